// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Random device identifier generation.
//!
//! Serials and UDIDs are drawn independently at random; uniqueness is
//! probabilistic, not enforced — no check against existing records is
//! performed here.

use rand::Rng;
use uuid::Uuid;

// Numbers plus capital letters without I, L, O for readability.
const SERIAL_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Length of a generated serial number.
pub const SERIAL_LENGTH: usize = 12;

/// Generate a random 12-character serial number.
///
/// Each character is an independent uniform draw from the restricted
/// alphabet (digits and capital letters excluding I, L and O).
pub fn random_serial() -> String {
    let mut rng = rand::thread_rng();
    (0..SERIAL_LENGTH)
        .map(|_| SERIAL_ALPHABET[rng.gen_range(0..SERIAL_ALPHABET.len())] as char)
        .collect()
}

/// Generate a random UDID in canonical uppercase UUID form.
pub fn random_udid() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Whether a serial consists of exactly 12 characters from the
/// restricted alphabet.
pub fn is_valid_serial(serial: &str) -> bool {
    serial.len() == SERIAL_LENGTH
        && serial.bytes().all(|b| SERIAL_ALPHABET.contains(&b))
}
