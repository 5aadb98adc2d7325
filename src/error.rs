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

//! Error types for the device simulator.
//!
//! This module defines all error types that can occur while resolving a
//! device's credentials, driving the enrollment lifecycle, talking to an
//! MDM server, or persisting device records.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during device simulation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required reference is empty or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced keychain item, profile, or device record is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// An enrollment profile did not contain exactly one MDM payload.
    #[error("invalid enrollment profile '{identifier}': expected exactly one MDM payload, found {payload_count}")]
    InvalidProfile {
        /// Identifier of the rejected profile.
        identifier: String,
        /// Number of MDM payloads the profile carried.
        payload_count: usize,
    },

    /// An enrollment mode this simulator does not speak was requested.
    #[error("unsupported enrollment: {0}")]
    UnsupportedEnrollment(String),

    /// The enrollment invariant does not hold for the device.
    #[error("device not enrolled: {0}")]
    NotEnrolled(String),

    /// A persistence transaction failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A transport-level failure outside HTTP semantics.
    #[error("transport error: {0}")]
    Transport(String),

    /// The MDM server rejected a check-in message.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message or status text from the server.
        message: String,
    },

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// HTTP request or response error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// Property list encoding error.
    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),
}

impl Error {
    /// Create a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an unsupported-enrollment error with the given message.
    pub fn unsupported_enrollment(msg: impl Into<String>) -> Self {
        Self::UnsupportedEnrollment(msg.into())
    }

    /// Create a not-enrolled error with the given message.
    pub fn not_enrolled(msg: impl Into<String>) -> Self {
        Self::NotEnrolled(msg.into())
    }

    /// Create a storage error with the given message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a server error with status and message.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }
}
