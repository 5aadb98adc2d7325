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

//! # usg-mdm-sim
//!
//! A simulated fleet of MDM-managed devices for testing and load
//! generation against MDM server implementations.
//!
//! Each simulated device owns a durable identity (UDID, serial number),
//! an enrollment record, and cryptographic credentials proving its
//! identity to the server. The core of the crate is the device identity
//! and enrollment state machine: credential resolution through the
//! keychain's three-hop identity chain, attachment of a single MDM
//! payload, validation of the enrollment invariant, transport wiring,
//! and the enroll/unenroll lifecycle with strict partial-failure
//! semantics — a device never reports enrolled on partial success.
//!
//! ## Features
//!
//! - **Async-first design** using Tokio, with cancellation tokens
//!   threaded through every network-bearing operation
//! - **Pluggable collaborators**: credential store, profile store, and
//!   wire transport are trait seams with in-memory / HTTP defaults
//! - **Transactional persistence** of device records on an embedded
//!   database, safe to share across a fleet
//! - **HTTP check-in transport** speaking plist Authenticate and
//!   TokenUpdate messages with mutual TLS and retry/backoff
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use usg_mdm_sim::checkin::HttpTransportFactory;
//! use usg_mdm_sim::keychain::InMemoryKeychain;
//! use usg_mdm_sim::profile::InMemoryProfileStore;
//! use usg_mdm_sim::{Device, DeviceServices, DeviceStore};
//!
//! # fn main() -> usg_mdm_sim::Result<()> {
//! let services = DeviceServices {
//!     keychain: Arc::new(InMemoryKeychain::new()),
//!     profiles: Arc::new(InMemoryProfileStore::new()),
//!     transports: Arc::new(HttpTransportFactory::default()),
//! };
//!
//! // Create a device with a random serial and UDID, then persist it.
//! let store = DeviceStore::open("devices.redb")?;
//! let device = Device::new("", services.clone());
//! store.save(device.record())?;
//!
//! // Reload it later by UDID.
//! let record = store.load(device.udid())?;
//! let device = Device::from_record(record, services);
//! assert!(!device.enrolled());
//! # Ok(())
//! # }
//! ```
//!
//! ## Enrollment
//!
//! A fresh enrollment installs the identity chain into the credential
//! store, attaches the enrollment payload directly, and commits the
//! profile reference only once TokenUpdate succeeds:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use usg_mdm_sim::keychain::install_identity;
//! use usg_mdm_sim::{Device, MdmPayload};
//! # async fn example(
//! #     mut device: Device,
//! #     key_pem: Vec<u8>,
//! #     certificate: x509_cert::Certificate,
//! # ) -> usg_mdm_sim::Result<()> {
//! # let keychain = usg_mdm_sim::keychain::InMemoryKeychain::new();
//!
//! let identity_uuid = install_identity(&keychain, key_pem, certificate)?;
//! device.set_identity_keychain_uuid(identity_uuid);
//!
//! device.attach_payload(MdmPayload {
//!     server_url: "https://mdm.example.com/mdm".into(),
//!     check_in_url: Some("https://mdm.example.com/checkin".into()),
//!     sign_message: true,
//!     check_out_when_removed: false,
//! })?;
//!
//! let cancel = CancellationToken::new();
//! device.enroll("com.example.enrollment", &cancel).await?;
//! assert!(device.enrolled());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A device is an independently operable unit with no internal locking;
//! a harness driving one device from multiple actors must serialize
//! access per device (one worker per device, or an external per-device
//! lock). Across devices the only shared state is the device store,
//! which serializes individual transactions.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod checkin;
pub mod client;
pub mod device;
pub mod error;
pub mod identifier;
pub mod keychain;
pub mod profile;
pub mod store;
pub mod tls;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types at crate root for convenience
pub use client::MdmClient;
pub use device::{Device, DeviceRecord, DeviceServices};
pub use error::{Error, Result};
pub use profile::{MdmPayload, Payload, Profile};
pub use store::DeviceStore;
pub use transport::{Transport, TransportFactory, TransportOptions};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("usg-mdm-sim/", env!("CARGO_PKG_VERSION"));
