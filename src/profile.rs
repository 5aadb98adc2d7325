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

//! Configuration profiles and the MDM enrollment payload.
//!
//! A profile is a named bundle of configuration payloads. The only
//! payload this simulator interprets is the MDM payload describing the
//! server endpoints; everything else rides along as opaque entries.
//! Profile (plist) parsing is out of scope — profiles are constructed
//! programmatically by the driving harness.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// MDM enrollment payload: where and how a device checks in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdmPayload {
    /// URL the device sends command responses to.
    #[serde(rename = "ServerURL")]
    pub server_url: String,

    /// URL for check-in messages (Authenticate, TokenUpdate). When
    /// absent, check-ins go to [`server_url`](Self::server_url).
    #[serde(rename = "CheckInURL", default, skip_serializing_if = "Option::is_none")]
    pub check_in_url: Option<String>,

    /// Whether messages carry a detached signature in the
    /// `Mdm-Signature` header. Only sign-message enrollment is
    /// supported by this simulator.
    #[serde(rename = "SignMessage", default)]
    pub sign_message: bool,

    /// Whether the server asked to be notified when the enrollment
    /// profile is removed.
    #[serde(rename = "CheckOutWhenRemoved", default)]
    pub check_out_when_removed: bool,
}

/// A single payload inside a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The MDM enrollment payload.
    Mdm(MdmPayload),
    /// Any other payload type, carried but not interpreted.
    Other {
        /// The payload's type identifier (e.g. `com.apple.wifi.managed`).
        payload_type: String,
    },
}

/// A named bundle of configuration payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// The profile identifier (e.g. `com.example.enrollment`).
    pub identifier: String,
    /// Optional human-readable name.
    pub display_name: Option<String>,
    /// The payloads the profile carries.
    pub payloads: Vec<Payload>,
}

impl Profile {
    /// Create an empty profile with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: None,
            payloads: Vec::new(),
        }
    }

    /// Append a payload, builder-style.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payloads.push(payload);
        self
    }

    /// All MDM payloads the profile carries.
    ///
    /// A profile is a valid enrollment source only when this returns
    /// exactly one payload.
    pub fn mdm_payloads(&self) -> Vec<&MdmPayload> {
        self.payloads
            .iter()
            .filter_map(|p| match p {
                Payload::Mdm(mdm) => Some(mdm),
                Payload::Other { .. } => None,
            })
            .collect()
    }
}

/// Store of named configuration profiles.
pub trait ProfileStore: Send + Sync {
    /// Load the profile with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such profile is installed.
    fn load(&self, identifier: &str) -> Result<Profile>;

    /// Install a profile, replacing any existing one with the same
    /// identifier.
    fn install(&self, profile: Profile) -> Result<()>;
}

/// In-memory [`ProfileStore`] for simulated devices.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfileStore {
    /// Create an empty profile store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn load(&self, identifier: &str) -> Result<Profile> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        profiles
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("profile {identifier} not found")))
    }

    fn install(&self, profile: Profile) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles.insert(profile.identifier.clone(), profile);
        Ok(())
    }
}
