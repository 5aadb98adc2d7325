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

//! Simulated devices: durable identity, enrollment references, and the
//! cached MDM client.
//!
//! A device is an independently operable unit. No internal locking is
//! provided; a harness driving one device from multiple actors must
//! serialize access per device.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::MdmClient;
use crate::error::{Error, Result};
use crate::identifier::{random_serial, random_udid};
use crate::keychain::CredentialStore;
use crate::profile::{MdmPayload, ProfileStore};
use crate::transport::TransportFactory;

/// Collaborators a device resolves its state through.
#[derive(Clone)]
pub struct DeviceServices {
    /// Credential store holding keys, certificates, and identity
    /// groupings.
    pub keychain: Arc<dyn CredentialStore>,
    /// Store of installed configuration profiles.
    pub profiles: Arc<dyn ProfileStore>,
    /// Builds the wire transport for enrolled devices.
    pub transports: Arc<dyn TransportFactory>,
}

impl std::fmt::Debug for DeviceServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceServices").finish_non_exhaustive()
    }
}

/// The durable, persisted part of a simulated device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Globally unique device identifier, canonical uppercase form.
    /// Immutable after creation.
    pub udid: String,
    /// 12-character serial number. Immutable after creation.
    pub serial: String,
    /// Display label.
    pub computer_name: String,
    /// Reference into the credential store; empty means no identity is
    /// attached.
    pub mdm_identity_keychain_uuid: String,
    /// Reference into the profile store; empty means not enrolled.
    pub mdm_profile_identifier: String,
}

impl DeviceRecord {
    /// Whether the record can be persisted. A device without a UDID is
    /// invalid.
    pub fn is_valid(&self) -> bool {
        !self.udid.is_empty()
    }
}

/// A simulated managed endpoint.
///
/// Owns a [`DeviceRecord`], the collaborator handles, and the lazily
/// constructed MDM client. The client is built on first access through
/// [`mdm_client`](Self::mdm_client), cached for the device's lifetime,
/// and mutated in place by enroll/unenroll rather than invalidated.
pub struct Device {
    record: DeviceRecord,
    services: DeviceServices,
    client: Option<MdmClient>,
}

impl Device {
    /// Create a new device with a random serial number and UDID.
    ///
    /// An empty `name` defaults the computer name to
    /// `"<serial>'s Computer"`.
    pub fn new(name: &str, services: DeviceServices) -> Self {
        let serial = random_serial();
        let computer_name = if name.is_empty() {
            format!("{serial}'s Computer")
        } else {
            name.to_owned()
        };
        Self {
            record: DeviceRecord {
                udid: random_udid(),
                serial,
                computer_name,
                mdm_identity_keychain_uuid: String::new(),
                mdm_profile_identifier: String::new(),
            },
            services,
            client: None,
        }
    }

    /// Wrap an existing record, typically one loaded from a
    /// [`DeviceStore`](crate::store::DeviceStore).
    pub fn from_record(record: DeviceRecord, services: DeviceServices) -> Self {
        Self {
            record,
            services,
            client: None,
        }
    }

    /// The persisted record.
    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    /// The device UDID.
    pub fn udid(&self) -> &str {
        &self.record.udid
    }

    /// The device serial number.
    pub fn serial(&self) -> &str {
        &self.record.serial
    }

    /// The device display name.
    pub fn computer_name(&self) -> &str {
        &self.record.computer_name
    }

    /// Attach the credential store reference for this device's MDM
    /// identity. Done by the harness after installing the identity
    /// chain, before enrollment.
    pub fn set_identity_keychain_uuid(&mut self, uuid: impl Into<String>) {
        self.record.mdm_identity_keychain_uuid = uuid.into();
    }

    /// The device's MDM client, constructed on first access.
    ///
    /// Construction resolves the identity from the credential store and
    /// the payload from the profile store, re-validates the enrollment
    /// invariant, and configures the transport. Nothing is cached on
    /// failure; a later call re-runs resolution.
    ///
    /// # Errors
    ///
    /// [`Error::NotEnrolled`] when the device has no identity keychain
    /// UUID or the invariant re-check fails; resolution errors
    /// propagate as-is.
    pub fn mdm_client(&mut self) -> Result<&mut MdmClient> {
        match &mut self.client {
            Some(client) => Ok(client),
            slot => {
                if self.record.mdm_identity_keychain_uuid.is_empty() {
                    return Err(Error::not_enrolled(format!(
                        "device {} has no identity keychain UUID",
                        self.record.udid
                    )));
                }
                let client = MdmClient::connect(&self.record, &self.services)?;
                Ok(slot.insert(client))
            }
        }
    }

    /// Construct and cache an MDM client around a directly supplied
    /// payload, the fresh-enrollment path: the payload does not come
    /// from the profile store because the profile reference is only
    /// committed once [`enroll`](Self::enroll) completes.
    ///
    /// Requires the identity keychain UUID to be set.
    pub fn attach_payload(&mut self, payload: MdmPayload) -> Result<&mut MdmClient> {
        let client = MdmClient::with_payload(&self.record, &self.services, payload)?;
        Ok(self.client.insert(client))
    }

    /// Enroll with the MDM server: Authenticate, then TokenUpdate, then
    /// commit the profile identifier on the record.
    ///
    /// The identifier is committed only after TokenUpdate succeeds; if
    /// Authenticate succeeds but TokenUpdate fails, the device remains
    /// not enrolled and the whole call must be retried. Cancellation is
    /// observed by the transport and propagates without committing.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedEnrollment`] when no payload is attached or
    /// the payload does not request sign-message mode — mutual-TLS-only
    /// enrollment is not supported.
    pub async fn enroll(
        &mut self,
        profile_identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::unsupported_enrollment("no MDM payload attached"))?;
        let payload = client
            .payload()
            .ok_or_else(|| Error::unsupported_enrollment("no MDM payload attached"))?;
        if !payload.sign_message {
            return Err(Error::unsupported_enrollment(
                "non-SignMessage (mutual-TLS) enrollment is not supported",
            ));
        }

        client.authenticate(cancel).await?;
        client.token_update(cancel, false).await?;

        self.record.mdm_profile_identifier = profile_identifier.to_owned();
        tracing::info!(
            udid = %self.record.udid,
            profile_identifier,
            "device enrolled"
        );
        Ok(())
    }

    /// Unenroll the device: clear the in-memory certificate, key, and
    /// payload, and both persisted reference fields.
    ///
    /// Idempotent — unenrolling an already-unenrolled device is a no-op
    /// that still reports success. No CheckOut message is sent, even
    /// when the payload requested `check_out_when_removed`.
    pub fn unenroll(&mut self) -> Result<()> {
        if let Some(client) = self.client.as_mut() {
            client.clear();
        }
        self.record.mdm_identity_keychain_uuid.clear();
        self.record.mdm_profile_identifier.clear();
        tracing::info!(udid = %self.record.udid, "device unenrolled");
        Ok(())
    }

    /// Whether the device is enrolled: the profile identifier, keychain
    /// UUID, payload, certificate, and private key are all present.
    pub fn enrolled(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| client.is_enrolled(&self.record))
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("record", &self.record)
            .field("client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}
