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

//! Per-device MDM client: resolved credentials, attached payload, and a
//! configured transport.
//!
//! An [`MdmClient`] is derived state, reconstructed on demand from a
//! device record and its collaborators, and cached on the owning
//! [`Device`](crate::device::Device). It is never persisted.

use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

use crate::device::{DeviceRecord, DeviceServices};
use crate::error::{Error, Result};
use crate::keychain::{CredentialStore, KeychainItem};
use crate::profile::{MdmPayload, ProfileStore};
use crate::transport::{
    ClientIdentity, DeviceInfo, IdentitySupplier, Transport, TransportFactory, TransportOptions,
};

/// Shared slot holding the device's currently resolved identity.
///
/// The transport reads it per handshake through the
/// [`IdentitySupplier`] seam; resolution writes it only on full
/// success, so it is never observed half-set.
#[derive(Clone, Default)]
pub struct IdentityHandle(Arc<RwLock<Option<ClientIdentity>>>);

impl IdentityHandle {
    /// Snapshot of the current identity, if any.
    pub fn get(&self) -> Option<ClientIdentity> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an identity is currently resolved.
    pub fn is_set(&self) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set(&self, identity: Option<ClientIdentity>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }
}

impl std::fmt::Debug for IdentityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IdentityHandle").field(&self.is_set()).finish()
    }
}

impl IdentitySupplier for IdentityHandle {
    fn identity(&self) -> Result<ClientIdentity> {
        self.get()
            .ok_or_else(|| Error::not_enrolled("no identity material resolved"))
    }
}

/// Per-device MDM state machine endpoint.
pub struct MdmClient {
    identity: IdentityHandle,
    payload: Option<MdmPayload>,
    transport: Option<Box<dyn Transport>>,
    defer_command_responses: bool,
}

impl MdmClient {
    fn empty() -> Self {
        Self {
            identity: IdentityHandle::default(),
            payload: None,
            transport: None,
            defer_command_responses: false,
        }
    }

    /// Construct a client for an already-enrolled device record:
    /// resolve identity and payload, re-validate the enrollment
    /// invariant, and configure the transport.
    pub(crate) fn connect(record: &DeviceRecord, services: &DeviceServices) -> Result<Self> {
        let mut client = Self::empty();
        client.resolve_identity(
            services.keychain.as_ref(),
            &record.mdm_identity_keychain_uuid,
        )?;
        client.resolve_payload(services.profiles.as_ref(), &record.mdm_profile_identifier)?;
        // Each step succeeded individually; the full invariant must
        // still hold before the device is treated as enrolled.
        if !client.is_enrolled(record) {
            return Err(Error::not_enrolled(format!(
                "enrollment invariant does not hold for device {}",
                record.udid
            )));
        }
        client.configure_transport(record, services.transports.as_ref())?;
        Ok(client)
    }

    /// Construct a client for a fresh enrollment: resolve identity and
    /// attach the supplied payload directly instead of loading one from
    /// the profile store.
    pub(crate) fn with_payload(
        record: &DeviceRecord,
        services: &DeviceServices,
        payload: MdmPayload,
    ) -> Result<Self> {
        let mut client = Self::empty();
        client.resolve_identity(
            services.keychain.as_ref(),
            &record.mdm_identity_keychain_uuid,
        )?;
        client.payload = Some(payload);
        client.configure_transport(record, services.transports.as_ref())?;
        Ok(client)
    }

    /// Resolve the device identity through the credential store's
    /// three-hop chain: identity grouping, then its key and certificate
    /// items as independent lookups.
    ///
    /// On success the certificate and private key are set together; on
    /// any failure the stored identity is left untouched.
    pub fn resolve_identity(
        &mut self,
        keychain: &dyn CredentialStore,
        keychain_uuid: &str,
    ) -> Result<()> {
        if keychain_uuid.is_empty() {
            return Err(Error::validation("empty keychain UUID for MDM identity"));
        }

        let KeychainItem::Identity {
            key_uuid,
            certificate_uuid,
        } = keychain.load_item(keychain_uuid)?
        else {
            return Err(Error::validation(format!(
                "keychain item {keychain_uuid} is not an identity grouping"
            )));
        };

        let KeychainItem::PrivateKey { key_pem } = keychain.load_item(&key_uuid)? else {
            return Err(Error::validation(format!(
                "keychain item {key_uuid} is not a private key"
            )));
        };
        let KeychainItem::Certificate { certificate } = keychain.load_item(&certificate_uuid)?
        else {
            return Err(Error::validation(format!(
                "keychain item {certificate_uuid} is not a certificate"
            )));
        };

        tracing::debug!(keychain_uuid, "resolved MDM identity");
        self.identity.set(Some(ClientIdentity {
            certificate,
            key_pem,
        }));
        Ok(())
    }

    /// Resolve the enrollment payload from the profile store.
    ///
    /// The profile must contain exactly one MDM payload; zero or many
    /// both reject — an ambiguous enrollment target is never silently
    /// accepted.
    pub fn resolve_payload(
        &mut self,
        profiles: &dyn ProfileStore,
        profile_identifier: &str,
    ) -> Result<()> {
        if profile_identifier.is_empty() {
            return Err(Error::validation("no MDM profile installed on device"));
        }

        let profile = profiles.load(profile_identifier)?;
        let payloads = profile.mdm_payloads();
        if payloads.len() != 1 {
            return Err(Error::InvalidProfile {
                identifier: profile_identifier.to_owned(),
                payload_count: payloads.len(),
            });
        }

        tracing::debug!(profile_identifier, "resolved MDM payload");
        self.payload = Some(payloads[0].clone());
        Ok(())
    }

    fn configure_transport(
        &mut self,
        record: &DeviceRecord,
        factory: &dyn TransportFactory,
    ) -> Result<()> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| Error::validation("no MDM payload attached"))?;

        let mut builder = TransportOptions::builder()
            .identity(Arc::new(self.identity.clone()))
            .device(DeviceInfo {
                udid: record.udid.clone(),
                serial_number: record.serial.clone(),
                device_name: record.computer_name.clone(),
            })
            .server_url(&payload.server_url)?
            .sign_message(payload.sign_message);
        if let Some(check_in_url) = &payload.check_in_url {
            builder = builder.check_in_url(check_in_url)?;
        }

        self.transport = Some(factory.build(builder.build()?)?);
        Ok(())
    }

    /// Whether the full enrollment invariant holds for `record`: profile
    /// identifier set, keychain UUID set, payload attached, certificate
    /// and private key resolved.
    pub fn is_enrolled(&self, record: &DeviceRecord) -> bool {
        let identity = self.identity.get();
        let checks = [
            !record.mdm_profile_identifier.is_empty(),
            !record.mdm_identity_keychain_uuid.is_empty(),
            self.payload.is_some(),
            identity.is_some(),
            identity.as_ref().is_some_and(|i| !i.key_pem.is_empty()),
        ];
        checks.iter().all(|&ok| ok)
    }

    /// The attached MDM payload, if any.
    pub fn payload(&self) -> Option<&MdmPayload> {
        self.payload.as_ref()
    }

    /// Handle to the shared identity slot.
    pub fn identity_handle(&self) -> &IdentityHandle {
        &self.identity
    }

    /// Whether command responses should be deferred with NotNow.
    pub fn defer_command_responses(&self) -> bool {
        self.defer_command_responses
    }

    /// Set whether command responses should be deferred with NotNow.
    pub fn set_defer_command_responses(&mut self, defer: bool) {
        self.defer_command_responses = defer;
    }

    /// Perform an Authenticate round-trip through the configured
    /// transport.
    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        self.transport()?.authenticate(cancel).await
    }

    /// Perform a TokenUpdate round-trip through the configured
    /// transport.
    pub async fn token_update(
        &self,
        cancel: &CancellationToken,
        awaiting_configuration: bool,
    ) -> Result<()> {
        self.transport()?
            .token_update(cancel, awaiting_configuration)
            .await
    }

    fn transport(&self) -> Result<&dyn Transport> {
        self.transport
            .as_deref()
            .ok_or_else(|| Error::validation("transport not configured"))
    }

    /// Drop all resolved enrollment state: identity and payload.
    pub(crate) fn clear(&mut self) {
        self.identity.set(None);
        self.payload = None;
    }
}

impl std::fmt::Debug for MdmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdmClient")
            .field("identity", &self.identity)
            .field("payload", &self.payload)
            .field("transport", &self.transport.is_some())
            .field("defer_command_responses", &self.defer_command_responses)
            .finish()
    }
}
