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

//! Shared fixtures for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use der::Decode;
use tokio_util::sync::CancellationToken;
use x509_cert::Certificate;

use usg_mdm_sim::keychain::install_identity;
use usg_mdm_sim::transport::{
    ClientIdentity, IdentitySupplier, Transport, TransportFactory, TransportOptions,
};
use usg_mdm_sim::{Device, DeviceServices, Error, MdmPayload, Result};

/// Mint a throwaway identity: (PKCS#8 PEM key bytes, certificate).
pub fn test_identity() -> (Vec<u8>, Certificate) {
    let certified = rcgen::generate_simple_self_signed(vec!["device.example.com".to_string()])
        .expect("generate test identity");
    let certificate = Certificate::from_der(certified.cert.der().as_ref())
        .expect("parse generated certificate");
    (certified.key_pair.serialize_pem().into_bytes(), certificate)
}

/// Identity supplier returning a fixed identity.
pub struct FixedIdentity(pub ClientIdentity);

impl IdentitySupplier for FixedIdentity {
    fn identity(&self) -> Result<ClientIdentity> {
        Ok(self.0.clone())
    }
}

/// Call counters observed across a [`ScriptedTransportFactory`]'s
/// transports.
#[derive(Default)]
pub struct TransportCalls {
    pub authenticate: AtomicUsize,
    pub token_update: AtomicUsize,
}

/// Transport whose outcomes are scripted per operation.
pub struct ScriptedTransport {
    calls: Arc<TransportCalls>,
    fail_authenticate: bool,
    fail_token_update: bool,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);
        if self.fail_authenticate {
            return Err(Error::server_error(500, "authenticate rejected"));
        }
        Ok(())
    }

    async fn token_update(
        &self,
        cancel: &CancellationToken,
        _awaiting_configuration: bool,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.calls.token_update.fetch_add(1, Ordering::SeqCst);
        if self.fail_token_update {
            return Err(Error::server_error(500, "token update rejected"));
        }
        Ok(())
    }
}

/// Factory for [`ScriptedTransport`]s sharing one set of counters.
#[derive(Default)]
pub struct ScriptedTransportFactory {
    pub calls: Arc<TransportCalls>,
    pub fail_authenticate: bool,
    pub fail_token_update: bool,
}

impl TransportFactory for ScriptedTransportFactory {
    fn build(&self, _options: TransportOptions) -> Result<Box<dyn Transport>> {
        Ok(Box::new(ScriptedTransport {
            calls: Arc::clone(&self.calls),
            fail_authenticate: self.fail_authenticate,
            fail_token_update: self.fail_token_update,
        }))
    }
}

/// Standard sign-message enrollment payload.
pub fn enrollment_payload() -> MdmPayload {
    MdmPayload {
        server_url: "https://mdm.example.com/mdm".into(),
        check_in_url: Some("https://mdm.example.com/checkin".into()),
        sign_message: true,
        check_out_when_removed: false,
    }
}

/// A device with an installed identity chain, ready to enroll through
/// the given services.
pub fn device_with_identity(services: DeviceServices) -> Device {
    let (key_pem, certificate) = test_identity();
    let identity_uuid = install_identity(services.keychain.as_ref(), key_pem, certificate)
        .expect("install identity");
    let mut device = Device::new("", services);
    device.set_identity_keychain_uuid(identity_uuid);
    device
}
