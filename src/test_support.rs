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

//! Shared helpers for unit tests.

use async_trait::async_trait;
use der::Decode;
use tokio_util::sync::CancellationToken;
use x509_cert::Certificate;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportFactory, TransportOptions};

/// Mint a throwaway self-signed certificate.
pub(crate) fn self_signed_certificate() -> Certificate {
    test_identity().1
}

/// Mint a throwaway identity: (PKCS#8 PEM key bytes, certificate).
pub(crate) fn test_identity() -> (Vec<u8>, Certificate) {
    let certified = rcgen::generate_simple_self_signed(vec!["device.example.com".to_string()])
        .expect("generate test identity");
    let certificate = Certificate::from_der(certified.cert.der().as_ref())
        .expect("parse generated certificate");
    (certified.key_pair.serialize_pem().into_bytes(), certificate)
}

/// Transport that succeeds without touching the network, honoring a
/// pre-cancelled token.
pub(crate) struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
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
        Ok(())
    }
}

/// Factory producing [`NullTransport`]s.
pub(crate) struct NullTransportFactory;

impl TransportFactory for NullTransportFactory {
    fn build(&self, _options: TransportOptions) -> Result<Box<dyn Transport>> {
        Ok(Box::new(NullTransport))
    }
}
