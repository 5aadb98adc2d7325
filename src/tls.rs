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

//! TLS configuration helpers for the check-in transport.
//!
//! Builds a reqwest client from the transport's trust configuration and
//! a supplied client identity. The client is rebuilt per check-in
//! attempt so the identity is always the currently resolved one.

use base64::prelude::*;
use der::Encode;

use crate::error::{Error, Result};
use crate::transport::{ClientIdentity, ServerTrust, TransportOptions};

/// Build a reqwest Client with the appropriate TLS configuration and
/// the given client identity for mutual TLS.
pub fn build_http_client(
    options: &TransportOptions,
    identity: &ClientIdentity,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(crate::USER_AGENT)
        .timeout(options.timeout)
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2);

    match &options.trust {
        ServerTrust::WebPki => {
            builder = builder.tls_built_in_root_certs(true);
        }
        ServerTrust::Explicit(ca_certs) => {
            builder = builder.tls_built_in_root_certs(false);
            for ca_pem in ca_certs {
                let cert = reqwest::Certificate::from_pem(ca_pem)
                    .map_err(|e| Error::transport(format!("failed to parse CA certificate: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        ServerTrust::InsecureAcceptAny => {
            builder = builder
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(true);
        }
    }

    let pem_bundle = identity_pem_bundle(identity)?;
    let identity = reqwest::Identity::from_pem(&pem_bundle)
        .map_err(|e| Error::transport(format!("failed to build client identity: {e}")))?;
    builder = builder.identity(identity);

    builder
        .build()
        .map_err(|e| Error::transport(format!("failed to build HTTP client: {e}")))
}

/// Combine the identity certificate and key into a single PEM buffer,
/// the form reqwest consumes.
fn identity_pem_bundle(identity: &ClientIdentity) -> Result<Vec<u8>> {
    let cert_der = identity.certificate.to_der()?;
    let mut bundle = pem_encode("CERTIFICATE", &cert_der);
    bundle.push(b'\n');
    bundle.extend_from_slice(&identity.key_pem);
    Ok(bundle)
}

/// PEM-encode a DER blob under the given tag, wrapped at 64 columns.
pub(crate) fn pem_encode(tag: &str, der: &[u8]) -> Vec<u8> {
    let b64 = BASE64_STANDARD.encode(der);
    let mut out = String::with_capacity(b64.len() + b64.len() / 64 + 64);
    out.push_str("-----BEGIN ");
    out.push_str(tag);
    out.push_str("-----\n");
    let mut rest = b64.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        out.push_str(line);
        out.push('\n');
        rest = tail;
    }
    out.push_str("-----END ");
    out.push_str(tag);
    out.push_str("-----\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_encode_wraps_at_64_columns() {
        let pem = pem_encode("CERTIFICATE", &[0u8; 100]);
        let text = String::from_utf8(pem).expect("utf8");
        assert!(text.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(text.ends_with("-----END CERTIFICATE-----\n"));
        for line in text.lines() {
            assert!(line.len() <= 64, "line too long: {line}");
        }
    }

    #[test]
    fn test_identity_pem_bundle_contains_cert_and_key() {
        let (key_pem, certificate) = crate::test_support::test_identity();
        let identity = ClientIdentity {
            certificate,
            key_pem: key_pem.clone(),
        };
        let bundle = identity_pem_bundle(&identity).expect("bundle");
        let text = String::from_utf8(bundle).expect("utf8");
        assert!(text.contains("-----BEGIN CERTIFICATE-----"));
        assert!(text.contains(String::from_utf8(key_pem).expect("utf8").trim_end()));
    }
}
