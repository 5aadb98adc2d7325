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

//! Integration tests for the HTTP check-in transport, using wiremock as
//! a stand-in MDM server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_identity, FixedIdentity};
use usg_mdm_sim::checkin::HttpTransport;
use usg_mdm_sim::transport::{
    ClientIdentity, DeviceInfo, MessageSigner, RetryPolicy, ServerTrust, Transport,
    TransportOptions,
};
use usg_mdm_sim::{Error, Result};

const UDID: &str = "E2C9AF2B-4F68-4B13-9B9D-09A51A21C8B5";

fn transport_for(server: &MockServer, sign_message: bool) -> HttpTransport {
    transport_with(server, sign_message, None, fast_retry())
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
    }
}

fn transport_with(
    server: &MockServer,
    sign_message: bool,
    signer: Option<Arc<dyn MessageSigner>>,
    retry: RetryPolicy,
) -> HttpTransport {
    let (key_pem, certificate) = test_identity();
    let mut builder = TransportOptions::builder()
        .identity(Arc::new(FixedIdentity(ClientIdentity {
            certificate,
            key_pem,
        })))
        .device(DeviceInfo {
            udid: UDID.into(),
            serial_number: "AB3K9HJ2MNPQ".into(),
            device_name: "AB3K9HJ2MNPQ's Computer".into(),
        })
        .server_url(format!("{}/mdm", server.uri()))
        .expect("server url")
        .check_in_url(format!("{}/checkin", server.uri()))
        .expect("check-in url")
        .sign_message(sign_message)
        .trust(ServerTrust::InsecureAcceptAny)
        .timeout(Duration::from_secs(5))
        .retry(retry);
    if let Some(signer) = signer {
        builder = builder.signer(signer);
    }
    HttpTransport::new(builder.build().expect("options"))
}

#[tokio::test]
async fn test_authenticate_sends_plist_checkin() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .and(header("Content-Type", "application/x-apple-aspen-mdm-checkin"))
        .and(body_string_contains("<string>Authenticate</string>"))
        .and(body_string_contains(UDID))
        .and(body_string_contains("AB3K9HJ2MNPQ"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    transport.authenticate(&cancel).await.expect("authenticate");
}

#[tokio::test]
async fn test_token_update_sends_token_and_awaiting_flag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .and(body_string_contains("<string>TokenUpdate</string>"))
        .and(body_string_contains("<key>Token</key>"))
        .and(body_string_contains("<key>PushMagic</key>"))
        .and(body_string_contains("<key>AwaitingConfiguration</key>"))
        .and(body_string_contains("<true/>"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    transport
        .token_update(&cancel, true)
        .await
        .expect("token update");
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    // First attempt hits a 503, the retry succeeds.
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    transport.authenticate(&cancel).await.expect("authenticate");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    let err = transport.authenticate(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 401, .. }));
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    let err = transport.authenticate(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_cancelled_token_stops_checkin() {
    let server = MockServer::start().await;
    // No mock mounted: a request would 404. Cancellation must win
    // before any request is attempted.
    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = transport.authenticate(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_cancel_during_retry_backoff_returns_promptly() {
    let server = MockServer::start().await;
    // The first attempt fails with a retryable 503, putting the
    // transport into a long backoff wait.
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_with(
        &server,
        false,
        None,
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        },
    );

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = transport.authenticate(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    // The call returned out of the backoff wait, not after the full
    // 30-second delay.
    assert!(started.elapsed() < Duration::from_secs(10));
}

struct StaticSigner;

impl MessageSigner for StaticSigner {
    fn sign(&self, _body: &[u8]) -> Result<Vec<u8>> {
        Ok(b"SIGNED".to_vec())
    }
}

#[tokio::test]
async fn test_sign_message_mode_adds_mdm_signature_header() {
    let server = MockServer::start().await;
    // base64("SIGNED")
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .and(header("Mdm-Signature", "U0lHTkVE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_with(&server, true, Some(Arc::new(StaticSigner)), fast_retry());
    let cancel = CancellationToken::new();
    transport.authenticate(&cancel).await.expect("authenticate");
}

#[tokio::test]
async fn test_unsigned_mode_sends_no_signature_header() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, false);
    let cancel = CancellationToken::new();
    transport.authenticate(&cancel).await.expect("authenticate");

    let requests = server.received_requests().await.expect("requests");
    assert!(requests
        .iter()
        .all(|r| !r.headers.contains_key("Mdm-Signature")));
}
