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

//! HTTP check-in transport.
//!
//! Sends plist-encoded Authenticate and TokenUpdate check-in messages
//! to the MDM server over HTTPS PUT. The client identity is re-read
//! from the supplier on every attempt, transient failures (connect
//! errors, timeouts, 5xx) are retried with exponential backoff, and
//! every wait observes the caller's cancellation token.
//!
//! The push token and push magic are fabricated at construction time —
//! a simulated device has no real APNs registration.

use rand::RngCore;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use base64::prelude::*;
use plist::{Dictionary, Value};

use crate::error::{Error, Result};
use crate::tls::build_http_client;
use crate::transport::{
    RetryPolicy, ServerTrust, Transport, TransportFactory, TransportOptions,
};

const CHECKIN_CONTENT_TYPE: &str = "application/x-apple-aspen-mdm-checkin";
const MDM_SIGNATURE_HEADER: &str = "Mdm-Signature";

/// MDM check-in client over HTTPS.
pub struct HttpTransport {
    options: TransportOptions,
    push_token: Vec<u8>,
    push_magic: String,
}

impl HttpTransport {
    /// Create a transport from the given options, fabricating a push
    /// token and push magic for TokenUpdate messages.
    pub fn new(options: TransportOptions) -> Self {
        let mut push_token = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut push_token);
        Self {
            options,
            push_token,
            push_magic: Uuid::new_v4().to_string().to_uppercase(),
        }
    }

    fn authenticate_body(&self) -> Result<Vec<u8>> {
        let device = &self.options.device;
        let mut dict = Dictionary::new();
        dict.insert("MessageType".into(), Value::String("Authenticate".into()));
        dict.insert("UDID".into(), Value::String(device.udid.clone()));
        dict.insert(
            "SerialNumber".into(),
            Value::String(device.serial_number.clone()),
        );
        dict.insert(
            "DeviceName".into(),
            Value::String(device.device_name.clone()),
        );
        encode_body(dict)
    }

    fn token_update_body(&self, awaiting_configuration: bool) -> Result<Vec<u8>> {
        let device = &self.options.device;
        let mut dict = Dictionary::new();
        dict.insert("MessageType".into(), Value::String("TokenUpdate".into()));
        dict.insert("UDID".into(), Value::String(device.udid.clone()));
        dict.insert("Token".into(), Value::Data(self.push_token.clone()));
        dict.insert("PushMagic".into(), Value::String(self.push_magic.clone()));
        dict.insert(
            "AwaitingConfiguration".into(),
            Value::Boolean(awaiting_configuration),
        );
        encode_body(dict)
    }

    /// Send one check-in body, retrying transient failures per the
    /// configured policy. Returns [`Error::Cancelled`] as soon as the
    /// token fires, including mid-backoff.
    async fn check_in(&self, cancel: &CancellationToken, body: Vec<u8>) -> Result<()> {
        let url = self.options.effective_check_in_url().clone();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.send_once(&url, &body) => result,
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.options.retry.max_attempts && retryable(&err) => {
                    let delay = self.options.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "check-in attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, url: &Url, body: &[u8]) -> Result<()> {
        // Re-read the identity so a rotated certificate takes effect on
        // the next handshake.
        let identity = self.options.identity.identity()?;
        let client = build_http_client(&self.options, &identity)?;

        tracing::debug!("PUT {}", url);
        let mut request = client
            .put(url.clone())
            .header(CONTENT_TYPE, CHECKIN_CONTENT_TYPE)
            .body(body.to_vec());

        if self.options.sign_message {
            if let Some(signer) = &self.options.signer {
                let signature = signer.sign(body)?;
                request = request.header(MDM_SIGNATURE_HEADER, BASE64_STANDARD.encode(signature));
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::server_error(status.as_u16(), message));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("options", &self.options)
            .field("push_magic", &self.push_magic)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let body = self.authenticate_body()?;
        self.check_in(cancel, body).await
    }

    async fn token_update(
        &self,
        cancel: &CancellationToken,
        awaiting_configuration: bool,
    ) -> Result<()> {
        let body = self.token_update_body(awaiting_configuration)?;
        self.check_in(cancel, body).await
    }
}

fn encode_body(dict: Dictionary) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut body)?;
    Ok(body)
}

// Request-construction failures are deterministic and never retried;
// only connect errors, timeouts, and 5xx responses are transient.
fn retryable(err: &Error) -> bool {
    match err {
        Error::Http(e) => e.is_connect() || e.is_timeout(),
        Error::Server { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Builds [`HttpTransport`]s, contributing trust, timeout, retry, and
/// signer settings to the options the core assembled.
#[derive(Clone, Default)]
pub struct HttpTransportFactory {
    /// Server certificate trust configuration for all built transports.
    pub trust: ServerTrust,
    /// Per-request timeout; `None` keeps the options' default.
    pub timeout: Option<std::time::Duration>,
    /// Retry policy; `None` keeps the options' default.
    pub retry: Option<RetryPolicy>,
    /// Message signer for sign-message mode.
    pub signer: Option<std::sync::Arc<dyn crate::transport::MessageSigner>>,
}

impl std::fmt::Debug for HttpTransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportFactory")
            .field("trust", &self.trust)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn build(&self, mut options: TransportOptions) -> Result<Box<dyn Transport>> {
        options.trust = self.trust.clone();
        if let Some(timeout) = self.timeout {
            options.timeout = timeout;
        }
        if let Some(retry) = &self.retry {
            options.retry = retry.clone();
        }
        if options.signer.is_none() {
            options.signer = self.signer.clone();
        }
        Ok(Box::new(HttpTransport::new(options)))
    }
}
