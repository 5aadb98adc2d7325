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

//! Transport interface for MDM server round-trips.
//!
//! The core state machine drives exactly two wire operations —
//! Authenticate and TokenUpdate — through the [`Transport`] trait.
//! Concrete transports own timeout and retry policy; the core passes a
//! cancellation token into every call and propagates cancellation
//! without committing partial enrollment state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;
use x509_cert::Certificate;

use crate::error::{Error, Result};

/// Resolved identity material handed to a transport for TLS and signing.
#[derive(Clone)]
pub struct ClientIdentity {
    /// The device's MDM identity certificate.
    pub certificate: Certificate,
    /// PKCS#8 PEM bytes of the matching private key.
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("key_pem_len", &self.key_pem.len())
            .finish_non_exhaustive()
    }
}

/// Capability that supplies the device's current identity on demand.
///
/// Transports call this per handshake so they always see the current
/// certificate/key pair instead of a copy captured at configuration
/// time.
pub trait IdentitySupplier: Send + Sync {
    /// The currently resolved identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEnrolled`] when no identity is resolved
    /// (e.g. after unenrollment).
    fn identity(&self) -> Result<ClientIdentity>;
}

/// Capability that produces a detached signature over a check-in body.
///
/// Used to populate the `Mdm-Signature` header in sign-message mode.
/// The signature format (CMS) is the implementer's concern.
pub trait MessageSigner: Send + Sync {
    /// Sign the given message body.
    fn sign(&self, body: &[u8]) -> Result<Vec<u8>>;
}

/// Descriptive device fields a transport needs to build check-in
/// messages.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device UDID.
    pub udid: String,
    /// Device serial number.
    pub serial_number: String,
    /// Device display name.
    pub device_name: String,
}

/// Server certificate trust configuration.
#[derive(Debug, Clone, Default)]
pub enum ServerTrust {
    /// Use the built-in webpki root store.
    #[default]
    WebPki,
    /// Trust exactly the given PEM-encoded CA certificates.
    Explicit(Vec<Vec<u8>>),
    /// Accept any server certificate (insecure, for test rigs only).
    InsecureAcceptAny,
}

/// Exponential backoff retry policy for transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * exp;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Options a transport is constructed with.
///
/// The core supplies the identity capability, the URL pair, the
/// sign-message toggle, and device info; the configured
/// [`TransportFactory`] contributes trust anchors, timeout, retry
/// policy, and an optional message signer.
#[derive(Clone)]
pub struct TransportOptions {
    /// Supplies the current client identity per handshake.
    pub identity: Arc<dyn IdentitySupplier>,
    /// Device fields used in check-in message bodies.
    pub device: DeviceInfo,
    /// MDM server URL.
    pub server_url: Url,
    /// Check-in URL; falls back to `server_url` when absent.
    pub check_in_url: Option<Url>,
    /// Whether check-in messages carry an `Mdm-Signature` header.
    pub sign_message: bool,
    /// Produces the detached signature in sign-message mode.
    pub signer: Option<Arc<dyn MessageSigner>>,
    /// Server certificate trust configuration.
    pub trust: ServerTrust,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportOptions")
            .field("device", &self.device)
            .field("server_url", &self.server_url)
            .field("check_in_url", &self.check_in_url)
            .field("sign_message", &self.sign_message)
            .field("signer", &self.signer.is_some())
            .field("trust", &self.trust)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl TransportOptions {
    /// Create a new options builder.
    pub fn builder() -> TransportOptionsBuilder {
        TransportOptionsBuilder::default()
    }

    /// The URL check-in messages are sent to.
    pub fn effective_check_in_url(&self) -> &Url {
        self.check_in_url.as_ref().unwrap_or(&self.server_url)
    }
}

/// Builder for [`TransportOptions`].
#[derive(Default)]
pub struct TransportOptionsBuilder {
    identity: Option<Arc<dyn IdentitySupplier>>,
    device: Option<DeviceInfo>,
    server_url: Option<Url>,
    check_in_url: Option<Url>,
    sign_message: bool,
    signer: Option<Arc<dyn MessageSigner>>,
    trust: ServerTrust,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
}

impl TransportOptionsBuilder {
    /// Set the identity supplier.
    pub fn identity(mut self, identity: Arc<dyn IdentitySupplier>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the device info used in check-in messages.
    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the MDM server URL.
    pub fn server_url(mut self, url: impl AsRef<str>) -> std::result::Result<Self, url::ParseError> {
        self.server_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set the check-in URL.
    pub fn check_in_url(
        mut self,
        url: impl AsRef<str>,
    ) -> std::result::Result<Self, url::ParseError> {
        self.check_in_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Enable or disable sign-message mode.
    pub fn sign_message(mut self, sign_message: bool) -> Self {
        self.sign_message = sign_message;
        self
    }

    /// Set the message signer used in sign-message mode.
    pub fn signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set the server trust configuration.
    pub fn trust(mut self, trust: ServerTrust) -> Self {
        self.trust = trust;
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the identity supplier, device
    /// info, or server URL is missing.
    pub fn build(self) -> Result<TransportOptions> {
        let identity = self
            .identity
            .ok_or_else(|| Error::validation("transport options require an identity supplier"))?;
        let device = self
            .device
            .ok_or_else(|| Error::validation("transport options require device info"))?;
        let server_url = self
            .server_url
            .ok_or_else(|| Error::validation("transport options require a server URL"))?;

        Ok(TransportOptions {
            identity,
            device,
            server_url,
            check_in_url: self.check_in_url,
            sign_message: self.sign_message,
            signer: self.signer,
            trust: self.trust,
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

/// Wire-protocol client for the two check-in operations the core drives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform an Authenticate check-in round-trip.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()>;

    /// Perform a TokenUpdate check-in round-trip.
    async fn token_update(
        &self,
        cancel: &CancellationToken,
        awaiting_configuration: bool,
    ) -> Result<()>;
}

/// Constructs a [`Transport`] from the options the core assembled.
pub trait TransportFactory: Send + Sync {
    /// Build a transport for one device.
    fn build(&self, options: TransportOptions) -> Result<Box<dyn Transport>>;
}
