//! Probe module for target checks.
//!
//! Supports HTTP, DNS and mock probes.

mod dns;
mod http;
mod mock;

pub use dns::*;
pub use http::*;
pub use mock::*;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Why a probe considered its target down.
///
/// The `Display` text is what incident messages show as the failure reason.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("expected status code {expected}, got {got}")]
    UnexpectedStatus { expected: u16, got: u16 },
    #[error("unexpected body: {body}.\nexpected to match: {pattern}")]
    UnexpectedBody { body: String, pattern: String },
    #[error("DNS error: {0}")]
    Dns(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// What a probe needs to know about the monitor it runs for.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    pub address: &'a str,
    pub timeout: Duration,
}

/// Capabilities every monitor kind provides.
pub trait Check {
    /// Normalise defaults and report every configuration problem.
    fn validate(&mut self) -> Vec<String>;

    /// Human readable description of the configured features.
    fn describe(&self) -> Vec<String>;

    /// Probe the target once.
    ///
    /// `Ok` carries the data handed to the `on_success` hook.
    fn test(&mut self, target: ProbeTarget<'_>) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

/// The monitor kinds.
#[derive(Debug)]
pub enum Probe {
    Http(HttpProbe),
    Dns(DnsProbe),
    Mock(MockProbe),
}

impl Probe {
    pub fn kind(&self) -> &'static str {
        match self {
            Probe::Http(_) => "http",
            Probe::Dns(_) => "dns",
            Probe::Mock(_) => "mock",
        }
    }
}

impl Check for Probe {
    fn validate(&mut self) -> Vec<String> {
        match self {
            Probe::Http(p) => p.validate(),
            Probe::Dns(p) => p.validate(),
            Probe::Mock(p) => p.validate(),
        }
    }

    fn describe(&self) -> Vec<String> {
        match self {
            Probe::Http(p) => p.describe(),
            Probe::Dns(p) => p.describe(),
            Probe::Mock(p) => p.describe(),
        }
    }

    async fn test(&mut self, target: ProbeTarget<'_>) -> Result<String, ProbeError> {
        match self {
            Probe::Http(p) => p.test(target).await,
            Probe::Dns(p) => p.test(target).await,
            Probe::Mock(p) => p.test(target).await,
        }
    }
}
