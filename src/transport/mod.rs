//! Broker connection contract.
//!
//! `Transport` is the seam between a protocol-version-specific client and
//! everything downstream that only wants to publish/subscribe. Here there
//! is a single wire protocol to support, so the trait stays a single
//! implementation rather than splitting v5/v311: a trait object behind an
//! `Arc<Mutex<_>>` so the dispatch loop and command handlers can share one
//! live connection.

pub mod demo;
pub mod rumqttc_transport;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

pub use rumqttc_transport::{BrokerConfig, RumqttcTransport};

#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Display for QoS {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            QoS::AtMostOnce => "At most once (0)",
            QoS::AtLeastOnce => "At least once (1)",
            QoS::ExactlyOnce => "Exactly once (2)",
        };
        write!(f, "{display}")
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(value: QoS) -> Self {
        match value {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(value: rumqttc::QoS) -> Self {
        match value {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("CA certificate must be present when using TLS")]
    CaCertificateMustBePresent,
    #[error("could not read CA certificate from file \"{1}\"")]
    CertificateNotReadable(#[source] std::io::Error, PathBuf),
    #[error("could not add CA certificate to root store")]
    CaCertificateNotAdded(#[source] rumqttc::tokio_rustls::rustls::Error),
    #[error("not connected to a broker")]
    NotConnected,
    #[error("client error")]
    Client(#[from] rumqttc::ClientError),
    #[error("connection error")]
    Connection(#[from] rumqttc::ConnectionError),
}

/// A single datum read off the wire, before it is wrapped into a
/// [`crate::message::Message`].
#[derive(Clone, Debug)]
pub struct IncomingPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Broker connection, abstracted so the shell's pipeline and command
/// handlers never depend on `rumqttc` directly.
///
/// `connect`/`disconnect`/`start_streaming`/`stop_streaming` are the
/// session-lifecycle half of the contract (§6); `publish`/`subscribe`/
/// `unsubscribe`/`poll` are the per-operation half the reader task and
/// command handlers drive continuously. `RumqttcTransport` establishes its
/// session in `connect` and treats `start_streaming`/`stop_streaming` as
/// a streaming-enabled flag `poll` honors (the underlying `rumqttc`
/// event loop has no separate "armed" state to toggle); `DemoTransport`
/// tracks the same flag purely for test assertions.
#[async_trait]
pub trait Transport: Send {
    /// Establishes the broker session. Fatal to the startup path on error.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Idempotent: a second call after `connect` (or before it) is a no-op.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    async fn start_streaming(&mut self) -> Result<(), TransportError>;

    async fn stop_streaming(&mut self) -> Result<(), TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic_filter: &str, qos: QoS) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self, topic_filter: &str) -> Result<(), TransportError>;

    /// Blocks until the next publish arrives, or a non-publish broker event
    /// has been processed (`Ok(None)`), or the connection is closed for
    /// good (`Err`). The shell wraps this call in a timeout at the call
    /// site (`receive(timeout)` of §6) rather than threading a timeout
    /// through every implementation's hot loop.
    async fn poll(&mut self) -> Result<Option<IncomingPublish>, TransportError>;
}

pub type SharedTransport = Arc<Mutex<dyn Transport>>;
