//! Production [`Transport`] backed by `rumqttc`'s 3.1.1 client.
//!
//! Connects over plain TCP or TLS-over-TCP, with the CA certificate loaded
//! via `rustls_pemfile`. Client-certificate auth and the v5/websocket wire
//! variants are out of scope here.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls::{Certificate, RootCertStore};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, TlsConfiguration, Transport as RumqttcTransportKind};
use tracing::debug;

use super::{IncomingPublish, QoS, Transport, TransportError};

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub tls_ca_file: Option<PathBuf>,
}

fn load_certificates_from_file(path: &PathBuf) -> Result<Vec<Certificate>, TransportError> {
    let file = File::open(path).map_err(|e| TransportError::CertificateNotReadable(e, path.clone()))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| TransportError::CertificateNotReadable(e, path.clone()))?;
    Ok(certs.into_iter().map(Certificate).collect())
}

fn configure_tls(config: &BrokerConfig) -> Result<TlsConfiguration, TransportError> {
    let mut root_store = RootCertStore::empty();

    if let Some(ca_file) = &config.tls_ca_file {
        let certificates = load_certificates_from_file(ca_file)?;
        debug!(count = certificates.len(), "loaded root CA certificates");
        for certificate in certificates {
            root_store
                .add(&certificate)
                .map_err(TransportError::CaCertificateNotAdded)?;
        }
    } else {
        return Err(TransportError::CaCertificateMustBePresent);
    }

    let client_config = rumqttc::tokio_rustls::rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConfiguration::Rustls(std::sync::Arc::new(client_config)))
}

pub struct RumqttcTransport {
    client: AsyncClient,
    event_loop: EventLoop,
    connected: bool,
    streaming: bool,
}

impl RumqttcTransport {
    pub fn connect(config: &BrokerConfig) -> Result<Self, TransportError> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        if config.use_tls {
            options.set_transport(configure_tls(config)?);
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        Ok(Self {
            client,
            event_loop,
            connected: false,
            streaming: false,
        })
    }
}

#[async_trait]
impl Transport for RumqttcTransport {
    /// The broker session itself is opened lazily, driven by [`Self::poll`]
    /// polling the event loop (`AsyncClient::new` only builds the client and
    /// its handle to the loop) — this just marks the session as wanted so
    /// `disconnect` knows whether a real `client.disconnect()` is owed.
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            self.client.disconnect().await?;
        }
        self.connected = false;
        Ok(())
    }

    async fn start_streaming(&mut self) -> Result<(), TransportError> {
        self.streaming = true;
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<(), TransportError> {
        self.streaming = false;
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, qos.into(), retain, payload.to_vec())
            .await
            .map_err(TransportError::from)
    }

    async fn subscribe(&mut self, topic_filter: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .subscribe(topic_filter, qos.into())
            .await
            .map_err(TransportError::from)
    }

    async fn unsubscribe(&mut self, topic_filter: &str) -> Result<(), TransportError> {
        self.client
            .unsubscribe(topic_filter)
            .await
            .map_err(TransportError::from)
    }

    /// Always drives the event loop (the connection's keep-alive and ack
    /// bookkeeping need that regardless of streaming state) but only
    /// surfaces a publish to the caller while `streaming` is enabled —
    /// `stop_streaming` silently drops incoming publishes rather than
    /// stalling the underlying connection.
    async fn poll(&mut self) -> Result<Option<IncomingPublish>, TransportError> {
        match self.event_loop.poll().await? {
            Event::Incoming(Incoming::Publish(publish)) => {
                if !self.streaming {
                    return Ok(None);
                }
                Ok(Some(IncomingPublish {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                    qos: publish.qos.into(),
                    retain: publish.retain,
                }))
            }
            Event::Incoming(incoming) => {
                debug!(?incoming, "incoming broker event");
                Ok(None)
            }
            Event::Outgoing(outgoing) => {
                debug!(?outgoing, "outgoing broker event");
                Ok(None)
            }
        }
    }
}
