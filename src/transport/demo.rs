//! In-memory [`Transport`] for tests and the `demos/` walkthroughs — no
//! broker required. Publishes loop back as incoming messages on the topics
//! the caller has subscribed to.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::topic;

use super::{IncomingPublish, QoS, Transport, TransportError};

pub struct DemoTransport {
    subscriptions: Vec<String>,
    inbox: VecDeque<IncomingPublish>,
    injected: mpsc::UnboundedReceiver<IncomingPublish>,
    connected: bool,
    streaming: bool,
}

impl DemoTransport {
    pub fn new() -> (Self, mpsc::UnboundedSender<IncomingPublish>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                subscriptions: Vec::new(),
                inbox: VecDeque::new(),
                injected: rx,
                connected: false,
                streaming: false,
            },
            tx,
        )
    }
}

#[async_trait]
impl Transport for DemoTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
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
        if self.subscriptions.iter().any(|pattern| topic::matches(pattern, topic)) {
            self.inbox.push_back(IncomingPublish {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            });
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic_filter: &str, _qos: QoS) -> Result<(), TransportError> {
        self.subscriptions.push(topic_filter.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic_filter: &str) -> Result<(), TransportError> {
        self.subscriptions.retain(|t| t != topic_filter);
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<IncomingPublish>, TransportError> {
        if let Some(publish) = self.inbox.pop_front() {
            return Ok(Some(publish));
        }
        match self.injected.recv().await {
            Some(publish) => Ok(Some(publish)),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_to_a_subscribed_topic_loops_back() {
        let (mut transport, _injector) = DemoTransport::new();
        transport.subscribe("sensors/+", QoS::AtMostOnce).await.unwrap();
        transport
            .publish("sensors/a", b"{}", QoS::AtMostOnce, false)
            .await
            .unwrap();

        let received = transport.poll().await.unwrap().unwrap();
        assert_eq!(received.topic, "sensors/a");
    }

    #[tokio::test]
    async fn connect_and_streaming_lifecycle_flags_toggle() {
        let (mut transport, _injector) = DemoTransport::new();
        assert!(!transport.connected);
        transport.connect().await.unwrap();
        assert!(transport.connected);
        transport.start_streaming().await.unwrap();
        assert!(transport.streaming);
        transport.stop_streaming().await.unwrap();
        assert!(!transport.streaming);
        transport.disconnect().await.unwrap();
        assert!(!transport.connected);
    }

    #[tokio::test]
    async fn publish_to_an_unsubscribed_topic_is_dropped() {
        let (mut transport, injector) = DemoTransport::new();
        transport.subscribe("sensors/+", QoS::AtMostOnce).await.unwrap();
        transport
            .publish("other/a", b"{}", QoS::AtMostOnce, false)
            .await
            .unwrap();
        drop(injector);

        assert!(transport.poll().await.is_err());
    }
}
