//! Mock transport for tests and dry runs: an in-process broker that records
//! every operation and can inject failures.

use super::{
    Channel, ConnectOptions, Connector, MessageProperties, Transport, TransportError,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    pub payload: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    ChannelOpened,
    Published,
    ChannelClosed,
    ConnectionClosed,
}

#[derive(Default)]
struct BrokerState {
    published: Vec<PublishedMessage>,
    events: Vec<BrokerEvent>,
    fail_connect: bool,
    fail_channel: bool,
    fail_close: bool,
    // Publishing fails permanently once this many messages were accepted.
    fail_publish_at: Option<usize>,
    // Upcoming publish attempts that drop their channel.
    transient_failures: usize,
    attempts: usize,
}

#[derive(Clone, Default)]
pub struct MockBroker(Arc<Mutex<BrokerState>>);

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // A panicking test thread must not hide the recorded state from others.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn failing_connect(self) -> Self {
        self.state().fail_connect = true;
        self
    }

    pub fn failing_channel(self) -> Self {
        self.state().fail_channel = true;
        self
    }

    pub fn failing_close(self) -> Self {
        self.state().fail_close = true;
        self
    }

    pub fn failing_publish_at(self, accepted: usize) -> Self {
        self.state().fail_publish_at = Some(accepted);
        self
    }

    pub fn transient_failures(self, count: usize) -> Self {
        self.state().transient_failures = count;
        self
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.state().events.clone()
    }

    /// Publish attempts, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state().attempts
    }

    fn record(&self, event: BrokerEvent) {
        self.state().events.push(event);
    }
}

/// Build a standalone broker from `key=value` options
/// (`fail_connect`, `fail_channel`, `fail_publish_at`, `transient_failures`).
pub fn broker_from_options(opts: &ConnectOptions) -> MockBroker {
    let flag = |key: &str| opts.params.get(key).is_some_and(|v| v == "true" || v == "1");
    let number = |key: &str| opts.params.get(key).and_then(|v| v.parse::<usize>().ok());
    let mut broker = MockBroker::new();
    if flag("fail_connect") {
        broker = broker.failing_connect();
    }
    if flag("fail_channel") {
        broker = broker.failing_channel();
    }
    if let Some(n) = number("fail_publish_at") {
        broker = broker.failing_publish_at(n);
    }
    if let Some(n) = number("transient_failures") {
        broker = broker.transient_failures(n);
    }
    broker
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn Transport>, TransportError> {
    broker_from_options(&opts).connect().await
}

#[async_trait::async_trait]
impl Connector for MockBroker {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        if self.state().fail_connect {
            return Err(TransportError::Connect("connection refused".into()));
        }
        self.record(BrokerEvent::Connected);
        Ok(Box::new(MockTransport {
            broker: self.clone(),
        }))
    }
}

struct MockTransport {
    broker: MockBroker,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open_channel(&self) -> Result<Box<dyn Channel>, TransportError> {
        if self.broker.state().fail_channel {
            return Err(TransportError::Channel("channel limit reached".into()));
        }
        self.broker.record(BrokerEvent::ChannelOpened);
        Ok(Box::new(MockChannel {
            broker: self.broker.clone(),
            dead: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.broker.record(BrokerEvent::ConnectionClosed);
        if self.broker.state().fail_close {
            return Err(TransportError::Close("connection reset".into()));
        }
        Ok(())
    }
}

struct MockChannel {
    broker: MockBroker,
    // Set by a transient failure; the channel stays unusable until replaced.
    dead: AtomicBool,
}

#[async_trait::async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let mut state = self.broker.state();
        state.attempts += 1;
        if self.dead.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            self.dead.store(true, Ordering::SeqCst);
            return Err(TransportError::Disconnected);
        }
        if state.fail_publish_at == Some(state.published.len()) {
            return Err(TransportError::Publish(format!(
                "exchange '{}' rejected message",
                exchange
            )));
        }
        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: properties.content_type.clone(),
            payload,
        });
        state.events.push(BrokerEvent::Published);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.broker.record(BrokerEvent::ChannelClosed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_publishes_in_order() {
        let broker = MockBroker::new();
        let conn = broker.connect().await.expect("connect");
        let channel = conn.open_channel().await.expect("channel");
        let props = MessageProperties::json();
        for ex in ["a", "b"] {
            channel
                .publish(ex, "rk", &props, Bytes::from_static(b"{}"))
                .await
                .expect("publish");
        }
        channel.close().await.expect("close channel");
        conn.shutdown().await.expect("shutdown");

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].exchange, "a");
        assert_eq!(published[1].exchange, "b");
        assert_eq!(published[1].content_type, "application/json");
        assert_eq!(
            broker.events(),
            vec![
                BrokerEvent::Connected,
                BrokerEvent::ChannelOpened,
                BrokerEvent::Published,
                BrokerEvent::Published,
                BrokerEvent::ChannelClosed,
                BrokerEvent::ConnectionClosed,
            ]
        );
    }

    #[tokio::test]
    async fn injected_failures() {
        let broker = MockBroker::new().transient_failures(1).failing_publish_at(1);
        let conn = broker.connect().await.expect("connect");
        let channel = conn.open_channel().await.expect("channel");
        let props = MessageProperties::json();

        let first = channel.publish("a", "rk", &props, Bytes::new()).await;
        assert!(matches!(first, Err(TransportError::Disconnected)));
        // The dropped channel keeps failing until it is replaced.
        let again = channel.publish("a", "rk", &props, Bytes::new()).await;
        assert!(matches!(again, Err(TransportError::Disconnected)));

        let channel = conn.open_channel().await.expect("reopen");
        channel
            .publish("a", "rk", &props, Bytes::new())
            .await
            .expect("publish on fresh channel");
        let rejected = channel.publish("a", "rk", &props, Bytes::new()).await;
        assert!(matches!(rejected, Err(TransportError::Publish(_))));
        assert_eq!(broker.attempts(), 4);
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn options_configure_failures() {
        let opts = ConnectOptions::default().with_param("fail_connect", "true");
        assert!(matches!(
            connect(opts).await,
            Err(TransportError::Connect(_))
        ));
    }
}
