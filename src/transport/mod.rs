//! Transport abstraction: traits, types, and builder factory.

pub mod config;
#[cfg(feature = "transport-amqp-0-9")]
pub mod amqp;
#[cfg(any(test, feature = "transport-mock"))]
pub mod mock;

use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Amqp,
    #[cfg(any(test, feature = "transport-mock"))]
    Mock,
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub params: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("channel: {0}")]
    Channel(String),
    #[error("publish: {0}")]
    Publish(String),
    #[error("close: {0}")]
    Close(String),
    #[error("timeout")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
    #[error("other: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected)
    }
}

/// Per-message metadata attached to a publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: String,
}

impl MessageProperties {
    pub fn json() -> Self {
        Self {
            content_type: "application/json".to_string(),
        }
    }
}

/// Establishes broker connections. One call yields one exclusively owned connection.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open broker connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn Channel>, TransportError>;
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// A logical publishing session over a connection.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &MessageProperties,
        payload: Bytes,
    ) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Connector for a named engine, configured from `key=value` options.
#[derive(Clone, Debug)]
pub struct TransportBuilder {
    engine: Engine,
    opts: ConnectOptions,
    timeout: Option<Duration>,
}

impl TransportBuilder {
    pub fn new(engine: Engine, opts: ConnectOptions) -> Self {
        Self {
            engine,
            opts,
            timeout: None,
        }
    }

    /// Bound the time spent establishing the connection.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    async fn connect_engine(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self.engine {
            Engine::Amqp => {
                #[cfg(feature = "transport-amqp-0-9")]
                {
                    return crate::transport::amqp::connect(self.opts.clone()).await;
                }
                #[cfg(not(feature = "transport-amqp-0-9"))]
                {
                    Err(TransportError::Connect("amqp feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "transport-mock"))]
            Engine::Mock => crate::transport::mock::connect(self.opts.clone()).await,
        }
    }
}

#[async_trait::async_trait]
impl Connector for TransportBuilder {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect_engine())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.connect_engine().await,
        }
    }
}
