//! mq-publish library crate: synthetic bulk publishing over AMQP.

pub mod config;
pub mod logging;
pub mod payload;
pub mod rate;
pub mod roles;
pub mod transport;

pub use config::{ConfigError, PublishConfig, RetryPolicy};
pub use roles::publisher::{PublishError, PublishSummary, PublisherDriver, run_publisher};
pub use transport::{ConnectOptions, Connector, Engine, Transport, TransportBuilder, TransportError};
