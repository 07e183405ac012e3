use crate::config::{ConfigError, PublishConfig};
use crate::payload::generate_payload;
use crate::rate::RateController;
use crate::transport::{Channel, Connector, Transport, TransportError};
use bytes::Bytes;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("connection failed: {0}")]
    Connection(#[source] TransportError),
    #[error("publish to '{exchange}' failed after {published} messages: {source}")]
    Publish {
        exchange: String,
        published: u64,
        #[source]
        source: TransportError,
    },
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Connecting,
    Publishing,
    Closing,
    Done,
    Failed,
}

/// Messages still to publish. Only ever moves towards zero.
#[derive(Debug)]
pub struct RemainingCount {
    total: u64,
    remaining: u64,
}

impl RemainingCount {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            remaining: total,
        }
    }

    pub fn get(&self) -> u64 {
        self.remaining
    }

    pub fn published(&self) -> u64 {
        self.total - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Account for one accepted publish. Returns false once exhausted.
    pub fn decrement(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(next) => {
                self.remaining = next;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    pub published: u64,
    /// Final observation; zero unless the run was cancelled.
    pub remaining: u64,
    /// Remaining counts reported at the start of exchange passes.
    pub progress: Vec<u64>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl PublishSummary {
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.published as f64 / secs
        } else {
            0.0
        }
    }
}

/// Publishes a bounded number of synthetic messages round-robin across exchanges
/// over a single exclusively owned connection and channel.
pub struct PublisherDriver<R> {
    config: PublishConfig,
    rng: R,
    cancel: Option<watch::Receiver<bool>>,
    state: DriverState,
}

impl<R: Rng + Send> PublisherDriver<R> {
    pub fn new(config: PublishConfig, rng: R) -> Result<Self, PublishError> {
        config.validate()?;
        Ok(Self {
            config,
            rng,
            cancel: None,
            state: DriverState::NotStarted,
        })
    }

    /// Stop issuing publishes once the receiver observes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    fn transition(&mut self, next: DriverState) {
        debug!(from = ?self.state, to = ?next, "publisher state");
        self.state = next;
    }

    pub async fn run(&mut self, connector: &dyn Connector) -> Result<PublishSummary, PublishError> {
        self.transition(DriverState::Connecting);
        let transport = match connector.connect().await {
            Ok(t) => t,
            Err(e) => {
                self.transition(DriverState::Failed);
                return Err(PublishError::Connection(e));
            }
        };
        let mut channel = match transport.open_channel().await {
            Ok(c) => c,
            Err(e) => {
                self.transition(DriverState::Failed);
                if let Err(close_err) = transport.shutdown().await {
                    warn!(error = %close_err, "connection close failed");
                }
                return Err(PublishError::Connection(e));
            }
        };

        self.transition(DriverState::Publishing);
        let outcome = self.publish_all(transport.as_ref(), &mut channel).await;

        self.transition(DriverState::Closing);
        let teardown = teardown(channel.as_ref(), transport.as_ref()).await;
        let result =
            outcome.and_then(|summary| teardown.map(|_| summary).map_err(PublishError::Connection));
        self.transition(if result.is_ok() {
            DriverState::Done
        } else {
            DriverState::Failed
        });
        result
    }

    async fn publish_all(
        &mut self,
        transport: &dyn Transport,
        channel: &mut Box<dyn Channel>,
    ) -> Result<PublishSummary, PublishError> {
        let Self {
            config, rng, cancel, ..
        } = self;
        let config = &*config;

        let started = Instant::now();
        let mut remaining = RemainingCount::new(config.total_messages);
        let mut rate = config.rate.map(RateController::new);
        let mut progress = Vec::new();
        let mut cancelled = false;

        'passes: while !remaining.is_exhausted() {
            if remaining.get() % config.progress_every == 0 {
                info!(remaining = remaining.get(), "to publish");
                progress.push(remaining.get());
            }
            for exchange in &config.exchanges {
                if let Some(rc) = rate.as_mut() {
                    tokio::select! {
                        biased;
                        _ = cancellation(cancel) => {
                            cancelled = true;
                            break 'passes;
                        }
                        _ = rc.wait_for_next() => {}
                    }
                }
                let body = generate_payload(rng).encode()?;
                let sent = publish_with_retry(transport, channel, config, cancel, exchange, body)
                    .await
                    .map_err(|source| PublishError::Publish {
                        exchange: exchange.clone(),
                        published: remaining.published(),
                        source,
                    })?;
                if !sent {
                    cancelled = true;
                    break 'passes;
                }
                remaining.decrement();
                if remaining.is_exhausted() {
                    break;
                }
            }
        }

        if cancelled {
            warn!(remaining = remaining.get(), "publishing cancelled");
        }
        info!(remaining = remaining.get(), "to publish");
        Ok(PublishSummary {
            published: remaining.published(),
            remaining: remaining.get(),
            progress,
            cancelled,
            elapsed: started.elapsed(),
        })
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Resolves once cancellation is requested; never resolves without a receiver
/// or after the sender is dropped without cancelling.
async fn cancellation(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        let closed = rx.wait_for(|stop| *stop).await.is_err();
        if !closed {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Publish one message, retrying recoverable failures. A `Disconnected` channel is
/// replaced before the next attempt. Returns `Ok(false)` if cancelled before the
/// message went out.
async fn publish_with_retry(
    transport: &dyn Transport,
    channel: &mut Box<dyn Channel>,
    config: &PublishConfig,
    cancel: &mut Option<watch::Receiver<bool>>,
    exchange: &str,
    body: Bytes,
) -> Result<bool, TransportError> {
    let mut attempt = 0;
    loop {
        if is_cancelled(cancel) {
            return Ok(false);
        }
        let err = match channel
            .publish(exchange, &config.routing_key, &config.properties, body.clone())
            .await
        {
            Ok(()) => return Ok(true),
            Err(e) => e,
        };
        if !err.is_recoverable() || attempt >= config.retry.max_retries {
            return Err(err);
        }
        let delay = config.retry.delay_for(attempt);
        attempt += 1;
        warn!(exchange, attempt, error = %err, ?delay, "publish failed, retrying");
        tokio::select! {
            biased;
            _ = cancellation(cancel) => return Ok(false),
            _ = tokio::time::sleep(delay) => {}
        }
        if matches!(err, TransportError::Disconnected) {
            if let Err(e) = channel.close().await {
                debug!(error = %e, "closing dead channel failed");
            }
            *channel = transport.open_channel().await?;
            info!(exchange, "channel reopened");
        }
    }
}

/// Close the channel, then the connection. Both are attempted; the first error wins.
async fn teardown(channel: &dyn Channel, transport: &dyn Transport) -> Result<(), TransportError> {
    let channel_closed = channel.close().await;
    if let Err(e) = &channel_closed {
        warn!(error = %e, "channel close failed");
    }
    let conn_closed = transport.shutdown().await;
    if let Err(e) = &conn_closed {
        warn!(error = %e, "connection close failed");
    }
    channel_closed.and(conn_closed)
}

/// Forward the first interrupt to `cancel` and resolve `true` on the second one,
/// so the caller can abort a run whose teardown hangs. Resolves `false` if the
/// interrupt source fails.
pub async fn relay_interrupts<F, Fut>(mut interrupt: F, cancel: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    info!("interrupt received, stopping publisher (repeat to abort)");
    let _ = cancel.send(true);
    if interrupt().await.is_err() {
        return false;
    }
    warn!("second interrupt received, aborting");
    true
}

/// Run a publisher with entropy-seeded payloads.
pub async fn run_publisher(
    config: PublishConfig,
    connector: &dyn Connector,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<PublishSummary, PublishError> {
    info!(
        exchanges = ?config.exchanges,
        total = config.total_messages,
        routing_key = %config.routing_key,
        rate = ?config.rate,
        "publishing messages"
    );
    let mut driver = PublisherDriver::new(config, StdRng::from_entropy())?;
    if let Some(rx) = cancel {
        driver = driver.with_cancel(rx);
    }
    let summary = driver.run(connector).await?;
    info!(
        published = summary.published,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        avg_rate = summary.average_rate(),
        "publishing finished"
    );
    Ok(summary)
}
