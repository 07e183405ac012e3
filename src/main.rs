use anyhow::{Result, anyhow};
use clap::Parser;
use mq_publish::config::{
    DEFAULT_PROGRESS_EVERY, DEFAULT_ROUTING_KEY, DEFAULT_TOTAL_MESSAGES, PublishConfig,
    RetryPolicy, parse_exchange_list,
};
use mq_publish::logging;
use mq_publish::roles::publisher::{relay_interrupts, run_publisher};
use mq_publish::transport::config::{parse_connect_kv, parse_engine};
use mq_publish::transport::{MessageProperties, TransportBuilder};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Conventional exit status for a process killed by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "mq-publish")]
#[command(about = "Publish synthetic JSON messages round-robin across AMQP exchanges")]
struct Cli {
    /// Comma-separated exchange names (default: amq.fanout,amq.headers,amq.topic)
    exchanges: Option<String>,

    /// Number of messages to publish
    #[arg(long, default_value_t = DEFAULT_TOTAL_MESSAGES)]
    count: u64,

    /// Broker engine (amqp, mock)
    #[arg(long, default_value = "amqp")]
    engine: String,

    /// Broker URL; overrides --connect host/port/user/pass/vhost
    #[arg(long, env = "MQ_PUBLISH_AMQP_ADDR")]
    url: Option<String>,

    /// Adapter parameters as key=value (repeatable)
    #[arg(long = "connect")]
    connect: Vec<String>,

    /// Routing key attached to every message
    #[arg(long, default_value = DEFAULT_ROUTING_KEY)]
    routing_key: String,

    /// Log progress when the remaining count is a multiple of this
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
    progress_every: u64,

    /// Messages per second. If omitted or <= 0, publishes back to back
    #[arg(long, allow_hyphen_values = true)]
    rate: Option<f64>,

    /// Retries per message on recoverable publish errors
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Initial retry backoff (ms), doubled per attempt
    #[arg(long, default_value = "100")]
    retry_backoff_ms: u64,

    /// Connection timeout in seconds (0 disables)
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level)?;

    let engine =
        parse_engine(&cli.engine).ok_or_else(|| anyhow!("unknown engine: {}", cli.engine))?;
    let mut opts = parse_connect_kv(&cli.connect);
    if let Some(url) = cli.url {
        opts.params.insert("url".into(), url);
    }
    let mut connector = TransportBuilder::new(engine, opts);
    if cli.connect_timeout > 0 {
        connector = connector.with_timeout(Duration::from_secs(cli.connect_timeout));
    }

    let config = PublishConfig {
        exchanges: parse_exchange_list(cli.exchanges.as_deref()),
        total_messages: cli.count,
        routing_key: cli.routing_key,
        properties: MessageProperties::json(),
        progress_every: cli.progress_every,
        rate: cli.rate.filter(|r| *r > 0.0),
        retry: RetryPolicy {
            max_retries: cli.retries,
            backoff: Duration::from_millis(cli.retry_backoff_ms),
        },
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if relay_interrupts(signal::ctrl_c, cancel_tx).await {
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    let summary = run_publisher(config, &connector, Some(cancel_rx)).await?;
    if summary.cancelled {
        info!(
            published = summary.published,
            remaining = summary.remaining,
            "stopped before completion"
        );
    }
    Ok(())
}
