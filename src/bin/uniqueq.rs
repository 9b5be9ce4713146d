//! uniqueq CLI: operator interface to a queue namespace on Redis.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use uniqueq::config::Config;
use uniqueq::telemetry::{TelemetryConfig, init_telemetry};
use uniqueq::{Error, RedisStore, ReaperConfig, UniqueQueue, spawn_reaper};

#[derive(Parser)]
#[command(name = "uniqueq", about = "Deduplicating lease-based work queue")]
struct Cli {
    /// Queue namespace prefix (overrides QUEUE_PREFIX)
    #[arg(long, global = true)]
    prefix: Option<String>,
    /// Lease duration in seconds (overrides QUEUE_LEASE_SECONDS)
    #[arg(long, global = true, allow_negative_numbers = true)]
    lease: Option<i64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue an item under a dedup key
    Put {
        /// Dedup key
        key: String,
        /// JSON item (defaults to null)
        #[arg(long)]
        item: Option<String>,
    },
    /// Fetch and lease the next item
    Get,
    /// Reclaim expired leases now
    Reclaim,
    /// Release a leased key (drop its lease and membership)
    Release {
        key: String,
    },
    /// Show whether a key is outstanding
    Status {
        key: String,
    },
    /// Run the background reaper until Ctrl-C
    Reap {
        /// Seconds between passes (overrides REAPER_INTERVAL_SECONDS)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "uniqueq".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let prefix = cli.prefix.or_else(|| config.queue_prefix.clone());
    if prefix.is_none() {
        anyhow::bail!("a queue prefix is required (--prefix or QUEUE_PREFIX)");
    }

    let store = RedisStore::connect(config.redis_url.expose_secret()).await?;
    let queue = UniqueQueue::new(
        store,
        cli.lease.unwrap_or(config.lease_seconds),
        prefix.as_deref(),
    )?;

    match cli.command {
        Command::Put { key, item } => cmd_put(&queue, key, item).await,
        Command::Get => cmd_get(&queue).await,
        Command::Reclaim => {
            let keys = queue.reclaim_expired().await?;
            println!("Reclaimed {} key(s)", keys.len());
            for key in keys {
                println!("  {key}");
            }
            Ok(())
        }
        Command::Release { key } => {
            if queue.release(&key).await? {
                println!("Released: {key}");
            } else {
                println!("Not released: {key} holds no lease");
            }
            Ok(())
        }
        Command::Status { key } => {
            let state = if queue.is_outstanding(&key).await? {
                "outstanding"
            } else {
                "absent"
            };
            println!("{key}: {state}");
            Ok(())
        }
        Command::Reap { interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.reaper_interval);
            cmd_reap(queue, interval).await
        }
    }
}

async fn cmd_put(
    queue: &UniqueQueue<RedisStore>,
    key: String,
    item: Option<String>,
) -> anyhow::Result<()> {
    let item: serde_json::Value = match item {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::Value::Null,
    };

    if queue.put(&item, &key).await? {
        println!("Queued: {key}");
    } else {
        println!("Duplicate: {key} is already outstanding");
    }
    Ok(())
}

async fn cmd_get(queue: &UniqueQueue<RedisStore>) -> anyhow::Result<()> {
    match queue.get::<serde_json::Value>().await {
        Ok(item) => {
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }
        Err(Error::QueueEmpty) => {
            println!("Queue is empty.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_reap(queue: UniqueQueue<RedisStore>, interval: Duration) -> anyhow::Result<()> {
    let handle = spawn_reaper(Arc::new(queue), ReaperConfig { interval });

    let signal = handle.shutdown_signal();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        signal.notify_one();
    });

    let total = handle.join().await;
    println!("Reaper stopped after reclaiming {total} key(s)");
    Ok(())
}
