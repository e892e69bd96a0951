use std::path::PathBuf;
use std::time::Duration;

use port_watch_rs::config::{
    parse_timeout_secs, WatchConfig, DEFAULT_API_BASE, DEFAULT_CONCURRENCY, DEFAULT_INTERVAL_SECS,
    DEFAULT_PORT_SPEC, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_STATE_FILE,
    DEFAULT_TIMEOUT_SECS,
};
use port_watch_rs::logging;
use port_watch_rs::notify::{NotifierConfig, RetryPolicy, TelegramNotifier};
use port_watch_rs::ports::{self, RangePolicy};
use port_watch_rs::watcher::{CycleOutcome, Watcher};

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// port-watch-rs — watch TCP ports on a host and report changes to a chat bot.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-watch-rs",
    version,
    about = "Watch TCP ports on a host and report openness changes to a chat bot.",
    long_about = None
)]
struct Cli {
    /// Host name or IP address to watch.
    host: String,

    /// Ports to watch: comma separated numbers and ranges (e.g. 22,80,8000-8100).
    #[arg(long, default_value = DEFAULT_PORT_SPEC)]
    ports: String,

    /// Read the port specification from a file instead (one token or list per line, `#` comments).
    #[arg(long = "ports-file", conflicts_with = "ports")]
    ports_file: Option<PathBuf>,

    /// Reject reversed ranges such as 1024-1 instead of swapping their endpoints.
    #[arg(long = "strict-ranges", default_value_t = false)]
    strict_ranges: bool,

    /// JSON file holding the last known open ports per host.
    #[arg(long = "state-file", default_value = DEFAULT_STATE_FILE)]
    state_file: PathBuf,

    /// Seconds between scan passes.
    #[arg(
        long,
        default_value_t = DEFAULT_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Per-port connect timeout in seconds.
    #[arg(
        long,
        default_value = DEFAULT_TIMEOUT_SECS,
        value_parser = parse_timeout_secs
    )]
    timeout: Duration,

    /// Max concurrent TCP connect attempts.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Bot API token.
    #[arg(long = "bot-token", env = "PORT_WATCH_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Chat or channel id that receives notifications.
    #[arg(long = "chat-id", env = "PORT_WATCH_CHAT_ID")]
    chat_id: String,

    /// Base URL of the bot API.
    #[arg(long = "api-base", env = "PORT_WATCH_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Delivery attempts per notification.
    #[arg(
        long,
        default_value_t = DEFAULT_RETRY_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    retries: u32,

    /// Seconds to wait between delivery attempts.
    #[arg(long = "retry-delay", default_value_t = DEFAULT_RETRY_DELAY.as_secs())]
    retry_delay: u64,

    /// Run a single scan pass and exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;

    println!("port-watch-rs configuration:");
    println!("  host         : {}", cli.host);
    match cli.ports_file.as_ref() {
        Some(p) => println!("  ports file   : {}", p.display()),
        None => println!("  ports        : {}", cli.ports),
    }
    println!("  state_file   : {}", cli.state_file.display());
    println!("  interval     : {}s", cli.interval);
    println!("  timeout      : {:?}", cli.timeout);
    println!("  concurrency  : {}", cli.concurrency);
    println!("  api_base     : {}", cli.api_base);
    println!("  chat_id      : {}", cli.chat_id);
    println!("  bot_token    : <redacted>");

    let policy = if cli.strict_ranges {
        RangePolicy::Strict
    } else {
        RangePolicy::Tolerant
    };
    let port_list = match cli.ports_file.as_deref() {
        Some(path) => ports::load_ports_from_path(path, policy)?,
        None => ports::parse_port_spec(&cli.ports, policy)?,
    };

    let mut config = WatchConfig::new(cli.host.clone(), port_list, cli.state_file.clone());
    config.interval = Duration::from_secs(cli.interval);
    config.timeout = cli.timeout;
    config.concurrency = cli.concurrency;
    config.retry = RetryPolicy {
        attempts: cli.retries,
        delay: Duration::from_secs(cli.retry_delay),
    };

    let mut notifier_config = NotifierConfig::new(cli.bot_token.clone(), cli.chat_id.clone());
    notifier_config.api_base = cli.api_base.clone();
    let notifier = TelegramNotifier::new(notifier_config)?;

    let mut watcher = Watcher::new(config, notifier);

    if cli.once {
        match watcher.run_cycle().await? {
            CycleOutcome::Unchanged => info!("no changes"),
            CycleOutcome::Changed { changes, .. } => info!(
                "opened {:?}, closed {:?}",
                changes.opened, changes.closed
            ),
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("interrupt received, stopping");
        cancel_signal.cancel();
    });

    watcher.run(cancel).await;
    Ok(())
}

/// Ctrl-C anywhere, SIGTERM as well on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
