//! The scan → diff → notify → persist loop for one host.

use anyhow::{Context, Result};
use ::time::OffsetDateTime;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::WatchConfig;
use crate::diff::{detect_changes, ChangeSet};
use crate::notify::{deliver_with_retry, format_change_message, DeliveryOutcome, Notifier};
use crate::scanner::{PortScanner, TcpScanner};
use crate::state::{self, PersistedState};

/// What a single cycle observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Unchanged,
    Changed {
        changes: ChangeSet,
        delivery: DeliveryOutcome,
    },
}

pub struct Watcher<N: Notifier, S: PortScanner = TcpScanner> {
    config: WatchConfig,
    notifier: N,
    scanner: S,
    state: PersistedState,
    // in-memory state is ahead of the state file
    unflushed: bool,
}

impl<N: Notifier> Watcher<N> {
    /// Load the previous state from `config.state_file` and build a watcher
    /// probing with TCP connects.
    pub fn new(config: WatchConfig, notifier: N) -> Self {
        let scanner = TcpScanner::new(config.concurrency, config.timeout);
        Watcher::with_scanner(config, notifier, scanner)
    }
}

impl<N: Notifier, S: PortScanner> Watcher<N, S> {
    pub fn with_scanner(config: WatchConfig, notifier: N, scanner: S) -> Self {
        let state = state::load_state(&config.state_file);
        debug!(
            "loaded state for {} host(s) from {}",
            state.hosts.len(),
            config.state_file.display()
        );
        Self {
            config,
            notifier,
            scanner,
            state,
            unflushed: false,
        }
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    /// Run one scan pass, and notify then persist if the open set changed.
    ///
    /// Returns an error only when the state file could not be written; the
    /// in-memory state has already advanced and the save is retried next cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let host = self.config.host.clone();

        let scan = self.scanner.scan(&host, &self.config.ports).await;
        let current = scan.open_ports();

        let changes = detect_changes(&current, self.state.open_ports(&host));
        if changes.is_empty() {
            debug!("no changes on {host} ({} open)", current.len());
            if self.unflushed {
                self.persist()?;
            }
            return Ok(CycleOutcome::Unchanged);
        }

        info!(
            "changes on {host}: opened {:?}, closed {:?}",
            changes.opened, changes.closed
        );
        let message = format_change_message(&host, &changes, OffsetDateTime::now_utc());
        let delivery = deliver_with_retry(&self.notifier, &message, self.config.retry).await;

        self.state.set_open_ports(&host, current);
        self.unflushed = true;
        self.persist()?;

        Ok(CycleOutcome::Changed { changes, delivery })
    }

    fn persist(&mut self) -> Result<()> {
        state::save_state(&self.config.state_file, &self.state).with_context(|| {
            format!(
                "state for {} not saved, will retry next cycle",
                self.config.host
            )
        })?;
        self.unflushed = false;
        debug!("state saved to {}", self.config.state_file.display());
        Ok(())
    }

    /// Loop until `cancel` fires, pacing cycle starts `interval` apart.
    ///
    /// A running scan is never interrupted; cancellation takes effect at the
    /// next cycle boundary or during the sleep.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "watching {} ({} ports) every {:?}",
            self.config.host,
            self.config.ports.len(),
            self.config.interval
        );

        while !cancel.is_cancelled() {
            let started = Instant::now();
            if let Err(e) = self.run_cycle().await {
                error!("scan cycle failed: {e:#}");
            }

            let wait = self.config.interval.saturating_sub(started.elapsed());
            debug!("next scan in {wait:?}");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(wait) => {}
            }
        }

        info!("watcher for {} stopped", self.config.host);
    }
}
