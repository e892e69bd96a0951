use crate::types::ScanResult;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// Upper bound on simultaneous connect attempts regardless of configuration.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Descriptors kept free for the state file, the HTTP client and stdio.
const FD_HEADROOM: u64 = 64;

/// One full scan pass over a host.
pub trait PortScanner: Send + Sync {
    fn scan<'a>(
        &'a self,
        host: &'a str,
        ports: &'a [u16],
    ) -> Pin<Box<dyn Future<Output = ScanResult> + Send + 'a>>;
}

/// TCP connect scanner used by the watcher.
#[derive(Debug, Clone)]
pub struct TcpScanner {
    concurrency: usize,
    timeout: Duration,
}

impl TcpScanner {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency: effective_concurrency(concurrency),
            timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl PortScanner for TcpScanner {
    fn scan<'a>(
        &'a self,
        host: &'a str,
        ports: &'a [u16],
    ) -> Pin<Box<dyn Future<Output = ScanResult> + Send + 'a>> {
        Box::pin(scan_host(host, ports, self.concurrency, self.timeout))
    }
}

/// Clamp a requested probe bound to `1..=MAX_CONCURRENCY` and to what the open
/// file limit allows. Probes beyond the limit fail with EMFILE and would read as closed.
pub fn effective_concurrency(requested: usize) -> usize {
    let mut bound = requested.clamp(1, MAX_CONCURRENCY);
    if let Some(limit) = fd_soft_limit() {
        let usable = usize::try_from(limit.saturating_sub(FD_HEADROOM).max(1))
            .unwrap_or(usize::MAX);
        if bound > usable {
            warn!(
                "concurrency {bound} exceeds the open file limit ({limit}), using {usable}; \
                 raise `ulimit -n` to probe more ports at once"
            );
            bound = usable;
        }
    }
    bound
}

#[cfg(unix)]
fn fd_soft_limit() -> Option<u64> {
    rlimit::getrlimit(rlimit::Resource::NOFILE)
        .ok()
        .map(|(soft, _)| soft)
}

#[cfg(not(unix))]
fn fd_soft_limit() -> Option<u64> {
    None
}

/// Attempt a TCP connect to `addr` within `timeout`.
///
/// Refusal, timeout and any other transport error all count as closed.
pub async fn probe_port(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Resolve a host name or literal address to the first address the resolver returns.
pub async fn resolve_host(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }
    match lookup_host((host, 0)).await {
        Ok(mut addrs) => addrs.next().map(|a| a.ip()),
        Err(e) => {
            warn!("failed to resolve {host}: {e}");
            None
        }
    }
}

/// Probe every port on `host` using asynchronous TCP connects with a concurrency limit.
///
/// - Uses `tokio::time::timeout` to bound connect time per socket.
/// - An unresolvable host reports every port closed.
pub async fn scan_host(
    host: &str,
    ports: &[u16],
    concurrency: usize,
    timeout: Duration,
) -> ScanResult {
    let Some(ip) = resolve_host(host).await else {
        return ScanResult::all_closed(ports);
    };

    let started = Instant::now();
    let result = scan_with(ports, concurrency, move |port| {
        probe_port(SocketAddr::new(ip, port), timeout)
    })
    .await;

    debug!(
        "scanned {} ports on {host} ({ip}) in {:?}, {} open",
        result.len(),
        started.elapsed(),
        result.open_ports().len()
    );
    result
}

/// Run `probe` for every port with at most `concurrency` in flight.
///
/// - Limits concurrent probes using a `Semaphore`.
/// - Waits for every probe before returning; the result always holds every
///   requested port exactly once, a failed probe task degrades to closed.
pub async fn scan_with<F, Fut>(ports: &[u16], concurrency: usize, probe: F) -> ScanResult
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let mut result = ScanResult::all_closed(ports);
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, MAX_CONCURRENCY)));
    let mut set = JoinSet::new();

    for &port in ports {
        let Ok(permit) = sem.clone().acquire_owned().await else {
            break;
        };
        let fut = probe(port);
        set.spawn(async move {
            let _permit = permit; // held until the probe finishes
            (port, fut.await)
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((port, open)) => {
                result.ports.insert(port, open);
            }
            Err(e) => warn!("probe task failed: {e}"),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_detects_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(probe_port(addr, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn unresolvable_host_reports_all_closed() {
        let res = scan_host("host.invalid", &[22, 80], 4, Duration::from_millis(100)).await;
        assert_eq!(res.len(), 2);
        assert!(res.open_ports().is_empty());
    }

    #[tokio::test]
    async fn literal_address_resolves_without_lookup() {
        assert_eq!(
            resolve_host("127.0.0.1").await,
            Some(IpAddr::from([127, 0, 0, 1]))
        );
    }

    #[tokio::test]
    async fn panicking_check_reads_as_closed() {
        let res = scan_with(&[1, 2, 3], 2, |port| async move {
            if port == 2 {
                panic!("check blew up");
            }
            true
        })
        .await;
        assert_eq!(res.len(), 3);
        assert_eq!(res.open_ports(), vec![1, 3]);
    }

    #[test]
    fn concurrency_clamped() {
        assert_eq!(effective_concurrency(0), 1);
        assert_eq!(effective_concurrency(8), 8);
        assert!(effective_concurrency(usize::MAX) <= MAX_CONCURRENCY);
    }

    #[cfg(unix)]
    #[test]
    fn concurrency_respects_open_file_limit() {
        let (soft, _) = rlimit::getrlimit(rlimit::Resource::NOFILE).unwrap();
        let bound = effective_concurrency(MAX_CONCURRENCY) as u64;
        assert!(bound <= soft.saturating_sub(FD_HEADROOM).max(1));
    }
}
