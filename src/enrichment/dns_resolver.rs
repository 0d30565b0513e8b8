use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::DnsConfig;
use crate::error::SnapError;

/// Addresses that never get a resolution scheduled by [`ReverseLookupCache::resolve_all`].
const SENTINELS: [&str; 4] = ["", "*", "0.0.0.0", "::"];

/// A blocking reverse name lookup.
pub trait ReverseResolve: Send + Sync + 'static {
    /// The name for `ip`, or `None` when it has none or the lookup failed.
    fn reverse(&self, ip: IpAddr) -> Option<String>;
}

/// Reverse lookup through the system resolver (`getnameinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl ReverseResolve for SystemResolver {
    fn reverse(&self, ip: IpAddr) -> Option<String> {
        dns_lookup::lookup_addr(&ip).ok()
    }
}

struct Entry {
    name: String,
    expires: Instant,
}

struct Shared {
    config: DnsConfig,
    cache: RwLock<HashMap<String, Entry>>,
    pending: Mutex<HashSet<String>>,
}

impl Shared {
    fn clear_pending(&self, addr: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(addr);
    }
}

/// Address-to-name cache with background, rate-limited resolution.
///
/// [`lookup`](Self::lookup) never waits on the resolver: a cold or expired
/// address comes back unchanged while it is queued for one of
/// `max_in_flight` worker threads. At most one resolution per address is
/// queued or running. A worker gives up waiting after the configured
/// timeout and caches the raw address, but does not take new work until the
/// resolver call it started has returned, so no more than `max_in_flight`
/// calls are ever outstanding. When the queue is full the address is simply
/// not scheduled; the next poll asks again.
///
/// Cloning is cheap and clones share the cache. Workers exit once every
/// clone is dropped.
#[derive(Clone)]
pub struct ReverseLookupCache {
    shared: Arc<Shared>,
    /// `None` when resolution is disabled.
    queue: Option<Sender<String>>,
}

impl ReverseLookupCache {
    pub fn new(config: DnsConfig) -> Result<Self, SnapError> {
        Self::with_resolver(config, SystemResolver)
    }

    pub fn with_resolver(
        config: DnsConfig,
        resolver: impl ReverseResolve,
    ) -> Result<Self, SnapError> {
        let enabled = config.enabled;
        let n_workers = config.max_in_flight.max(1);
        let (queue_tx, queue_rx) = crossbeam_channel::bounded(config.queue_depth.max(1));
        let shared = Arc::new(Shared {
            config,
            cache: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
        });

        if !enabled {
            return Ok(Self {
                shared,
                queue: None,
            });
        }

        let resolver: Arc<dyn ReverseResolve> = Arc::new(resolver);
        for i in 0..n_workers {
            let rx = queue_rx.clone();
            let shared = Arc::clone(&shared);
            let resolver = Arc::clone(&resolver);
            thread::Builder::new()
                .name(format!("netscope-rdns-{i}"))
                .spawn(move || rdns_worker(&shared, resolver, rx))
                .map_err(|e| SnapError::Fatal(format!("spawn rdns worker: {e}")))?;
        }
        log::debug!("started {n_workers} rdns workers");

        Ok(Self {
            shared,
            queue: Some(queue_tx),
        })
    }

    /// Best-known name for `addr`.
    pub fn lookup(&self, addr: &str) -> String {
        if let Some(name) = self.cached(addr) {
            return name;
        }
        self.schedule(addr);
        addr.to_string()
    }

    /// Trigger resolution of every address not already fresh in the cache.
    /// Wildcard and unspecified addresses are skipped. Does not wait.
    pub fn resolve_all<'a, I>(&self, addrs: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for addr in addrs {
            if SENTINELS.contains(&addr) || self.cached(addr).is_some() {
                continue;
            }
            self.schedule(addr);
        }
    }

    /// The cached name for `addr` if it has not expired.
    pub fn cached(&self, addr: &str) -> Option<String> {
        let cache = self.shared.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(addr)
            .filter(|e| e.expires > Instant::now())
            .map(|e| e.name.clone())
    }

    /// Addresses queued or being resolved.
    #[doc(hidden)]
    pub fn in_flight(&self) -> usize {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Block until nothing is queued or being resolved, or `timeout` passes.
    /// Returns whether the cache went idle.
    #[doc(hidden)]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn schedule(&self, addr: &str) {
        let Some(queue) = &self.queue else {
            return;
        };
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !pending.insert(addr.to_string()) {
                return;
            }
        }

        match queue.try_send(addr.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("rdns queue full, deferring {addr}");
                self.shared.clear_pending(addr);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("rdns workers gone, not resolving {addr}");
                self.shared.clear_pending(addr);
            }
        }
    }
}

/// Resolve queued addresses until every sender is dropped.
fn rdns_worker(shared: &Shared, resolver: Arc<dyn ReverseResolve>, rx: Receiver<String>) {
    while let Ok(addr) = rx.recv() {
        let query = parse_ip(&addr).and_then(|ip| start_query(Arc::clone(&resolver), ip));
        let name = query
            .as_ref()
            .and_then(|answer| answer.recv_timeout(shared.config.timeout).ok().flatten())
            .map(|n| n.trim_end_matches('.').to_string())
            .filter(|n| !n.is_empty());
        if name.is_none() {
            log::debug!("rdns {addr}: no name, caching raw address");
        }

        let entry = Entry {
            name: name.unwrap_or_else(|| addr.clone()),
            expires: Instant::now() + shared.config.ttl,
        };
        shared
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr.clone(), entry);
        shared.clear_pending(&addr);

        // A timed-out call still occupies this worker's slot until it returns.
        if let Some(answer) = query {
            let _ = answer.recv();
        }
    }
}

/// Run the blocking lookup on a short-lived thread; the answer arrives on
/// the returned channel.
fn start_query(
    resolver: Arc<dyn ReverseResolve>,
    ip: IpAddr,
) -> Option<mpsc::Receiver<Option<String>>> {
    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = thread::Builder::new()
        .name("rdns-query".into())
        .spawn(move || {
            let _ = tx.send(resolver.reverse(ip));
        });
    match spawned {
        Ok(_) => Some(rx),
        Err(e) => {
            log::warn!("spawn rdns query for {ip}: {e}");
            None
        }
    }
}

/// Accepts bracketed IPv6 and drops a `%zone` suffix.
fn parse_ip(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim_start_matches('[').trim_end_matches(']');
    let addr = addr.split_once('%').map_or(addr, |(ip, _)| ip);
    addr.parse().ok()
}
