//! One poll: read every source, correlate, and assemble a [`CollectionResult`].
//!
//! Sources fail independently. A failing source leaves its collection empty
//! and adds a [`CollectionError`] tagged with the source; the rest of the
//! poll carries on.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::enrichment::{self, dns_resolver::ReverseLookupCache};
use crate::error::SnapError;
use crate::model::{CollectionError, CollectionResult, Socket, SocketProto, Source};
use crate::parse::{arp, firewall, lsof};
use crate::rates::RateCalculator;
use crate::system::connection::RawConnection;
use crate::system::{HostSource, SystemSource};

pub const FIREWALL_NEEDS_ROOT: &str = "requires elevated privilege (run as root)";

/// Owns the per-engine state that must survive across polls: the rate
/// baselines and the reverse-lookup cache.
pub struct Collector {
    source: Box<dyn SystemSource>,
    rates: RateCalculator,
    dns: ReverseLookupCache,
}

impl Collector {
    pub fn new(source: impl SystemSource + 'static, dns: ReverseLookupCache) -> Self {
        Self {
            source: Box::new(source),
            rates: RateCalculator::new(),
            dns,
        }
    }

    /// A collector reading the running host.
    pub fn host(config: &EngineConfig) -> Result<Self, SnapError> {
        Ok(Self::new(
            HostSource::new(config.commands.clone()),
            ReverseLookupCache::new(config.dns.clone())?,
        ))
    }

    pub fn dns(&self) -> &ReverseLookupCache {
        &self.dns
    }

    pub fn collect(&mut self) -> CollectionResult {
        self.collect_at(Instant::now())
    }

    /// Run one poll with `now` as the rate sample time.
    pub fn collect_at(&mut self, now: Instant) -> CollectionResult {
        let mut result = CollectionResult::empty();
        let mut errors = Vec::new();
        let source = self.source.as_ref();

        // 1. interfaces + rates
        match source.interfaces() {
            Ok(mut interfaces) => {
                let throughputs = self.rates.calculate_at(&interfaces, now);
                for iface in &mut interfaces {
                    if let Some(t) = throughputs.get(&iface.name) {
                        iface.tx_rate = t.tx_rate;
                        iface.rx_rate = t.rx_rate;
                    }
                }
                result.interfaces = interfaces;
                result.throughputs = throughputs;
            }
            Err(e) => record(&mut errors, Source::Interfaces, e),
        }

        // 2. routes, isolated from decode panics
        match panic::catch_unwind(AssertUnwindSafe(|| source.routes())) {
            Ok(Ok(routes)) => result.routes = routes,
            Ok(Err(e)) => record(&mut errors, Source::Routes, e),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log::warn!("route decode panicked: {msg}");
                errors.push(CollectionError::new(
                    Source::Routes,
                    format!("route decode panicked: {msg}"),
                ));
            }
        }

        // 3. inet sockets
        match source.connections() {
            Ok(raw) => {
                let total = raw.len();
                result.sockets = raw.into_iter().filter_map(classify).collect();
                let dropped = total - result.sockets.len();
                if dropped > 0 {
                    log::debug!("discarded {dropped} unclassifiable connections");
                }
            }
            Err(e) => record(&mut errors, Source::Connections, e),
        }

        // 4. lsof passes + pid enrichment
        let mut index = lsof::LsofIndex::default();
        match source.lsof_inet() {
            Ok(out) => lsof::parse_inet(&out, &mut index),
            Err(e) => record(&mut errors, Source::LsofInet, e),
        }
        match source.lsof_unix() {
            Ok(out) => result.unix_sockets = lsof::parse_unix(&out),
            Err(e) => record(&mut errors, Source::LsofUnix, e),
        }
        let attributed = enrichment::enrich_sockets(&mut result.sockets, &index);
        log::debug!("lsof attributed {attributed} sockets");

        // 5. processes with per-poll socket counts
        match source.processes() {
            Ok(mut processes) => {
                let mut counts: FxHashMap<u32, (usize, usize)> = FxHashMap::default();
                for pid in result.sockets.iter().filter_map(|s| s.pid) {
                    counts.entry(pid).or_default().0 += 1;
                }
                for pid in result.unix_sockets.iter().filter_map(|s| s.pid) {
                    counts.entry(pid).or_default().1 += 1;
                }
                for p in &mut processes {
                    let (conns, unix) = counts.get(&p.pid).copied().unwrap_or_default();
                    p.num_conns = conns;
                    p.num_unix_socks = unix;
                }
                result.processes = processes;
            }
            Err(e) => record(&mut errors, Source::Processes, e),
        }

        // 6. firewall, root only
        result.is_root = source.is_elevated();
        if result.is_root {
            match source.firewall_rules() {
                Ok(out) => result.firewall = firewall::parse_pfctl(&out),
                Err(e) => record(&mut errors, Source::Firewall, e),
            }
        } else {
            errors.push(CollectionError::new(Source::Firewall, FIREWALL_NEEDS_ROOT));
        }

        match source.arp_table() {
            Ok(out) => result.arp = arp::parse_arp(&out),
            Err(e) => record(&mut errors, Source::Arp, e),
        }

        // 7. warm the name cache; never waited on
        self.dns
            .resolve_all(result.sockets.iter().map(|s| s.remote_addr.as_str()));

        // 8. stamp
        result.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        result.errors = errors;

        log::debug!(
            "poll: {} interfaces, {} routes, {} sockets, {} unix sockets, {} processes, {} rules, {} arp, {} errors",
            result.interfaces.len(),
            result.routes.len(),
            result.sockets.len(),
            result.unix_sockets.len(),
            result.processes.len(),
            result.firewall.len(),
            result.arp.len(),
            result.errors.len(),
        );
        result
    }
}

fn record(errors: &mut Vec<CollectionError>, source: Source, err: SnapError) {
    log::warn!("{source}: {err}");
    errors.push(CollectionError::new(source, err.to_string()));
}

/// Tag a raw connection with its proto; `None` for anything not TCP/UDP over IP.
fn classify(raw: RawConnection) -> Option<Socket> {
    let proto = SocketProto::classify(raw.family, raw.sock_type)?;
    Some(Socket {
        proto,
        local_addr: raw.local_addr.to_string(),
        local_port: u32::from(raw.local_port),
        remote_addr: raw.remote_addr.to_string(),
        remote_port: u32::from(raw.remote_port),
        state: raw.state,
        pid: raw.pid,
        process: String::new(),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::model::SocketState;

    fn raw(family: i32, sock_type: i32) -> RawConnection {
        RawConnection {
            family,
            sock_type,
            local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 22,
            remote_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            remote_port: 0,
            state: SocketState::Listen,
            pid: None,
        }
    }

    #[test]
    fn classify_keeps_inet_and_drops_the_rest() {
        let s = classify(raw(libc::AF_INET, libc::SOCK_STREAM)).unwrap();
        assert_eq!(s.proto, SocketProto::Tcp);
        assert_eq!(s.local_addr, "0.0.0.0");
        assert_eq!(s.local_port, 22);
        assert!(classify(raw(libc::AF_UNIX, libc::SOCK_STREAM)).is_none());
        assert!(classify(raw(libc::AF_INET, libc::SOCK_RAW)).is_none());
    }

    #[test]
    fn panic_message_variants() {
        let p = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "boom 1");
        let p = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "static");
    }
}
