//! Collector integration tests.
//!
//! A poll is driven against an in-memory `SystemSource` fed with captured
//! tool output, so these run anywhere without privileges.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use netscope::collector::{Collector, FIREWALL_NEEDS_ROOT};
use netscope::config::DnsConfig;
use netscope::enrichment::dns_resolver::{ReverseLookupCache, ReverseResolve};
use netscope::error::SnapError;
use netscope::model::{Interface, Process, Route, SocketProto, SocketState, Source};
use netscope::state::Store;
use netscope::system::SystemSource;
use netscope::system::connection::RawConnection;

const LSOF_INET: &str = "\
p312
cmDNSResponder
f5
n*:5353
p1204
cfirefox
f41
n192.168.1.5:52100->93.184.216.34:443
f42
n[fe80::1]:6463
";

const LSOF_UNIX: &str = "\
p88
cnotifyd
f4
n/var/run/notifyd.sock
p1204
cfirefox
f9
n->0x5f1e2a7bc1d2e3f4
";

const PFCTL: &str = "\
@0 scrub-anchor \"com.apple/*\" all fragment reassemble
@1 pass in proto tcp from any to any port = 22
  [ Evaluations: 10  Packets: 7  Bytes: 420  States: 1 ]
";

const ARP: &str = "\
? (192.168.1.1) at 68:d7:9a:6a:20:6 on en0 ifscope [ethernet]
router.lan (192.168.1.254) at (incomplete) on en0 ifscope [ethernet]
";

/// Canned host. Interface counters advance on every poll.
#[derive(Default)]
struct FakeSource {
    elevated: bool,
    panic_in_routes: bool,
    fail_interfaces: bool,
    fail_lsof: bool,
    polls: Arc<AtomicU64>,
}

fn conn(
    v6: bool,
    sock_type: i32,
    local: IpAddr,
    local_port: u16,
    remote: IpAddr,
    remote_port: u16,
    state: SocketState,
    pid: Option<u32>,
) -> RawConnection {
    RawConnection {
        family: if v6 { libc::AF_INET6 } else { libc::AF_INET },
        sock_type,
        local_addr: local,
        local_port,
        remote_addr: remote,
        remote_port,
        state,
        pid,
    }
}

impl SystemSource for FakeSource {
    fn interfaces(&self) -> Result<Vec<Interface>, SnapError> {
        if self.fail_interfaces {
            return Err(SnapError::Interface(std::io::Error::other("getifaddrs failed")));
        }
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Interface {
            name: "en0".into(),
            index: 4,
            mtu: 1500,
            up: true,
            bytes_sent: 1000 + n * 2000,
            bytes_recv: 5000 + n * 500,
            ..Default::default()
        }])
    }

    fn routes(&self) -> Result<Vec<Route>, SnapError> {
        if self.panic_in_routes {
            panic!("truncated sockaddr");
        }
        let iface_names = HashMap::from([(4u32, "en0".to_string())]);
        Ok(vec![Route {
            destination: "default".into(),
            gateway: "192.168.1.1".into(),
            netmask: String::new(),
            interface: iface_names.get(&4).cloned().unwrap_or_default(),
            flags: "UGSc".into(),
        }])
    }

    fn connections(&self) -> Result<Vec<RawConnection>, SnapError> {
        let any4 = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Ok(vec![
            conn(
                false,
                libc::SOCK_STREAM,
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
                52100,
                IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
                443,
                SocketState::Established,
                None,
            ),
            conn(
                false,
                libc::SOCK_DGRAM,
                any4,
                5353,
                any4,
                0,
                SocketState::Bound,
                None,
            ),
            conn(
                true,
                libc::SOCK_STREAM,
                IpAddr::V6("fe80::1".parse::<Ipv6Addr>().unwrap()),
                6463,
                IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                0,
                SocketState::Listen,
                None,
            ),
            conn(
                false,
                libc::SOCK_STREAM,
                any4,
                22,
                any4,
                0,
                SocketState::Listen,
                Some(1),
            ),
            conn(
                false,
                libc::SOCK_RAW,
                any4,
                0,
                any4,
                0,
                SocketState::Closed,
                None,
            ),
        ])
    }

    fn processes(&self) -> Result<Vec<Process>, SnapError> {
        Ok([(1, "launchd"), (88, "notifyd"), (312, "mDNSResponder"), (1204, "firefox")]
            .into_iter()
            .map(|(pid, name)| Process {
                pid,
                name: name.into(),
                command: name.into(),
                user: "root".into(),
                ..Default::default()
            })
            .collect())
    }

    fn lsof_inet(&self) -> Result<String, SnapError> {
        if self.fail_lsof {
            return Err(SnapError::Command {
                program: "lsof".into(),
                detail: "No such file or directory".into(),
            });
        }
        Ok(LSOF_INET.into())
    }

    fn lsof_unix(&self) -> Result<String, SnapError> {
        if self.fail_lsof {
            return Err(SnapError::Command {
                program: "lsof".into(),
                detail: "No such file or directory".into(),
            });
        }
        Ok(LSOF_UNIX.into())
    }

    fn firewall_rules(&self) -> Result<String, SnapError> {
        Ok(PFCTL.into())
    }

    fn arp_table(&self) -> Result<String, SnapError> {
        Ok(ARP.into())
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }
}

fn no_dns() -> ReverseLookupCache {
    ReverseLookupCache::new(DnsConfig {
        enabled: false,
        ..DnsConfig::default()
    })
    .unwrap()
}

fn collector(source: FakeSource) -> Collector {
    Collector::new(source, no_dns())
}

// =========================================================================
// Section 1: Assembly of one poll
// =========================================================================

/// Every source feeds its collection; non-inet connections are dropped.
#[test]
fn poll_assembles_every_collection() {
    let result = collector(FakeSource {
        elevated: true,
        ..Default::default()
    })
    .collect();

    assert_eq!(result.interfaces.len(), 1);
    assert_eq!(result.routes.len(), 1);
    assert_eq!(result.routes[0].interface, "en0");
    assert_eq!(result.sockets.len(), 4);
    assert_eq!(result.unix_sockets.len(), 2);
    assert_eq!(result.processes.len(), 4);
    assert_eq!(result.firewall.len(), 2);
    assert_eq!(result.arp.len(), 2);
    assert!(result.is_root);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert!(result.timestamp > 0);
}

/// Sockets the OS left unattributed pick up owners from lsof.
#[test]
fn lsof_attributes_sockets() {
    let result = collector(FakeSource::default()).collect();

    let by_port = |port: u32| {
        result
            .sockets
            .iter()
            .find(|s| s.local_port == port)
            .unwrap()
    };

    let https = by_port(52100);
    assert_eq!(https.proto, SocketProto::Tcp);
    assert_eq!(https.pid, Some(1204));
    assert_eq!(https.process, "firefox");

    // Unspecified local address falls back to the wildcard key.
    let mdns = by_port(5353);
    assert_eq!(mdns.proto, SocketProto::Udp);
    assert_eq!(mdns.pid, Some(312));
    assert_eq!(mdns.process, "mDNSResponder");

    // IPv6 keys are bracketed.
    let v6 = by_port(6463);
    assert_eq!(v6.proto, SocketProto::Tcp6);
    assert_eq!(v6.pid, Some(1204));

    // OS-reported pid kept even though lsof never saw it.
    let ssh = by_port(22);
    assert_eq!(ssh.pid, Some(1));
    assert_eq!(ssh.process, "");
}

/// Per-process counts equal the sockets in the same result carrying that pid.
#[test]
fn process_counts_match_sockets() {
    let result = collector(FakeSource::default()).collect();

    for p in &result.processes {
        let conns = result.sockets.iter().filter(|s| s.pid == Some(p.pid)).count();
        let unix = result
            .unix_sockets
            .iter()
            .filter(|s| s.pid == Some(p.pid))
            .count();
        assert_eq!(p.num_conns, conns, "pid {}", p.pid);
        assert_eq!(p.num_unix_socks, unix, "pid {}", p.pid);
    }

    let firefox = result.processes.iter().find(|p| p.pid == 1204).unwrap();
    assert_eq!(firefox.num_conns, 2);
    assert_eq!(firefox.num_unix_socks, 1);
}

// =========================================================================
// Section 2: Source isolation
// =========================================================================

/// A panic while decoding routes empties only the routes.
#[test]
fn route_panic_is_contained() {
    let result = collector(FakeSource {
        panic_in_routes: true,
        ..Default::default()
    })
    .collect();

    assert!(result.routes.is_empty());
    let errs: Vec<_> = result.errors_from(Source::Routes).collect();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("truncated sockaddr"));
    assert_eq!(result.sockets.len(), 4);
    assert_eq!(result.interfaces.len(), 1);
}

/// Routes keep their interface names when the interface listing fails.
#[test]
fn routes_labelled_without_interfaces() {
    let result = collector(FakeSource {
        fail_interfaces: true,
        ..Default::default()
    })
    .collect();

    assert!(result.interfaces.is_empty());
    assert_eq!(result.errors_from(Source::Interfaces).count(), 1);
    assert_eq!(result.routes.len(), 1);
    assert_eq!(result.routes[0].interface, "en0");
    assert_eq!(result.sockets.len(), 4);
}

/// Without privilege the firewall is skipped with a fixed message.
#[test]
fn firewall_needs_privilege() {
    let result = collector(FakeSource::default()).collect();

    assert!(!result.is_root);
    assert!(result.firewall.is_empty());
    let errs: Vec<_> = result.errors_from(Source::Firewall).collect();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].message, FIREWALL_NEEDS_ROOT);
}

/// A missing lsof leaves sockets unattributed and reports both passes.
#[test]
fn lsof_failure_is_reported() {
    let result = collector(FakeSource {
        fail_lsof: true,
        ..Default::default()
    })
    .collect();

    assert_eq!(result.errors_from(Source::LsofInet).count(), 1);
    assert_eq!(result.errors_from(Source::LsofUnix).count(), 1);
    assert!(result.unix_sockets.is_empty());
    assert_eq!(result.sockets.len(), 4);
    assert!(
        result
            .sockets
            .iter()
            .filter(|s| s.local_port != 22)
            .all(|s| s.pid.is_none())
    );
}

// =========================================================================
// Section 3: Rates across polls
// =========================================================================

/// First poll reports zero; later polls report the counter delta per second.
#[test]
fn rates_follow_counters() {
    let mut c = collector(FakeSource::default());
    let t0 = Instant::now();

    let first = c.collect_at(t0);
    assert_eq!(first.interfaces[0].tx_rate, 0.0);
    assert_eq!(first.throughputs["en0"].rx_rate, 0.0);

    let second = c.collect_at(t0 + Duration::from_secs(2));
    assert_eq!(second.interfaces[0].tx_rate, 1000.0);
    assert_eq!(second.interfaces[0].rx_rate, 250.0);
    assert_eq!(second.throughputs["en0"].tx_rate, 1000.0);
}

// =========================================================================
// Section 4: Collector feeding the store and the name cache
// =========================================================================

struct Named;

impl ReverseResolve for Named {
    fn reverse(&self, ip: IpAddr) -> Option<String> {
        match ip {
            IpAddr::V4(v4) if v4 == Ipv4Addr::new(93, 184, 216, 34) => {
                Some("example.org.".into())
            }
            _ => None,
        }
    }
}

/// Remote addresses of a poll are warmed in the name cache.
#[test]
fn poll_warms_reverse_cache() {
    let dns = ReverseLookupCache::with_resolver(DnsConfig::default(), Named).unwrap();
    let mut c = Collector::new(FakeSource::default(), dns.clone());
    c.collect();

    assert!(dns.wait_idle(Duration::from_secs(5)));
    assert_eq!(dns.cached("93.184.216.34").as_deref(), Some("example.org"));
    // Unspecified remotes are never looked up.
    assert_eq!(dns.cached("0.0.0.0"), None);
}

/// Store indices cross-reference the collector's output.
#[test]
fn store_indexes_poll() {
    let store = Store::new();
    store.update(collector(FakeSource::default()).collect());
    let snap = store.snapshot();

    assert_eq!(snap.seq, 1);
    assert_eq!(snap.sockets_for_pid(1204).count(), 2);
    assert_eq!(snap.process(312).map(|p| p.name.as_str()), Some("mDNSResponder"));
    assert_eq!(snap.routes_for_interface("en0").count(), 1);
    assert_eq!(snap.interface("en0").map(|i| i.mtu), Some(1500));
    assert!(snap.interface("lo0").is_none());
}
