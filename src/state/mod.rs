use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::model::{
    ArpEntry, CollectionError, CollectionResult, FirewallRule, Interface, Process, Route, Socket,
    Throughput, UnixSocket,
};

/// Cross-references into one published result.
///
/// The maps hold their own copies of the records, so they stay valid however
/// a reader reorders or trims the collections of its [`Snapshot`].
#[derive(Debug, Default)]
pub struct Indices {
    /// pid -> inet sockets owned by it (sockets without a pid are not indexed)
    pub sockets_by_pid: FxHashMap<u32, Vec<Socket>>,
    pub process_by_pid: FxHashMap<u32, Process>,
    /// interface name -> routes through it (routes with no interface are not indexed)
    pub routes_by_interface: FxHashMap<String, Vec<Route>>,
    pub interface_by_name: FxHashMap<String, Interface>,
}

impl Indices {
    fn build(result: &CollectionResult) -> Self {
        let mut idx = Indices::default();

        for sock in &result.sockets {
            if let Some(pid) = sock.pid {
                idx.sockets_by_pid.entry(pid).or_default().push(sock.clone());
            }
        }
        for p in &result.processes {
            idx.process_by_pid.insert(p.pid, p.clone());
        }
        for r in &result.routes {
            if !r.interface.is_empty() {
                idx.routes_by_interface
                    .entry(r.interface.clone())
                    .or_default()
                    .push(r.clone());
            }
        }
        for iface in &result.interfaces {
            idx.interface_by_name.insert(iface.name.clone(), iface.clone());
        }

        idx
    }
}

struct Published {
    seq: u64,
    result: CollectionResult,
    indices: Arc<Indices>,
}

/// Holds the latest poll result for any number of readers.
///
/// `update` builds the new result and its indices off to the side and swaps
/// them in with one atomic store, so a reader sees either the previous poll
/// or the new one in full. With several writers the last store wins.
pub struct Store {
    state: ArcSwap<Published>,
    next_seq: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(Published {
                seq: 0,
                result: CollectionResult::empty(),
                indices: Arc::new(Indices::default()),
            }),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn update(&self, result: CollectionResult) {
        let indices = Arc::new(Indices::build(&result));
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.state.store(Arc::new(Published {
            seq,
            result,
            indices,
        }));
    }

    /// An independent copy of the current result. The index maps are shared
    /// with the store; they are never mutated after publication.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.load();
        let r = &state.result;
        Snapshot {
            seq: state.seq,
            interfaces: r.interfaces.clone(),
            routes: r.routes.clone(),
            sockets: r.sockets.clone(),
            unix_sockets: r.unix_sockets.clone(),
            processes: r.processes.clone(),
            firewall: r.firewall.clone(),
            arp: r.arp.clone(),
            throughputs: r.throughputs.clone(),
            errors: r.errors.clone(),
            timestamp: r.timestamp,
            is_root: r.is_root,
            indices: Arc::clone(&state.indices),
        }
    }
}

/// Read-only view of one poll, safe to hold while the store moves on.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Which update produced this; 0 before the first one.
    pub seq: u64,
    pub interfaces: Vec<Interface>,
    pub routes: Vec<Route>,
    pub sockets: Vec<Socket>,
    pub unix_sockets: Vec<UnixSocket>,
    pub processes: Vec<Process>,
    pub firewall: Vec<FirewallRule>,
    pub arp: Vec<ArpEntry>,
    pub throughputs: HashMap<String, Throughput>,
    pub errors: Vec<CollectionError>,
    pub timestamp: u64,
    pub is_root: bool,
    #[serde(skip)]
    indices: Arc<Indices>,
}

impl Snapshot {
    pub fn indices(&self) -> &Arc<Indices> {
        &self.indices
    }

    pub fn sockets_for_pid(&self, pid: u32) -> impl Iterator<Item = &Socket> {
        self.indices.sockets_by_pid.get(&pid).into_iter().flatten()
    }

    pub fn process(&self, pid: u32) -> Option<&Process> {
        self.indices.process_by_pid.get(&pid)
    }

    pub fn routes_for_interface(&self, name: &str) -> impl Iterator<Item = &Route> {
        self.indices.routes_by_interface.get(name).into_iter().flatten()
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.indices.interface_by_name.get(name)
    }
}
