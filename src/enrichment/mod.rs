pub mod dns_resolver;

use crate::model::Socket;
use crate::parse::lsof::LsofIndex;

/// A way of finding the owner of a socket whose pid the OS did not report,
/// by keying into lsof's `local-address:port` map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PidLookup {
    /// `<local addr>:<port>`, IPv6 bracketed the way lsof prints it.
    ExactAddress,
    /// `*:<port>`. A port bound by several processes on different
    /// addresses can be attributed to the wrong one.
    WildcardPort,
}

impl PidLookup {
    /// Tried in this order; the first hit wins.
    pub const CHAIN: [PidLookup; 2] = [Self::ExactAddress, Self::WildcardPort];

    pub fn key(self, socket: &Socket) -> String {
        match self {
            Self::ExactAddress => {
                let addr = &socket.local_addr;
                if addr.contains(':') && !addr.starts_with('[') {
                    format!("[{addr}]:{}", socket.local_port)
                } else {
                    format!("{addr}:{}", socket.local_port)
                }
            }
            Self::WildcardPort => format!("*:{}", socket.local_port),
        }
    }
}

/// Owner of `socket` from the lsof index, and which lookup found it.
pub fn resolve_pid(socket: &Socket, index: &LsofIndex) -> Option<(u32, PidLookup)> {
    PidLookup::CHAIN.into_iter().find_map(|lookup| {
        index
            .socket_pids
            .get(&lookup.key(socket))
            .map(|&pid| (pid, lookup))
    })
}

/// Attach process identity to sockets from this poll's lsof pass.
///
/// A socket that already has a pid only gets its process name filled in. A
/// socket without one goes through [`PidLookup::CHAIN`]; fields are only
/// overwritten when a lookup hits. Returns how many sockets gained a pid.
pub fn enrich_sockets(sockets: &mut [Socket], index: &LsofIndex) -> usize {
    let mut attributed = 0;

    for socket in sockets.iter_mut() {
        let pid = match socket.pid {
            Some(pid) => pid,
            None => match resolve_pid(socket, index) {
                Some((pid, _)) => {
                    socket.pid = Some(pid);
                    attributed += 1;
                    pid
                }
                None => continue,
            },
        };
        if let Some(name) = index.process_name(pid) {
            socket.process = name.to_string();
        }
    }

    attributed
}
