pub mod fmt;

use std::collections::HashMap;

use serde::Serialize;

/// Transport + address family of an inet socket.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SocketProto {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl SocketProto {
    /// Map a raw (family, socket type) pair onto a proto tag.
    ///
    /// Returns `None` for anything that is not a TCP or UDP socket over IPv4/IPv6.
    pub fn classify(family: i32, sock_type: i32) -> Option<Self> {
        match (family, sock_type) {
            (libc::AF_INET, libc::SOCK_STREAM) => Some(Self::Tcp),
            (libc::AF_INET6, libc::SOCK_STREAM) => Some(Self::Tcp6),
            (libc::AF_INET, libc::SOCK_DGRAM) => Some(Self::Udp),
            (libc::AF_INET6, libc::SOCK_DGRAM) => Some(Self::Udp6),
            _ => None,
        }
    }
}

impl std::fmt::Display for SocketProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tcp6 => write!(f, "tcp6"),
            Self::Udp => write!(f, "udp"),
            Self::Udp6 => write!(f, "udp6"),
        }
    }
}

impl std::str::FromStr for SocketProto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" | "tcp4" => Ok(Self::Tcp),
            "tcp6" => Ok(Self::Tcp6),
            "udp" | "udp4" => Ok(Self::Udp),
            "udp6" => Ok(Self::Udp6),
            other => Err(format!("unknown socket proto '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketState {
    // TCP states
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    CloseWait,
    LastAck,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    // UDP states
    Bound,
    Connected,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Listen => write!(f, "LISTEN"),
            Self::SynSent => write!(f, "SYN_SENT"),
            Self::SynReceived => write!(f, "SYN_RECEIVED"),
            Self::Established => write!(f, "ESTABLISHED"),
            Self::CloseWait => write!(f, "CLOSE_WAIT"),
            Self::LastAck => write!(f, "LAST_ACK"),
            Self::FinWait1 => write!(f, "FIN_WAIT_1"),
            Self::FinWait2 => write!(f, "FIN_WAIT_2"),
            Self::Closing => write!(f, "CLOSING"),
            Self::TimeWait => write!(f, "TIME_WAIT"),
            Self::Bound => write!(f, "BOUND"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// A network interface with cumulative IO counters. Identity is `name`.
#[derive(Clone, Serialize, Debug, Default, PartialEq)]
pub struct Interface {
    pub name: String,
    pub index: u32,
    pub mtu: u32,
    pub hw_addr: String,
    pub addrs: Vec<String>,
    pub up: bool,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    /// bytes/sec
    pub tx_rate: f64,
    /// bytes/sec
    pub rx_rate: f64,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Route {
    pub destination: String,
    pub gateway: String,
    pub netmask: String,
    pub interface: String,
    pub flags: String,
}

/// A TCP or UDP socket. Local + remote + proto is not unique.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct Socket {
    pub proto: SocketProto,
    pub local_addr: String,
    pub local_port: u32,
    pub remote_addr: String,
    pub remote_port: u32,
    pub state: SocketState,
    /// `None` when the owning process is unknown.
    pub pid: Option<u32>,
    pub process: String,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq, Eq)]
pub struct UnixSocket {
    pub path: String,
    pub sock_type: String,
    pub state: String,
    pub pid: Option<u32>,
    pub process: String,
    pub fd: String,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq, Eq)]
pub struct Process {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub user: String,
    /// Inet sockets in the same result owned by this pid.
    pub num_conns: usize,
    /// Unix sockets in the same result owned by this pid.
    pub num_unix_socks: usize,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq, Eq)]
pub struct FirewallRule {
    pub rule_num: u32,
    pub action: String,
    pub direction: String,
    pub proto: String,
    pub src: String,
    pub dst: String,
    pub packets: u64,
    pub bytes: u64,
    pub raw_rule: String,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq, Eq)]
pub struct ArpEntry {
    pub hostname: String,
    pub ip: String,
    pub mac: String,
    pub interface: String,
    pub flags: Vec<String>,
    pub link_type: String,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq)]
pub struct Throughput {
    pub interface: String,
    pub tx_rate: f64,
    pub rx_rate: f64,
}

/// Which data source a [`CollectionError`] came from.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Interfaces,
    Routes,
    Connections,
    LsofInet,
    LsofUnix,
    Processes,
    Firewall,
    Arp,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interfaces => "interfaces",
            Self::Routes => "routes",
            Self::Connections => "connections",
            Self::LsofInet => "lsof-inet",
            Self::LsofUnix => "lsof-unix",
            Self::Processes => "processes",
            Self::Firewall => "firewall",
            Self::Arp => "arp",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal failure of one source during a poll.
#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
pub struct CollectionError {
    pub source: Source,
    pub message: String,
}

impl CollectionError {
    pub fn new(source: Source, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

/// Everything gathered in one poll.
#[derive(Clone, Serialize, Debug, Default)]
pub struct CollectionResult {
    pub interfaces: Vec<Interface>,
    pub routes: Vec<Route>,
    pub sockets: Vec<Socket>,
    pub unix_sockets: Vec<UnixSocket>,
    pub processes: Vec<Process>,
    pub firewall: Vec<FirewallRule>,
    pub arp: Vec<ArpEntry>,
    pub throughputs: HashMap<String, Throughput>,
    pub errors: Vec<CollectionError>,
    /// Capture time, seconds since the Unix epoch.
    pub timestamp: u64,
    pub is_root: bool,
}

impl CollectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn errors_from(&self, source: Source) -> impl Iterator<Item = &CollectionError> {
        self.errors.iter().filter(move |e| e.source == source)
    }
}
