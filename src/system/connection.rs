use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::SnapError;
use crate::model::SocketState;

/// An inet socket as the OS reports it, before proto classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConnection {
    pub family: i32,
    pub sock_type: i32,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
    pub state: SocketState,
    /// Owning process when the OS attributes it.
    pub pid: Option<u32>,
}

fn udp_state(remote_port: u16) -> SocketState {
    if remote_port == 0 {
        SocketState::Bound
    } else {
        SocketState::Connected
    }
}

// ---------------------------------------------------------------------------
// macOS: libproc, walking every process's socket descriptors
// ---------------------------------------------------------------------------

#[cfg(target_os = "macos")]
#[allow(non_camel_case_types, dead_code)]
mod macos_impl {
    use std::mem;

    use super::*;

    const PROC_ALL_PIDS: u32 = 1;
    const PROC_PIDLISTFDS: i32 = 1;
    const PROC_PIDFDSOCKETINFO: i32 = 3;
    const PROX_FDTYPE_SOCKET: u32 = 2;

    // TCP states from <netinet/tcp_fsm.h>
    const TCPS_CLOSED: i32 = 0;
    const TCPS_LISTEN: i32 = 1;
    const TCPS_SYN_SENT: i32 = 2;
    const TCPS_SYN_RECEIVED: i32 = 3;
    const TCPS_ESTABLISHED: i32 = 4;
    const TCPS_CLOSE_WAIT: i32 = 5;
    const TCPS_FIN_WAIT_1: i32 = 6;
    const TCPS_CLOSING: i32 = 7;
    const TCPS_LAST_ACK: i32 = 8;
    const TCPS_FIN_WAIT_2: i32 = 9;
    const TCPS_TIME_WAIT: i32 = 10;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct proc_fdinfo {
        proc_fd: i32,
        proc_fdtype: u32,
    }

    const _: () = assert!(mem::size_of::<proc_fdinfo>() == 8);

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct proc_fileinfo {
        fi_openflags: u32,
        fi_status: u32,
        fi_offset: i64,
        fi_type: i32,
        fi_guardflags: u32,
    }

    const _: () = assert!(mem::size_of::<proc_fileinfo>() == 24);

    // <sys/proc_info.h> in_sockinfo. Addresses are in4in6 unions: an IPv4
    // address sits in the last 4 of the 16 bytes.
    #[repr(C)]
    #[derive(Clone, Copy)]
    struct in_sockinfo {
        insi_fport: i32,
        insi_lport: i32,
        insi_gencnt: u64,
        insi_flags: u32,
        insi_flow: u32,
        insi_vflag: u8,
        insi_ip_ttl: u8,
        _rfu_1: u32,
        insi_faddr: [u8; 16],
        insi_laddr: [u8; 16],
        _tail: [u8; 16],
    }

    const _: () = assert!(mem::size_of::<in_sockinfo>() == 80);

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct tcp_sockinfo {
        tcpsi_ini: in_sockinfo,
        tcpsi_state: i32,
        tcpsi_timer: [i32; 4],
        tcpsi_mss: i32,
        tcpsi_flags: u32,
        _rfu_1: u32,
        tcpsi_tp: u64,
    }

    const _: () = assert!(mem::size_of::<tcp_sockinfo>() == 120);

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct sockbuf_info {
        sbi_cc: u32,
        sbi_hiwat: u32,
        sbi_mbcnt: u32,
        sbi_mbmax: u32,
        sbi_lowat: u32,
        sbi_flags: i16,
        sbi_timeo: i16,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct socket_info {
        _soi_stat: [u8; 136],
        soi_so: u64,
        soi_pcb: u64,
        soi_type: i32,
        soi_protocol: i32,
        soi_family: i32,
        soi_options: i16,
        soi_linger: i16,
        soi_state: i16,
        soi_qlen: i16,
        soi_incqlen: i16,
        soi_qlimit: i16,
        soi_timeo: i16,
        soi_error: u16,
        soi_oobmark: u32,
        soi_rcv: sockbuf_info,
        soi_snd: sockbuf_info,
        soi_kind: i32,
        _rfu_1: u32,
        soi_proto: [u8; 528],
    }

    const _: () = assert!(mem::size_of::<socket_info>() == 768);

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct socket_fdinfo {
        pfi: proc_fileinfo,
        psi: socket_info,
    }

    const _: () = assert!(mem::size_of::<socket_fdinfo>() == 792);

    unsafe extern "C" {
        fn proc_listpids(
            type_: u32,
            typeinfo: u32,
            buffer: *mut libc::c_void,
            buffersize: libc::c_int,
        ) -> libc::c_int;

        fn proc_pidinfo(
            pid: libc::c_int,
            flavor: libc::c_int,
            arg: u64,
            buffer: *mut libc::c_void,
            buffersize: libc::c_int,
        ) -> libc::c_int;

        fn proc_pidfdinfo(
            pid: libc::c_int,
            fd: libc::c_int,
            flavor: libc::c_int,
            buffer: *mut libc::c_void,
            buffersize: libc::c_int,
        ) -> libc::c_int;
    }

    pub fn list_connections() -> Result<Vec<RawConnection>, SnapError> {
        let mut conns = Vec::new();
        for pid in list_pids()? {
            // Processes that exit or deny inspection mid-walk are skipped.
            for fd in socket_fds(pid) {
                if let Some(conn) = socket_info(pid, fd) {
                    conns.push(conn);
                }
            }
        }
        Ok(conns)
    }

    fn list_pids() -> Result<Vec<i32>, SnapError> {
        let mut buffer: Vec<i32> = vec![0; 4096];

        loop {
            let buf_size = buffer.len() * mem::size_of::<i32>();
            let ret = unsafe {
                proc_listpids(
                    PROC_ALL_PIDS,
                    0,
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buf_size as libc::c_int,
                )
            };

            if ret <= 0 {
                return Err(SnapError::Libproc(format!(
                    "proc_listpids failed: {}",
                    std::io::Error::last_os_error()
                )));
            }

            let count = ret as usize / mem::size_of::<i32>();
            if count >= buffer.len() {
                buffer.resize(buffer.len() * 2, 0);
                continue;
            }

            buffer.truncate(count);
            buffer.retain(|&pid| pid > 0);
            return Ok(buffer);
        }
    }

    fn socket_fds(pid: i32) -> Vec<i32> {
        let cap = 4096;
        let mut buffer: Vec<proc_fdinfo> = vec![
            proc_fdinfo {
                proc_fd: 0,
                proc_fdtype: 0
            };
            cap
        ];

        let ret = unsafe {
            proc_pidinfo(
                pid,
                PROC_PIDLISTFDS,
                0,
                buffer.as_mut_ptr() as *mut libc::c_void,
                (cap * mem::size_of::<proc_fdinfo>()) as libc::c_int,
            )
        };
        if ret <= 0 {
            return Vec::new();
        }

        let count = (ret as usize / mem::size_of::<proc_fdinfo>()).min(cap);
        buffer[..count]
            .iter()
            .filter(|fd| fd.proc_fdtype == PROX_FDTYPE_SOCKET)
            .map(|fd| fd.proc_fd)
            .collect()
    }

    fn socket_info(pid: i32, fd: i32) -> Option<RawConnection> {
        let mut info: socket_fdinfo = unsafe { mem::zeroed() };

        let ret = unsafe {
            proc_pidfdinfo(
                pid,
                fd,
                PROC_PIDFDSOCKETINFO,
                &mut info as *mut _ as *mut libc::c_void,
                mem::size_of::<socket_fdinfo>() as libc::c_int,
            )
        };
        if ret <= 0 {
            return None;
        }

        let family = info.psi.soi_family;
        let sock_type = info.psi.soi_type;
        if family != libc::AF_INET && family != libc::AF_INET6 {
            return None;
        }

        let (inp, tcp_state) = if sock_type == libc::SOCK_STREAM {
            let tcp: tcp_sockinfo =
                unsafe { std::ptr::read_unaligned(info.psi.soi_proto.as_ptr() as *const tcp_sockinfo) };
            (tcp.tcpsi_ini, Some(tcp.tcpsi_state))
        } else {
            let inp: in_sockinfo =
                unsafe { std::ptr::read_unaligned(info.psi.soi_proto.as_ptr() as *const in_sockinfo) };
            (inp, None)
        };

        let local_port = u16::from_be(inp.insi_lport as u16);
        let remote_port = u16::from_be(inp.insi_fport as u16);
        let state = match tcp_state {
            Some(s) => tcp_state_to_socket_state(s),
            None => udp_state(remote_port),
        };

        Some(RawConnection {
            family,
            sock_type,
            local_addr: in4in6(&inp.insi_laddr, family),
            local_port,
            remote_addr: in4in6(&inp.insi_faddr, family),
            remote_port,
            state,
            pid: Some(pid as u32),
        })
    }

    fn in4in6(bytes: &[u8; 16], family: i32) -> IpAddr {
        if family == libc::AF_INET {
            IpAddr::V4(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]))
        } else {
            IpAddr::V6(Ipv6Addr::from(*bytes))
        }
    }

    fn tcp_state_to_socket_state(state: i32) -> SocketState {
        match state {
            TCPS_LISTEN => SocketState::Listen,
            TCPS_SYN_SENT => SocketState::SynSent,
            TCPS_SYN_RECEIVED => SocketState::SynReceived,
            TCPS_ESTABLISHED => SocketState::Established,
            TCPS_CLOSE_WAIT => SocketState::CloseWait,
            TCPS_FIN_WAIT_1 => SocketState::FinWait1,
            TCPS_CLOSING => SocketState::Closing,
            TCPS_LAST_ACK => SocketState::LastAck,
            TCPS_FIN_WAIT_2 => SocketState::FinWait2,
            TCPS_TIME_WAIT => SocketState::TimeWait,
            _ => SocketState::Closed,
        }
    }
}

#[cfg(target_os = "macos")]
pub use macos_impl::list_connections;

// ---------------------------------------------------------------------------
// Linux: /proc/net/{tcp,tcp6,udp,udp6} joined to /proc/<pid>/fd socket inodes
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub fn list_connections() -> Result<Vec<RawConnection>, SnapError> {
    let tables = [
        ("/proc/net/tcp", libc::AF_INET, libc::SOCK_STREAM),
        ("/proc/net/tcp6", libc::AF_INET6, libc::SOCK_STREAM),
        ("/proc/net/udp", libc::AF_INET, libc::SOCK_DGRAM),
        ("/proc/net/udp6", libc::AF_INET6, libc::SOCK_DGRAM),
    ];

    let mut entries = Vec::new();
    let mut first_err = None;
    let mut any_read = false;
    for (path, family, sock_type) in tables {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                any_read = true;
                entries.extend(parse_proc_net_table(&content, family, sock_type));
            }
            Err(e) => {
                log::debug!("read {path}: {e}");
                first_err.get_or_insert((path, e));
            }
        }
    }
    if !any_read && let Some((path, source)) = first_err {
        return Err(SnapError::Procfs {
            path: path.to_string(),
            source,
        });
    }

    let owners = inode_owners();
    Ok(entries
        .into_iter()
        .map(|(inode, mut conn)| {
            conn.pid = owners.get(&inode).copied();
            conn
        })
        .collect())
}

/// Socket inode -> pid, from every `/proc/<pid>/fd` this process can read.
#[cfg(target_os = "linux")]
fn inode_owners() -> std::collections::HashMap<u64, u32> {
    let mut owners = std::collections::HashMap::new();

    let Ok(proc_dir) = std::fs::read_dir("/proc") else {
        return owners;
    };
    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        // EACCES for other users' processes when unprivileged.
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(link) = std::fs::read_link(fd.path())
                && let Some(inode) = parse_socket_inode(&link.to_string_lossy())
            {
                owners.entry(inode).or_insert(pid);
            }
        }
    }

    owners
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn list_connections() -> Result<Vec<RawConnection>, SnapError> {
    Err(SnapError::Unsupported("connection enumeration"))
}

/// Parse one `/proc/net/{tcp,udp}[6]` table into (inode, connection) pairs.
///
/// Columns used: 1 local, 2 remote, 3 state (hex), 9 inode. Rows that do not
/// parse are skipped.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_net_table(
    content: &str,
    family: i32,
    sock_type: i32,
) -> Vec<(u64, RawConnection)> {
    let parse_addr = if family == libc::AF_INET6 {
        parse_addr_v6
    } else {
        parse_addr_v4
    };

    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                return None;
            }
            let (local_addr, local_port) = parse_addr(fields[1])?;
            let (remote_addr, remote_port) = parse_addr(fields[2])?;
            let st = u8::from_str_radix(fields[3], 16).ok()?;
            let inode: u64 = fields[9].parse().ok()?;

            let state = if sock_type == libc::SOCK_STREAM {
                tcp_state_from_hex(st)
            } else {
                udp_state(remote_port)
            };

            Some((
                inode,
                RawConnection {
                    family,
                    sock_type,
                    local_addr,
                    local_port,
                    remote_addr,
                    remote_port,
                    state,
                    pid: None,
                },
            ))
        })
        .collect()
}

/// `AABBCCDD:PORT`, address as a host-order u32.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_addr_v4(s: &str) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((IpAddr::V4(Ipv4Addr::from(raw.to_ne_bytes())), port))
}

/// 32 hex chars as four host-order u32 words, then `:PORT`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_addr_v6(s: &str) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 32 {
        return None;
    }
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let mut octets = [0u8; 16];
    for i in 0..4 {
        let word = u32::from_str_radix(&addr_hex[i * 8..(i + 1) * 8], 16).ok()?;
        octets[i * 4..i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
    }
    Some((IpAddr::V6(Ipv6Addr::from(octets)), port))
}

/// `socket:[12345]` -> 12345
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

/// include/net/tcp_states.h
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn tcp_state_from_hex(st: u8) -> SocketState {
    match st {
        0x01 => SocketState::Established,
        0x02 => SocketState::SynSent,
        0x03 => SocketState::SynReceived,
        0x04 => SocketState::FinWait1,
        0x05 => SocketState::FinWait2,
        0x06 => SocketState::TimeWait,
        0x08 => SocketState::CloseWait,
        0x09 => SocketState::LastAck,
        0x0A => SocketState::Listen,
        0x0B => SocketState::Closing,
        _ => SocketState::Closed,
    }
}
