//! Kernel routing-table records.
//!
//! Two inputs produce the same [`Route`] record: the BSD routing-socket RIB
//! dump (`sysctl NET_RT_DUMP`, a stream of `rt_msghdr` messages each followed
//! by packed `sockaddr`s) and the Linux `/proc/net/route` text table.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::SnapError;
use crate::model::Route;

// rt_msghdr (Darwin): msglen u16, version u8, type u8, index u16, pad,
// flags i32 @8, addrs i32 @12, then pid/seq/errno/use/inits + rt_metrics.
const RTM_HDR_LEN: usize = 92;
const RTM_VERSION: u8 = 5;
const OFF_INDEX: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_ADDRS: usize = 12;

// Message types that carry a route.
const RTM_ADD: u8 = 0x1;
const RTM_LOCK: u8 = 0x8;
const RTM_RESOLVE: u8 = 0xb;

// Address families as they appear on the routing socket (BSD numbering).
const SA_INET: u8 = 2;
const SA_LINK: u8 = 18;
const SA_INET6: u8 = 30;

const RTAX_MAX: usize = 8;
const SOCKADDR_ALIGN: usize = 4;

/// One address record from a route message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
    Link { index: u16, name: Option<String> },
}

impl RouteAddr {
    /// Display form. Link-layer addresses show the interface name when it is
    /// known, else `link#<index>`.
    pub fn render(&self, iface_names: &HashMap<u32, String>) -> String {
        match self {
            Self::V4(ip) => ip.to_string(),
            Self::V6(ip) => ip.to_string(),
            Self::Link {
                name: Some(name), ..
            } => name.clone(),
            Self::Link { index, name: None } => iface_names
                .get(&u32::from(*index))
                .cloned()
                .unwrap_or_else(|| format!("link#{index}")),
        }
    }

    fn is_v6(&self) -> bool {
        matches!(self, Self::V6(_))
    }
}

/// Decode a routing-socket RIB dump into routes.
///
/// Non-route messages and messages of an unknown version are skipped. A
/// message length that is too short or runs past the buffer is a decode
/// fault: nothing after it can be framed, so the whole dump is rejected.
pub fn parse_rib(buf: &[u8], iface_names: &HashMap<u32, String>) -> Result<Vec<Route>, SnapError> {
    let mut routes = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        if buf.len() - offset < 4 {
            return Err(SnapError::RouteDecode {
                offset,
                detail: "truncated message header".to_string(),
            });
        }
        let msglen = u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize;
        if msglen < 4 || offset + msglen > buf.len() {
            return Err(SnapError::RouteDecode {
                offset,
                detail: format!(
                    "message length {msglen} does not fit buffer of {}",
                    buf.len()
                ),
            });
        }

        let msg = &buf[offset..offset + msglen];
        offset += msglen;

        if msg[2] != RTM_VERSION || !is_route_type(msg[3]) || msg.len() < RTM_HDR_LEN {
            continue;
        }
        routes.push(decode_route(msg, iface_names));
    }

    Ok(routes)
}

fn is_route_type(t: u8) -> bool {
    (RTM_ADD..=RTM_LOCK).contains(&t) || t == RTM_RESOLVE
}

fn read_i32(msg: &[u8], at: usize) -> i32 {
    i32::from_ne_bytes([msg[at], msg[at + 1], msg[at + 2], msg[at + 3]])
}

fn decode_route(msg: &[u8], iface_names: &HashMap<u32, String>) -> Route {
    let index = u16::from_ne_bytes([msg[OFF_INDEX], msg[OFF_INDEX + 1]]);
    let flags = read_i32(msg, OFF_FLAGS) as u32;
    let present = read_i32(msg, OFF_ADDRS) as u32;

    let [dst, gw, mask] = decode_addrs(&msg[RTM_HDR_LEN..], present);
    let render = |a: Option<RouteAddr>| a.map(|a| a.render(iface_names)).unwrap_or_default();

    Route {
        destination: render(dst),
        gateway: render(gw),
        netmask: render(mask),
        interface: if index > 0 {
            iface_names.get(&u32::from(index)).cloned().unwrap_or_default()
        } else {
            String::new()
        },
        flags: format!("{flags:#x}"),
    }
}

/// Walk the packed sockaddrs selected by the `rtm_addrs` bitmask and return
/// the first three slots (destination, gateway, netmask).
fn decode_addrs(mut data: &[u8], present: u32) -> [Option<RouteAddr>; 3] {
    let mut out: [Option<RouteAddr>; 3] = [None, None, None];
    let mut prev_v6 = false;

    for slot in 0..RTAX_MAX {
        if present & (1 << slot) == 0 {
            continue;
        }
        if slot >= out.len() || data.is_empty() {
            break;
        }

        let sa_len = data[0] as usize;
        let step = roundup(sa_len).min(data.len());
        let addr = decode_sockaddr(&data[..step], prev_v6);
        if let Some(a) = &addr {
            prev_v6 = a.is_v6();
        }
        out[slot] = addr;
        data = &data[step..];
    }

    out
}

fn roundup(len: usize) -> usize {
    if len == 0 {
        SOCKADDR_ALIGN
    } else {
        (len + SOCKADDR_ALIGN - 1) & !(SOCKADDR_ALIGN - 1)
    }
}

fn decode_sockaddr(b: &[u8], prev_v6: bool) -> Option<RouteAddr> {
    let sa_len = (*b.first()? as usize).min(b.len());
    let family = b.get(1).copied().unwrap_or(0);

    match family {
        SA_INET if sa_len >= 8 => Some(RouteAddr::V4(Ipv4Addr::new(b[4], b[5], b[6], b[7]))),
        SA_INET6 if sa_len >= 24 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&b[8..24]);
            Some(RouteAddr::V6(Ipv6Addr::from(octets)))
        }
        SA_LINK if sa_len >= 8 => {
            let index = u16::from_ne_bytes([b[2], b[3]]);
            let nlen = b[5] as usize;
            let name = (nlen > 0 && 8 + nlen <= sa_len)
                .then(|| String::from_utf8_lossy(&b[8..8 + nlen]).into_owned());
            Some(RouteAddr::Link { index, name })
        }
        SA_INET | SA_INET6 | SA_LINK => None,
        // Kernel form: a netmask truncated to its significant bytes, with no
        // usable family. It takes the family of the address before it.
        _ => {
            if prev_v6 {
                let mut octets = [0u8; 16];
                copy_tail(b, sa_len, 8, &mut octets);
                Some(RouteAddr::V6(Ipv6Addr::from(octets)))
            } else {
                let mut octets = [0u8; 4];
                copy_tail(b, sa_len, 4, &mut octets);
                Some(RouteAddr::V4(Ipv4Addr::from(octets)))
            }
        }
    }
}

fn copy_tail(b: &[u8], sa_len: usize, from: usize, out: &mut [u8]) {
    if sa_len > from {
        let end = sa_len.min(from + out.len());
        out[..end - from].copy_from_slice(&b[from..end]);
    }
}

/// Parse the Linux `/proc/net/route` table (IPv4 only).
///
/// Columns: Iface Destination Gateway Flags RefCnt Use Metric Mask ...
/// with addresses as host-order hex. The header and short lines are skipped.
pub fn parse_proc_net_route(content: &str) -> Vec<Route> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 {
                return None;
            }
            let flags = u32::from_str_radix(fields[3], 16).ok()?;
            Some(Route {
                destination: hex_ipv4(fields[1])?.to_string(),
                gateway: hex_ipv4(fields[2])?.to_string(),
                netmask: hex_ipv4(fields[7])?.to_string(),
                interface: fields[0].to_string(),
                flags: format!("{flags:#x}"),
            })
        })
        .collect()
}

fn hex_ipv4(s: &str) -> Option<Ipv4Addr> {
    if s.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(s, 16).ok()?;
    Some(Ipv4Addr::from(raw.to_ne_bytes()))
}
