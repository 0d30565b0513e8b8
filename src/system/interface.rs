use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::SnapError;
use crate::model::Interface;

// if_data for AF_LINK entries on macOS (32-bit counters, widened later
// from NET_RT_IFLIST2 when that dump is available).
#[cfg(target_os = "macos")]
#[allow(non_camel_case_types, dead_code)]
#[repr(C)]
#[derive(Clone, Copy)]
struct if_data {
    ifi_type: u8,
    ifi_typelen: u8,
    ifi_physical: u8,
    ifi_addrlen: u8,
    ifi_hdrlen: u8,
    ifi_recvquota: u8,
    ifi_xmitquota: u8,
    ifi_unused1: u8,
    ifi_mtu: u32,
    ifi_metric: u32,
    ifi_baudrate: u32,
    ifi_ipackets: u32,
    ifi_ierrors: u32,
    ifi_opackets: u32,
    ifi_oerrors: u32,
    ifi_collisions: u32,
    ifi_ibytes: u32,
    ifi_obytes: u32,
    ifi_imcasts: u32,
    ifi_omcasts: u32,
    ifi_iqdrops: u32,
    ifi_noproto: u32,
    ifi_recvtiming: u32,
    ifi_xmittiming: u32,
    ifi_lastchange: libc::timeval,
    ifi_unused2: u32,
    ifi_hwassist: u32,
    ifi_reserved1: u32,
    ifi_reserved2: u32,
}

/// Enumerate interfaces with addresses and cumulative IO counters, sorted by name.
pub fn list_interfaces() -> Result<Vec<Interface>, SnapError> {
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    if unsafe { libc::getifaddrs(&mut ifaddrs) } != 0 {
        return Err(SnapError::Interface(std::io::Error::last_os_error()));
    }

    let mut interfaces = collect_interfaces(ifaddrs);

    unsafe { libc::freeifaddrs(ifaddrs) };

    #[cfg(target_os = "linux")]
    for iface in &mut interfaces {
        fill_from_sysfs(iface);
    }

    #[cfg(target_os = "macos")]
    widen_counters(&mut interfaces);

    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(interfaces)
}

#[allow(non_camel_case_types)]
#[repr(C)]
struct if_nameindex_entry {
    if_index: libc::c_uint,
    if_name: *mut libc::c_char,
}

unsafe extern "C" {
    fn if_nameindex() -> *mut if_nameindex_entry;
    fn if_freenameindex(ptr: *mut if_nameindex_entry);
}

/// Interface index -> name straight from the kernel, used to label routes.
/// Independent of [`list_interfaces`] so one failing does not blank the other.
pub fn index_table() -> Result<HashMap<u32, String>, SnapError> {
    let head = unsafe { if_nameindex() };
    if head.is_null() {
        return Err(SnapError::Interface(std::io::Error::last_os_error()));
    }

    let mut names = HashMap::new();
    let mut current = head;
    loop {
        let entry = unsafe { &*current };
        if entry.if_index == 0 || entry.if_name.is_null() {
            break;
        }
        let name = unsafe { CStr::from_ptr(entry.if_name) }
            .to_string_lossy()
            .into_owned();
        names.insert(entry.if_index, name);
        current = unsafe { current.add(1) };
    }

    unsafe { if_freenameindex(head) };
    Ok(names)
}

fn collect_interfaces(ifaddrs: *mut libc::ifaddrs) -> Vec<Interface> {
    let mut interfaces: HashMap<String, Interface> = HashMap::new();
    let mut current = ifaddrs;

    while !current.is_null() {
        let entry = unsafe { &*current };
        current = entry.ifa_next;

        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let iface = interfaces.entry(name.clone()).or_insert_with(|| Interface {
            index: name_to_index(&name),
            name,
            ..Default::default()
        });
        iface.up = (entry.ifa_flags & libc::IFF_UP as u32) != 0;

        if entry.ifa_addr.is_null() {
            continue;
        }
        let family = unsafe { (*entry.ifa_addr).sa_family } as i32;

        match family {
            libc::AF_INET => {
                let sa = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
                let addr = Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes());
                let prefix = netmask_v4(entry.ifa_netmask).unwrap_or(32);
                iface.addrs.push(cidr(IpAddr::V4(addr), prefix));
            }
            libc::AF_INET6 => {
                let sa = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in6) };
                let addr = Ipv6Addr::from(sa.sin6_addr.s6_addr);
                let prefix = netmask_v6(entry.ifa_netmask).unwrap_or(128);
                iface.addrs.push(cidr(IpAddr::V6(addr), prefix));
            }
            #[cfg(target_os = "macos")]
            libc::AF_LINK => read_link_entry(entry, iface),
            _ => {}
        }
    }

    interfaces.into_values().collect()
}

#[cfg(target_os = "macos")]
fn read_link_entry(entry: &libc::ifaddrs, iface: &mut Interface) {
    if !entry.ifa_data.is_null() {
        let data = unsafe { &*(entry.ifa_data as *const if_data) };
        iface.mtu = data.ifi_mtu;
        iface.bytes_recv = u64::from(data.ifi_ibytes);
        iface.bytes_sent = u64::from(data.ifi_obytes);
        iface.packets_recv = u64::from(data.ifi_ipackets);
        iface.packets_sent = u64::from(data.ifi_opackets);
    }

    let sa_len = unsafe { (*entry.ifa_addr).sa_len } as usize;
    let raw = unsafe { std::slice::from_raw_parts(entry.ifa_addr as *const u8, sa_len) };
    if let Some(mac) = link_layer_addr(raw) {
        iface.hw_addr = mac;
    }
}

/// Replace the wrapping 32-bit counters with the `if_data64` ones. Keeps the
/// 32-bit values if the dump fails.
#[cfg(target_os = "macos")]
fn widen_counters(interfaces: &mut [Interface]) {
    use super::route::{NET_RT_IFLIST2, route_sysctl};

    let buf = match route_sysctl(NET_RT_IFLIST2) {
        Ok(buf) => buf,
        Err(e) => {
            log::debug!("NET_RT_IFLIST2 unavailable, keeping 32-bit counters: {e}");
            return;
        }
    };
    let stats = crate::parse::link_stats::parse_iflist2(&buf);
    for iface in interfaces {
        if let Some(c) = stats.get(&iface.index) {
            iface.bytes_recv = c.bytes_recv;
            iface.bytes_sent = c.bytes_sent;
            iface.packets_recv = c.packets_recv;
            iface.packets_sent = c.packets_sent;
        }
    }
}

/// Hardware address from a raw `sockaddr_dl`: the `alen` bytes after the
/// `nlen`-byte name that starts at offset 8.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn link_layer_addr(sdl: &[u8]) -> Option<String> {
    let nlen = *sdl.get(5)? as usize;
    let alen = *sdl.get(6)? as usize;
    let start = 8 + nlen;
    let bytes = sdl.get(start..start + alen)?;
    if bytes.is_empty() {
        return None;
    }
    Some(format_mac(bytes))
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(target_os = "linux")]
fn fill_from_sysfs(iface: &mut Interface) {
    let base = format!("/sys/class/net/{}", iface.name);
    let read_u64 = |rel: &str| -> u64 {
        std::fs::read_to_string(format!("{base}/{rel}"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    };

    iface.mtu = read_u64("mtu") as u32;
    iface.bytes_recv = read_u64("statistics/rx_bytes");
    iface.bytes_sent = read_u64("statistics/tx_bytes");
    iface.packets_recv = read_u64("statistics/rx_packets");
    iface.packets_sent = read_u64("statistics/tx_packets");
    if let Ok(mac) = std::fs::read_to_string(format!("{base}/address")) {
        let mac = mac.trim();
        if mac != "00:00:00:00:00:00" {
            iface.hw_addr = mac.to_string();
        }
    }
}

fn name_to_index(name: &str) -> u32 {
    CString::new(name)
        .map(|c| unsafe { libc::if_nametoindex(c.as_ptr()) })
        .unwrap_or(0)
}

fn netmask_v4(mask: *const libc::sockaddr) -> Option<u32> {
    if mask.is_null() {
        return None;
    }
    let sa = unsafe { &*(mask as *const libc::sockaddr_in) };
    Some(u32::from_be_bytes(sa.sin_addr.s_addr.to_ne_bytes()).count_ones())
}

fn netmask_v6(mask: *const libc::sockaddr) -> Option<u32> {
    if mask.is_null() {
        return None;
    }
    let sa = unsafe { &*(mask as *const libc::sockaddr_in6) };
    Some(u128::from_be_bytes(sa.sin6_addr.s6_addr).count_ones())
}

fn cidr(addr: IpAddr, prefix: u32) -> String {
    format!("{addr}/{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_dl_mac() {
        // len, family, index(2), type, nlen=3, alen=6, slen, "en0", mac
        let mut sdl = vec![20u8, 18, 4, 0, 6, 3, 6, 0];
        sdl.extend(b"en0");
        sdl.extend([0xa4, 0x83, 0xe7, 0x01, 0x02, 0x0f]);
        assert_eq!(link_layer_addr(&sdl).as_deref(), Some("a4:83:e7:01:02:0f"));
    }

    #[test]
    fn sockaddr_dl_without_address() {
        let mut sdl = vec![16u8, 18, 1, 0, 24, 3, 0, 0];
        sdl.extend(b"lo0");
        assert_eq!(link_layer_addr(&sdl), None);
        assert_eq!(link_layer_addr(&[1, 2, 3]), None);
    }

    #[test]
    fn index_table_round_trips() {
        let names = index_table().unwrap();
        assert!(!names.is_empty());
        for (index, name) in &names {
            assert_eq!(name_to_index(name), *index, "{name}");
        }
    }

    #[test]
    fn cidr_format() {
        assert_eq!(cidr("192.168.1.5".parse().unwrap(), 24), "192.168.1.5/24");
        assert_eq!(cidr("fe80::1".parse().unwrap(), 64), "fe80::1/64");
    }
}
