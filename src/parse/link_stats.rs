//! 64-bit interface counters from a routing-socket `NET_RT_IFLIST2` dump.
//!
//! The `if_data` that `getifaddrs` hands back on Darwin carries 32-bit byte
//! counters, which wrap after 4 GiB. `RTM_IFINFO2` messages carry an
//! `if_msghdr2` whose `if_data64` has the same counters at full width.

use std::collections::HashMap;

// if_msghdr2: msglen u16, version u8, type u8, addrs i32, flags i32,
// index u16 @12, then send-queue fields, then if_data64 @32.
const RTM_VERSION: u8 = 5;
const RTM_IFINFO2: u8 = 0x12;
const OFF_INDEX: usize = 12;
const OFF_DATA: usize = 32;

// Offsets inside if_data64.
const OFF_IPACKETS: usize = OFF_DATA + 24;
const OFF_OPACKETS: usize = OFF_DATA + 40;
const OFF_IBYTES: usize = OFF_DATA + 64;
const OFF_OBYTES: usize = OFF_DATA + 72;
const IFM2_MIN_LEN: usize = OFF_OBYTES + 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub bytes_recv: u64,
    pub bytes_sent: u64,
    pub packets_recv: u64,
    pub packets_sent: u64,
}

/// Counters keyed by interface index.
///
/// Other message types are skipped. A message length that cannot be framed
/// ends the walk; whatever was decoded before it is returned.
pub fn parse_iflist2(buf: &[u8]) -> HashMap<u32, LinkCounters> {
    let mut out = HashMap::new();
    let mut offset = 0;

    while buf.len() - offset >= 4 {
        let msglen = u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize;
        if msglen < 4 || offset + msglen > buf.len() {
            log::debug!("iflist2: unframeable message at offset {offset}");
            break;
        }
        let msg = &buf[offset..offset + msglen];
        offset += msglen;

        if msg[2] != RTM_VERSION || msg[3] != RTM_IFINFO2 || msg.len() < IFM2_MIN_LEN {
            continue;
        }
        let index = u16::from_ne_bytes([msg[OFF_INDEX], msg[OFF_INDEX + 1]]);
        out.insert(
            u32::from(index),
            LinkCounters {
                bytes_recv: read_u64(msg, OFF_IBYTES),
                bytes_sent: read_u64(msg, OFF_OBYTES),
                packets_recv: read_u64(msg, OFF_IPACKETS),
                packets_sent: read_u64(msg, OFF_OPACKETS),
            },
        );
    }

    out
}

fn read_u64(msg: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&msg[at..at + 8]);
    u64::from_ne_bytes(bytes)
}
