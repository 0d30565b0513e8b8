//! Parsers for the raw output of each system data source.
//!
//! Every parser here is a pure function from raw text or bytes to records.
//! The formats are undocumented and drift between OS releases, so the
//! policy is: return only the records that parse, drop everything else
//! without reporting it. A line or message that does not match is never an
//! error. Tests assert on this skip behavior directly.
//!
//! The one exception is the routing-socket decoder, which reports a
//! structurally broken buffer (a message length that runs past the end) as
//! [`SnapError::RouteDecode`](crate::error::SnapError::RouteDecode); records
//! it merely does not understand are still skipped.

pub mod arp;
pub mod firewall;
pub mod link_stats;
pub mod lsof;
pub mod route;
