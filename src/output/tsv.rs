use std::io::Write;

use crate::error::SnapError;
use crate::model::fmt::{format_addr_port, format_pid, format_process, format_rate};
use crate::state::Snapshot;

/// Write the snapshot as TSV, one `# <name>` section per collection, each
/// with its own header row.
pub fn write_tsv(
    snap: &Snapshot,
    host_name: &dyn Fn(&str) -> String,
    writer: &mut impl Write,
) -> Result<(), SnapError> {
    let mut out = Sections { writer };

    out.section(
        "interfaces",
        "name\tindex\tup\tmtu\thw_addr\taddrs\tbytes_sent\tbytes_recv\ttx_rate\trx_rate",
    )?;
    for i in &snap.interfaces {
        out.row(&[
            &i.name,
            &i.index.to_string(),
            &i.up.to_string(),
            &i.mtu.to_string(),
            &i.hw_addr,
            &i.addrs.join(","),
            &i.bytes_sent.to_string(),
            &i.bytes_recv.to_string(),
            &format_rate(i.tx_rate),
            &format_rate(i.rx_rate),
        ])?;
    }

    out.section("routes", "destination\tgateway\tnetmask\tinterface\tflags")?;
    for r in &snap.routes {
        out.row(&[&r.destination, &r.gateway, &r.netmask, &r.interface, &r.flags])?;
    }

    out.section("sockets", "proto\tlocal\tremote\tremote_host\tstate\tpid\tprocess")?;
    for s in &snap.sockets {
        let remote_host = if s.remote_port == 0 {
            String::new()
        } else {
            host_name(&s.remote_addr)
        };
        out.row(&[
            &s.proto.to_string(),
            &format_addr_port(&s.local_addr, s.local_port),
            &format_addr_port(&s.remote_addr, s.remote_port),
            &remote_host,
            &s.state.to_string(),
            &format_pid(s.pid),
            format_process(&s.process),
        ])?;
    }

    out.section("unix_sockets", "path\ttype\tpid\tprocess\tfd")?;
    for u in &snap.unix_sockets {
        out.row(&[
            &u.path,
            &u.sock_type,
            &format_pid(u.pid),
            format_process(&u.process),
            &u.fd,
        ])?;
    }

    out.section("processes", "pid\tname\tuser\tconns\tunix_socks\tcommand")?;
    for p in &snap.processes {
        out.row(&[
            &p.pid.to_string(),
            &p.name,
            &p.user,
            &p.num_conns.to_string(),
            &p.num_unix_socks.to_string(),
            &p.command,
        ])?;
    }

    out.section("firewall", "rule\taction\tdirection\tproto\tsrc\tdst\tpackets\tbytes")?;
    for f in &snap.firewall {
        out.row(&[
            &f.rule_num.to_string(),
            &f.action,
            &f.direction,
            &f.proto,
            &f.src,
            &f.dst,
            &f.packets.to_string(),
            &f.bytes.to_string(),
        ])?;
    }

    out.section("arp", "ip\tmac\tinterface\thostname\tflags\ttype")?;
    for a in &snap.arp {
        out.row(&[
            &a.ip,
            &a.mac,
            &a.interface,
            &a.hostname,
            &a.flags.join(","),
            &a.link_type,
        ])?;
    }

    out.section("errors", "source\tmessage")?;
    for e in &snap.errors {
        out.row(&[e.source.as_str(), &e.message])?;
    }

    Ok(())
}

struct Sections<'a, W: Write> {
    writer: &'a mut W,
}

impl<W: Write> Sections<'_, W> {
    fn section(&mut self, name: &str, header: &str) -> Result<(), SnapError> {
        writeln!(self.writer, "# {name}\n{header}").map_err(SnapError::Serialization)
    }

    fn row(&mut self, fields: &[&str]) -> Result<(), SnapError> {
        let line: Vec<String> = fields.iter().map(|f| escape_tsv(f)).collect();
        writeln!(self.writer, "{}", line.join("\t")).map_err(SnapError::Serialization)
    }
}

/// Escape tabs and newlines in a string for TSV output.
fn escape_tsv(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}
