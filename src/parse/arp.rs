use std::sync::LazyLock;

use regex::Regex;

use crate::model::ArpEntry;

// ? (192.168.1.1) at 68:d7:9a:6a:20:6 on en0 ifscope [ethernet]
// mdns.mcast.net (224.0.0.251) at (incomplete) on en0 ifscope permanent [ethernet]
static ARP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+\(([^)]+)\)\s+at\s+(\S+)\s+on\s+(\S+)(.*)$").expect("valid regex")
});

const KNOWN_FLAGS: [&str; 2] = ["ifscope", "permanent"];

/// Parse `arp -a` output. Lines that do not look like a neighbor entry are skipped.
pub fn parse_arp(output: &str) -> Vec<ArpEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<ArpEntry> {
    let caps = ARP_LINE.captures(line)?;

    let hostname = match &caps[1] {
        "?" => String::new(),
        name => name.to_string(),
    };

    let mut entry = ArpEntry {
        hostname,
        ip: caps[2].to_string(),
        mac: caps[3].to_string(),
        interface: caps[4].to_string(),
        ..Default::default()
    };

    let rest = caps[5].trim();
    if !rest.is_empty() {
        entry.flags = KNOWN_FLAGS
            .iter()
            .filter(|flag| rest.contains(*flag))
            .map(|flag| flag.to_string())
            .collect();
        entry.link_type = bracketed(rest).unwrap_or_default().to_string();
    }

    Some(entry)
}

/// Contents of the first `[...]` group.
fn bracketed(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let len = s[start..].find(']')?;
    Some(&s[start + 1..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_host_with_link_type() {
        let entries = parse_arp("? (192.168.1.1) at 68:d7:9a:6a:20:6 on en0 ifscope [ethernet]\n");
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.hostname, "");
        assert_eq!(e.ip, "192.168.1.1");
        assert_eq!(e.mac, "68:d7:9a:6a:20:6");
        assert_eq!(e.interface, "en0");
        assert!(e.flags.iter().any(|f| f == "ifscope"));
        assert_eq!(e.link_type, "ethernet");
    }

    #[test]
    fn named_host_incomplete_permanent() {
        let entries = parse_arp(
            "mdns.mcast.net (224.0.0.251) at (incomplete) on en0 ifscope permanent [ethernet]",
        );
        let e = &entries[0];
        assert_eq!(e.hostname, "mdns.mcast.net");
        assert_eq!(e.mac, "(incomplete)");
        assert_eq!(e.flags, vec!["ifscope".to_string(), "permanent".to_string()]);
    }

    #[test]
    fn no_trailing_tokens() {
        let entries = parse_arp("router (10.0.0.1) at aa:bb:cc:dd:ee:ff on en1");
        let e = &entries[0];
        assert!(e.flags.is_empty());
        assert_eq!(e.link_type, "");
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let output = "\
arp: bogus output
? (192.168.1.1) at 68:d7:9a:6a:20:6 on en0 ifscope [ethernet]

not an entry at all
? (192.168.1.20) at 0:11:22:33:44:55 on en0 ifscope [ethernet]
";
        let entries = parse_arp(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].ip, "192.168.1.20");
    }

    #[test]
    fn empty_input() {
        assert!(parse_arp("").is_empty());
    }
}
