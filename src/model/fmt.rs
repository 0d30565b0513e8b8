//! Display helpers shared by every consumer of a snapshot.

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;

/// Human-readable byte count, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= TB {
        format!("{:.1} TB", b / TB)
    } else if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Human-readable throughput, e.g. `12.0 KB/s`. Negative input renders as zero.
pub fn format_rate(bytes_per_sec: f64) -> String {
    let r = bytes_per_sec.max(0.0);
    if r >= GB {
        format!("{:.1} GB/s", r / GB)
    } else if r >= MB {
        format!("{:.1} MB/s", r / MB)
    } else if r >= KB {
        format!("{:.1} KB/s", r / KB)
    } else {
        format!("{r:.0} B/s")
    }
}

/// `*` for wildcard/unspecified addresses.
pub fn format_addr(addr: &str) -> &str {
    match addr {
        "" | "0.0.0.0" | "::" => "*",
        other => other,
    }
}

pub fn format_port(port: u32) -> String {
    if port == 0 {
        "*".to_string()
    } else {
        port.to_string()
    }
}

pub fn format_addr_port(addr: &str, port: u32) -> String {
    format!("{}:{}", format_addr(addr), format_port(port))
}

/// `--` for an unassociated socket.
pub fn format_pid(pid: Option<u32>) -> String {
    match pid {
        Some(p) if p > 0 => p.to_string(),
        _ => "--".to_string(),
    }
}

pub fn format_process(name: &str) -> &str {
    if name.is_empty() { "--" } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn rate_never_negative() {
        assert_eq!(format_rate(-10.0), "0 B/s");
        assert_eq!(format_rate(2048.0), "2.0 KB/s");
    }

    #[test]
    fn wildcard_addresses() {
        assert_eq!(format_addr_port("0.0.0.0", 80), "*:80");
        assert_eq!(format_addr_port("", 0), "*:*");
        assert_eq!(format_addr_port("10.0.0.1", 443), "10.0.0.1:443");
    }

    #[test]
    fn unassociated_pid() {
        assert_eq!(format_pid(None), "--");
        assert_eq!(format_pid(Some(0)), "--");
        assert_eq!(format_pid(Some(42)), "42");
        assert_eq!(format_process(""), "--");
    }
}
