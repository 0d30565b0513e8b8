use std::time::Duration;

/// Reverse-lookup cache settings.
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// When false, lookups never schedule a resolution and always return the
    /// raw address.
    pub enabled: bool,
    pub ttl: Duration,
    /// Per-attempt resolver timeout.
    pub timeout: Duration,
    /// Admission limit on concurrent resolutions; also the worker count.
    pub max_in_flight: usize,
    /// Addresses waiting for a worker. Beyond this, scheduling is dropped
    /// and retried on a later poll.
    pub queue_depth: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(5 * 60),
            timeout: Duration::from_millis(500),
            max_in_flight: 10,
            queue_depth: 256,
        }
    }
}

/// External programs the collector shells out to.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub lsof: String,
    pub arp: String,
    pub pfctl: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            lsof: "lsof".to_string(),
            arp: "arp".to_string(),
            pfctl: "pfctl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub dns: DnsConfig,
    pub commands: CommandConfig,
}
