use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{CommandConfig, DnsConfig, EngineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "netscope",
    version,
    about = "Poll host network and process state and print each snapshot"
)]
pub struct Cli {
    /// Poll interval in seconds [default: 2.0]
    #[arg(long, default_value_t = 2.0, value_parser = validate_interval)]
    pub interval: f64,

    /// Number of polls before exiting; 0 polls until interrupted
    #[arg(long, default_value_t = 1)]
    pub count: u64,

    /// Output format [default: tsv]
    #[arg(long, default_value = "tsv")]
    pub format: OutputFormat,

    /// Disable reverse DNS of remote addresses
    #[arg(long)]
    pub no_dns: bool,

    /// Per-lookup reverse DNS timeout in milliseconds
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..=10_000))]
    pub dns_timeout_ms: u64,

    /// Maximum concurrent reverse DNS lookups
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=256))]
    pub dns_workers: u64,

    /// Path to lsof
    #[arg(long, default_value = "lsof")]
    pub lsof: String,

    /// Path to arp
    #[arg(long, default_value = "arp")]
    pub arp: String,

    /// Path to pfctl
    #[arg(long, default_value = "pfctl")]
    pub pfctl: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tsv,
    Json,
}

fn validate_interval(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if val < 0.5 {
        Err("interval must be at least 0.5 seconds".to_string())
    } else if val > 60.0 {
        Err("interval must be at most 60.0 seconds".to_string())
    } else {
        Ok(val)
    }
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dns: DnsConfig {
                enabled: !self.no_dns,
                timeout: Duration::from_millis(self.dns_timeout_ms),
                max_in_flight: self.dns_workers as usize,
                ..DnsConfig::default()
            },
            commands: CommandConfig {
                lsof: self.lsof.clone(),
                arp: self.arp.clone(),
                pfctl: self.pfctl.clone(),
            },
        }
    }
}
