pub mod command;
pub mod connection;
pub mod interface;
pub mod process;
pub mod route;

use crate::config::CommandConfig;
use crate::error::SnapError;
use crate::model::{Interface, Process, Route};

use self::connection::RawConnection;

/// The OS facilities and external tools a poll reads from.
///
/// Text-producing sources return the tool's raw output; parsing stays in the
/// collector so it can be exercised with fixture text.
pub trait SystemSource: Send {
    fn interfaces(&self) -> Result<Vec<Interface>, SnapError>;
    /// Routes carry interface names resolved by the source itself.
    fn routes(&self) -> Result<Vec<Route>, SnapError>;
    fn connections(&self) -> Result<Vec<RawConnection>, SnapError>;
    fn processes(&self) -> Result<Vec<Process>, SnapError>;
    /// `lsof -i -P -n -F pcfn`
    fn lsof_inet(&self) -> Result<String, SnapError>;
    /// `lsof -U -F pcfn`
    fn lsof_unix(&self) -> Result<String, SnapError>;
    /// `pfctl -vsr`
    fn firewall_rules(&self) -> Result<String, SnapError>;
    /// `arp -a`
    fn arp_table(&self) -> Result<String, SnapError>;
    fn is_elevated(&self) -> bool;
}

/// The running host.
#[derive(Debug, Clone, Default)]
pub struct HostSource {
    commands: CommandConfig,
}

impl HostSource {
    pub fn new(commands: CommandConfig) -> Self {
        Self { commands }
    }
}

impl SystemSource for HostSource {
    fn interfaces(&self) -> Result<Vec<Interface>, SnapError> {
        interface::list_interfaces()
    }

    fn routes(&self) -> Result<Vec<Route>, SnapError> {
        route::list_routes()
    }

    fn connections(&self) -> Result<Vec<RawConnection>, SnapError> {
        connection::list_connections()
    }

    fn processes(&self) -> Result<Vec<Process>, SnapError> {
        process::list_processes()
    }

    fn lsof_inet(&self) -> Result<String, SnapError> {
        command::run(&self.commands.lsof, &["-i", "-P", "-n", "-F", "pcfn"])
    }

    fn lsof_unix(&self) -> Result<String, SnapError> {
        command::run(&self.commands.lsof, &["-U", "-F", "pcfn"])
    }

    fn firewall_rules(&self) -> Result<String, SnapError> {
        command::run(&self.commands.pfctl, &["-vsr"])
    }

    fn arp_table(&self) -> Result<String, SnapError> {
        command::run(&self.commands.arp, &["-a"])
    }

    fn is_elevated(&self) -> bool {
        crate::privilege::is_elevated()
    }
}
