use sysinfo::{System, Users};

use crate::error::SnapError;
use crate::model::Process;

/// Every visible process with name, command line and owning user, sorted by
/// pid. Socket counts are left at zero for the collector to fill in.
pub fn list_processes() -> Result<Vec<Process>, SnapError> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return Err(SnapError::Unsupported("process enumeration"));
    }

    let mut sys = System::new();
    sys.refresh_processes();
    let users = Users::new_with_refreshed_list();

    let mut processes: Vec<Process> = sys
        .processes()
        .iter()
        .map(|(pid, proc_)| {
            let user = proc_
                .user_id()
                .map(|uid| {
                    users
                        .get_user_by_id(uid)
                        .map(|u| u.name().to_string())
                        .unwrap_or_else(|| (**uid).to_string())
                })
                .unwrap_or_default();

            Process {
                pid: pid.as_u32(),
                name: proc_.name().to_string(),
                command: proc_.cmd().join(" "),
                user,
                num_conns: 0,
                num_unix_socks: 0,
            }
        })
        .collect();

    if processes.is_empty() {
        return Err(SnapError::Libproc("process table is empty".to_string()));
    }

    processes.sort_by_key(|p| p.pid);
    Ok(processes)
}
