//! `lsof -F pcfn` field output.
//!
//! Each line is one field: a single-letter tag followed by its value. A `p`
//! (pid) field opens a process context that every following `c` (command),
//! `f` (file descriptor) and `n` (name) field belongs to, until the next `p`.

use std::collections::HashMap;

use crate::model::UnixSocket;

/// Process identity gathered from the inet lsof pass.
#[derive(Debug, Default, Clone)]
pub struct LsofIndex {
    /// pid -> command name
    pub pid_process: HashMap<u32, String>,
    /// `local-address:port` (as lsof prints it) -> pid
    pub socket_pids: HashMap<String, u32>,
}

impl LsofIndex {
    pub fn process_name(&self, pid: u32) -> Option<&str> {
        self.pid_process.get(&pid).map(String::as_str)
    }
}

enum Field<'a> {
    Pid(Option<u32>),
    Command(&'a str),
    Fd(&'a str),
    Name(&'a str),
}

fn fields(output: &str) -> impl Iterator<Item = Field<'_>> {
    output.lines().filter_map(|line| {
        let mut chars = line.chars();
        let tag = chars.next()?;
        let value = chars.as_str();
        match tag {
            'p' => Some(Field::Pid(value.parse().ok().filter(|pid| *pid > 0))),
            'c' => Some(Field::Command(value)),
            'f' => Some(Field::Fd(value)),
            'n' => Some(Field::Name(value)),
            _ => None,
        }
    })
}

/// Fill `index` from the output of the inet-scoped invocation.
///
/// For a connected socket the name is `local->remote`; only the local half
/// is kept as the key.
pub fn parse_inet(output: &str, index: &mut LsofIndex) {
    let mut current_pid: Option<u32> = None;

    for field in fields(output) {
        match field {
            Field::Pid(pid) => current_pid = pid,
            Field::Command(cmd) => {
                if let Some(pid) = current_pid {
                    index.pid_process.insert(pid, cmd.to_string());
                }
            }
            Field::Name(name) => {
                let local = name.split_once("->").map_or(name, |(local, _)| local);
                if let Some(pid) = current_pid
                    && local.contains(':')
                {
                    index.socket_pids.insert(local.to_string(), pid);
                }
            }
            Field::Fd(_) => {}
        }
    }
}

/// Unix-domain sockets from the unix-scoped invocation.
///
/// `-F` output does not say whether a socket is stream or datagram, so
/// every record is typed `stream`.
pub fn parse_unix(output: &str) -> Vec<UnixSocket> {
    let mut sockets = Vec::new();
    let mut current_pid: Option<u32> = None;
    let mut current_cmd = "";
    let mut current_fd = "";

    for field in fields(output) {
        match field {
            Field::Pid(pid) => {
                current_pid = pid;
                current_cmd = "";
                current_fd = "";
            }
            Field::Command(cmd) => current_cmd = cmd,
            Field::Fd(fd) => current_fd = fd,
            Field::Name(name) => {
                if let Some(pid) = current_pid {
                    sockets.push(UnixSocket {
                        path: name.to_string(),
                        sock_type: "stream".to_string(),
                        state: String::new(),
                        pid: Some(pid),
                        process: current_cmd.to_string(),
                        fd: current_fd.to_string(),
                    });
                }
            }
        }
    }

    sockets
}
