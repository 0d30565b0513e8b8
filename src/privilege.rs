/// Whether this process runs with an effective uid of root. Reading firewall
/// rules needs it.
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}
