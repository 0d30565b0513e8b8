use crate::error::SnapError;
use crate::model::Route;

/// Kernel IPv4/IPv6 routes, labelled with interface names from a fresh
/// index table.
#[cfg(target_os = "macos")]
pub fn list_routes() -> Result<Vec<Route>, SnapError> {
    let iface_names = super::interface::index_table()?;
    let buf = route_sysctl(NET_RT_DUMP)?;
    crate::parse::route::parse_rib(&buf, &iface_names)
}

#[cfg(target_os = "linux")]
pub fn list_routes() -> Result<Vec<Route>, SnapError> {
    let path = "/proc/net/route";
    let content = std::fs::read_to_string(path).map_err(|source| SnapError::Procfs {
        path: path.to_string(),
        source,
    })?;
    Ok(crate::parse::route::parse_proc_net_route(&content))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn list_routes() -> Result<Vec<Route>, SnapError> {
    Err(SnapError::Unsupported("route enumeration"))
}

#[cfg(target_os = "macos")]
const NET_RT_DUMP: libc::c_int = 1;
#[cfg(target_os = "macos")]
pub(crate) const NET_RT_IFLIST2: libc::c_int = 6;

/// `sysctl {CTL_NET, PF_ROUTE, 0, 0, op, 0}`: the raw routing-socket
/// message stream for `op`.
#[cfg(target_os = "macos")]
pub(crate) fn route_sysctl(op: libc::c_int) -> Result<Vec<u8>, SnapError> {
    use std::ptr;

    const CTL_NET: libc::c_int = 4;
    const PF_ROUTE: libc::c_int = 17;

    let mut mib = [CTL_NET, PF_ROUTE, 0, 0, op, 0];
    let mut size: libc::size_t = 0;

    let ret = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            ptr::null_mut(),
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if ret != 0 {
        return Err(SnapError::Sysctl(std::io::Error::last_os_error()));
    }

    // The table can grow between the two calls.
    size = size * 3 / 2;
    let mut buf = vec![0u8; size];

    let ret = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as libc::c_uint,
            buf.as_mut_ptr() as *mut libc::c_void,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if ret != 0 {
        return Err(SnapError::Sysctl(std::io::Error::last_os_error()));
    }

    buf.truncate(size);
    Ok(buf)
}
