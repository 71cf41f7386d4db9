//! Local interface enumeration for listen-mode diagnostics.
//!
//! A listening card side prints the addresses a reader could dial, so the
//! operator knows what to type on the other machine.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::debug;

use crate::error::Result;

/// Addresses of all interfaces that are up and not loopback.
pub fn local_addresses() -> Result<Vec<IpAddr>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY: `head` is a valid out-pointer. On success the list is released
    // with `freeifaddrs` below before returning.
    let rc = unsafe { libc::getifaddrs(&mut head) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    let mut out = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        // SAFETY: `cursor` is a non-null node of the list returned by
        // `getifaddrs`, which stays alive until `freeifaddrs`.
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        let flags = entry.ifa_flags as libc::c_int;
        if flags & libc::IFF_UP == 0 || flags & libc::IFF_LOOPBACK != 0 {
            continue;
        }
        if entry.ifa_addr.is_null() {
            continue;
        }

        // SAFETY: `ifa_addr` is non-null and points at a sockaddr whose
        // concrete layout is identified by `sa_family`.
        if let Some(addr) = unsafe { sockaddr_to_ip(entry.ifa_addr) } {
            if !out.contains(&addr) {
                out.push(addr);
            }
        }
    }

    // SAFETY: `head` came from a successful `getifaddrs` call and is freed once.
    unsafe { libc::freeifaddrs(head) };

    debug!(count = out.len(), "enumerated local interface addresses");
    Ok(out)
}

unsafe fn sockaddr_to_ip(sa: *const libc::sockaddr) -> Option<IpAddr> {
    match (*sa).sa_family as libc::c_int {
        libc::AF_INET => {
            let sin = &*(sa as *const libc::sockaddr_in);
            Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(
                sin.sin_addr.s_addr,
            ))))
        }
        libc::AF_INET6 => {
            let sin6 = &*(sa as *const libc::sockaddr_in6);
            Some(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_reports_loopback() {
        let addrs = local_addresses().unwrap();
        assert!(addrs.iter().all(|addr| !addr.is_loopback()));
    }

    #[test]
    fn reports_each_address_once() {
        let addrs = local_addresses().unwrap();
        let mut deduped = addrs.clone();
        deduped.dedup();
        assert_eq!(addrs.len(), deduped.len());
    }
}
