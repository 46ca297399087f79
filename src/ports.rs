//! Port allocation.
//!
//! Allocation is a pure function of the base port and the user index, so
//! two runs with the same base reuse the same ports. [`is_port_free`] lets
//! the launcher notice a port still held by a previous fleet.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use crate::{AppError, Result};

/// Port of the session at `index`: `base_port + index`.
///
/// # Errors
///
/// Returns `AppError::Config` if the result does not fit in a `u16`.
pub fn allocate(base_port: u16, index: usize) -> Result<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
        .ok_or_else(|| {
            AppError::Config(format!(
                "port for index {index} overflows from base {base_port}"
            ))
        })
}

/// Whether `port` can currently be bound on every address `host` resolves to.
///
/// A name such as `localhost` may resolve to both `127.0.0.1` and `::1`; a
/// port held on either counts as occupied. Unresolvable hosts are reported
/// as not free. Listeners are dropped immediately, so a `true` result is
/// only a snapshot.
#[must_use]
pub fn is_port_free(host: &str, port: u16) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    let addrs: Vec<SocketAddr> = addrs.collect();
    !addrs.is_empty() && addrs.iter().all(|addr| TcpListener::bind(addr).is_ok())
}
