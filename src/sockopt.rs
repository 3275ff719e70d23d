//! `SO_SNDBUF`/`SO_RCVBUF` sizing and `SO_KEEPALIVE` disabling for session
//! sockets, set on every connect/accept. `TCP_NODELAY` is set directly on the
//! `mio`/`std` stream via its own setter at each call site; these two need a
//! raw `setsockopt`, following `flux-network`'s `tcp::stream::
//! set_socket_buf_size` (`examples/gattaca-com-flux/crates/flux-network/src/
//! tcp/stream.rs`).

use std::os::fd::AsRawFd;

pub(crate) fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Disables the OS's own idle-connection probing. Liveness is the embedding
/// application's job (e.g. an application-level heartbeat), not the kernel's.
pub(crate) fn set_keepalive(stream: &mio::net::TcpStream, enabled: bool) {
    let fd = stream.as_raw_fd();
    let value: libc::c_int = if enabled { 1 } else { 0 };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &value as *const _ as *const libc::c_void,
            core::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}
