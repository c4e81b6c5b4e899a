//! Cross-core RPMSG stream socket
//!
//! The peer core reaches the service through an RPMSG socket with the
//! same stream semantics as the local Unix domain socket; only the
//! address family and peer namespace differ. The constants below mirror
//! the platform's `netpacket/rpmsg.h`.

use std::io;
use std::mem;
use std::os::unix::io::FromRawFd;
use std::os::unix::net::UnixListener as StdUnixListener;

use tokio::net::UnixListener;

/// RPMSG socket address family.
pub const AF_RPMSG: libc::c_int = 44;

const RPMSG_CPU_SIZE: usize = 16;
const RPMSG_NAME_SIZE: usize = 64;

#[repr(C)]
struct SockaddrRpmsg {
    family: libc::sa_family_t,
    /// Peer CPU name; empty means "any".
    cpu: [u8; RPMSG_CPU_SIZE],
    /// Endpoint name announced to the peer.
    name: [u8; RPMSG_NAME_SIZE],
}

/// Bind a listening RPMSG socket under `name` and adopt it as a
/// nonblocking Unix listener so the accept loop can treat both
/// transports uniformly.
pub fn bind(name: &str, backlog: u32) -> io::Result<UnixListener> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= RPMSG_NAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "rpmsg endpoint name must be 1..=63 bytes",
        ));
    }

    let fd = unsafe {
        libc::socket(
            AF_RPMSG,
            libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut addr = SockaddrRpmsg {
        family: AF_RPMSG as libc::sa_family_t,
        cpu: [0; RPMSG_CPU_SIZE],
        name: [0; RPMSG_NAME_SIZE],
    };
    addr.name[..bytes.len()].copy_from_slice(bytes);

    let rc = unsafe {
        libc::bind(
            fd,
            (&addr as *const SockaddrRpmsg).cast::<libc::sockaddr>(),
            mem::size_of::<SockaddrRpmsg>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let rc = unsafe { libc::listen(fd, backlog as libc::c_int) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let std_listener = unsafe { StdUnixListener::from_raw_fd(fd) };
    UnixListener::from_std(std_listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_oversized_name() {
        let name = "x".repeat(RPMSG_NAME_SIZE);
        let err = bind(&name, 16).expect_err("must be rejected");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(bind("", 16).is_err());
    }
}
