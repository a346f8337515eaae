// cansocket/src/transport.rs
//
// The kernel transport: the system calls the sockets are built on.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The kernel transport.
//!
//! Every system call the sockets make goes through the [`Transport`] trait:
//! creating and closing the descriptor, interface lookups, socket options,
//! binding, reads and writes, and readiness polling. The real
//! implementation, [`SysTransport`], talks to the Linux kernel. The
//! [`mock::MockTransport`] plays back scripted results so that the sockets
//! can be exercised without a CAN interface.
//!
//! Failures are reported as `std::io::Error` values carrying the OS error
//! code; the socket classifies them into its own error kinds.

use crate::{
    addr::CanAddr, constants::CAN_ISOTP, socket::SocketType, IoError, IoErrorKind, IoResult,
};
use libc::{socklen_t, AF_CAN, CAN_RAW, EINPROGRESS};
use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
};
use std::{
    io::{Read, Write},
    mem,
    os::{
        raw::c_int,
        unix::io::{AsFd, AsRawFd, RawFd},
    },
    ptr, slice,
    time::Duration,
};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Check an error return value for a non-blocking call that would block.
///
/// A non-blocking socket with nothing to read, or no room to write, reports
/// it as an error. This trait adds a `should_retry` method to `Error` and
/// `Result` to check for this condition.
pub trait ShouldRetry {
    /// Check for a "would block" condition
    ///
    /// If `true`, the call should be retried when the socket is ready.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for IoError {
    fn should_retry(&self) -> bool {
        match self.kind() {
            // EAGAIN, EINPROGRESS and EWOULDBLOCK are the three possible codes
            // returned when a call would block. the stdlib already maps EAGAIN
            // and EWOULDBLOCK os WouldBlock
            IoErrorKind::WouldBlock => true,
            // however, EINPROGRESS is also valid
            _ => matches!(self.raw_os_error(), Some(errno) if errno == EINPROGRESS),
        }
    }
}

impl<E: std::fmt::Debug> ShouldRetry for IoResult<E> {
    fn should_retry(&self) -> bool {
        match *self {
            Err(ref e) => e.should_retry(),
            _ => false,
        }
    }
}

/// The readiness of a descriptor after a poll.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// A read won't block (data, or an error to pick up)
    pub readable: bool,
    /// A write won't block
    pub writable: bool,
}

// ===== Transport trait =====

/// The system calls a socket needs from the kernel.
///
/// A transport owns at most one descriptor at a time.
pub trait Transport {
    /// Creates the socket descriptor for the socket type.
    fn open(&mut self, socket_type: SocketType) -> IoResult<()>;

    /// Closes the descriptor, if open.
    fn close(&mut self) -> IoResult<()>;

    /// Whether a descriptor is open
    fn is_open(&self) -> bool;

    /// The OS descriptor, if open
    fn raw_fd(&self) -> Option<RawFd>;

    /// Puts the descriptor in, or out of, non-blocking mode.
    fn set_nonblocking(&mut self, nonblocking: bool) -> IoResult<()>;

    /// Looks up the index of a network interface by name.
    fn interface_index(&self, ifname: &str) -> IoResult<u32>;

    /// Looks up the MTU of a network interface by name.
    fn interface_mtu(&self, ifname: &str) -> IoResult<usize>;

    /// Sets a socket option from its raw bytes.
    fn set_option(&mut self, level: c_int, name: c_int, value: &[u8]) -> IoResult<()>;

    /// Binds the descriptor to an address.
    fn bind(&mut self, addr: &CanAddr) -> IoResult<()>;

    /// Reads once from the descriptor.
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize>;

    /// Writes once to the descriptor.
    fn write(&mut self, buf: &[u8]) -> IoResult<usize>;

    /// Waits for the descriptor to become readable and/or writable.
    ///
    /// A timeout of `None` waits forever. Returns `None` if the time ran out
    /// with nothing ready.
    fn poll(
        &mut self,
        read: bool,
        write: bool,
        timeout: Option<Duration>,
    ) -> IoResult<Option<Readiness>>;
}

impl<'a> dyn Transport + 'a {
    /// Sets a socket option from a value.
    ///
    /// Note that the `val` parameter must be specified correctly; if an option
    /// expects an integer, it is advisable to pass in a `c_int`, not the default
    /// of `i32`.
    pub fn set_socket_option<T>(&mut self, level: c_int, name: c_int, val: &T) -> IoResult<()> {
        self.set_option(level, name, crate::as_bytes(val))
    }

    /// Sets a collection of multiple socket options with one call.
    pub fn set_socket_option_mult<T>(
        &mut self,
        level: c_int,
        name: c_int,
        values: &[T],
    ) -> IoResult<()> {
        let bytes = unsafe {
            slice::from_raw_parts(values.as_ptr().cast::<u8>(), mem::size_of_val(values))
        };
        self.set_option(level, name, bytes)
    }
}

// ===== SysTransport =====

/// The transport to the Linux kernel.
#[derive(Debug, Default)]
pub struct SysTransport(Option<socket2::Socket>);

impl SysTransport {
    /// Creates a transport with no descriptor open.
    pub fn new() -> Self {
        Self(None)
    }

    fn socket(&self) -> IoResult<&socket2::Socket> {
        self.0
            .as_ref()
            .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))
    }

    fn socket_mut(&mut self) -> IoResult<&mut socket2::Socket> {
        self.0
            .as_mut()
            .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))
    }
}

impl Transport for SysTransport {
    fn open(&mut self, socket_type: SocketType) -> IoResult<()> {
        let (ty, proto) = match socket_type {
            SocketType::Raw => (socket2::Type::RAW, CAN_RAW),
            SocketType::IsoTp => (socket2::Type::DGRAM, CAN_ISOTP),
            _ => return Err(IoError::from_raw_os_error(libc::EPROTONOSUPPORT)),
        };
        let af_can = socket2::Domain::from(AF_CAN);
        let sock = socket2::Socket::new_raw(af_can, ty, Some(socket2::Protocol::from(proto)))?;
        self.0 = Some(sock);
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        if let Some(sock) = self.0.take() {
            let fd = sock.as_raw_fd();
            // take the descriptor back so a failing close can be reported
            mem::forget(sock);
            if unsafe { libc::close(fd) } < 0 {
                return Err(IoError::last_os_error());
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.0.is_some()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.0.as_ref().map(|sock| sock.as_raw_fd())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> IoResult<()> {
        self.socket()?.set_nonblocking(nonblocking)
    }

    fn interface_index(&self, ifname: &str) -> IoResult<u32> {
        Ok(nix::net::if_::if_nametoindex(ifname)?)
    }

    fn interface_mtu(&self, ifname: &str) -> IoResult<usize> {
        let fd = self.socket()?.as_raw_fd();

        let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
        if ifname.len() >= ifr.ifr_name.len() {
            return Err(IoError::from_raw_os_error(libc::ENODEV));
        }
        for (dst, src) in ifr.ifr_name.iter_mut().zip(ifname.bytes()) {
            *dst = src as libc::c_char;
        }

        let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFMTU as _, &mut ifr as *mut libc::ifreq) };
        if ret < 0 {
            return Err(IoError::last_os_error());
        }
        Ok(unsafe { ifr.ifr_ifru.ifru_mtu } as usize)
    }

    fn set_option(&mut self, level: c_int, name: c_int, value: &[u8]) -> IoResult<()> {
        let fd = self.socket()?.as_raw_fd();

        let ret = if value.is_empty() {
            // can't pass in a ptr to a 0-len slice, pass a null ptr instead
            unsafe { libc::setsockopt(fd, level, name, ptr::null(), 0) }
        } else {
            unsafe {
                libc::setsockopt(
                    fd,
                    level,
                    name,
                    value.as_ptr().cast(),
                    value.len() as socklen_t,
                )
            }
        };

        match ret {
            0 => Ok(()),
            _ => Err(IoError::last_os_error()),
        }
    }

    fn bind(&mut self, addr: &CanAddr) -> IoResult<()> {
        self.socket()?.bind(&addr.into_sock_addr())
    }

    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.socket_mut()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.socket_mut()?.write(buf)
    }

    fn poll(
        &mut self,
        read: bool,
        write: bool,
        timeout: Option<Duration>,
    ) -> IoResult<Option<Readiness>> {
        let sock = self.socket()?;

        let mut events = PollFlags::empty();
        events.set(PollFlags::POLLIN, read);
        events.set(PollFlags::POLLOUT, write);

        let timeout = match timeout {
            None => PollTimeout::NONE,
            Some(t) => {
                let ms = i32::try_from(t.as_millis()).unwrap_or(i32::MAX);
                PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)
            }
        };

        let mut fds = [PollFd::new(sock.as_fd(), events)];
        let n = loop {
            match poll(&mut fds, timeout) {
                Err(Errno::EINTR) => continue,
                res => break res?,
            }
        };

        if n == 0 {
            return Ok(None);
        }

        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        Ok(Some(Readiness {
            readable: revents
                .intersects(PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP),
            writable: revents.contains(PollFlags::POLLOUT),
        }))
    }
}

/////////////////////////////////////////////////////////////////////////////
