// cansocket/src/transport/mock.rs
//
// A scripted transport for exercising sockets without a CAN interface.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! A scripted transport for tests, built with the `mock` feature.
//!
//! The [`MockTransport`] plays back queued read results, records whatever
//! is written and every option that is set, and fails on demand with OS
//! error codes. Clones share their state, so a test can keep one handle to
//! script and inspect the transport while the socket owns the other.
//!
//! ```
//! use cansocket::{transport::mock::MockTransport, CanRawSocket, OpenMode};
//!
//! let mock = MockTransport::new();
//! mock.add_interface("vcan0", 3, 16);
//!
//! let mut sock = CanRawSocket::with_transport(Box::new(mock.clone()));
//! assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
//! assert_eq!(Some(3), mock.bound().map(|addr| addr.ifindex()));
//! ```

use crate::{
    addr::CanAddr,
    socket::SocketType,
    transport::{Readiness, Transport},
    IoError, IoResult,
};
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    os::{raw::c_int, unix::io::RawFd},
    rc::Rc,
    time::Duration,
};

/// The descriptor the mock reports while open.
pub const MOCK_FD: RawFd = 42;

/// One scripted result for a read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// The bytes the kernel hands back
    Data(Vec<u8>),
    /// The call fails with the OS error code
    Error(i32),
}

#[derive(Debug)]
struct MockState {
    interfaces: HashMap<String, (u32, usize)>,
    open: Option<SocketType>,
    nonblocking: bool,
    bound: Option<CanAddr>,
    options: Vec<(c_int, c_int, Vec<u8>)>,
    reads: VecDeque<MockRead>,
    written: Vec<Vec<u8>>,
    write_errors: VecDeque<i32>,
    write_limit: Option<usize>,
    writable: bool,
    open_error: Option<i32>,
    bind_error: Option<i32>,
    close_error: Option<i32>,
    option_errors: HashMap<(c_int, c_int), i32>,
    polls: usize,
    closes: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            interfaces: HashMap::new(),
            open: None,
            nonblocking: false,
            bound: None,
            options: Vec::new(),
            reads: VecDeque::new(),
            written: Vec::new(),
            write_errors: VecDeque::new(),
            write_limit: None,
            writable: true,
            open_error: None,
            bind_error: None,
            close_error: None,
            option_errors: HashMap::new(),
            polls: 0,
            closes: 0,
        }
    }
}

/// A transport that plays back scripted results.
#[derive(Debug, Clone, Default)]
pub struct MockTransport(Rc<RefCell<MockState>>);

impl MockTransport {
    /// Creates a mock with no interfaces and nothing to read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes an interface known to the lookups.
    pub fn add_interface(&self, ifname: &str, ifindex: u32, mtu: usize) {
        self.0
            .borrow_mut()
            .interfaces
            .insert(ifname.to_string(), (ifindex, mtu));
    }

    /// Queues bytes for a future read.
    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        self.0.borrow_mut().reads.push_back(MockRead::Data(data.into()));
    }

    /// Queues a failing read.
    pub fn push_read_error(&self, errno: i32) {
        self.0.borrow_mut().reads.push_back(MockRead::Error(errno));
    }

    /// The number of scripted reads not yet consumed
    pub fn pending_reads(&self) -> usize {
        self.0.borrow().reads.len()
    }

    /// Queues a failing write.
    pub fn push_write_error(&self, errno: i32) {
        self.0.borrow_mut().write_errors.push_back(errno);
    }

    /// Limits how many bytes a single write accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.0.borrow_mut().write_limit = limit;
    }

    /// Sets whether writes go through. When not, they would block.
    pub fn set_writable(&self, writable: bool) {
        self.0.borrow_mut().writable = writable;
    }

    /// Makes the next open fail.
    pub fn fail_open(&self, errno: i32) {
        self.0.borrow_mut().open_error = Some(errno);
    }

    /// Makes the next bind fail.
    pub fn fail_bind(&self, errno: i32) {
        self.0.borrow_mut().bind_error = Some(errno);
    }

    /// Makes the next close fail.
    pub fn fail_close(&self, errno: i32) {
        self.0.borrow_mut().close_error = Some(errno);
    }

    /// Makes every attempt to set the option fail.
    pub fn fail_option(&self, level: c_int, name: c_int, errno: i32) {
        self.0
            .borrow_mut()
            .option_errors
            .insert((level, name), errno);
    }

    /// Everything written so far, one entry per write call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.0.borrow().written.clone()
    }

    /// Takes the record of what was written.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.0.borrow_mut().written)
    }

    /// Every option that was set, in order, as (level, name, bytes).
    pub fn options(&self) -> Vec<(c_int, c_int, Vec<u8>)> {
        self.0.borrow().options.clone()
    }

    /// The bytes of the last successful set of an option.
    pub fn option(&self, level: c_int, name: c_int) -> Option<Vec<u8>> {
        self.0
            .borrow()
            .options
            .iter()
            .rev()
            .find(|(lvl, nm, _)| *lvl == level && *nm == name)
            .map(|(_, _, val)| val.clone())
    }

    /// The number of times the option was set
    pub fn option_count(&self, level: c_int, name: c_int) -> usize {
        self.0
            .borrow()
            .options
            .iter()
            .filter(|(lvl, nm, _)| *lvl == level && *nm == name)
            .count()
    }

    /// The socket type that is open, if any
    pub fn open_type(&self) -> Option<SocketType> {
        self.0.borrow().open
    }

    /// Whether the descriptor was put in non-blocking mode
    pub fn is_nonblocking(&self) -> bool {
        self.0.borrow().nonblocking
    }

    /// The address the socket is bound to
    pub fn bound(&self) -> Option<CanAddr> {
        self.0.borrow().bound
    }

    /// The number of polls made
    pub fn poll_count(&self) -> usize {
        self.0.borrow().polls
    }

    /// The number of descriptors closed
    pub fn close_count(&self) -> usize {
        self.0.borrow().closes
    }
}

fn os_err(errno: i32) -> IoError {
    IoError::from_raw_os_error(errno)
}

impl Transport for MockTransport {
    fn open(&mut self, socket_type: SocketType) -> IoResult<()> {
        let mut st = self.0.borrow_mut();
        if let Some(errno) = st.open_error.take() {
            return Err(os_err(errno));
        }
        st.open = Some(socket_type);
        st.nonblocking = false;
        st.bound = None;
        Ok(())
    }

    fn close(&mut self) -> IoResult<()> {
        let mut st = self.0.borrow_mut();
        if st.open.take().is_some() {
            st.closes += 1;
            st.bound = None;
            if let Some(errno) = st.close_error.take() {
                return Err(os_err(errno));
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.0.borrow().open.is_some()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.0.borrow().open.map(|_| MOCK_FD)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> IoResult<()> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        st.nonblocking = nonblocking;
        Ok(())
    }

    fn interface_index(&self, ifname: &str) -> IoResult<u32> {
        self.0
            .borrow()
            .interfaces
            .get(ifname)
            .map(|&(idx, _)| idx)
            .ok_or_else(|| os_err(libc::ENODEV))
    }

    fn interface_mtu(&self, ifname: &str) -> IoResult<usize> {
        self.0
            .borrow()
            .interfaces
            .get(ifname)
            .map(|&(_, mtu)| mtu)
            .ok_or_else(|| os_err(libc::ENODEV))
    }

    fn set_option(&mut self, level: c_int, name: c_int, value: &[u8]) -> IoResult<()> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        if let Some(&errno) = st.option_errors.get(&(level, name)) {
            return Err(os_err(errno));
        }
        st.options.push((level, name, value.to_vec()));
        Ok(())
    }

    fn bind(&mut self, addr: &CanAddr) -> IoResult<()> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        if let Some(errno) = st.bind_error.take() {
            return Err(os_err(errno));
        }
        st.bound = Some(*addr);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        match st.reads.pop_front() {
            None => Err(os_err(libc::EAGAIN)),
            Some(MockRead::Error(errno)) => Err(os_err(errno)),
            Some(MockRead::Data(data)) => {
                // a datagram that doesn't fit is truncated, like the kernel does
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        if let Some(errno) = st.write_errors.pop_front() {
            return Err(os_err(errno));
        }
        if !st.writable {
            return Err(os_err(libc::EAGAIN));
        }
        let n = st.write_limit.map_or(buf.len(), |lim| lim.min(buf.len()));
        st.written.push(buf[..n].to_vec());
        Ok(n)
    }

    fn poll(
        &mut self,
        read: bool,
        write: bool,
        _timeout: Option<Duration>,
    ) -> IoResult<Option<Readiness>> {
        let mut st = self.0.borrow_mut();
        if st.open.is_none() {
            return Err(os_err(libc::EBADF));
        }
        st.polls += 1;

        let ready = Readiness {
            readable: read && !st.reads.is_empty(),
            writable: write && (st.writable || !st.write_errors.is_empty()),
        };

        // nothing will ever change, so waiting is the same as timing out
        Ok(if ready.readable || ready.writable {
            Some(ready)
        } else {
            None
        })
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interfaces() {
        let mock = MockTransport::new();
        mock.add_interface("can0", 5, 72);

        assert_eq!(5, mock.interface_index("can0").unwrap());
        assert_eq!(72, mock.interface_mtu("can0").unwrap());

        let err = mock.interface_index("can1").unwrap_err();
        assert_eq!(Some(libc::ENODEV), err.raw_os_error());
    }

    #[test]
    fn test_scripted_reads() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();

        mock.open(SocketType::Raw).unwrap();
        assert_eq!(Some(MOCK_FD), mock.raw_fd());

        handle.push_read(vec![1, 2, 3, 4]);
        handle.push_read_error(libc::ENETDOWN);

        let mut buf = [0u8; 2];
        assert_eq!(2, mock.read(&mut buf).unwrap());
        assert_eq!([1, 2], buf);

        let err = mock.read(&mut buf).unwrap_err();
        assert_eq!(Some(libc::ENETDOWN), err.raw_os_error());

        let err = mock.read(&mut buf).unwrap_err();
        assert_eq!(std::io::ErrorKind::WouldBlock, err.kind());
    }

    #[test]
    fn test_writes() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();
        mock.open(SocketType::IsoTp).unwrap();

        handle.push_write_error(libc::ENOBUFS);
        assert!(mock.write(b"abc").is_err());
        assert_eq!(3, mock.write(b"abc").unwrap());

        handle.set_write_limit(Some(2));
        assert_eq!(2, mock.write(b"xyz").unwrap());

        handle.set_writable(false);
        assert!(mock.write(b"xyz").is_err());

        assert_eq!(vec![b"abc".to_vec(), b"xy".to_vec()], handle.written());
    }

    #[test]
    fn test_options_and_poll() {
        let mut mock = MockTransport::new();
        let handle = mock.clone();

        assert!(mock.set_option(101, 1, &[0; 8]).is_err());
        mock.open(SocketType::Raw).unwrap();

        handle.fail_option(101, 2, libc::EINVAL);
        assert!(mock.set_option(101, 2, &[1]).is_err());
        mock.set_option(101, 1, &[1, 2]).unwrap();
        mock.set_option(101, 1, &[3, 4]).unwrap();

        assert_eq!(Some(vec![3, 4]), handle.option(101, 1));
        assert_eq!(2, handle.option_count(101, 1));
        assert_eq!(None, handle.option(101, 2));

        assert_eq!(None, mock.poll(true, false, None).unwrap());
        handle.push_read(vec![0]);
        let ready = mock.poll(true, true, None).unwrap().unwrap();
        assert!(ready.readable && ready.writable);
        assert_eq!(2, handle.poll_count());

        mock.close().unwrap();
        assert_eq!(1, handle.close_count());
        assert!(!mock.is_open());
    }
}
