// cansocket/src/socket/mio.rs
//
// Registration of sockets with a mio event loop.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Integration with a `mio` event loop.
//!
//! A connected socket can be registered with a `mio::Registry`. When the
//! poll reports the token, pass readable and writable events on to
//! [`handle_read_ready`](CanAbstractSocket::handle_read_ready) and
//! [`handle_write_ready`](CanAbstractSocket::handle_write_ready), then
//! reregister with the socket's current [`interest`](CanAbstractSocket::interest).

use super::{CanAbstractSocket, Protocol};
use crate::{IoError, IoResult};
use ::mio::{event, unix::SourceFd, Interest, Registry, Token};
use std::os::unix::io::RawFd;

impl<P: Protocol> CanAbstractSocket<P> {
    /// The readiness the socket is waiting for, if any.
    pub fn interest(&self) -> Option<Interest> {
        match (self.read_notifier, self.write_notifier) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    fn registered_fd(&self) -> IoResult<RawFd> {
        self.socket_descriptor()
            .ok_or_else(|| IoError::from_raw_os_error(libc::EBADF))
    }
}

impl<P: Protocol> event::Source for CanAbstractSocket<P> {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> IoResult<()> {
        SourceFd(&self.registered_fd()?).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> IoResult<()> {
        SourceFd(&self.registered_fd()?).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> IoResult<()> {
        SourceFd(&self.registered_fd()?).deregister(registry)
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use crate::{transport::mock::MockTransport, CanRawSocket, OpenMode};
    use ::mio::Interest;

    #[test]
    fn test_interest() {
        let mock = MockTransport::new();
        mock.add_interface("vcan0", 1, 16);
        let mut sock = CanRawSocket::with_transport(Box::new(mock));

        assert_eq!(None, sock.interest());

        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        assert_eq!(Some(Interest::READABLE), sock.interest());

        sock.write_data(&[0u8; 16]).unwrap();
        assert_eq!(Some(Interest::READABLE | Interest::WRITABLE), sock.interest());
    }
}
