// cansocket/src/socket.rs
//
// The buffered, readiness-driven socket engine shared by all CAN protocols.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The socket engine.
//!
//! A [`CanAbstractSocket`] owns one non-blocking kernel descriptor and
//! presents it as a sequential, buffered byte stream. Everything the
//! application writes goes into a write buffer and is pushed to the kernel
//! when the descriptor is writable; everything the kernel has to give is
//! pulled into a read buffer when the descriptor is readable.
//!
//! The engine doesn't run an event loop of its own. The application tells
//! it about readiness by calling [`handle_read_ready`] and
//! [`handle_write_ready`] (or through the `mio` integration), or it blocks
//! in [`wait_for_ready_read`] / [`wait_for_bytes_written`], which poll the
//! descriptor and then run exactly the same logic.
//!
//! What happens on the socket is reported through [`SocketEvent`]s given
//! to an optional event handler. The handler gets the socket itself, so it
//! can read, write or close from inside the callback. A "ready read" is
//! never reported again from inside its own handler, and a "bytes written"
//! is never reported twice for the same bytes.
//!
//! The protocol specific parts (opening and configuring the descriptor,
//! and moving bytes in protocol sized units) are supplied through the
//! [`Protocol`] trait.
//!
//! [`handle_read_ready`]: CanAbstractSocket::handle_read_ready
//! [`handle_write_ready`]: CanAbstractSocket::handle_write_ready
//! [`wait_for_ready_read`]: CanAbstractSocket::wait_for_ready_read
//! [`wait_for_bytes_written`]: CanAbstractSocket::wait_for_bytes_written

use crate::{
    errors::{SocketError, SocketErrorInfo},
    ring_buffer::RingBuffer,
    transport::{Readiness, ShouldRetry, Transport},
    util::{remaining_timeout, timed_out},
    IoError, IoErrorKind, IoResult,
};
use bitflags::bitflags;
use log::{debug, trace, warn};
use std::{
    collections::VecDeque,
    fmt, io, mem,
    os::unix::io::RawFd,
    time::{Duration, Instant},
};

#[cfg(feature = "mio")]
mod mio;

bitflags! {
    /// The mode a socket is connected in.
    ///
    /// Only reading and writing are supported by CAN sockets; the other
    /// modes exist so they can be refused.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct OpenMode: u32 {
        /// The socket can be read
        const READ_ONLY = 0x0001;
        /// The socket can be written
        const WRITE_ONLY = 0x0002;
        /// The socket can be read and written
        const READ_WRITE = Self::READ_ONLY.bits() | Self::WRITE_ONLY.bits();
        /// Append to the end (not supported)
        const APPEND = 0x0004;
        /// Truncate on open (not supported)
        const TRUNCATE = 0x0008;
        /// Translate line endings (not supported)
        const TEXT = 0x0010;
        /// Bypass the buffers (not supported)
        const UNBUFFERED = 0x0020;
    }
}

impl OpenMode {
    const UNSUPPORTED: Self = Self::APPEND
        .union(Self::TRUNCATE)
        .union(Self::TEXT)
        .union(Self::UNBUFFERED);
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::empty()
    }
}

/// The connection state of a socket.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// Not connected to an interface
    #[default]
    Unconnected,
    /// The descriptor is being opened and configured
    Connecting,
    /// Connected and transferring data
    Connected,
    /// Being shut down
    Closing,
}

/// The CAN protocol a socket speaks.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// Raw CAN and CAN FD frames
    Raw,
    /// Broadcast manager
    Bcm,
    /// VAG transport protocol 1.6
    Tp16,
    /// VAG transport protocol 2.0
    Tp20,
    /// ISO 15765-2 transport protocol
    IsoTp,
    /// Not known
    #[default]
    Unknown,
}

/// Something that happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent<O> {
    /// New data arrived in the read buffer
    ReadyRead,
    /// The kernel accepted this many bytes from the write buffer
    BytesWritten(usize),
    /// The connection state changed
    StateChanged(SocketState),
    /// The socket's current error was set
    Error(SocketError),
    /// A socket option was changed to a new value
    OptionChanged(O),
}

/// The protocol specific hooks of a socket.
///
/// The engine calls these to set up the descriptor and to move bytes
/// between its buffers and the kernel.
pub trait Protocol {
    /// The identifier of a socket option, reported in change events
    type OptionId: Copy + fmt::Debug + PartialEq;

    /// The protocol of the socket
    fn socket_type(&self) -> SocketType;

    /// The most bytes taken from the kernel in one read notification
    fn read_chunk_size(&self) -> usize;

    /// The chunk size of the socket's buffers
    fn initial_buffer_size(&self) -> usize;

    /// Opens, configures and binds the descriptor for the interface.
    fn connect(&mut self, io: &mut dyn Transport, ifname: &str) -> Result<(), SocketErrorInfo>;

    /// Releases any state tied to the connection.
    fn disconnect(&mut self) {}

    /// Reads as much as fits from the descriptor into `buf`.
    ///
    /// A "would block" error is not a failure; it means there was nothing
    /// to read.
    fn read_from_socket(&mut self, io: &mut dyn Transport, buf: &mut [u8]) -> IoResult<usize>;

    /// Writes from `buf` to the descriptor, returning the bytes taken.
    fn write_to_socket(&mut self, io: &mut dyn Transport, buf: &[u8]) -> IoResult<usize>;

    /// The size of the smallest unit the protocol moves, or zero for a
    /// plain byte stream.
    fn msg_size(&self) -> usize;

    /// Whether each kernel read returns one whole message, cutting off
    /// whatever doesn't fit the buffer.
    fn is_datagram(&self) -> bool {
        false
    }

    /// Notes that `len` bytes were queued for writing as one message.
    fn message_queued(&mut self, _len: usize) {}

    /// The number of bytes at the head of the write buffer that have to
    /// go to the kernel in one piece.
    fn next_write_size(&self) -> usize {
        self.msg_size()
    }
}

/// The callback that receives the socket's events.
pub type EventHandler<P> =
    Box<dyn FnMut(&mut CanAbstractSocket<P>, &SocketEvent<<P as Protocol>::OptionId>)>;

/// A buffered, non-blocking CAN socket.
pub struct CanAbstractSocket<P: Protocol> {
    protocol: P,
    io: Box<dyn Transport>,
    state: SocketState,
    error: SocketErrorInfo,
    open_mode: OpenMode,
    interface_name: String,
    read_buffer: RingBuffer,
    write_buffer: RingBuffer,
    read_buffer_max_size: usize,
    read_notifier: bool,
    write_notifier: bool,
    emitted_ready_read: bool,
    emitted_bytes_written: bool,
    pending_bytes_written: usize,
    write_sequence_started: bool,
    handler: Option<EventHandler<P>>,
    dispatching: bool,
    queued_events: VecDeque<SocketEvent<P::OptionId>>,
}

impl<P: Protocol> CanAbstractSocket<P> {
    /// Creates an unconnected socket for the protocol, making its system
    /// calls through the transport.
    pub fn with_protocol(protocol: P, io: Box<dyn Transport>) -> Self {
        let chunk = protocol.initial_buffer_size();
        Self {
            protocol,
            io,
            state: SocketState::Unconnected,
            error: SocketErrorInfo::default(),
            open_mode: OpenMode::empty(),
            interface_name: String::new(),
            read_buffer: RingBuffer::new(chunk),
            write_buffer: RingBuffer::new(chunk),
            read_buffer_max_size: 0,
            read_notifier: false,
            write_notifier: false,
            emitted_ready_read: false,
            emitted_bytes_written: false,
            pending_bytes_written: 0,
            write_sequence_started: false,
            handler: None,
            dispatching: false,
            queued_events: VecDeque::new(),
        }
    }

    // ===== Events =====

    /// Sets the callback that receives the socket's events, replacing any
    /// previous one.
    pub fn set_event_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Self, &SocketEvent<P::OptionId>) + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Removes the event callback and gets it back.
    pub fn take_event_handler(&mut self) -> Option<EventHandler<P>> {
        self.handler.take()
    }

    /// Delivers an event to the handler.
    ///
    /// Events raised while the handler is running are queued and delivered
    /// in order once it returns.
    pub(crate) fn emit(&mut self, event: SocketEvent<P::OptionId>) {
        if self.dispatching {
            self.queued_events.push_back(event);
            return;
        }
        let Some(mut handler) = self.handler.take() else {
            return;
        };

        self.dispatching = true;
        handler(self, &event);
        while let Some(event) = self.queued_events.pop_front() {
            handler(self, &event);
        }
        self.dispatching = false;

        // the handler may have installed a replacement for itself
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }

    // ===== Lifecycle =====

    /// Connects the socket to a CAN interface.
    ///
    /// Returns `false` and sets the error if the socket isn't unconnected,
    /// if the mode is empty or asks for anything but reading and writing,
    /// or if the protocol fails to set up the descriptor.
    pub fn connect_to_interface(&mut self, ifname: &str, mode: OpenMode) -> bool {
        if self.state != SocketState::Unconnected {
            self.set_error(SocketErrorInfo::with_message(
                SocketError::OperationError,
                "Trying to connect while connection is in progress",
            ));
            return false;
        }

        if mode.is_empty() || mode.intersects(OpenMode::UNSUPPORTED) {
            self.set_error(SocketErrorInfo::with_message(
                SocketError::UnsupportedOperation,
                "Unsupported open mode",
            ));
            return false;
        }

        debug!("Connecting {:?} socket to '{}'", self.socket_type(), ifname);

        self.interface_name = ifname.to_string();
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.open_mode = mode;

        self.set_state(SocketState::Connecting);

        if let Err(err) = self.protocol.connect(self.io.as_mut(), ifname) {
            debug!("Failed to connect to '{}': {}", ifname, err);
            self.set_error(err);
            self.close();
            return false;
        }

        if mode.contains(OpenMode::READ_ONLY) {
            self.set_read_notification_enabled(true);
        }

        self.set_state(SocketState::Connected);
        true
    }

    /// Disconnects the socket from the interface.
    pub fn disconnect_from_interface(&mut self) {
        self.close();
    }

    /// Closes the socket.
    ///
    /// Anything still buffered is discarded, and no bytes written
    /// notification is made for data the kernel already accepted.
    /// Closing an unconnected socket does nothing.
    pub fn close(&mut self) {
        if self.state == SocketState::Unconnected {
            return;
        }

        debug!("Closing {:?} socket on '{}'", self.socket_type(), self.interface_name);
        self.set_state(SocketState::Closing);

        self.read_notifier = false;
        self.write_notifier = false;

        if let Err(err) = self.io.close() {
            warn!("Error closing the socket descriptor: {}", err);
            self.set_error(SocketErrorInfo::from_io(&err));
        }
        self.protocol.disconnect();

        self.interface_name.clear();
        self.pending_bytes_written = 0;
        self.write_sequence_started = false;
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.open_mode = OpenMode::empty();

        self.set_state(SocketState::Unconnected);
    }

    fn set_state(&mut self, state: SocketState) {
        if self.state != state {
            self.state = state;
            self.emit(SocketEvent::StateChanged(state));
        }
    }

    /// Makes the error the socket's current error and reports it.
    pub(crate) fn set_error(&mut self, err: SocketErrorInfo) {
        debug!("Socket error: {:?}: {}", err.kind(), err.message());
        let kind = err.kind();
        self.error = err;
        self.emit(SocketEvent::Error(kind));
    }

    // ===== Readiness =====

    /// Tells the socket that its descriptor is readable.
    ///
    /// Does nothing unless the socket is connected and wants to read.
    pub fn handle_read_ready(&mut self) -> bool {
        if self.state != SocketState::Connected || !self.read_notifier {
            return false;
        }
        self.read_notification()
    }

    /// Tells the socket that its descriptor is writable.
    ///
    /// Does nothing unless the socket is connected and has something to
    /// write or report.
    pub fn handle_write_ready(&mut self) -> bool {
        if self.state != SocketState::Connected || !self.write_notifier {
            return false;
        }
        self.complete_async_write()
    }

    /// Whether the socket is waiting for its descriptor to become readable
    pub fn is_read_notification_enabled(&self) -> bool {
        self.read_notifier
    }

    /// Whether the socket is waiting for its descriptor to become writable
    pub fn is_write_notification_enabled(&self) -> bool {
        self.write_notifier
    }

    fn set_read_notification_enabled(&mut self, enable: bool) {
        if self.read_notifier != enable {
            trace!("Read notification {}", if enable { "on" } else { "off" });
            self.read_notifier = enable;
        }
    }

    fn set_write_notification_enabled(&mut self, enable: bool) {
        if self.write_notifier != enable {
            trace!("Write notification {}", if enable { "on" } else { "off" });
            self.write_notifier = enable;
        }
    }

    // The unit used for the read buffer limits. A protocol without one
    // still needs room for a single byte.
    fn min_read_size(&self) -> usize {
        self.protocol.msg_size().max(1)
    }

    fn has_read_room(&self) -> bool {
        self.read_buffer_max_size == 0
            || self.read_buffer.len() + self.min_read_size() <= self.read_buffer_max_size
    }

    // Re-arms reading once the application made room for another message.
    fn resume_reading(&mut self) {
        if self.state == SocketState::Connected
            && self.open_mode.contains(OpenMode::READ_ONLY)
            && !self.read_notifier
            && self.has_read_room()
        {
            self.set_read_notification_enabled(true);
        }
    }

    // ===== The read pump =====

    fn read_notification(&mut self) -> bool {
        let min_size = self.min_read_size();
        let old_len = self.read_buffer.len();

        let mut to_read = self.protocol.read_chunk_size();
        if self.read_buffer_max_size > 0 {
            let room = self.read_buffer_max_size.saturating_sub(old_len);
            if to_read > room {
                if room < min_size {
                    // full; the application has to read first
                    return false;
                }
                // a datagram cut short is lost, so it gets the whole
                // window and the cap is checked after the read
                if !self.protocol.is_datagram() {
                    to_read = room;
                }
            }
        }

        let buf = self.read_buffer.reserve(to_read);
        let res = self.protocol.read_from_socket(self.io.as_mut(), buf);

        let n = match res {
            Ok(n) => n,
            Err(err) if err.should_retry() => 0,
            Err(err) => {
                self.read_buffer.chop(to_read);
                let err = SocketErrorInfo::from_io(&err);
                if err.kind() == SocketError::ResourceExhausted {
                    warn!("Out of resources reading the socket; reads suspended");
                    self.set_read_notification_enabled(false);
                    self.set_error(err);
                } else {
                    self.set_error(err.reclassify(SocketError::ReadError));
                }
                return false;
            }
        };

        self.read_buffer.chop(to_read - n.min(to_read));
        trace!("Read {} bytes, {} buffered", n, self.read_buffer.len());

        if self.read_buffer_max_size > 0
            && self.read_buffer.len() + min_size > self.read_buffer_max_size
        {
            self.set_read_notification_enabled(false);
        }

        if self.read_buffer.len() > old_len && !self.emitted_ready_read {
            self.emitted_ready_read = true;
            self.emit(SocketEvent::ReadyRead);
            self.emitted_ready_read = false;
        }

        true
    }

    // ===== The write pump =====

    fn start_async_write(&mut self) -> bool {
        if self.write_buffer.is_empty() || self.write_sequence_started {
            return true;
        }

        // a protocol unit must never be split across two writes
        self.write_buffer
            .make_contiguous(self.protocol.next_write_size());

        let res = self
            .protocol
            .write_to_socket(self.io.as_mut(), self.write_buffer.read_pointer());

        let n = match res {
            Ok(n) => n,
            Err(err) => {
                if err.kind() == IoErrorKind::InvalidData {
                    // the kernel can never take what is queued
                    self.write_buffer.clear();
                    self.set_write_notification_enabled(false);
                }
                let err = SocketErrorInfo::from_io(&err);
                if err.kind() == SocketError::ResourceExhausted {
                    self.set_error(err);
                } else {
                    self.set_error(err.reclassify(SocketError::WriteError));
                }
                return false;
            }
        };

        trace!("Wrote {} bytes, {} left", n, self.write_buffer.len() - n);

        self.write_buffer.free(n);
        self.pending_bytes_written += n;
        self.write_sequence_started = true;

        self.set_write_notification_enabled(true);
        true
    }

    fn complete_async_write(&mut self) -> bool {
        if self.pending_bytes_written > 0 && !self.emitted_bytes_written {
            self.emitted_bytes_written = true;
            let n = mem::take(&mut self.pending_bytes_written);
            self.emit(SocketEvent::BytesWritten(n));
            self.emitted_bytes_written = false;
        }

        self.write_sequence_started = false;

        if self.write_buffer.is_empty() {
            self.set_write_notification_enabled(false);
            return true;
        }

        self.start_async_write()
    }

    // ===== Blocking waits =====

    fn wait_for_read_or_write(
        &mut self,
        read: bool,
        write: bool,
        timeout: Option<Duration>,
    ) -> Option<Readiness> {
        match self.io.poll(read, write, timeout) {
            Ok(Some(ready)) => Some(ready),
            Ok(None) => {
                self.set_error(SocketError::Timeout.into());
                None
            }
            Err(err) => {
                self.set_error(SocketErrorInfo::from_io(&err));
                None
            }
        }
    }

    /// Blocks until new data is available to read, or the timeout runs out.
    ///
    /// Pending writes are pushed out while waiting. A timeout of `None`
    /// waits forever. Returns `false` if the socket is unconnected, on an
    /// error, or on a timeout (which sets a timeout error).
    pub fn wait_for_ready_read<D>(&mut self, timeout: D) -> bool
    where
        D: Into<Option<Duration>>,
    {
        if self.state == SocketState::Unconnected {
            return false;
        }

        let timeout = timeout.into();
        let start = Instant::now();

        loop {
            let write = !self.write_buffer.is_empty();
            let remaining = remaining_timeout(timeout, start.elapsed());

            let Some(ready) = self.wait_for_read_or_write(true, write, remaining) else {
                return false;
            };

            if ready.readable {
                return self.read_notification();
            }

            if ready.writable && !self.complete_async_write() {
                return false;
            }

            if timed_out(timeout, start.elapsed()) {
                self.set_error(SocketError::Timeout.into());
                return false;
            }
        }
    }

    /// Blocks until the kernel took some of the buffered data, or the
    /// timeout runs out.
    ///
    /// Returns `false` right away if there is nothing to write. A timeout
    /// of `None` waits forever.
    pub fn wait_for_bytes_written<D>(&mut self, timeout: D) -> bool
    where
        D: Into<Option<Duration>>,
    {
        if self.state == SocketState::Unconnected {
            return false;
        }
        if self.write_buffer.is_empty() && self.pending_bytes_written == 0 {
            return false;
        }

        let timeout = timeout.into();
        let start = Instant::now();

        loop {
            let read = self.read_notifier;
            let remaining = remaining_timeout(timeout, start.elapsed());

            let Some(ready) = self.wait_for_read_or_write(read, true, remaining) else {
                return false;
            };

            if ready.readable && !self.read_notification() {
                return false;
            }

            if ready.writable {
                return self.complete_async_write();
            }

            if timed_out(timeout, start.elapsed()) {
                self.set_error(SocketError::Timeout.into());
                return false;
            }
        }
    }

    // ===== Stream =====

    /// Moves buffered data into `buf`, returning the number of bytes.
    ///
    /// This never touches the kernel; it only takes what earlier read
    /// notifications brought in.
    pub fn read_data(&mut self, buf: &mut [u8]) -> usize {
        let n = self.read_buffer.read(buf);
        self.resume_reading();
        n
    }

    /// Takes everything out of the read buffer.
    pub fn read_all(&mut self) -> Vec<u8> {
        let data = self.read_buffer.read_all();
        self.resume_reading();
        data
    }

    /// Takes one line, up to and including '\n', but no more than `max`
    /// bytes, out of the read buffer.
    pub fn read_line(&mut self, max: usize) -> Vec<u8> {
        let line = self.read_buffer.read_line(max);
        self.resume_reading();
        line
    }

    /// Copies buffered data into `buf` without taking it out.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        self.read_buffer.peek(buf)
    }

    /// Queues data to be written to the kernel.
    ///
    /// The data goes to the write buffer and is pushed out when the
    /// descriptor is writable, on [`flush`](Self::flush), or while
    /// blocked in a wait.
    pub fn write_data(&mut self, data: &[u8]) -> Result<usize, SocketErrorInfo> {
        if self.state != SocketState::Connected {
            return Err(SocketErrorInfo::with_message(
                SocketError::OperationError,
                "Socket is not connected",
            ));
        }
        if !self.open_mode.contains(OpenMode::WRITE_ONLY) {
            return Err(SocketErrorInfo::with_message(
                SocketError::OperationError,
                "Socket is not open for writing",
            ));
        }

        if !data.is_empty() {
            self.write_buffer.append(data);
            self.protocol.message_queued(data.len());
        }
        if !self.write_buffer.is_empty() && !self.write_notifier {
            self.set_write_notification_enabled(true);
        }
        Ok(data.len())
    }

    /// Pushes as much buffered data to the kernel as it takes right now,
    /// reporting what the kernel took before.
    pub fn flush(&mut self) -> bool {
        self.complete_async_write()
    }

    /// The number of bytes ready to be read
    pub fn bytes_available(&self) -> usize {
        self.read_buffer.len()
    }

    /// The number of bytes waiting to be written
    pub fn bytes_to_write(&self) -> usize {
        self.write_buffer.len()
    }

    /// Whether there is no more data to read for now
    pub fn at_end(&self) -> bool {
        self.read_buffer.is_empty()
    }

    /// Whether a whole line can be read
    pub fn can_read_line(&self) -> bool {
        self.read_buffer.can_read_line()
    }

    /// Sockets are always sequential; there is no seeking.
    pub fn is_sequential(&self) -> bool {
        true
    }

    // ===== Accessors =====

    /// The connection state
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// The protocol of the socket
    pub fn socket_type(&self) -> SocketType {
        self.protocol.socket_type()
    }

    /// The kind of the last error
    pub fn error(&self) -> SocketError {
        self.error.kind()
    }

    /// The description of the last error
    pub fn error_string(&self) -> &str {
        self.error.message()
    }

    /// The last error, with its description
    pub fn error_info(&self) -> &SocketErrorInfo {
        &self.error
    }

    /// Resets the error to "no error".
    pub fn clear_error(&mut self) {
        self.error = SocketErrorInfo::default();
    }

    /// The name of the interface the socket is connected to
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    /// The OS descriptor, while connected
    pub fn socket_descriptor(&self) -> Option<RawFd> {
        self.io.raw_fd()
    }

    /// The mode the socket was connected in
    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    /// The most bytes the read buffer holds before reading stops.
    /// Zero means no limit.
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_max_size
    }

    /// Limits the read buffer. Zero means no limit.
    pub fn set_read_buffer_size(&mut self, size: usize) {
        if self.read_buffer_max_size != size {
            self.read_buffer_max_size = size;
            self.resume_reading();
        }
    }

    pub(crate) fn protocol(&self) -> &P {
        &self.protocol
    }

    /// The protocol and transport, borrowed together, to configure a
    /// connected descriptor.
    pub(crate) fn protocol_and_transport(&mut self) -> (&mut P, &mut dyn Transport) {
        (&mut self.protocol, self.io.as_mut())
    }

    pub(crate) fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }
}

impl<P: Protocol> Drop for CanAbstractSocket<P> {
    fn drop(&mut self) {
        if self.state != SocketState::Unconnected {
            self.close();
        }
    }
}

impl<P: Protocol> fmt::Debug for CanAbstractSocket<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CanAbstractSocket")
            .field("type", &self.socket_type())
            .field("state", &self.state)
            .field("interface", &self.interface_name)
            .field("bytes_available", &self.read_buffer.len())
            .field("bytes_to_write", &self.write_buffer.len())
            .field("error", &self.error.kind())
            .finish()
    }
}

impl<P: Protocol> io::Read for CanAbstractSocket<P> {
    /// Reads buffered data, without blocking.
    ///
    /// With nothing buffered, a connected socket reports `WouldBlock` and an
    /// unconnected one reports the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read_buffer.is_empty() {
            return match self.state {
                SocketState::Unconnected => Ok(0),
                _ => Err(IoErrorKind::WouldBlock.into()),
            };
        }
        Ok(self.read_data(buf))
    }
}

impl<P: Protocol> io::Write for CanAbstractSocket<P> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.write_data(buf).map_err(|err| {
            let kind = match err.kind() {
                SocketError::OperationError => IoErrorKind::NotConnected,
                _ => IoErrorKind::Other,
            };
            IoError::new(kind, err)
        })
    }

    fn flush(&mut self) -> IoResult<()> {
        if CanAbstractSocket::flush(self) {
            Ok(())
        } else {
            Err(IoError::new(IoErrorKind::Other, self.error.clone()))
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
