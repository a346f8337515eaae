// cansocket/src/lib.rs
//
// The main lib file for the Rust 'cansocket' library.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Buffered, non-blocking SocketCAN sockets.
//!
//! The Linux kernel supports using CAN-devices through a network-like API
//! (see https://www.kernel.org/doc/Documentation/networking/can.txt). This
//! crate puts a buffered, event-driven stream interface on top of it, for
//! raw CAN and CAN FD frames and for ISO-TP transport connections.
//!
//! # An introduction to CAN
//!
//! The CAN bus was originally designed to allow microcontrollers inside a
//! vehicle to communicate over a single shared bus. Messages called
//! *frames* are multicast to all devices on the bus.
//!
//! Every frame consists of an ID and a payload of up to 8 bytes. If two
//! devices attempt to send a frame at the same time, the device with the
//! higher ID will notice the conflict, stop sending and reattempt to sent its
//! frame in the next time slot. This means that the lower the ID, the higher
//! the priority. CAN FD frames carry up to 64 bytes, and the ISO-TP
//! transport protocol splits larger payloads over a sequence of frames.
//!
//! # Sockets
//!
//! Every socket is a [`CanAbstractSocket`] driven by a [`Protocol`] that
//! knows how to set up the kernel socket and move its messages:
//!
//! - [`CanRawSocket`] reads and writes whole frames in the kernel layout.
//! - [`CanIsoTpSocket`] reads and writes ISO-TP payloads as a byte stream.
//!
//! A socket never blocks on its own. Data written is queued in a write
//! buffer and pushed to the kernel when the descriptor becomes writable;
//! data read from the kernel is queued in a read buffer until the
//! application takes it. The application tells the socket about readiness
//! through [`handle_read_ready`](CanAbstractSocket::handle_read_ready) and
//! [`handle_write_ready`](CanAbstractSocket::handle_write_ready), from its
//! own event loop (see the `mio` feature), or blocks in
//! [`wait_for_ready_read`](CanAbstractSocket::wait_for_ready_read) and
//! [`wait_for_bytes_written`](CanAbstractSocket::wait_for_bytes_written).
//! What happens is reported to an event handler as [`SocketEvent`]s.
//!
//! ```no_run
//! use cansocket::{CanFrame, CanRawSocket, OpenMode, SocketEvent, StandardId};
//!
//! let mut sock = CanRawSocket::new();
//! sock.set_event_handler(|sock, ev| {
//!     if let SocketEvent::ReadyRead = ev {
//!         while let Ok(frame) = sock.read_frame() {
//!             println!("{}", frame);
//!         }
//!     }
//! });
//!
//! if sock.connect_to_interface("vcan0", OpenMode::READ_WRITE) {
//!     let frame = CanFrame::with_data(StandardId::new(0x123).unwrap(), &[1, 2]).unwrap();
//!     sock.write_frame(&frame).unwrap();
//!     sock.wait_for_bytes_written(std::time::Duration::from_secs(1));
//!     sock.wait_for_ready_read(std::time::Duration::from_secs(1));
//! }
//! ```
//!
//! # Errors
//!
//! Socket operations that follow the event model return `false` on
//! failure, keep the error as the socket's current
//! [`error`](CanAbstractSocket::error) and report it with an
//! [`Error`](SocketEvent::Error) event. The frame helpers return a
//! [`Result`].

pub mod addr;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod id;
pub mod isotp;
pub mod raw;
pub mod ring_buffer;
pub mod socket;
pub mod transport;

mod util;

pub use embedded_can::{self, ExtendedId, Frame as EmbeddedFrame, Id, StandardId};

pub use crate::{
    addr::CanAddr,
    errors::{ConstructionError, Error, ParseError, Result, SocketError, SocketErrorInfo},
    frame::{ByteOrder, CanFrame, FrameFormat, FrameKind},
    id::{ErrorClass, FdFlags, IdFlags},
    isotp::{
        CanIsoTpSocket, FlowControlOptions, IsoTpFlags, IsoTpOption, IsoTpOptionValue,
        IsoTpOptions, LinkLayerOptions,
    },
    raw::{CanFilter, CanRawSocket, RawOption, RawOptionValue},
    socket::{CanAbstractSocket, OpenMode, Protocol, SocketEvent, SocketState, SocketType},
    transport::{ShouldRetry, SysTransport, Transport},
    util::timeout_from_msecs,
};

/// An error from the standard library I/O
pub type IoError = std::io::Error;

/// The kind of a standard library I/O error
pub type IoErrorKind = std::io::ErrorKind;

/// A result from the standard library I/O
pub type IoResult<T> = std::io::Result<T>;

/// Gets a byte slice for any sized variable.
///
/// Note that this should normally be unsafe, but since we're only
/// using it internally for types sent to the kernel, it's OK.
pub fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

/// Gets a mutable byte slice for any sized variable.
pub fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}
