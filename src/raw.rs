// cansocket/src/raw.rs
//
// Raw CAN and CAN FD sockets.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Raw CAN sockets.
//!
//! A [`CanRawSocket`] moves whole frames in the kernel's `can_frame` (16
//! bytes) or `canfd_frame` (72 bytes) layout. Each frame in the buffers is
//! tagged in its two reserved header bytes with its payload capacity and
//! size, so a reader can tell classic and FD frames apart:
//!
//! ```text
//! classic:  res0 = 8,  res1 = 16
//! FD:       res0 = 64, res1 = 72
//! ```
//!
//! The socket options (filters, error mask, loopback, own messages and FD
//! frames) can be set at any time. While unconnected they are kept until
//! the socket connects; while connected they go to the kernel right away,
//! and are only kept if the kernel accepts them.

use crate::{
    addr::CanAddr,
    constants::{
        CANFD_MTU, CAN_MTU, CAN_RAW_ERR_FILTER, CAN_RAW_FD_FRAMES, CAN_RAW_FILTER,
        CAN_RAW_LOOPBACK, CAN_RAW_RECV_OWN_MSGS, RAW_INITIAL_BUFFER_SIZE, RAW_READ_CHUNK_SIZE,
        RES0_OFFSET, RES1_OFFSET, SOL_CAN_RAW,
    },
    errors::{ConstructionError, Error, Result, SocketError, SocketErrorInfo},
    frame::{frame_size_from_sentinels, CanFrame, FrameKind, FRAME_HEADER_SIZE},
    id::ErrorClass,
    socket::{CanAbstractSocket, Protocol, SocketEvent, SocketState, SocketType},
    transport::{ShouldRetry, SysTransport, Transport},
    IoError, IoErrorKind, IoResult,
};
use libc::canid_t;
use log::debug;
use std::os::raw::c_int;

// ===== CanFilter =====

/// The CAN filter defines which ID's can be accepted on a socket.
///
/// Each filter contains an internal id and mask. Packets are considered to
/// be matched by a filter if `received_id & mask == filter_id & mask` holds
/// true.
///
/// A socket can be given multiple filters, and each one can be inverted
/// ([ref](https://docs.kernel.org/networking/can.html#raw-protocol-sockets-with-can-filters-sock-raw))
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct CanFilter(libc::can_filter);

impl CanFilter {
    /// Construct a new CAN filter.
    pub fn new(id: canid_t, mask: canid_t) -> Self {
        Self(libc::can_filter {
            can_id: id,
            can_mask: mask,
        })
    }

    /// Construct a new inverted CAN filter.
    pub fn new_inverted(id: canid_t, mask: canid_t) -> Self {
        Self::new(id | libc::CAN_INV_FILTER, mask)
    }

    /// The filter ID, including any flag bits
    pub fn id(&self) -> canid_t {
        self.0.can_id
    }

    /// The filter mask
    pub fn mask(&self) -> canid_t {
        self.0.can_mask
    }
}

impl Default for CanFilter {
    /// A filter that accepts every frame.
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl From<libc::can_filter> for CanFilter {
    fn from(filt: libc::can_filter) -> Self {
        Self(filt)
    }
}

impl From<(u32, u32)> for CanFilter {
    fn from(filt: (u32, u32)) -> Self {
        CanFilter::new(filt.0, filt.1)
    }
}

impl AsRef<libc::can_filter> for CanFilter {
    fn as_ref(&self) -> &libc::can_filter {
        &self.0
    }
}

// ===== Options =====

/// The options of a raw CAN socket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RawOption {
    /// The array of receive filters
    CanFilter,
    /// The error classes reported as error frames
    ErrorFilterMask,
    /// Whether frames sent are looped back to other sockets
    Loopback,
    /// Whether the socket receives the frames it sent itself
    ReceiveOwnMessages,
    /// Whether CAN FD frames can be sent and received
    FdFrames,
}

impl RawOption {
    /// All the options, in the order they are pushed to the kernel.
    pub const ALL: [RawOption; 5] = [
        RawOption::CanFilter,
        RawOption::ErrorFilterMask,
        RawOption::Loopback,
        RawOption::ReceiveOwnMessages,
        RawOption::FdFrames,
    ];
}

/// A value for one of the raw CAN socket options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOptionValue {
    /// The receive filters. Empty drops every frame.
    CanFilter(Vec<CanFilter>),
    /// The error classes to receive
    ErrorFilterMask(ErrorClass),
    /// Loopback on/off
    Loopback(bool),
    /// Own messages on/off
    ReceiveOwnMessages(bool),
    /// FD frames on/off
    FdFrames(bool),
}

impl RawOptionValue {
    /// The option the value is for
    pub fn option(&self) -> RawOption {
        use RawOptionValue::*;
        match self {
            CanFilter(_) => RawOption::CanFilter,
            ErrorFilterMask(_) => RawOption::ErrorFilterMask,
            Loopback(_) => RawOption::Loopback,
            ReceiveOwnMessages(_) => RawOption::ReceiveOwnMessages,
            FdFrames(_) => RawOption::FdFrames,
        }
    }
}

// ===== RawProtocol =====

/// The raw CAN hooks of the socket engine, and its option cache.
#[derive(Debug, Clone)]
pub struct RawProtocol {
    filters: Vec<CanFilter>,
    error_mask: ErrorClass,
    loopback: bool,
    recv_own_msgs: bool,
    fd_frames: bool,
    ifname: String,
}

impl Default for RawProtocol {
    fn default() -> Self {
        Self {
            filters: vec![CanFilter::default()],
            error_mask: ErrorClass::empty(),
            loopback: true,
            recv_own_msgs: false,
            fd_frames: false,
            ifname: String::new(),
        }
    }
}

impl RawProtocol {
    /// The cached value of an option
    pub fn value(&self, option: RawOption) -> RawOptionValue {
        match option {
            RawOption::CanFilter => RawOptionValue::CanFilter(self.filters.clone()),
            RawOption::ErrorFilterMask => RawOptionValue::ErrorFilterMask(self.error_mask),
            RawOption::Loopback => RawOptionValue::Loopback(self.loopback),
            RawOption::ReceiveOwnMessages => RawOptionValue::ReceiveOwnMessages(self.recv_own_msgs),
            RawOption::FdFrames => RawOptionValue::FdFrames(self.fd_frames),
        }
    }

    // Stores a value, telling whether it differs from the old one.
    fn cache(&mut self, value: RawOptionValue) -> bool {
        fn update<T: PartialEq>(slot: &mut T, val: T) -> bool {
            if *slot == val {
                return false;
            }
            *slot = val;
            true
        }

        match value {
            RawOptionValue::CanFilter(v) => update(&mut self.filters, v),
            RawOptionValue::ErrorFilterMask(v) => update(&mut self.error_mask, v),
            RawOptionValue::Loopback(v) => update(&mut self.loopback, v),
            RawOptionValue::ReceiveOwnMessages(v) => update(&mut self.recv_own_msgs, v),
            RawOptionValue::FdFrames(v) => update(&mut self.fd_frames, v),
        }
    }

    // Sets the option on the kernel socket.
    fn push(
        &self,
        io: &mut dyn Transport,
        value: &RawOptionValue,
    ) -> std::result::Result<(), SocketErrorInfo> {
        match value {
            RawOptionValue::CanFilter(filters) => {
                io.set_socket_option_mult(SOL_CAN_RAW, CAN_RAW_FILTER, filters)?
            }
            RawOptionValue::ErrorFilterMask(mask) => {
                io.set_socket_option(SOL_CAN_RAW, CAN_RAW_ERR_FILTER, &mask.bits())?
            }
            RawOptionValue::Loopback(on) => {
                io.set_socket_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, &c_int::from(*on))?
            }
            RawOptionValue::ReceiveOwnMessages(on) => {
                io.set_socket_option(SOL_CAN_RAW, CAN_RAW_RECV_OWN_MSGS, &c_int::from(*on))?
            }
            RawOptionValue::FdFrames(on) => {
                // bound to all interfaces, there's no single link to check
                if *on && !self.ifname.is_empty() {
                    let mtu = io.interface_mtu(&self.ifname)?;
                    if mtu != CANFD_MTU {
                        return Err(SocketErrorInfo::with_message(
                            SocketError::UnsupportedOperation,
                            "Device doesn't support flexible data rate frames",
                        ));
                    }
                }
                io.set_socket_option(SOL_CAN_RAW, CAN_RAW_FD_FRAMES, &c_int::from(*on))?
            }
        }
        Ok(())
    }

    /// The size of the frames read from the kernel
    fn frame_size(&self) -> usize {
        if self.fd_frames {
            CANFD_MTU
        } else {
            CAN_MTU
        }
    }
}

impl Protocol for RawProtocol {
    type OptionId = RawOption;

    fn socket_type(&self) -> SocketType {
        SocketType::Raw
    }

    fn read_chunk_size(&self) -> usize {
        RAW_READ_CHUNK_SIZE
    }

    fn initial_buffer_size(&self) -> usize {
        RAW_INITIAL_BUFFER_SIZE
    }

    fn connect(
        &mut self,
        io: &mut dyn Transport,
        ifname: &str,
    ) -> std::result::Result<(), SocketErrorInfo> {
        io.open(SocketType::Raw)?;
        io.set_nonblocking(true)?;

        // an empty name binds to all the CAN interfaces
        let ifindex = if ifname.is_empty() {
            0
        } else {
            io.interface_index(ifname)?
        };
        self.ifname = ifname.to_string();

        for option in RawOption::ALL {
            let value = self.value(option);
            self.push(io, &value)?;
        }

        io.bind(&CanAddr::new(ifindex))?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.ifname.clear();
    }

    fn read_from_socket(&mut self, io: &mut dyn Transport, buf: &mut [u8]) -> IoResult<usize> {
        let frame_size = self.frame_size();
        let mut n = 0;

        while buf.len() - n >= frame_size {
            let frame = &mut buf[n..n + frame_size];
            let size = match io.read(frame) {
                Ok(0) => break,
                Ok(size) => size,
                Err(err) if err.should_retry() => break,
                // keep the frames that made it
                Err(_) if n > 0 => break,
                Err(err) => return Err(err),
            };

            if size != CAN_MTU && size != frame_size {
                return Err(IoError::new(
                    IoErrorKind::InvalidData,
                    format!("Unexpected CAN frame size: {}", size),
                ));
            }

            frame[RES0_OFFSET] = (size - FRAME_HEADER_SIZE) as u8;
            frame[RES1_OFFSET] = size as u8;
            n += size;
        }
        Ok(n)
    }

    fn write_to_socket(&mut self, io: &mut dyn Transport, buf: &[u8]) -> IoResult<usize> {
        let mut n = 0;

        while n < buf.len() {
            let rest = &buf[n..];
            let size = match frame_size_from_sentinels(rest) {
                Some(CAN_MTU) => CAN_MTU,
                Some(CANFD_MTU) if self.fd_frames => CANFD_MTU,
                _ => 0,
            };

            // anything but whole frames can never be written
            if size == 0 || rest.len() < size {
                if n > 0 {
                    break;
                }
                return Err(IoError::new(
                    IoErrorKind::InvalidData,
                    "Invalid CAN frame in the write buffer",
                ));
            }

            match io.write(&rest[..size]) {
                Ok(0) => break,
                Ok(written) if written == size => n += written,
                Ok(_) => {
                    return Err(IoError::new(IoErrorKind::WriteZero, "Incomplete CAN frame write"))
                }
                Err(err) if err.should_retry() || err.raw_os_error() == Some(libc::ENOBUFS) => {
                    break
                }
                Err(_) if n > 0 => break,
                Err(err) => return Err(err),
            }
        }
        Ok(n)
    }

    fn msg_size(&self) -> usize {
        self.frame_size()
    }
}

// ===== CanRawSocket =====

/// A buffered, non-blocking raw CAN socket.
pub type CanRawSocket = CanAbstractSocket<RawProtocol>;

impl CanRawSocket {
    /// Creates an unconnected raw socket.
    pub fn new() -> Self {
        Self::with_transport(Box::new(SysTransport::new()))
    }

    /// Creates an unconnected raw socket that makes its system calls
    /// through the transport.
    pub fn with_transport(io: Box<dyn Transport>) -> Self {
        Self::with_protocol(RawProtocol::default(), io)
    }

    /// Sets a socket option.
    ///
    /// Fails, with no side effects, if the value is for a different option
    /// or the kernel refuses it. A change notification is made if the
    /// value differs from the old one.
    pub fn set_socket_option(&mut self, option: RawOption, value: RawOptionValue) -> bool {
        if value.option() != option {
            self.set_error(SocketErrorInfo::with_message(
                SocketError::UnsupportedOperation,
                format!("Invalid value for the {:?} option", option),
            ));
            return false;
        }

        if self.state() == SocketState::Connected {
            let (proto, io) = self.protocol_and_transport();
            if let Err(err) = proto.push(io, &value) {
                debug!("Failed to set {:?}: {}", option, err);
                self.set_error(err);
                return false;
            }
        }

        if self.protocol_mut().cache(value) {
            self.emit(SocketEvent::OptionChanged(option));
        }
        true
    }

    /// Gets the current value of a socket option.
    pub fn socket_option(&self, option: RawOption) -> RawOptionValue {
        self.protocol().value(option)
    }

    /// Sets the receive filters.
    ///
    /// By default there is a single filter that accepts every frame. An
    /// empty array drops every frame.
    pub fn set_can_filter(&mut self, filters: &[CanFilter]) -> bool {
        self.set_socket_option(
            RawOption::CanFilter,
            RawOptionValue::CanFilter(filters.to_vec()),
        )
    }

    /// The receive filters
    pub fn can_filter(&self) -> &[CanFilter] {
        &self.protocol().filters
    }

    /// Sets the error classes that are received as error frames.
    pub fn set_error_filter_mask(&mut self, mask: ErrorClass) -> bool {
        self.set_socket_option(
            RawOption::ErrorFilterMask,
            RawOptionValue::ErrorFilterMask(mask),
        )
    }

    /// The error classes that are received as error frames
    pub fn error_filter_mask(&self) -> ErrorClass {
        self.protocol().error_mask
    }

    /// Enable or disable loopback.
    ///
    /// By default, loopback is enabled, causing other applications that open
    /// the same CAN bus to see frames emitted by different applications on
    /// the same system.
    pub fn set_loopback(&mut self, enabled: bool) -> bool {
        self.set_socket_option(RawOption::Loopback, RawOptionValue::Loopback(enabled))
    }

    /// Whether loopback is enabled
    pub fn loopback(&self) -> bool {
        self.protocol().loopback
    }

    /// Enable or disable receiving of own frames.
    ///
    /// When loopback is enabled, this settings controls if CAN frames sent
    /// are received back immediately by sender. Default is off.
    pub fn set_receive_own_messages(&mut self, enabled: bool) -> bool {
        self.set_socket_option(
            RawOption::ReceiveOwnMessages,
            RawOptionValue::ReceiveOwnMessages(enabled),
        )
    }

    /// Whether the socket receives its own frames
    pub fn receive_own_messages(&self) -> bool {
        self.protocol().recv_own_msgs
    }

    /// Enable or disable CAN FD frames.
    ///
    /// Enabling fails if the interface can't carry FD frames.
    pub fn set_fd_frames(&mut self, enabled: bool) -> bool {
        self.set_socket_option(RawOption::FdFrames, RawOptionValue::FdFrames(enabled))
    }

    /// Whether CAN FD frames are enabled
    pub fn fd_frames(&self) -> bool {
        self.protocol().fd_frames
    }

    /// Queues a frame to be written.
    pub fn write_frame(&mut self, frame: &CanFrame) -> Result<()> {
        match frame.frame_kind() {
            FrameKind::Unknown => return Err(ConstructionError::WrongFrameType.into()),
            FrameKind::Fd if !self.fd_frames() => {
                return Err(Error::Socket(SocketErrorInfo::with_message(
                    SocketError::UnsupportedOperation,
                    "FD frames are not enabled on the socket",
                )))
            }
            _ => (),
        }
        self.write_data(&frame.to_kernel_bytes())?;
        Ok(())
    }

    /// Takes the next frame out of the read buffer.
    ///
    /// Reports `WouldBlock` if no whole frame has been read yet.
    pub fn read_frame(&mut self) -> Result<CanFrame> {
        let mut hdr = [0u8; FRAME_HEADER_SIZE];
        if self.peek(&mut hdr) < FRAME_HEADER_SIZE {
            return Err(IoError::from(IoErrorKind::WouldBlock).into());
        }

        // whatever the sentinels say, a classic frame's worth is consumed
        let size = frame_size_from_sentinels(&hdr).unwrap_or(CAN_MTU);
        if self.bytes_available() < size {
            return Err(IoError::from(IoErrorKind::WouldBlock).into());
        }

        let mut buf = [0u8; CANFD_MTU];
        let n = self.read_data(&mut buf[..size]);
        CanFrame::from_kernel_bytes(&buf[..n])
            .map(|(frame, _)| frame)
            .ok_or_else(|| IoError::from(IoErrorKind::UnexpectedEof).into())
    }
}

impl Default for CanRawSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl embedded_can::nb::Can for CanRawSocket {
    type Frame = CanFrame;
    type Error = Error;

    /// Queues the frame and pushes out as much as the kernel takes.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        self.write_frame(frame).map_err(nb::Error::Other)?;
        self.flush();
        Ok(None)
    }

    /// Gets a frame, reading from the kernel if none is buffered.
    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        if self.bytes_available() < FRAME_HEADER_SIZE {
            self.handle_read_ready();
        }
        match self.read_frame() {
            Ok(frame) => Ok(frame),
            Err(Error::Io(err)) if err.should_retry() => Err(nb::Error::WouldBlock),
            Err(err) => Err(nb::Error::Other(err)),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        id::{CAN_EFF_FLAG, CAN_RTR_FLAG, CAN_SFF_MASK},
        socket::OpenMode,
        transport::mock::MockTransport,
    };
    use embedded_can::{nb::Can, StandardId};

    fn socket(mtu: usize) -> (CanRawSocket, MockTransport) {
        let mock = MockTransport::new();
        mock.add_interface("vcan0", 3, mtu);
        (CanRawSocket::with_transport(Box::new(mock.clone())), mock)
    }

    fn c_int_bytes(val: c_int) -> Vec<u8> {
        val.to_ne_bytes().to_vec()
    }

    #[test]
    fn test_defaults() {
        let (sock, _) = socket(CAN_MTU);
        assert_eq!(SocketType::Raw, sock.socket_type());
        assert_eq!(&[CanFilter::new(0, 0)], sock.can_filter());
        assert_eq!(ErrorClass::empty(), sock.error_filter_mask());
        assert!(sock.loopback());
        assert!(!sock.receive_own_messages());
        assert!(!sock.fd_frames());
    }

    #[test]
    fn test_connect_pushes_options() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.set_receive_own_messages(true));
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        assert_eq!(Some(SocketType::Raw), mock.open_type());
        assert!(mock.is_nonblocking());
        assert_eq!(Some(3), mock.bound().map(|addr| addr.ifindex()));

        let names: Vec<_> = mock.options().iter().map(|(_, name, _)| *name).collect();
        assert_eq!(
            vec![
                CAN_RAW_FILTER,
                CAN_RAW_ERR_FILTER,
                CAN_RAW_LOOPBACK,
                CAN_RAW_RECV_OWN_MSGS,
                CAN_RAW_FD_FRAMES
            ],
            names
        );
        assert_eq!(Some(vec![0u8; 8]), mock.option(SOL_CAN_RAW, CAN_RAW_FILTER));
        assert_eq!(Some(c_int_bytes(1)), mock.option(SOL_CAN_RAW, CAN_RAW_RECV_OWN_MSGS));
        assert_eq!(Some(c_int_bytes(0)), mock.option(SOL_CAN_RAW, CAN_RAW_FD_FRAMES));
    }

    #[test]
    fn test_connect_all_interfaces() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.set_fd_frames(true));
        assert!(sock.connect_to_interface("", OpenMode::READ_ONLY));
        assert_eq!(Some(0), mock.bound().map(|addr| addr.ifindex()));
    }

    #[test]
    fn test_no_such_device() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(!sock.connect_to_interface("can9", OpenMode::READ_WRITE));
        assert_eq!(SocketError::NoSuchDevice, sock.error());
        assert_eq!(SocketState::Unconnected, sock.state());
        assert!(!mock.is_open());
    }

    #[test]
    fn test_filter_round_trip() {
        let (mut sock, mock) = socket(CAN_MTU);
        let filters = [CanFilter::new(0x1ab, CAN_EFF_FLAG | CAN_RTR_FLAG | CAN_SFF_MASK)];

        assert!(sock.set_can_filter(&filters));
        assert_eq!(&filters, sock.can_filter());
        assert_eq!(
            RawOptionValue::CanFilter(filters.to_vec()),
            sock.socket_option(RawOption::CanFilter)
        );

        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        let bytes = mock.option(SOL_CAN_RAW, CAN_RAW_FILTER).unwrap();
        assert_eq!(8, bytes.len());
        assert_eq!(&0x1ab_u32.to_ne_bytes(), &bytes[..4]);
        assert_eq!(&filters, sock.can_filter());
    }

    #[test]
    fn test_option_change_events() {
        let (mut sock, _mock) = socket(CAN_MTU);
        let changes = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let ch = changes.clone();
        sock.set_event_handler(move |_, ev| {
            if let SocketEvent::OptionChanged(opt) = ev {
                ch.borrow_mut().push(*opt);
            }
        });

        assert!(sock.set_loopback(true));
        assert!(sock.set_loopback(false));
        assert!(sock.set_loopback(false));
        assert!(sock.set_error_filter_mask(ErrorClass::BUS_OFF));

        assert_eq!(
            vec![RawOption::Loopback, RawOption::ErrorFilterMask],
            *changes.borrow()
        );
    }

    #[test]
    fn test_option_kind_mismatch() {
        let (mut sock, _mock) = socket(CAN_MTU);
        assert!(!sock.set_socket_option(RawOption::Loopback, RawOptionValue::FdFrames(true)));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());
        assert!(sock.loopback());
        assert!(!sock.fd_frames());
    }

    #[test]
    fn test_option_refused_while_connected() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        mock.fail_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, libc::EINVAL);
        assert!(!sock.set_loopback(false));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());
        assert!(sock.loopback());

        assert!(sock.set_error_filter_mask(ErrorClass::ALL));
        assert_eq!(
            Some(ErrorClass::ALL.bits().to_ne_bytes().to_vec()),
            mock.option(SOL_CAN_RAW, CAN_RAW_ERR_FILTER)
        );
    }

    #[test]
    fn test_fd_needs_fd_link() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        assert!(!sock.set_fd_frames(true));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());
        assert_eq!(
            "Device doesn't support flexible data rate frames",
            sock.error_string()
        );
        assert!(!sock.fd_frames());
        assert_eq!(1, mock.option_count(SOL_CAN_RAW, CAN_RAW_FD_FRAMES));

        // cached while unconnected, checked on connect
        sock.close();
        assert!(sock.set_fd_frames(true));
        assert!(!sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());

        let (mut sock, _mock) = socket(CANFD_MTU);
        assert!(sock.set_fd_frames(true));
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        assert_eq!(CANFD_MTU, sock.protocol().msg_size());
    }

    #[test]
    fn test_read_marks_frames() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        let frame = CanFrame::with_data(StandardId::new(0x123).unwrap(), &[1, 2, 3]).unwrap();
        let mut raw = frame.to_kernel_bytes();
        // the kernel leaves the reserved bytes zeroed
        raw[RES0_OFFSET] = 0;
        raw[RES1_OFFSET] = 0;
        mock.push_read(raw.clone());
        mock.push_read(raw);

        assert!(sock.handle_read_ready());
        assert_eq!(2 * CAN_MTU, sock.bytes_available());

        assert_eq!(frame, sock.read_frame().unwrap());
        assert_eq!(frame, sock.read_frame().unwrap());
        assert!(sock.read_frame().is_err());
    }

    #[test]
    fn test_read_bad_size() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        mock.push_read(vec![0u8; 10]);
        assert!(!sock.handle_read_ready());
        assert_eq!(SocketError::ReadError, sock.error());
        assert_eq!(0, sock.bytes_available());
    }

    #[test]
    fn test_write_frames() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        let f1 = CanFrame::with_data(StandardId::new(0x100).unwrap(), &[0xAA]).unwrap();
        let f2 = CanFrame::remote(StandardId::new(0x101).unwrap());
        sock.write_frame(&f1).unwrap();
        sock.write_frame(&f2).unwrap();
        assert_eq!(2 * CAN_MTU, sock.bytes_to_write());

        assert!(sock.flush());
        let written = mock.written();
        assert_eq!(2, written.len());
        assert_eq!(f1.to_kernel_bytes(), written[0]);
        assert_eq!(f2.to_kernel_bytes(), written[1]);
    }

    #[test]
    fn test_write_fd_frame_needs_fd_mode() {
        let (mut sock, _mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        let mut frame = CanFrame::with_data(StandardId::new(0x100).unwrap(), &[1; 8]).unwrap();
        frame.to_fd_frame();
        assert!(sock.write_frame(&frame).is_err());
        assert_eq!(0, sock.bytes_to_write());
    }

    #[test]
    fn test_write_misclassified_buffer() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        sock.write_data(&[0u8; CAN_MTU]).unwrap();
        assert!(!sock.flush());
        assert_eq!(SocketError::WriteError, sock.error());
        assert!(mock.written().is_empty());
        assert_eq!(0, sock.bytes_to_write());
        assert!(!sock.is_write_notification_enabled());
    }

    #[test]
    fn test_write_stops_on_nobufs() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        let frame = CanFrame::with_data(StandardId::new(0x7ff).unwrap(), &[]).unwrap();
        sock.write_frame(&frame).unwrap();
        sock.write_frame(&frame).unwrap();

        mock.push_write_error(libc::ENOBUFS);
        assert!(sock.flush());
        assert_eq!(2 * CAN_MTU, sock.bytes_to_write());
        assert_eq!(SocketError::NoError, sock.error());

        assert!(sock.flush());
        assert_eq!(0, sock.bytes_to_write());
    }

    #[test]
    fn test_nb_can() {
        let (mut sock, mock) = socket(CAN_MTU);
        assert!(sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));

        assert!(matches!(sock.receive(), Err(nb::Error::WouldBlock)));

        let frame = CanFrame::with_data(StandardId::new(0x42).unwrap(), &[1, 2]).unwrap();
        assert_eq!(None, sock.transmit(&frame).unwrap());
        assert_eq!(vec![frame.to_kernel_bytes()], mock.written());

        mock.push_read(frame.to_kernel_bytes());
        assert_eq!(frame, sock.receive().unwrap());
    }
}
