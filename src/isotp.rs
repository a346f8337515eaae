// cansocket/src/isotp.rs
//
// ISO-TP (ISO 15765-2) transport sockets.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! ISO-TP sockets.
//!
//! The kernel's `CAN_ISOTP` protocol segments and reassembles payloads
//! larger than a single CAN frame over a pair of CAN IDs. A
//! [`CanIsoTpSocket`] sends to the `tx` ID and receives on the `rx` ID.
//! Each kernel read returns one whole payload, so the socket is a plain
//! byte stream and has no message size of its own.
//!
//! Both IDs have to be set before connecting. The IDs and the transport
//! options are bound to the kernel socket when it connects and can't be
//! changed afterwards.

use crate::{
    addr::CanAddr,
    constants::{
        CAN_ISOTP_DEFAULT_PAD_CONTENT, CAN_ISOTP_LL_OPTS, CAN_ISOTP_OPTS, CAN_ISOTP_RECV_FC,
        CAN_ISOTP_RX_STMIN, CAN_ISOTP_TX_STMIN, ISOTP_INITIAL_BUFFER_SIZE, ISOTP_MAX_PDU,
        ISOTP_READ_CHUNK_SIZE, SOL_CAN_ISOTP,
    },
    errors::{ConstructionError, SocketError, SocketErrorInfo},
    id::FdFlags,
    socket::{CanAbstractSocket, OpenMode, Protocol, SocketEvent, SocketState, SocketType},
    transport::{ShouldRetry, SysTransport, Transport},
    IoResult,
};
use bitflags::bitflags;
use embedded_can::Id;
use libc::{CANFD_MTU, CAN_MTU};
use log::debug;
use std::collections::VecDeque;

bitflags! {
    /// The ISO-TP behavior flags (`CAN_ISOTP_*` in `linux/can/isotp.h`).
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct IsoTpFlags: u32 {
        /// Listen only, don't send flow control frames
        const LISTEN_MODE = 0x0001;
        /// Use extended addressing
        const EXTEND_ADDR = 0x0002;
        /// Pad the transmitted frames
        const TX_PADDING = 0x0004;
        /// Expect padded received frames
        const RX_PADDING = 0x0008;
        /// Check the length of received padded frames
        const CHK_PAD_LEN = 0x0010;
        /// Check the padding bytes of received frames
        const CHK_PAD_DATA = 0x0020;
        /// Half duplex error state handling
        const HALF_DUPLEX = 0x0040;
        /// Ignore the stmin from received flow control frames
        const FORCE_TXSTMIN = 0x0080;
        /// Ignore consecutive frames that come in faster than stmin
        const FORCE_RXSTMIN = 0x0100;
        /// Use a different extended address for receiving
        const RX_EXT_ADDR = 0x0200;
    }
}

// ===== IsoTpOptions =====

/// The general ISO-TP options (`struct can_isotp_options`).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IsoTpOptions {
    flags: u32,
    frame_txtime: u32,
    ext_address: u8,
    txpad_content: u8,
    rxpad_content: u8,
    rx_ext_address: u8,
}

impl IsoTpOptions {
    /// Creates the options.
    pub fn new(
        flags: IsoTpFlags,
        frame_txtime: u32,
        ext_address: u8,
        txpad_content: u8,
        rxpad_content: u8,
        rx_ext_address: u8,
    ) -> Self {
        Self {
            flags: flags.bits(),
            frame_txtime,
            ext_address,
            txpad_content,
            rxpad_content,
            rx_ext_address,
        }
    }

    /// The behavior flags
    pub fn flags(&self) -> IsoTpFlags {
        IsoTpFlags::from_bits_truncate(self.flags)
    }

    /// Sets the behavior flags.
    pub fn set_flags(&mut self, flags: IsoTpFlags) {
        self.flags = flags.bits();
    }

    /// The time between two consecutive frames, in nanoseconds
    pub fn frame_txtime(&self) -> u32 {
        self.frame_txtime
    }

    /// Sets the time between two consecutive frames, in nanoseconds.
    pub fn set_frame_txtime(&mut self, nsecs: u32) {
        self.frame_txtime = nsecs;
    }

    /// The extended address, used with [`IsoTpFlags::EXTEND_ADDR`]
    pub fn ext_address(&self) -> u8 {
        self.ext_address
    }

    /// Sets the extended address.
    pub fn set_ext_address(&mut self, addr: u8) {
        self.ext_address = addr;
    }

    /// The padding byte of transmitted frames
    pub fn txpad_content(&self) -> u8 {
        self.txpad_content
    }

    /// Sets the padding byte of transmitted frames.
    pub fn set_txpad_content(&mut self, content: u8) {
        self.txpad_content = content;
    }

    /// The padding byte expected in received frames
    pub fn rxpad_content(&self) -> u8 {
        self.rxpad_content
    }

    /// Sets the padding byte expected in received frames.
    pub fn set_rxpad_content(&mut self, content: u8) {
        self.rxpad_content = content;
    }

    /// The receive extended address, used with [`IsoTpFlags::RX_EXT_ADDR`]
    pub fn rx_ext_address(&self) -> u8 {
        self.rx_ext_address
    }

    /// Sets the receive extended address.
    pub fn set_rx_ext_address(&mut self, addr: u8) {
        self.rx_ext_address = addr;
    }
}

impl Default for IsoTpOptions {
    fn default() -> Self {
        Self::new(
            IsoTpFlags::empty(),
            0,
            0,
            CAN_ISOTP_DEFAULT_PAD_CONTENT,
            CAN_ISOTP_DEFAULT_PAD_CONTENT,
            0,
        )
    }
}

// ===== FlowControlOptions =====

/// The flow control options sent to the peer (`struct can_isotp_fc_options`).
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FlowControlOptions {
    bs: u8,
    stmin: u8,
    wftmax: u8,
}

impl FlowControlOptions {
    /// Min separation time code for no delay
    pub const STMIN_0_MS: u8 = 0x00;
    /// Min separation time code for the longest delay, 127ms
    pub const STMIN_127_MS: u8 = 0x7F;
    /// Min separation time code for 100us
    pub const STMIN_100_US: u8 = 0xF1;
    /// Min separation time code for 900us
    pub const STMIN_900_US: u8 = 0xF9;

    /// Creates the options.
    ///
    /// `stmin` is a separation time code: 0x00-0x7F are milliseconds and
    /// 0xF1-0xF9 are 100-900 microseconds.
    pub fn new(bs: u8, stmin: u8, wftmax: u8) -> Self {
        Self { bs, stmin, wftmax }
    }

    /// The number of consecutive frames between flow control frames.
    /// Zero is no limit.
    pub fn block_size(&self) -> u8 {
        self.bs
    }

    /// The min separation time code
    pub fn stmin(&self) -> u8 {
        self.stmin
    }

    /// The max number of wait frames before giving up
    pub fn wftmax(&self) -> u8 {
        self.wftmax
    }
}

// ===== LinkLayerOptions =====

/// The data lengths an ISO-TP link can transmit with.
pub const TX_DATA_LENGTHS: [u8; 8] = [8, 12, 16, 20, 24, 32, 48, 64];

/// The link layer options (`struct can_isotp_ll_options`).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinkLayerOptions {
    mtu: u8,
    tx_dl: u8,
    tx_flags: u8,
}

impl LinkLayerOptions {
    /// Creates the options.
    ///
    /// The MTU selects classic (16) or FD (72) frames. The transmit data
    /// length must be one of the CAN FD lengths, and over 8 only on an FD
    /// link.
    pub fn new(mtu: usize, tx_dl: u8, tx_flags: FdFlags) -> Result<Self, ConstructionError> {
        let mtu = match mtu {
            CAN_MTU | CANFD_MTU => mtu as u8,
            _ => return Err(ConstructionError::InvalidDataLength),
        };
        if !TX_DATA_LENGTHS.contains(&tx_dl) {
            return Err(ConstructionError::InvalidDataLength);
        }
        if mtu as usize == CAN_MTU && tx_dl > 8 {
            return Err(ConstructionError::TooMuchData);
        }
        Ok(Self {
            mtu,
            tx_dl,
            tx_flags: tx_flags.bits(),
        })
    }

    /// Options for an FD link, sending frames of the data length.
    pub fn fd(tx_dl: u8, tx_flags: FdFlags) -> Result<Self, ConstructionError> {
        Self::new(CANFD_MTU, tx_dl, tx_flags)
    }

    /// The link MTU
    pub fn mtu(&self) -> usize {
        self.mtu as usize
    }

    /// The transmit data length
    pub fn tx_dl(&self) -> u8 {
        self.tx_dl
    }

    /// The FD flags of transmitted frames
    pub fn tx_flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.tx_flags)
    }
}

impl Default for LinkLayerOptions {
    fn default() -> Self {
        Self {
            mtu: CAN_MTU as u8,
            tx_dl: 8,
            tx_flags: 0,
        }
    }
}

// ===== Option ids and values =====

/// The options of an ISO-TP socket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IsoTpOption {
    /// The ID the socket sends to
    TxId,
    /// The ID the socket receives on
    RxId,
    /// The general ISO-TP options
    IsoTpOptions,
    /// The flow control options
    FlowControlOptions,
    /// Min separation time for transmitted frames, in nanoseconds
    TxMinSepTime,
    /// Min separation time for received frames, in nanoseconds
    RxMinSepTime,
    /// The link layer options
    LinkLayerOptions,
}

/// A value for one of the ISO-TP socket options.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IsoTpOptionValue {
    /// The transmit ID
    TxId(Id),
    /// The receive ID
    RxId(Id),
    /// General options
    IsoTpOptions(IsoTpOptions),
    /// Flow control options
    FlowControlOptions(FlowControlOptions),
    /// Transmit min separation time
    TxMinSepTime(u32),
    /// Receive min separation time
    RxMinSepTime(u32),
    /// Link layer options
    LinkLayerOptions(LinkLayerOptions),
}

impl IsoTpOptionValue {
    /// The option the value is for
    pub fn option(&self) -> IsoTpOption {
        use IsoTpOptionValue::*;
        match self {
            TxId(_) => IsoTpOption::TxId,
            RxId(_) => IsoTpOption::RxId,
            IsoTpOptions(_) => IsoTpOption::IsoTpOptions,
            FlowControlOptions(_) => IsoTpOption::FlowControlOptions,
            TxMinSepTime(_) => IsoTpOption::TxMinSepTime,
            RxMinSepTime(_) => IsoTpOption::RxMinSepTime,
            LinkLayerOptions(_) => IsoTpOption::LinkLayerOptions,
        }
    }
}

// ===== IsoTpProtocol =====

/// The ISO-TP hooks of the socket engine, and its addressing and options.
#[derive(Debug, Default, Clone)]
pub struct IsoTpProtocol {
    tx_id: Option<Id>,
    rx_id: Option<Id>,
    options: IsoTpOptions,
    fc_options: FlowControlOptions,
    tx_stmin: Option<u32>,
    rx_stmin: Option<u32>,
    ll_options: LinkLayerOptions,
    // lengths of the PDUs waiting in the write buffer
    queued: VecDeque<usize>,
}

impl IsoTpProtocol {
    /// The value of an option. The IDs and min separation times are `None`
    /// until set.
    pub fn value(&self, option: IsoTpOption) -> Option<IsoTpOptionValue> {
        use IsoTpOptionValue::*;
        match option {
            IsoTpOption::TxId => self.tx_id.map(TxId),
            IsoTpOption::RxId => self.rx_id.map(RxId),
            IsoTpOption::IsoTpOptions => Some(IsoTpOptions(self.options)),
            IsoTpOption::FlowControlOptions => Some(FlowControlOptions(self.fc_options)),
            IsoTpOption::TxMinSepTime => self.tx_stmin.map(TxMinSepTime),
            IsoTpOption::RxMinSepTime => self.rx_stmin.map(RxMinSepTime),
            IsoTpOption::LinkLayerOptions => Some(LinkLayerOptions(self.ll_options)),
        }
    }

    // Stores a value, telling whether it differs from the old one.
    fn cache(&mut self, value: IsoTpOptionValue) -> bool {
        fn update<T: PartialEq>(slot: &mut T, val: T) -> bool {
            if *slot == val {
                return false;
            }
            *slot = val;
            true
        }

        use IsoTpOptionValue::*;
        match value {
            TxId(id) => update(&mut self.tx_id, Some(id)),
            RxId(id) => update(&mut self.rx_id, Some(id)),
            IsoTpOptions(opts) => update(&mut self.options, opts),
            FlowControlOptions(opts) => update(&mut self.fc_options, opts),
            TxMinSepTime(t) => update(&mut self.tx_stmin, Some(t)),
            RxMinSepTime(t) => update(&mut self.rx_stmin, Some(t)),
            LinkLayerOptions(opts) => update(&mut self.ll_options, opts),
        }
    }
}

impl Protocol for IsoTpProtocol {
    type OptionId = IsoTpOption;

    fn socket_type(&self) -> SocketType {
        SocketType::IsoTp
    }

    fn read_chunk_size(&self) -> usize {
        ISOTP_READ_CHUNK_SIZE
    }

    fn initial_buffer_size(&self) -> usize {
        ISOTP_INITIAL_BUFFER_SIZE
    }

    fn connect(
        &mut self,
        io: &mut dyn Transport,
        ifname: &str,
    ) -> std::result::Result<(), SocketErrorInfo> {
        let (tx_id, rx_id) = match (self.tx_id, self.rx_id) {
            (Some(tx), Some(rx)) => (tx, rx),
            _ => {
                return Err(SocketErrorInfo::with_message(
                    SocketError::UnsupportedOperation,
                    "The transmit and receive IDs must be set before connecting",
                ))
            }
        };
        if ifname.is_empty() {
            return Err(SocketErrorInfo::with_message(
                SocketError::NoSuchDevice,
                "An ISO-TP socket needs an interface name",
            ));
        }

        self.queued.clear();
        io.open(SocketType::IsoTp)?;
        io.set_nonblocking(true)?;
        let ifindex = io.interface_index(ifname)?;

        io.set_socket_option(SOL_CAN_ISOTP, CAN_ISOTP_OPTS, &self.options)?;
        io.set_socket_option(SOL_CAN_ISOTP, CAN_ISOTP_RECV_FC, &self.fc_options)?;
        if let Some(nsecs) = self.tx_stmin {
            io.set_socket_option(SOL_CAN_ISOTP, CAN_ISOTP_TX_STMIN, &nsecs)?;
        }
        if let Some(nsecs) = self.rx_stmin {
            io.set_socket_option(SOL_CAN_ISOTP, CAN_ISOTP_RX_STMIN, &nsecs)?;
        }
        io.set_socket_option(SOL_CAN_ISOTP, CAN_ISOTP_LL_OPTS, &self.ll_options)?;

        io.bind(&CanAddr::new_isotp(ifindex, rx_id, tx_id))?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.queued.clear();
    }

    fn read_from_socket(&mut self, io: &mut dyn Transport, buf: &mut [u8]) -> IoResult<usize> {
        match io.read(buf) {
            Err(err) if err.should_retry() => Ok(0),
            res => res,
        }
    }

    fn write_to_socket(&mut self, io: &mut dyn Transport, buf: &[u8]) -> IoResult<usize> {
        // each write is sent as one PDU
        let len = self
            .queued
            .front()
            .copied()
            .unwrap_or(ISOTP_MAX_PDU)
            .min(buf.len());

        match io.write(&buf[..len]) {
            Ok(n) => {
                if let Some(front) = self.queued.front_mut() {
                    if n >= *front {
                        self.queued.pop_front();
                    } else {
                        *front -= n;
                    }
                }
                Ok(n)
            }
            Err(err) if err.should_retry() => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn msg_size(&self) -> usize {
        0
    }

    fn is_datagram(&self) -> bool {
        true
    }

    fn message_queued(&mut self, mut len: usize) {
        while len > 0 {
            let pdu = len.min(ISOTP_MAX_PDU);
            self.queued.push_back(pdu);
            len -= pdu;
        }
    }

    fn next_write_size(&self) -> usize {
        self.queued.front().copied().unwrap_or(0)
    }
}

// ===== CanIsoTpSocket =====

/// A buffered, non-blocking ISO-TP socket.
pub type CanIsoTpSocket = CanAbstractSocket<IsoTpProtocol>;

impl CanIsoTpSocket {
    /// Creates an unconnected ISO-TP socket with no IDs set.
    pub fn new() -> Self {
        Self::with_transport(Box::new(SysTransport::new()))
    }

    /// Creates an unconnected ISO-TP socket that makes its system calls
    /// through the transport.
    pub fn with_transport(io: Box<dyn Transport>) -> Self {
        Self::with_protocol(IsoTpProtocol::default(), io)
    }

    /// Sets the IDs and connects to the interface.
    pub fn connect_with_ids<T, R>(&mut self, ifname: &str, tx_id: T, rx_id: R, mode: OpenMode) -> bool
    where
        T: Into<Id>,
        R: Into<Id>,
    {
        self.set_tx_id(tx_id) && self.set_rx_id(rx_id) && self.connect_to_interface(ifname, mode)
    }

    /// Sets a socket option.
    ///
    /// Only allowed while unconnected. Fails, with no side effects, if the
    /// value is for a different option. A change notification is made if
    /// the value differs from the old one.
    pub fn set_socket_option(&mut self, option: IsoTpOption, value: IsoTpOptionValue) -> bool {
        if value.option() != option {
            self.set_error(SocketErrorInfo::with_message(
                SocketError::UnsupportedOperation,
                format!("Invalid value for the {:?} option", option),
            ));
            return false;
        }

        if self.state() != SocketState::Unconnected {
            debug!("Can't set {:?} on a connected ISO-TP socket", option);
            self.set_error(SocketErrorInfo::with_message(
                SocketError::UnsupportedOperation,
                "ISO-TP options can only be set while unconnected",
            ));
            return false;
        }

        if self.protocol_mut().cache(value) {
            self.emit(SocketEvent::OptionChanged(option));
        }
        true
    }

    /// Gets the value of a socket option, if it was set.
    pub fn socket_option(&self, option: IsoTpOption) -> Option<IsoTpOptionValue> {
        self.protocol().value(option)
    }

    /// Sets the ID the socket sends to.
    pub fn set_tx_id(&mut self, id: impl Into<Id>) -> bool {
        self.set_socket_option(IsoTpOption::TxId, IsoTpOptionValue::TxId(id.into()))
    }

    /// The ID the socket sends to
    pub fn tx_id(&self) -> Option<Id> {
        self.protocol().tx_id
    }

    /// Sets the ID the socket receives on.
    pub fn set_rx_id(&mut self, id: impl Into<Id>) -> bool {
        self.set_socket_option(IsoTpOption::RxId, IsoTpOptionValue::RxId(id.into()))
    }

    /// The ID the socket receives on
    pub fn rx_id(&self) -> Option<Id> {
        self.protocol().rx_id
    }

    /// Sets the general ISO-TP options.
    pub fn set_isotp_options(&mut self, opts: IsoTpOptions) -> bool {
        self.set_socket_option(IsoTpOption::IsoTpOptions, IsoTpOptionValue::IsoTpOptions(opts))
    }

    /// The general ISO-TP options
    pub fn isotp_options(&self) -> IsoTpOptions {
        self.protocol().options
    }

    /// Sets the flow control options.
    pub fn set_flow_control_options(&mut self, opts: FlowControlOptions) -> bool {
        self.set_socket_option(
            IsoTpOption::FlowControlOptions,
            IsoTpOptionValue::FlowControlOptions(opts),
        )
    }

    /// The flow control options
    pub fn flow_control_options(&self) -> FlowControlOptions {
        self.protocol().fc_options
    }

    /// Sets the min separation time of transmitted frames, in nanoseconds.
    pub fn set_tx_min_sep_time(&mut self, nsecs: u32) -> bool {
        self.set_socket_option(IsoTpOption::TxMinSepTime, IsoTpOptionValue::TxMinSepTime(nsecs))
    }

    /// The min separation time of transmitted frames, if set
    pub fn tx_min_sep_time(&self) -> Option<u32> {
        self.protocol().tx_stmin
    }

    /// Sets the min separation time of received frames, in nanoseconds.
    pub fn set_rx_min_sep_time(&mut self, nsecs: u32) -> bool {
        self.set_socket_option(IsoTpOption::RxMinSepTime, IsoTpOptionValue::RxMinSepTime(nsecs))
    }

    /// The min separation time of received frames, if set
    pub fn rx_min_sep_time(&self) -> Option<u32> {
        self.protocol().rx_stmin
    }

    /// Sets the link layer options.
    pub fn set_link_layer_options(&mut self, opts: LinkLayerOptions) -> bool {
        self.set_socket_option(
            IsoTpOption::LinkLayerOptions,
            IsoTpOptionValue::LinkLayerOptions(opts),
        )
    }

    /// The link layer options
    pub fn link_layer_options(&self) -> LinkLayerOptions {
        self.protocol().ll_options
    }
}

impl Default for CanIsoTpSocket {
    fn default() -> Self {
        Self::new()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{as_bytes, transport::mock::MockTransport};
    use embedded_can::{ExtendedId, StandardId};
    use std::{cell::RefCell, mem, rc::Rc};

    fn socket() -> (CanIsoTpSocket, MockTransport) {
        let mock = MockTransport::new();
        mock.add_interface("vcan0", 5, CAN_MTU);
        (CanIsoTpSocket::with_transport(Box::new(mock.clone())), mock)
    }

    fn std_id(id: u16) -> StandardId {
        StandardId::new(id).unwrap()
    }

    #[test]
    fn test_kernel_struct_sizes() {
        assert_eq!(12, mem::size_of::<IsoTpOptions>());
        assert_eq!(3, mem::size_of::<FlowControlOptions>());
        assert_eq!(3, mem::size_of::<LinkLayerOptions>());
    }

    #[test]
    fn test_defaults() {
        let (sock, _) = socket();
        assert_eq!(SocketType::IsoTp, sock.socket_type());
        assert_eq!(None, sock.tx_id());
        assert_eq!(None, sock.rx_id());

        let opts = sock.isotp_options();
        assert!(opts.flags().is_empty());
        assert_eq!(0xCC, opts.txpad_content());
        assert_eq!(0xCC, opts.rxpad_content());

        assert_eq!(FlowControlOptions::new(0, 0, 0), sock.flow_control_options());

        let ll = sock.link_layer_options();
        assert_eq!(CAN_MTU, ll.mtu());
        assert_eq!(8, ll.tx_dl());
        assert!(ll.tx_flags().is_empty());

        assert_eq!(None, sock.tx_min_sep_time());
        assert_eq!(None, sock.socket_option(IsoTpOption::TxId));
    }

    #[test]
    fn test_link_layer_validation() {
        assert!(LinkLayerOptions::new(CANFD_MTU, 64, FdFlags::BRS).is_ok());
        assert!(LinkLayerOptions::fd(12, FdFlags::empty()).is_ok());
        assert_eq!(
            Err(ConstructionError::InvalidDataLength),
            LinkLayerOptions::new(CANFD_MTU, 10, FdFlags::empty())
        );
        assert_eq!(
            Err(ConstructionError::InvalidDataLength),
            LinkLayerOptions::new(20, 8, FdFlags::empty())
        );
        assert_eq!(
            Err(ConstructionError::TooMuchData),
            LinkLayerOptions::new(CAN_MTU, 16, FdFlags::empty())
        );
    }

    #[test]
    fn test_connect_needs_ids() {
        let (mut sock, mock) = socket();
        assert!(!sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());
        assert_eq!(None, mock.open_type());

        assert!(sock.set_tx_id(std_id(0x0A)));
        assert!(!sock.connect_to_interface("vcan0", OpenMode::READ_WRITE));
        assert_eq!(SocketState::Unconnected, sock.state());
    }

    #[test]
    fn test_connect_needs_interface() {
        let (mut sock, _mock) = socket();
        assert!(!sock.connect_with_ids("", std_id(0x0A), std_id(0x01), OpenMode::READ_WRITE));
        assert_eq!(SocketError::NoSuchDevice, sock.error());
    }

    #[test]
    fn test_connect() {
        let (mut sock, mock) = socket();
        let fc = FlowControlOptions::new(8, FlowControlOptions::STMIN_100_US, 2);
        assert!(sock.set_flow_control_options(fc));
        assert!(sock.set_rx_min_sep_time(500_000));

        let rx = ExtendedId::new(0x18DA_F110).unwrap();
        assert!(sock.connect_with_ids("vcan0", std_id(0x7E0), rx, OpenMode::READ_WRITE));
        assert_eq!(SocketState::Connected, sock.state());

        assert_eq!(Some(SocketType::IsoTp), mock.open_type());
        assert!(mock.is_nonblocking());

        let names: Vec<_> = mock.options().iter().map(|(_, name, _)| *name).collect();
        assert_eq!(
            vec![CAN_ISOTP_OPTS, CAN_ISOTP_RECV_FC, CAN_ISOTP_RX_STMIN, CAN_ISOTP_LL_OPTS],
            names
        );
        assert_eq!(
            Some(as_bytes(&fc).to_vec()),
            mock.option(SOL_CAN_ISOTP, CAN_ISOTP_RECV_FC)
        );
        assert_eq!(
            Some(500_000u32.to_ne_bytes().to_vec()),
            mock.option(SOL_CAN_ISOTP, CAN_ISOTP_RX_STMIN)
        );

        let addr = mock.bound().unwrap();
        assert_eq!(CanAddr::new_isotp(5, rx, std_id(0x7E0)), addr);
    }

    #[test]
    fn test_options_locked_while_connected() {
        let (mut sock, _mock) = socket();
        assert!(sock.connect_with_ids("vcan0", std_id(0x0A), std_id(0x01), OpenMode::READ_WRITE));

        assert!(!sock.set_tx_id(std_id(0x0B)));
        assert_eq!(SocketError::UnsupportedOperation, sock.error());
        assert_eq!(Some(Id::Standard(std_id(0x0A))), sock.tx_id());

        assert!(!sock.set_link_layer_options(LinkLayerOptions::fd(64, FdFlags::BRS).unwrap()));
        assert_eq!(LinkLayerOptions::default(), sock.link_layer_options());

        sock.close();
        assert!(sock.set_tx_id(std_id(0x0B)));
    }

    #[test]
    fn test_option_events() {
        let (mut sock, _mock) = socket();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let ch = changes.clone();
        sock.set_event_handler(move |_, ev| {
            if let SocketEvent::OptionChanged(opt) = ev {
                ch.borrow_mut().push(*opt);
            }
        });

        assert!(sock.set_tx_id(std_id(0x0A)));
        assert!(sock.set_tx_id(std_id(0x0A)));
        assert!(sock.set_isotp_options(IsoTpOptions::default()));

        let mut opts = IsoTpOptions::default();
        opts.set_flags(IsoTpFlags::TX_PADDING | IsoTpFlags::RX_PADDING);
        assert!(sock.set_socket_option(
            IsoTpOption::IsoTpOptions,
            IsoTpOptionValue::IsoTpOptions(opts)
        ));

        assert!(!sock.set_socket_option(IsoTpOption::RxId, IsoTpOptionValue::TxMinSepTime(0)));

        assert_eq!(
            vec![IsoTpOption::TxId, IsoTpOption::IsoTpOptions],
            *changes.borrow()
        );
        assert_eq!(
            Some(IsoTpOptionValue::IsoTpOptions(opts)),
            sock.socket_option(IsoTpOption::IsoTpOptions)
        );
    }

    #[test]
    fn test_read_and_write() {
        let (mut sock, mock) = socket();
        assert!(sock.connect_with_ids("vcan0", std_id(0x0A), std_id(0x01), OpenMode::READ_WRITE));

        mock.push_read(&b"hello"[..]);
        mock.push_read(&b" world"[..]);
        assert!(sock.handle_read_ready());
        assert!(sock.handle_read_ready());
        assert_eq!(b"hello world".to_vec(), sock.read_all());

        sock.write_data(b"0123456789").unwrap();
        assert!(sock.flush());
        assert_eq!(vec![b"0123456789".to_vec()], mock.written());
    }

    #[test]
    fn test_write_splits_large_pdus() {
        let (mut sock, mock) = socket();
        assert!(sock.connect_with_ids("vcan0", std_id(0x0A), std_id(0x01), OpenMode::WRITE_ONLY));

        sock.write_data(&vec![0x55u8; ISOTP_MAX_PDU + 5]).unwrap();
        assert!(sock.flush());
        assert!(sock.flush());

        let written = mock.written();
        assert_eq!(2, written.len());
        assert_eq!(ISOTP_MAX_PDU, written[0].len());
        assert_eq!(5, written[1].len());
    }
}
