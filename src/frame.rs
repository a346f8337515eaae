// cansocket/src/frame.rs
//
// The CAN 2.0 / CAN FD frame value type and its stream codec.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! A [`CanFrame`] is a plain value holding everything that goes into the
//! kernel's `can_frame` or `canfd_frame`:
//!
//! ```text
//! offset  size  field
//!   0      4    ID word (29 bits of ID + EFF/RTR/ERR flags)
//!   4      1    data length
//!   5      1    FD flags (BRS, ESI)
//!   6      1    sentinel 0 (max data length: 8 or 64)
//!   7      1    sentinel 1 (MTU: 16 or 72)
//!   8     8/64  payload
//! ```
//!
//! The two sentinel bytes are reserved by the kernel and are used here to
//! tell classic frames apart from FD frames when they travel through a byte
//! stream. A frame whose sentinels don't name a known kind is unusable and
//! is turned into an error frame with the [`ErrorClass::UNKNOWN_FRAME`] bit.
//!
//! The frame kind is stored explicitly and is only changed by the kind
//! transitions ([`CanFrame::to_data_frame`] and friends), which always leave
//! the frame in the canonical state for the new kind.

use crate::{
    constants::{CANFD_MTU, CAN_MTU, RES0_OFFSET, RES1_OFFSET},
    errors::{ConstructionError, ParseError},
    id::{
        id_from_canid_t, id_from_raw, id_to_canid_t, ErrorClass, FdFlags, IdFlags, CANFD_MAX_DLEN,
        CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_MAX_DLEN, CAN_RTR_FLAG, CAN_SFF_MASK,
    },
};
use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id, StandardId};
use itertools::Itertools;
use libc::canid_t;
use std::{
    cmp::Ordering,
    fmt,
    io::{self, Read, Write},
    ops::{Index, IndexMut},
    str::FromStr,
};

/// Size of the frame header that precedes the payload.
pub const FRAME_HEADER_SIZE: usize = 8;

// ===== FrameKind =====

/// The kind of a CAN frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// A classic CAN 2.0 data frame, up to 8 bytes of payload
    Data,
    /// A CAN FD frame, up to 64 bytes of payload
    Fd,
    /// An error frame reported by the driver or the stack
    Error,
    /// A remote transmission request
    Rtr,
    /// An empty or unrecognized frame
    #[default]
    Unknown,
}

/// The identifier format of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    /// 11-bit identifier
    Standard,
    /// 29-bit identifier
    Extended,
}

/// Byte order of the multi-byte fields in the stream codec.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

impl ByteOrder {
    /// The byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }

    fn u32_to_bytes(&self, val: u32) -> [u8; 4] {
        match self {
            Self::BigEndian => val.to_be_bytes(),
            Self::LittleEndian => val.to_le_bytes(),
        }
    }

    fn u32_from_bytes(&self, buf: [u8; 4]) -> u32 {
        match self {
            Self::BigEndian => u32::from_be_bytes(buf),
            Self::LittleEndian => u32::from_le_bytes(buf),
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// Gets the payload capacity named by a pair of sentinel bytes, if they
/// name a known frame layout.
pub fn payload_len_from_sentinels(res0: u8, res1: u8) -> Option<usize> {
    match (res0 as usize, res1 as usize) {
        (CAN_MAX_DLEN, CAN_MTU) => Some(CAN_MAX_DLEN),
        (CANFD_MAX_DLEN, CANFD_MTU) => Some(CANFD_MAX_DLEN),
        _ => None,
    }
}

/// Gets the size of the kernel frame that starts a buffer, from its
/// sentinel bytes.
pub fn frame_size_from_sentinels(buf: &[u8]) -> Option<usize> {
    if buf.len() <= RES1_OFFSET {
        return None;
    }
    payload_len_from_sentinels(buf[RES0_OFFSET], buf[RES1_OFFSET])
        .map(|len| len + FRAME_HEADER_SIZE)
}

// ===== CanFrame =====

/// A CAN 2.0 or CAN FD frame.
///
/// Frames are plain values: cloning copies the whole frame and each copy can
/// be changed independently.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CanFrame {
    kind: FrameKind,
    id: canid_t,
    len: u8,
    flags: u8,
    res0: u8,
    res1: u8,
    data: [u8; CANFD_MAX_DLEN],
}

impl CanFrame {
    /// Creates an empty frame of the specified kind.
    pub fn new(kind: FrameKind) -> Self {
        let mut frame = Self::default();
        frame.set_frame_kind(kind);
        frame
    }

    /// Creates a data frame, or an FD frame if the payload doesn't fit in a
    /// classic frame.
    pub fn with_data(id: impl Into<Id>, data: &[u8]) -> Result<Self, ConstructionError> {
        let kind = match data.len() {
            n if n <= CAN_MAX_DLEN => FrameKind::Data,
            n if n <= CANFD_MAX_DLEN => FrameKind::Fd,
            _ => return Err(ConstructionError::TooMuchData),
        };
        let mut frame = Self::new(kind);
        frame.set_id_word(id_to_canid_t(id));
        frame.set_data(data)?;
        Ok(frame)
    }

    /// Creates a data frame from a raw numeric ID.
    ///
    /// IDs up to 0x7FF are standard, larger ones extended.
    pub fn from_raw_id(id: u32, data: &[u8]) -> Result<Self, ConstructionError> {
        let id = id_from_raw(id).ok_or(ConstructionError::IdTooLarge)?;
        Self::with_data(id, data)
    }

    /// Creates a remote frame for the ID.
    pub fn remote(id: impl Into<Id>) -> Self {
        let mut frame = Self::new(FrameKind::Rtr);
        frame.set_id_word(id_to_canid_t(id) | CAN_RTR_FLAG);
        frame
    }

    /// Resets the frame to the empty, unknown, state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether the frame is of a known kind
    pub fn is_valid(&self) -> bool {
        self.kind != FrameKind::Unknown
    }

    /// Whether the data length is zero
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the frame has no payload buffer at all.
    pub fn is_null(&self) -> bool {
        self.kind == FrameKind::Unknown
    }

    /// The kind of the frame
    pub fn frame_kind(&self) -> FrameKind {
        self.kind
    }

    /// Converts the frame to another kind.
    pub fn set_frame_kind(&mut self, kind: FrameKind) {
        use FrameKind::*;
        match kind {
            Data => self.to_data_frame(),
            Fd => self.to_fd_frame(),
            Error => self.to_error_frame(),
            Rtr => self.to_rtr_frame(),
            Unknown => self.clear(),
        }
    }

    /// Works out the frame kind from the length, sentinel bytes and flag
    /// bits, the way the kind is recognized on a byte stream.
    ///
    /// For any frame built through the kind transitions this agrees with
    /// [`frame_kind`](Self::frame_kind).
    pub fn derived_kind(&self) -> FrameKind {
        let len = self.len as usize;
        let err = self.id & CAN_ERR_FLAG != 0;
        let rtr = self.id & CAN_RTR_FLAG != 0;

        match payload_len_from_sentinels(self.res0, self.res1) {
            Some(CAN_MAX_DLEN) => match (err, rtr) {
                (false, false) if len <= CAN_MAX_DLEN => FrameKind::Data,
                (true, false) if len == CAN_MAX_DLEN => FrameKind::Error,
                (false, true) if len == 0 => FrameKind::Rtr,
                _ => FrameKind::Unknown,
            },
            Some(CANFD_MAX_DLEN) if !err && !rtr && len <= CANFD_MAX_DLEN => FrameKind::Fd,
            _ => FrameKind::Unknown,
        }
    }

    /// Whether this is a classic data frame
    pub fn is_data_frame(&self) -> bool {
        self.kind == FrameKind::Data
    }

    /// Whether this is an FD frame
    pub fn is_fd_frame(&self) -> bool {
        self.kind == FrameKind::Fd
    }

    /// Whether this is an error frame
    pub fn is_error_frame(&self) -> bool {
        self.kind == FrameKind::Error
    }

    /// Whether this is a remote request frame
    pub fn is_rtr_frame(&self) -> bool {
        self.kind == FrameKind::Rtr
    }

    fn set_sentinels(&mut self, mtu: usize) {
        let (res0, res1) = match mtu {
            CANFD_MTU => (CANFD_MAX_DLEN, CANFD_MTU),
            _ => (CAN_MAX_DLEN, CAN_MTU),
        };
        self.res0 = res0 as u8;
        self.res1 = res1 as u8;
    }

    fn truncate_payload(&mut self, max: usize) {
        self.data[max..].fill(0);
    }

    /// Converts the frame into a classic data frame.
    ///
    /// The length is cut down to 8 bytes, the RTR and error flags and the FD
    /// flags are cleared.
    pub fn to_data_frame(&mut self) {
        self.len = self.len.min(CAN_MAX_DLEN as u8);
        self.flags = 0;
        self.id &= !(CAN_RTR_FLAG | CAN_ERR_FLAG);
        self.set_sentinels(CAN_MTU);
        self.truncate_payload(CAN_MAX_DLEN);
        self.kind = FrameKind::Data;
    }

    /// Converts the frame into an FD frame.
    ///
    /// The length and payload are kept, the RTR and error flags cleared.
    pub fn to_fd_frame(&mut self) {
        self.len = self.len.min(CANFD_MAX_DLEN as u8);
        self.id &= !(CAN_RTR_FLAG | CAN_ERR_FLAG);
        self.set_sentinels(CANFD_MTU);
        self.kind = FrameKind::Fd;
    }

    /// Converts the frame into an error frame, which always has a length
    /// of 8.
    pub fn to_error_frame(&mut self) {
        self.len = CAN_MAX_DLEN as u8;
        self.flags = 0;
        self.id = (self.id & !CAN_RTR_FLAG) | CAN_ERR_FLAG;
        self.set_sentinels(CAN_MTU);
        self.truncate_payload(CAN_MAX_DLEN);
        self.kind = FrameKind::Error;
    }

    /// Converts the frame into a remote request frame, which carries no
    /// data.
    pub fn to_rtr_frame(&mut self) {
        self.len = 0;
        self.flags = 0;
        self.id = (self.id & !CAN_ERR_FLAG) | CAN_RTR_FLAG;
        self.set_sentinels(CAN_MTU);
        self.truncate_payload(0);
        self.kind = FrameKind::Rtr;
    }

    /// The largest data length for the frame's kind.
    ///
    /// This is 8 for classic data and error frames, 64 for FD frames and
    /// zero for remote and unknown frames.
    pub fn max_data_length(&self) -> usize {
        use FrameKind::*;
        match self.kind {
            Data | Error => CAN_MAX_DLEN,
            Fd => CANFD_MAX_DLEN,
            Rtr | Unknown => 0,
        }
    }

    /// The size of the frame in the kernel layout, or zero if unknown.
    pub fn max_data_transfer_unit(&self) -> usize {
        use FrameKind::*;
        match self.kind {
            Data | Error | Rtr => CAN_MTU,
            Fd => CANFD_MTU,
            Unknown => 0,
        }
    }

    /// Gets the 29-bit CAN ID, without flags.
    pub fn can_id(&self) -> canid_t {
        self.id & CAN_EFF_MASK
    }

    /// Sets the 29-bit CAN ID, keeping the flags.
    pub fn set_can_id(&mut self, id: canid_t) {
        self.id = (self.id & !CAN_EFF_MASK) | (id & CAN_EFF_MASK);
    }

    /// Gets the full 32-bit ID word, including the flags.
    pub fn id_word(&self) -> canid_t {
        self.id
    }

    /// Sets the full 32-bit ID word, including the flags.
    ///
    /// This does not change the frame kind.
    pub fn set_id_word(&mut self, id: canid_t) {
        self.id = id;
    }

    /// Gets the flag bits of the ID word.
    pub fn id_flags(&self) -> IdFlags {
        IdFlags::from_bits_truncate(self.id)
    }

    /// Gets the embedded_can ID of the frame, if the ID fits its format.
    pub fn embedded_id(&self) -> Option<Id> {
        id_from_canid_t(self.id)
    }

    /// The identifier format
    pub fn frame_format(&self) -> FrameFormat {
        if self.id & CAN_EFF_FLAG != 0 {
            FrameFormat::Extended
        } else {
            FrameFormat::Standard
        }
    }

    /// Sets the identifier format, which toggles the EFF flag.
    pub fn set_frame_format(&mut self, format: FrameFormat) {
        match format {
            FrameFormat::Extended => self.id |= CAN_EFF_FLAG,
            FrameFormat::Standard => self.id &= !CAN_EFF_FLAG,
        }
    }

    /// Whether the frame uses a 29-bit identifier
    pub fn is_extended(&self) -> bool {
        self.frame_format() == FrameFormat::Extended
    }

    /// The data length, in bytes
    pub fn data_length(&self) -> usize {
        self.len as usize
    }

    /// Sets the data length.
    ///
    /// Fails for unknown, remote and error frames, unless the length is
    /// unchanged, and for lengths over the kind's maximum. Bytes exposed by
    /// growing the length keep whatever the payload buffer held.
    pub fn set_data_length(&mut self, len: usize) -> bool {
        if !self.is_valid() {
            false
        } else if self.data_length() == len {
            true
        } else if self.is_rtr_frame() || self.is_error_frame() {
            false
        } else if len <= self.max_data_length() {
            self.len = len as u8;
            true
        } else {
            false
        }
    }

    /// The payload, `data_length()` bytes long
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_length()]
    }

    /// The payload as a mutable slice, `data_length()` bytes long
    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.data_length();
        &mut self.data[..len]
    }

    /// Replaces the payload, adjusting the data length to match.
    ///
    /// Error frames keep their fixed length and take up to 8 bytes; remote
    /// frames only accept an empty payload.
    pub fn set_data(&mut self, data: &[u8]) -> Result<(), ConstructionError> {
        use FrameKind::*;
        let n = data.len();
        match self.kind {
            Unknown => return Err(ConstructionError::WrongFrameType),
            Rtr if n > 0 => return Err(ConstructionError::WrongFrameType),
            _ if n > self.max_data_length() => return Err(ConstructionError::TooMuchData),
            _ => (),
        }

        let max = self.max_data_length();
        self.data[..n].copy_from_slice(data);
        self.data[n..max].fill(0);
        if self.kind != Error {
            self.len = n as u8;
        }
        Ok(())
    }

    /// Gets the error classes carried by an error frame.
    ///
    /// This is empty for any other kind of frame.
    pub fn error(&self) -> ErrorClass {
        if self.is_error_frame() {
            ErrorClass::from_bits_truncate(self.can_id())
        } else {
            ErrorClass::empty()
        }
    }

    /// Gets the FD flags.
    pub fn fd_flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags)
    }

    /// Sets the FD flags. Only FD frames carry flags.
    pub fn set_fd_flags(&mut self, flags: FdFlags) -> bool {
        if self.is_fd_frame() {
            self.flags = flags.bits();
            true
        } else {
            false
        }
    }

    /// Whether the payload was sent with the bit rate switch
    pub fn is_brs(&self) -> bool {
        self.fd_flags().contains(FdFlags::BRS)
    }

    /// Sets the bit rate switch flag of an FD frame.
    pub fn set_brs(&mut self, on: bool) -> bool {
        let mut flags = self.fd_flags();
        flags.set(FdFlags::BRS, on);
        self.set_fd_flags(flags)
    }

    /// Whether the sender was error passive
    pub fn is_esi(&self) -> bool {
        self.fd_flags().contains(FdFlags::ESI)
    }

    /// Sets the error state indicator flag of an FD frame.
    pub fn set_esi(&mut self, on: bool) -> bool {
        let mut flags = self.fd_flags();
        flags.set(FdFlags::ESI, on);
        self.set_fd_flags(flags)
    }

    /// Compares frames by their 29-bit CAN ID, ignoring the flags.
    pub fn cmp_can_id(&self, other: &Self) -> Ordering {
        self.can_id().cmp(&other.can_id())
    }

    // ===== Codec =====

    /// Rebuilds a frame from a header, taking the kind from the sentinel
    /// bytes and flags. Returns the frame and the payload capacity, or
    /// `None` if the header doesn't describe a usable frame.
    fn from_header(hdr: &[u8; FRAME_HEADER_SIZE], order: ByteOrder) -> (Self, Option<usize>) {
        let mut frame = Self {
            id: order.u32_from_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]),
            len: hdr[4],
            flags: hdr[5],
            res0: hdr[RES0_OFFSET],
            res1: hdr[RES1_OFFSET],
            ..Self::default()
        };

        let cap = payload_len_from_sentinels(frame.res0, frame.res1)
            .filter(|&cap| frame.data_length() <= cap);

        frame.kind = frame.derived_kind();
        (frame, cap)
    }

    /// Turns a frame that couldn't be recognized into an error frame
    /// reporting an unknown frame.
    fn into_unknown_error(mut self) -> Self {
        self.kind = FrameKind::Unknown;
        self.data = [0; CANFD_MAX_DLEN];
        self.set_can_id(ErrorClass::UNKNOWN_FRAME.bits());
        self.to_error_frame();
        self
    }

    fn header(&self, order: ByteOrder) -> [u8; FRAME_HEADER_SIZE] {
        let id = order.u32_to_bytes(self.id);
        [
            id[0], id[1], id[2], id[3], self.len, self.flags, self.res0, self.res1,
        ]
    }

    /// Writes the frame to a byte stream.
    ///
    /// The header (ID word, length, flags and the two sentinel bytes) is
    /// followed by exactly `data_length()` payload bytes. An invalid frame
    /// writes nothing.
    pub fn encode<W: Write>(&self, out: &mut W, order: ByteOrder) -> io::Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        out.write_all(&self.header(order))?;
        out.write_all(self.data())
    }

    /// Gets the stream encoding of the frame.
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.data_length());
        // writing to a Vec can't fail
        let _ = self.encode(&mut buf, order);
        buf
    }

    /// Reads a frame from a byte stream.
    ///
    /// If the sentinel bytes don't describe a known frame layout, or the
    /// length doesn't fit it, no payload is read and the result is an error
    /// frame carrying [`ErrorClass::UNKNOWN_FRAME`].
    pub fn decode<R: Read>(input: &mut R, order: ByteOrder) -> io::Result<Self> {
        let mut hdr = [0u8; FRAME_HEADER_SIZE];
        input.read_exact(&mut hdr)?;

        let (mut frame, cap) = Self::from_header(&hdr, order);
        if cap.is_none() {
            return Ok(frame.into_unknown_error());
        }

        let len = frame.data_length();
        input.read_exact(&mut frame.data[..len])?;

        if frame.kind == FrameKind::Unknown {
            return Ok(frame.into_unknown_error());
        }
        Ok(frame)
    }

    /// Gets the frame in the kernel's `can_frame`/`canfd_frame` layout,
    /// with the sentinel bytes filled in. Empty for an invalid frame.
    pub fn to_kernel_bytes(&self) -> Vec<u8> {
        let mtu = self.max_data_transfer_unit();
        if mtu == 0 {
            return Vec::new();
        }
        let mut buf = vec![0u8; mtu];
        buf[..FRAME_HEADER_SIZE].copy_from_slice(&self.header(ByteOrder::native()));
        buf[FRAME_HEADER_SIZE..].copy_from_slice(&self.data[..mtu - FRAME_HEADER_SIZE]);
        buf
    }

    /// Rebuilds a frame from the kernel layout, as produced by
    /// [`to_kernel_bytes`](Self::to_kernel_bytes) or read from a raw socket.
    ///
    /// Returns the frame and the number of bytes it took up, or `None` if
    /// the buffer doesn't hold a whole frame.
    pub fn from_kernel_bytes(buf: &[u8]) -> Option<(Self, usize)> {
        let mut hdr = [0u8; FRAME_HEADER_SIZE];
        hdr.copy_from_slice(buf.get(..FRAME_HEADER_SIZE)?);

        let (mut frame, cap) = Self::from_header(&hdr, ByteOrder::native());
        let size = FRAME_HEADER_SIZE
            + payload_len_from_sentinels(frame.res0, frame.res1).unwrap_or(CAN_MAX_DLEN);
        let payload = buf.get(FRAME_HEADER_SIZE..size)?;

        if cap.is_none() || frame.kind == FrameKind::Unknown {
            return Some((frame.into_unknown_error(), size));
        }
        frame.data[..payload.len()].copy_from_slice(payload);
        frame.truncate_payload(frame.max_data_length());
        Some((frame, size))
    }
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            kind: FrameKind::Unknown,
            id: 0,
            len: 0,
            flags: 0,
            res0: 0,
            res1: 0,
            data: [0; CANFD_MAX_DLEN],
        }
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CanFrame {{ kind: {:?}, ", self.kind)?;
        write!(f, "id: 0x{:X}, ", self.can_id())?;
        write!(f, "flags: {:?}, ", self.id_flags())?;
        write!(f, "len: {}, ", self.len)?;
        write!(f, "data: {:02X?} }}", self.data())
    }
}

impl fmt::UpperHex for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:X}#", self.can_id())?;
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(" "))
    }
}

/// Formats the frame the way candump shows it on its command line:
/// `123#11223344`, `12345678#R`, `123##1AABB` (FD, flags nibble first).
impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_extended() || self.is_error_frame() {
            write!(f, "{:08X}", self.can_id())?;
        } else {
            write!(f, "{:03X}", self.can_id())?;
        }

        use FrameKind::*;
        match self.kind {
            Data | Error => write!(f, "#{}", hex::encode_upper(self.data())),
            Fd => write!(f, "##{:X}{}", self.flags & 0x0F, hex::encode_upper(self.data())),
            Rtr => write!(f, "#R"),
            Unknown => write!(f, "#?"),
        }
    }
}

/// Parses a frame in candump's command-line form, as printed by
/// [`Display`](fmt::Display).
///
/// An ID longer than three hex digits is taken as an extended ID.
impl FromStr for CanFrame {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id_str, rest) = s.trim().split_once('#').ok_or(ParseError::MissingSeparator)?;

        let raw_id = canid_t::from_str_radix(id_str, 16).map_err(|_| ParseError::InvalidId)?;
        let id: Id = if id_str.len() > 3 {
            ExtendedId::new(raw_id).ok_or(ParseError::InvalidId)?.into()
        } else if raw_id <= CAN_SFF_MASK {
            StandardId::new(raw_id as u16).ok_or(ParseError::InvalidId)?.into()
        } else {
            return Err(ParseError::InvalidId);
        };

        if rest.eq_ignore_ascii_case("r") {
            return Ok(Self::remote(id));
        }

        if let Some(fd) = rest.strip_prefix('#') {
            let mut chars = fd.chars();
            let flags = chars
                .next()
                .and_then(|c| c.to_digit(16))
                .ok_or(ParseError::InvalidData)?;
            let data = hex::decode(chars.as_str()).map_err(|_| ParseError::InvalidData)?;

            let mut frame = Self::new(FrameKind::Fd);
            frame.set_id_word(id_to_canid_t(id));
            frame.set_data(&data)?;
            frame.set_fd_flags(FdFlags::from_bits_truncate(flags as u8));
            return Ok(frame);
        }

        let data = hex::decode(rest).map_err(|_| ParseError::InvalidData)?;
        let mut frame = Self::new(FrameKind::Data);
        frame.set_id_word(id_to_canid_t(id));
        frame.set_data(&data)?;
        Ok(frame)
    }
}

impl Index<usize> for CanFrame {
    type Output = u8;

    fn index(&self, idx: usize) -> &u8 {
        &self.data()[idx]
    }
}

impl IndexMut<usize> for CanFrame {
    fn index_mut(&mut self, idx: usize) -> &mut u8 {
        &mut self.data_mut()[idx]
    }
}

impl EmbeddedFrame for CanFrame {
    /// Create a new data frame. Payloads over 8 bytes give an FD frame.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::with_data(id, data).ok()
    }

    /// Create a new remote frame
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc <= CAN_MAX_DLEN {
            Some(Self::remote(id))
        } else {
            None
        }
    }

    fn is_extended(&self) -> bool {
        CanFrame::is_extended(self)
    }

    fn is_remote_frame(&self) -> bool {
        self.is_rtr_frame()
    }

    fn id(&self) -> Id {
        self.embedded_id().unwrap_or(Id::Standard(StandardId::ZERO))
    }

    fn dlc(&self) -> usize {
        match self.data_length() {
            n if n <= CAN_MAX_DLEN => n,
            n if n <= 24 => 0x08 + (n - 9) / 4 + 1,
            n if n <= 32 => 0x0D,
            n if n <= 48 => 0x0E,
            _ => 0x0F,
        }
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &[u8] = &[0x11, 0x22, 0x33, 0x44];
    const FD_DATA: &[u8] = &[0xAB; 32];

    const ALL_KINDS: [FrameKind; 4] = [
        FrameKind::Data,
        FrameKind::Fd,
        FrameKind::Error,
        FrameKind::Rtr,
    ];

    fn predicates(frame: &CanFrame) -> [bool; 4] {
        [
            frame.is_data_frame(),
            frame.is_fd_frame(),
            frame.is_error_frame(),
            frame.is_rtr_frame(),
        ]
    }

    #[test]
    fn test_defaults() {
        let frame = CanFrame::default();

        assert!(!frame.is_valid());
        assert!(frame.is_null());
        assert!(frame.is_empty());
        assert_eq!(FrameKind::Unknown, frame.frame_kind());
        assert_eq!(FrameKind::Unknown, frame.derived_kind());
        assert_eq!(0, frame.id_word());
        assert_eq!(0, frame.max_data_length());
        assert_eq!(0, frame.max_data_transfer_unit());
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_new_kinds() {
        let frame = CanFrame::new(FrameKind::Data);
        assert!(frame.is_data_frame());
        assert_eq!(CAN_MAX_DLEN, frame.max_data_length());
        assert_eq!(CAN_MTU, frame.max_data_transfer_unit());

        let frame = CanFrame::new(FrameKind::Fd);
        assert!(frame.is_fd_frame());
        assert_eq!(CANFD_MAX_DLEN, frame.max_data_length());
        assert_eq!(CANFD_MTU, frame.max_data_transfer_unit());

        let frame = CanFrame::new(FrameKind::Error);
        assert!(frame.is_error_frame());
        assert_eq!(CAN_MAX_DLEN, frame.data_length());

        let frame = CanFrame::new(FrameKind::Rtr);
        assert!(frame.is_rtr_frame());
        assert_eq!(0, frame.data_length());
        assert!(frame.id_flags().contains(IdFlags::RTR));
    }

    #[test]
    fn test_transitions_leave_one_kind() {
        for from in ALL_KINDS {
            for to in ALL_KINDS {
                let mut frame = CanFrame::new(from);
                frame.set_can_id(0x1AB);
                if frame.set_data_length(frame.max_data_length()) {
                    let max = frame.max_data_length();
                    frame.data_mut()[..max].fill(0x55);
                }

                frame.set_frame_kind(to);

                assert_eq!(to, frame.frame_kind(), "{:?} -> {:?}", from, to);
                assert_eq!(to, frame.derived_kind(), "{:?} -> {:?}", from, to);
                assert_eq!(1, predicates(&frame).iter().filter(|&&p| p).count());
                assert!(frame.data_length() <= frame.max_data_length());
                assert_eq!(0x1AB, frame.can_id());
            }
        }
    }

    #[test]
    fn test_transitions_idempotent() {
        for kind in ALL_KINDS {
            let mut frame = CanFrame::new(kind);
            frame.set_can_id(0x123);
            let once = frame.clone();
            frame.set_frame_kind(kind);
            assert_eq!(once, frame);
        }
    }

    #[test]
    fn test_fd_to_data_truncates() {
        let mut frame = CanFrame::with_data(StandardId::new(0x100).unwrap(), FD_DATA).unwrap();
        assert!(frame.is_fd_frame());
        assert!(frame.set_brs(true));

        frame.to_data_frame();
        assert_eq!(CAN_MAX_DLEN, frame.data_length());
        assert_eq!(&FD_DATA[..8], frame.data());
        assert!(!frame.is_brs());

        // growing back to FD doesn't resurrect the old payload
        frame.to_fd_frame();
        assert!(frame.set_data_length(16));
        assert_eq!(&[0u8; 8], &frame.data()[8..]);
    }

    #[test]
    fn test_set_data_length() {
        let mut frame = CanFrame::default();
        assert!(!frame.set_data_length(0));

        let mut frame = CanFrame::new(FrameKind::Data);
        assert!(frame.set_data_length(8));
        assert!(!frame.set_data_length(9));
        assert_eq!(8, frame.data_length());

        let mut frame = CanFrame::new(FrameKind::Fd);
        assert!(frame.set_data_length(64));
        assert!(!frame.set_data_length(65));

        let mut frame = CanFrame::new(FrameKind::Rtr);
        assert!(frame.set_data_length(0));
        assert!(!frame.set_data_length(1));

        let mut frame = CanFrame::new(FrameKind::Error);
        assert!(frame.set_data_length(8));
        assert!(!frame.set_data_length(4));
    }

    #[test]
    fn test_set_data() {
        let mut frame = CanFrame::new(FrameKind::Data);
        frame.set_data(DATA).unwrap();
        assert_eq!(DATA, frame.data());
        assert_eq!(DATA.len(), frame.data_length());
        assert_eq!(0x33, frame[2]);

        frame[2] = 0x99;
        assert_eq!(0x99, frame.data()[2]);

        assert_eq!(Err(ConstructionError::TooMuchData), frame.set_data(FD_DATA));
        assert_eq!(
            Err(ConstructionError::WrongFrameType),
            CanFrame::default().set_data(DATA)
        );
        assert_eq!(
            Err(ConstructionError::WrongFrameType),
            CanFrame::new(FrameKind::Rtr).set_data(DATA)
        );

        let mut frame = CanFrame::new(FrameKind::Error);
        frame.set_data(DATA).unwrap();
        assert_eq!(CAN_MAX_DLEN, frame.data_length());
        assert_eq!(DATA, &frame.data()[..4]);
    }

    #[test]
    fn test_from_raw_id() {
        let frame = CanFrame::from_raw_id(0x7ff, &[1, 2]).unwrap();
        assert!(!frame.is_extended());
        assert_eq!(0x7ff, frame.can_id());

        let frame = CanFrame::from_raw_id(0x800, &[]).unwrap();
        assert!(frame.is_extended());

        assert_eq!(
            Err(ConstructionError::IdTooLarge),
            CanFrame::from_raw_id(CAN_EFF_MASK + 1, &[])
        );
    }

    #[test]
    fn test_ids() {
        let mut frame = CanFrame::new(FrameKind::Data);
        frame.set_id_word(0x1234_5678 | CAN_EFF_FLAG);
        assert_eq!(0x1234_5678 & CAN_EFF_MASK, frame.can_id());
        assert_eq!(FrameFormat::Extended, frame.frame_format());

        frame.set_can_id(0xFFFF_FFFF);
        assert_eq!(CAN_EFF_MASK, frame.can_id());
        assert!(frame.id_flags().contains(IdFlags::EFF));

        frame.set_frame_format(FrameFormat::Standard);
        assert!(!frame.is_extended());
        assert_eq!(CAN_EFF_MASK, frame.id_word());
    }

    #[test]
    fn test_error_classes() {
        let mut frame = CanFrame::new(FrameKind::Error);
        frame.set_can_id((ErrorClass::BUS_OFF | ErrorClass::NO_ACK).bits());
        assert_eq!(ErrorClass::BUS_OFF | ErrorClass::NO_ACK, frame.error());

        frame.to_data_frame();
        assert!(frame.error().is_empty());
    }

    #[test]
    fn test_ordering() {
        let mut a = CanFrame::new(FrameKind::Data);
        a.set_can_id(0x100);
        let mut b = CanFrame::new(FrameKind::Rtr);
        b.set_can_id(0x080);

        assert_eq!(Ordering::Greater, a.cmp_can_id(&b));

        let mut frames = vec![a, b];
        frames.sort_by(CanFrame::cmp_can_id);
        assert_eq!(0x080, frames[0].can_id());
    }

    #[test]
    fn test_round_trip_lengths() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            for len in 0..=CAN_MAX_DLEN {
                let data: Vec<u8> = (0..len as u8).map(|i| i * 3 + 1).collect();
                let frame = CanFrame::with_data(ExtendedId::new(0x1ABCDE).unwrap(), &data).unwrap();

                let buf = frame.to_bytes(order);
                assert_eq!(FRAME_HEADER_SIZE + len, buf.len());

                let copy = CanFrame::decode(&mut buf.as_slice(), order).unwrap();
                assert_eq!(frame.can_id(), copy.can_id());
                assert_eq!(frame.data_length(), copy.data_length());
                assert_eq!(frame.data(), copy.data());
                assert_eq!(frame, copy);
            }
        }
    }

    #[test]
    fn test_byte_order_is_explicit() {
        let frame = CanFrame::with_data(StandardId::new(0x123).unwrap(), DATA).unwrap();

        let be = frame.to_bytes(ByteOrder::BigEndian);
        assert_eq!(&[0x00, 0x00, 0x01, 0x23], &be[..4]);

        let le = frame.to_bytes(ByteOrder::LittleEndian);
        assert_eq!(&[0x23, 0x01, 0x00, 0x00], &le[..4]);

        assert_eq!(ByteOrder::native(), ByteOrder::default());
    }

    #[test]
    fn test_encode_fields() {
        let frame = CanFrame::with_data(StandardId::new(0x7FF).unwrap(), DATA).unwrap();
        let buf = frame.to_bytes(ByteOrder::BigEndian);

        assert_eq!(DATA.len() as u8, buf[4]);
        assert_eq!(0, buf[5]);
        assert_eq!(CAN_MAX_DLEN as u8, buf[6]);
        assert_eq!(CAN_MTU as u8, buf[7]);
        assert_eq!(DATA, &buf[8..]);

        assert!(CanFrame::default().to_bytes(ByteOrder::native()).is_empty());
    }

    #[test]
    fn test_round_trip_fd() {
        let mut frame = CanFrame::with_data(StandardId::new(0x42).unwrap(), FD_DATA).unwrap();
        frame.set_brs(true);

        let buf = frame.to_bytes(ByteOrder::native());
        let copy = CanFrame::decode(&mut buf.as_slice(), ByteOrder::native()).unwrap();
        assert!(copy.is_fd_frame());
        assert!(copy.is_brs());
        assert_eq!(FD_DATA, copy.data());
    }

    #[test]
    fn test_unknown_sentinels() {
        let frame = CanFrame::with_data(StandardId::new(0x123).unwrap(), DATA).unwrap();
        let mut buf = frame.to_bytes(ByteOrder::native());
        buf[RES0_OFFSET] = 0x12;
        buf[RES1_OFFSET] = 0x34;

        let mut input = buf.as_slice();
        let copy = CanFrame::decode(&mut input, ByteOrder::native()).unwrap();

        assert!(copy.is_error_frame());
        assert!(copy.error().contains(ErrorClass::UNKNOWN_FRAME));
        assert_eq!(CAN_MAX_DLEN, copy.data_length());
        // payload was left in the stream
        assert_eq!(DATA.len(), input.len());
    }

    #[test]
    fn test_length_too_large_for_sentinels() {
        let frame = CanFrame::with_data(StandardId::new(0x123).unwrap(), DATA).unwrap();
        let mut buf = frame.to_bytes(ByteOrder::native());
        buf[4] = 20;

        let copy = CanFrame::decode(&mut buf.as_slice(), ByteOrder::native()).unwrap();
        assert!(copy.is_error_frame());
        assert!(copy.error().contains(ErrorClass::UNKNOWN_FRAME));
    }

    #[test]
    fn test_derived_kind_compatibility() {
        // The stream recognizes kinds the same way the transitions build them
        for kind in ALL_KINDS {
            let mut frame = CanFrame::new(kind);
            frame.set_can_id(0x55);
            assert_eq!(kind, frame.derived_kind());
        }

        // Flags alone decide between data, error and remote frames
        let mut frame = CanFrame::new(FrameKind::Data);
        frame.set_data(&[0; 8]).unwrap();
        frame.set_id_word(frame.id_word() | CAN_ERR_FLAG);
        assert_eq!(FrameKind::Data, frame.frame_kind());
        assert_eq!(FrameKind::Error, frame.derived_kind());

        // An error flag with a short payload is not anything recognizable
        assert!(frame.set_data_length(2));
        assert_eq!(FrameKind::Unknown, frame.derived_kind());
    }

    #[test]
    fn test_kernel_layout() {
        let frame = CanFrame::with_data(StandardId::new(0x321).unwrap(), DATA).unwrap();
        let buf = frame.to_kernel_bytes();
        assert_eq!(CAN_MTU, buf.len());
        assert_eq!(Some(CAN_MTU), frame_size_from_sentinels(&buf));

        let (copy, n) = CanFrame::from_kernel_bytes(&buf).unwrap();
        assert_eq!(CAN_MTU, n);
        assert_eq!(frame, copy);

        let frame = CanFrame::with_data(StandardId::new(0x321).unwrap(), FD_DATA).unwrap();
        let buf = frame.to_kernel_bytes();
        assert_eq!(CANFD_MTU, buf.len());
        assert!(CanFrame::from_kernel_bytes(&buf[..CAN_MTU]).is_none());
        let (copy, n) = CanFrame::from_kernel_bytes(&buf).unwrap();
        assert_eq!(CANFD_MTU, n);
        assert_eq!(frame, copy);
    }

    #[test]
    fn test_display() {
        let frame = CanFrame::with_data(StandardId::new(0x1AB).unwrap(), DATA).unwrap();
        assert_eq!("1AB#11223344", frame.to_string());
        assert_eq!("1AB#11 22 33 44", format!("{:X}", frame));

        let frame = CanFrame::remote(ExtendedId::new(0x1AB).unwrap());
        assert_eq!("000001AB#R", frame.to_string());

        let mut frame = CanFrame::with_data(StandardId::new(0x1AB).unwrap(), &[0xAA; 12]).unwrap();
        frame.set_brs(true);
        assert_eq!(format!("1AB##1{}", "AA".repeat(12)), frame.to_string());
    }

    #[test]
    fn test_parse() {
        let frame: CanFrame = "1AB#11223344".parse().unwrap();
        assert!(frame.is_data_frame());
        assert!(!frame.is_extended());
        assert_eq!(0x1AB, frame.can_id());
        assert_eq!(DATA, frame.data());

        let frame: CanFrame = "000001AB#R".parse().unwrap();
        assert!(frame.is_rtr_frame());
        assert!(frame.is_extended());

        let frame: CanFrame = "123##1AABBCCDDEEFF00112233".parse().unwrap();
        assert!(frame.is_fd_frame());
        assert!(frame.is_brs());
        assert_eq!(10, frame.data_length());

        assert_eq!(Err(ParseError::MissingSeparator), "123".parse::<CanFrame>());
        assert_eq!(Err(ParseError::InvalidId), "XYZ#00".parse::<CanFrame>());
        assert_eq!(Err(ParseError::InvalidId), "800#00".parse::<CanFrame>());
        assert_eq!(Err(ParseError::InvalidData), "123#0".parse::<CanFrame>());
    }

    #[test]
    fn test_embedded_frame() {
        let frame = <CanFrame as EmbeddedFrame>::new(StandardId::new(0x10).unwrap(), DATA).unwrap();
        assert_eq!(Id::Standard(StandardId::new(0x10).unwrap()), EmbeddedFrame::id(&frame));
        assert_eq!(DATA.len(), frame.dlc());
        assert!(!EmbeddedFrame::is_remote_frame(&frame));

        let frame = <CanFrame as EmbeddedFrame>::new(StandardId::new(0x10).unwrap(), FD_DATA).unwrap();
        assert!(frame.is_fd_frame());
        assert_eq!(0x0D, frame.dlc());

        let frame = CanFrame::new_remote(ExtendedId::new(0x10).unwrap(), 2).unwrap();
        assert!(EmbeddedFrame::is_remote_frame(&frame));
        assert!(EmbeddedFrame::is_extended(&frame));
        assert!(CanFrame::new_remote(ExtendedId::new(0x10).unwrap(), 9).is_none());
    }
}
