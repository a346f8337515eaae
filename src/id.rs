// cansocket/src/id.rs
//
// CAN identifiers, ID word flags and error classes.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN identifiers and the flag bits carried in the 32-bit SocketCAN ID word.

use bitflags::bitflags;
use embedded_can::{ExtendedId, Id, StandardId};
use libc::canid_t;

pub use libc::{
    CANFD_BRS, CANFD_ESI, CANFD_MAX_DLEN, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_ERR_MASK,
    CAN_MAX_DLEN, CAN_RTR_FLAG, CAN_SFF_MASK,
};

/// An error mask that will cause SocketCAN to report all errors
pub const ERR_MASK_ALL: u32 = CAN_ERR_MASK;

/// An error mask that will cause SocketCAN to silently drop all errors
pub const ERR_MASK_NONE: u32 = 0;

bitflags! {
    /// Bit flags in the composite SocketCAN ID word.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct IdFlags: canid_t {
        /// Indicates frame uses a 29-bit extended ID
        const EFF = CAN_EFF_FLAG;
        /// Indicates a remote request frame.
        const RTR = CAN_RTR_FLAG;
        /// Indicates an error frame.
        const ERR = CAN_ERR_FLAG;
    }

    /// Bit flags for the Flexible Data (FD) frames.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FdFlags: u8 {
        /// Bit rate switch (second bit rate for payload data)
        const BRS = CANFD_BRS as u8;
        /// Error state indicator of the transmitting node
        const ESI = CANFD_ESI as u8;
    }

    /// Error classes reported in the ID word of an error frame.
    ///
    /// The same bits are used as the raw socket's error filter mask.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ErrorClass: u32 {
        /// TX timeout (by netdevice driver)
        const TX_TIMEOUT = 0x0001;
        /// Lost arbitration
        const LOST_ARBITRATION = 0x0002;
        /// Controller problems
        const CONTROLLER = 0x0004;
        /// Protocol violations
        const PROTOCOL = 0x0008;
        /// Transceiver status
        const TRANSCEIVER = 0x0010;
        /// Received no ACK on transmission
        const NO_ACK = 0x0020;
        /// Bus off
        const BUS_OFF = 0x0040;
        /// Bus error (may flood!)
        const BUS_ERROR = 0x0080;
        /// Controller restarted
        const RESTARTED = 0x0100;
        /// A frame was received that could not be identified.
        const UNKNOWN_FRAME = 0x0200;
    }
}

impl ErrorClass {
    /// Every error class. Used as a filter, reports all errors.
    pub const ALL: Self = Self::from_bits_retain(ERR_MASK_ALL);
}

impl Default for ErrorClass {
    fn default() -> Self {
        Self::empty()
    }
}

/// Gets the canid_t value from an Id
/// If it's an extended ID, the CAN_EFF_FLAG bit is also set.
pub fn id_to_canid_t(id: impl Into<Id>) -> canid_t {
    use Id::*;
    match id.into() {
        Standard(id) => id.as_raw() as canid_t,
        Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

/// Determines if the ID is a standard, 11-bit, ID.
#[inline]
pub fn id_is_standard(id: &Id) -> bool {
    matches!(id, Id::Standard(_))
}

/// Determines if the ID is an extended, 29-bit, ID.
#[inline]
pub fn id_is_extended(id: &Id) -> bool {
    matches!(id, Id::Extended(_))
}

/// Gets the raw numeric value of an Id, without any flag bits.
pub fn id_to_raw(id: &Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw() as u32,
        Id::Extended(id) => id.as_raw(),
    }
}

/// Creates a CAN ID from a raw integer value.
///
/// If the `id` is <= 0x7FF, it's assumed to be a standard ID, otherwise
/// it is created as an Extened ID. If you require an Extended ID <= 0x7FF,
/// create it explicitly.
pub fn id_from_raw(id: u32) -> Option<Id> {
    let id = match id {
        n if n <= CAN_SFF_MASK => StandardId::new(n as u16)?.into(),
        n => ExtendedId::new(n)?.into(),
    };
    Some(id)
}

/// Creates a CAN ID from a SocketCAN ID word.
///
/// The EFF flag in the word selects the identifier format, so extended
/// IDs in the standard range survive the conversion.
pub fn id_from_canid_t(word: canid_t) -> Option<Id> {
    if word & CAN_EFF_FLAG != 0 {
        Some(ExtendedId::new(word & CAN_EFF_MASK)?.into())
    } else {
        Some(StandardId::new((word & CAN_SFF_MASK) as u16)?.into())
    }
}

/////////////////////////////////////////////////////////////////////////////
