// cansocket/src/constants.rs
//
// Kernel and engine constants not exported by libc.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

use std::os::raw::c_int;

pub use libc::{
    CANFD_MTU, CAN_MTU, CAN_RAW, CAN_RAW_ERR_FILTER, CAN_RAW_FD_FRAMES, CAN_RAW_FILTER,
    CAN_RAW_LOOPBACK, CAN_RAW_RECV_OWN_MSGS, SOL_CAN_BASE, SOL_CAN_RAW,
};

// constants stolen from C headers (linux/can/isotp.h)
pub const CAN_ISOTP: c_int = 6;
pub const SOL_CAN_ISOTP: c_int = SOL_CAN_BASE + CAN_ISOTP;

pub const CAN_ISOTP_OPTS: c_int = 1;
pub const CAN_ISOTP_RECV_FC: c_int = 2;
pub const CAN_ISOTP_TX_STMIN: c_int = 3;
pub const CAN_ISOTP_RX_STMIN: c_int = 4;
pub const CAN_ISOTP_LL_OPTS: c_int = 5;

/// Default padding byte for ISO-TP frames
pub const CAN_ISOTP_DEFAULT_PAD_CONTENT: u8 = 0xCC;

/// Largest PDU a classic ISO-TP socket transfers in one write
pub const ISOTP_MAX_PDU: usize = 4095;

/// Offset of the first sentinel byte in the kernel frame layout
pub const RES0_OFFSET: usize = 6;

/// Offset of the second sentinel byte in the kernel frame layout
pub const RES1_OFFSET: usize = 7;

/// Raw socket read chunk: 72 classic or 16 FD frames
pub const RAW_READ_CHUNK_SIZE: usize = 1152;

/// Initial raw socket buffer capacity
pub const RAW_INITIAL_BUFFER_SIZE: usize = 18432;

/// ISO-TP socket read chunk, enough for the largest PDU
pub const ISOTP_READ_CHUNK_SIZE: usize = 4096;

/// Initial ISO-TP socket buffer capacity
pub const ISOTP_INITIAL_BUFFER_SIZE: usize = 16384;
