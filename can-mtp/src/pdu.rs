//! Encode and decode the four transport frame classes.
//!
//! Every frame carries its class in the high nibble of byte 0:
//!
//! | Class       | Tag | Low nibble of byte 0      | Byte 1          | Payload          |
//! |-------------|-----|---------------------------|-----------------|------------------|
//! | Single      | 0   | size (1..=7)              | data            | data[1..=size]   |
//! | First       | 1   | size bits 11..8           | size bits 7..0  | data[2..8]       |
//! | Consecutive | 2   | sequence index            | data            | data[1..]        |
//! | Flow        | 3   | status (0 CTS/1 WAIT/2 ABT)| block size     | separation time  |

use embedded_can::{Frame, Id};

use crate::errors::MtpError;

/// Largest message a segmented transfer can declare (12-bit size field).
pub const MAX_MESSAGE_LEN: u16 = 4095;
/// Most payload bytes a single frame can carry.
pub const MAX_SINGLE_PAYLOAD: usize = 7;
/// Payload bytes carried by an opening segmented frame.
pub const FIRST_CHUNK: usize = 6;
/// Most payload bytes a consecutive frame can carry.
pub const CONSECUTIVE_CHUNK: usize = 7;

/// Class tag of a single frame.
pub const CLASS_SINGLE: u8 = 0;
/// Class tag of an opening segmented frame.
pub const CLASS_FIRST: u8 = 1;
/// Class tag of a consecutive frame.
pub const CLASS_CONSECUTIVE: u8 = 2;
/// Class tag of a flow-control frame.
pub const CLASS_FLOW: u8 = 3;

/// Class tag of a frame, from its first payload byte.
pub const fn classify(byte0: u8) -> u8 {
    byte0 >> 4
}

/// Flow-control status nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send further consecutive frames.
    ClearToSend,
    /// Pause before resuming.
    Wait,
    /// Abort the transfer.
    Abort,
}

/// Parsed protocol data unit.
///
/// Payload slices borrow the frame data they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu<'a> {
    /// Complete message in one frame (1..=7 bytes).
    Single {
        /// Message bytes.
        data: &'a [u8],
    },
    /// Opening frame of a segmented message.
    First {
        /// Declared total message size.
        size: u16,
        /// First six message bytes.
        data: &'a [u8],
    },
    /// Follow-up frame of a segmented message.
    Consecutive {
        /// 4-bit sequence index, wrapping modulo 16.
        index: u8,
        /// Up to seven message bytes.
        data: &'a [u8],
    },
    /// Flow-control feedback. Recognized on the wire, never acted on.
    Flow {
        /// Receiver-to-sender status.
        status: FlowStatus,
        /// Frames allowed before the next flow frame (0 = unlimited).
        block_size: u8,
        /// Requested minimum delay between frames.
        separation_time: u8,
    },
}

/// Decode raw frame payload bytes into a PDU view.
///
/// A frame that does not match its class's exact length and size rules is
/// rejected; the caller drops it.
pub fn decode(data: &[u8]) -> Result<Pdu<'_>, MtpError> {
    if data.is_empty() || data.len() > 8 {
        return Err(MtpError::InvalidFrame);
    }
    match classify(data[0]) {
        CLASS_SINGLE => {
            let size = (data[0] & 0x0F) as usize;
            if size == 0 || size > MAX_SINGLE_PAYLOAD || size != data.len() - 1 {
                return Err(MtpError::InvalidFrame);
            }
            Ok(Pdu::Single {
                data: &data[1..1 + size],
            })
        }
        CLASS_FIRST => {
            if data.len() != 8 {
                return Err(MtpError::InvalidFrame);
            }
            let size = u16::from(data[0] & 0x0F) << 8 | u16::from(data[1]);
            if !(8..=MAX_MESSAGE_LEN).contains(&size) {
                return Err(MtpError::InvalidFrame);
            }
            Ok(Pdu::First {
                size,
                data: &data[2..8],
            })
        }
        CLASS_CONSECUTIVE => Ok(Pdu::Consecutive {
            index: data[0] & 0x0F,
            data: &data[1..],
        }),
        CLASS_FLOW => {
            if data.len() < 3 {
                return Err(MtpError::InvalidFrame);
            }
            let status = match data[0] & 0x0F {
                0x0 => FlowStatus::ClearToSend,
                0x1 => FlowStatus::Wait,
                0x2 => FlowStatus::Abort,
                _ => return Err(MtpError::InvalidFrame),
            };
            Ok(Pdu::Flow {
                status,
                block_size: data[1],
                separation_time: data[2],
            })
        }
        _ => Err(MtpError::InvalidFrame),
    }
}

/// Build a bus frame carrying the given PDU.
///
/// Frames are sized exactly; no padding is emitted.
pub fn encode<F: Frame>(id: Id, pdu: &Pdu<'_>) -> Result<F, MtpError> {
    let mut buf = [0u8; 8];
    let len = match pdu {
        Pdu::Single { data } => {
            if data.is_empty() || data.len() > MAX_SINGLE_PAYLOAD {
                return Err(MtpError::InvalidFrame);
            }
            buf[0] = data.len() as u8;
            buf[1..1 + data.len()].copy_from_slice(data);
            1 + data.len()
        }
        Pdu::First { size, data } => {
            if !(8..=MAX_MESSAGE_LEN).contains(size) || data.len() != FIRST_CHUNK {
                return Err(MtpError::InvalidFrame);
            }
            buf[0] = 0x10 | (size >> 8) as u8;
            buf[1] = (size & 0xFF) as u8;
            buf[2..8].copy_from_slice(data);
            8
        }
        Pdu::Consecutive { index, data } => {
            if data.is_empty() || data.len() > CONSECUTIVE_CHUNK {
                return Err(MtpError::InvalidFrame);
            }
            buf[0] = 0x20 | (index & 0x0F);
            buf[1..1 + data.len()].copy_from_slice(data);
            1 + data.len()
        }
        Pdu::Flow {
            status,
            block_size,
            separation_time,
        } => {
            let status = match status {
                FlowStatus::ClearToSend => 0x0,
                FlowStatus::Wait => 0x1,
                FlowStatus::Abort => 0x2,
            };
            buf[0] = 0x30 | status;
            buf[1] = *block_size;
            buf[2] = *separation_time;
            3
        }
    };
    Frame::new(id, &buf[..len]).ok_or(MtpError::InvalidFrame)
}
