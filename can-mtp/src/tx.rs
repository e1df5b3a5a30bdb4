//! Segmentation of outbound messages.

use core::cmp::min;

use crate::pdu::{CONSECUTIVE_CHUNK, FIRST_CHUNK};

/// The one in-flight outbound transfer.
///
/// `size > 0` means a message is queued; `position > 0` means at least its
/// opening frame has gone out on the bus.
pub(crate) struct TxTransfer<const MAX_BUFFER: usize> {
    /// Arbitration id the message transmits under.
    pub(crate) address: u32,
    /// Total message size.
    pub(crate) size: u16,
    /// Next byte to send.
    pub(crate) position: u16,
    /// Sequence index of the next consecutive frame; 1 once the opening
    /// frame has been sent, wrapping modulo 16 on the wire.
    pub(crate) counter: u8,
    payload: [u8; MAX_BUFFER],
}

impl<const MAX_BUFFER: usize> TxTransfer<MAX_BUFFER> {
    pub(crate) const fn new() -> Self {
        Self {
            address: 0,
            size: 0,
            position: 0,
            counter: 0,
            payload: [0; MAX_BUFFER],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.address = 0;
        self.size = 0;
        self.position = 0;
        self.counter = 0;
    }

    /// A message is queued (whether or not transmission has started).
    pub(crate) fn has_message(&self) -> bool {
        self.size > 0
    }

    /// Transmission has started and is not finished.
    pub(crate) fn in_flight(&self) -> bool {
        self.position > 0 && self.position < self.size
    }

    /// Restart the transfer from its opening frame after a bus collision.
    pub(crate) fn rewind(&mut self) {
        self.position = 0;
        self.counter = 1;
    }

    /// Queue a message. The caller guarantees `payload.len() <= MAX_BUFFER`.
    pub(crate) fn load(&mut self, address: u32, payload: &[u8]) {
        self.address = address;
        self.size = payload.len() as u16;
        self.position = 0;
        self.counter = 0;
        self.payload[..payload.len()].copy_from_slice(payload);
    }

    /// The whole message, for the single-frame path.
    pub(crate) fn single(&self) -> &[u8] {
        &self.payload[..usize::from(self.size)]
    }

    /// The six bytes carried by the opening segmented frame.
    pub(crate) fn first_chunk(&self) -> &[u8] {
        &self.payload[..FIRST_CHUNK]
    }

    /// Account for a successfully sent opening frame.
    pub(crate) fn mark_first_sent(&mut self) {
        self.position = FIRST_CHUNK as u16;
        self.counter = 1;
    }

    /// The bytes of the next consecutive frame (up to seven).
    pub(crate) fn next_chunk(&self) -> &[u8] {
        let at = usize::from(self.position);
        let chunk = min(CONSECUTIVE_CHUNK, usize::from(self.size - self.position));
        &self.payload[at..at + chunk]
    }

    /// Account for a successfully sent consecutive frame.
    pub(crate) fn advance(&mut self, sent: usize) {
        self.position += sent as u16;
        self.counter = self.counter.wrapping_add(1);
    }

    pub(crate) fn complete(&self) -> bool {
        self.position >= self.size
    }
}
