//! Reassembly of inbound segmented messages.

use core::cmp::min;

/// The one in-flight inbound transfer.
///
/// `size > 0` means a segmented reassembly is in progress; a completed or
/// inactive transfer has `size == 0` and `position == 0`.
pub(crate) struct RxTransfer<const MAX_BUFFER: usize> {
    /// Arbitration id the transfer arrived under.
    pub(crate) address: u32,
    /// Declared total message size.
    pub(crate) size: u16,
    /// Next byte to write.
    pub(crate) position: u16,
    /// Sequence index expected on the next consecutive frame. Recorded for
    /// bookkeeping only; frames append by position, not by index.
    pub(crate) counter: u8,
    payload: [u8; MAX_BUFFER],
}

impl<const MAX_BUFFER: usize> RxTransfer<MAX_BUFFER> {
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

    pub(crate) fn in_progress(&self) -> bool {
        self.size > 0
    }

    /// Begin reassembly from an opening frame, replacing any transfer in
    /// progress. The caller guarantees `size as usize <= MAX_BUFFER`.
    pub(crate) fn start(&mut self, address: u32, size: u16, head: &[u8]) {
        self.address = address;
        self.size = size;
        self.payload[..head.len()].copy_from_slice(head);
        self.position = head.len() as u16;
        self.counter = 1;
    }

    /// Append a consecutive-frame chunk; true once the message is complete.
    pub(crate) fn append(&mut self, index: u8, data: &[u8]) -> bool {
        let remaining = usize::from(self.size - self.position);
        let chunk = min(data.len(), remaining);
        let at = usize::from(self.position);
        self.payload[at..at + chunk].copy_from_slice(&data[..chunk]);
        self.position += chunk as u16;
        self.counter = index.wrapping_add(1) & 0x0F;
        self.position == self.size
    }

    /// The reassembled message bytes.
    pub(crate) fn completed(&self) -> &[u8] {
        &self.payload[..usize::from(self.size)]
    }
}
