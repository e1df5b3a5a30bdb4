//! The host-provided bus seam.

use embedded_can::{ExtendedId, Frame, Id, StandardId};

/// The three bus hooks the engine drives.
///
/// All methods are non-blocking. `read` and `send` report failure through
/// their `Result`; the engine treats a failure as fatal for the in-flight
/// transfer only and never retries an operation itself.
pub trait BusAdapter {
    /// Concrete frame type moved across the bus.
    type Frame: Frame;
    /// Backend failure type. Carried, never inspected.
    type Error;

    /// True when at least one inbound frame is ready to read.
    fn available(&mut self) -> bool;

    /// Consume one inbound frame.
    fn read(&mut self) -> Result<Self::Frame, Self::Error>;

    /// Transmit one frame synchronously.
    fn send(&mut self, frame: &Self::Frame) -> Result<(), Self::Error>;
}

/// Bare identifier value of a frame id.
///
/// `Id` carries no flag bits, so values compared through this helper are
/// always plain 11- or 29-bit addresses.
pub fn raw_id(id: Id) -> u32 {
    match id {
        Id::Standard(id) => u32::from(id.as_raw()),
        Id::Extended(id) => id.as_raw(),
    }
}

/// Build a frame id from a bare address.
///
/// Values within the 11-bit range become standard ids, larger values
/// extended ids. Returns `None` above 29 bits.
pub fn id_from_raw(address: u32) -> Option<Id> {
    if address <= u32::from(StandardId::MAX.as_raw()) {
        StandardId::new(address as u16).map(Id::Standard)
    } else {
        ExtendedId::new(address).map(Id::Extended)
    }
}
