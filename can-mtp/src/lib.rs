//! `can-mtp`: segmented message transport over classic CAN frames.
//!
//! A CAN frame carries at most 8 payload bytes. This crate carries
//! application messages of up to 4095 bytes across a shared broadcast bus
//! by segmenting them into the four frame classes of [`pdu`]:
//! - a **single** frame for messages of up to 7 bytes,
//! - a **first** frame plus **consecutive** frames for larger messages, and
//! - **flow-control** frames, recognized in the wire grammar but not used
//!   to pace transmission (peers accept consecutive frames back-to-back,
//!   subject only to the sender's [`MtpConfig::wait_time`]).
//!
//! The engine is a cooperatively scheduled state machine: the host calls
//! [`MtpNode::tick`] from its polling loop (a sub-10 ms cadence works
//! well), and every piece of progress — reading, reassembly, transmission,
//! collision handling — happens inside one such step. There is exactly one
//! inbound and one outbound transfer at any time; completed inbound
//! messages are handed to the callback installed at construction.
//!
//! Because the bus is a broadcast medium, two nodes can start segmented
//! transmissions simultaneously. The engine detects this when a foreign
//! first or consecutive frame shows up mid-transmission and resolves it by
//! arbitration id: the lower id keeps the bus, the higher id rewinds its
//! transfer and retries after a hold-off.
//!
//! The bus itself is injected through [`BusAdapter`], and time through
//! [`Clock`], which keeps the engine free of platform assumptions and
//! makes timeout behavior testable.
//!
//! ```rust,ignore
//! use can_mtp::{MtpNode, StdClock};
//!
//! let mut node = MtpNode::<_, _, _, 256>::new(0x100, bus, StdClock::new(), |addr, bytes| {
//!     // a complete message arrived
//! })?;
//! node.begin();
//! loop {
//!     node.tick();
//!     // now and then:
//!     // node.send(b"hello")?;
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bus;
pub mod config;
pub mod errors;
pub mod pdu;
mod rx;
pub mod timer;
mod tx;

pub use bus::BusAdapter;
pub use config::MtpConfig;
pub use errors::MtpError;
pub use timer::Clock;
#[cfg(feature = "std")]
pub use timer::StdClock;

use core::time::Duration;

use embedded_can::Frame;

use bus::{id_from_raw, raw_id};
use pdu::{MAX_MESSAGE_LEN, MAX_SINGLE_PAYLOAD, Pdu};
use rx::RxTransfer;
use tx::TxTransfer;

#[cfg(feature = "defmt")]
use defmt::{debug, warn};

#[cfg(not(feature = "defmt"))]
macro_rules! debug {
    ($($t:tt)*) => {
        let _ = ($($t)*);
    };
}
#[cfg(not(feature = "defmt"))]
macro_rules! warn {
    ($($t:tt)*) => {
        let _ = ($($t)*);
    };
}

/// Machine state, advanced one transition per [`MtpNode::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not yet started; [`MtpNode::begin`] has not been called.
    Disabled,
    /// Nothing pending. The only state with no timer obligation.
    Idle,
    /// Waiting for further frames of an exchange in progress.
    CheckRead,
    /// A frame is ready on the bus; consume it.
    Read,
    /// Dispatch the frame just read by its class.
    Parse,
    /// Decide which transmit step comes next.
    CheckSend,
    /// Transmit a complete message in one frame.
    SendSingle,
    /// Transmit the opening frame of a segmented message.
    SendFirst,
    /// Transmit the next chunk of a segmented message.
    SendConsecutive,
    /// Probe the bus for a competing sender after a segmented send.
    CheckCollision,
}

/// The transport engine.
///
/// Generic over the injected bus (`B`), clock (`C`) and message callback
/// (`H`); `MAX_BUFFER` bounds both transfer buffers and must cover the
/// largest message the deployment exchanges (64 bytes minimum).
///
/// The callback runs inside `tick` (or inside a blocking send, which ticks
/// internally) whenever a message completes. It must not call back into
/// the sending API.
pub struct MtpNode<B, C, H, const MAX_BUFFER: usize = 64>
where
    B: BusAdapter,
    C: Clock,
    H: FnMut(u32, &[u8]),
{
    bus: B,
    clock: C,
    on_message: H,
    cfg: MtpConfig,
    address: u32,
    state: State,
    /// Entry time of the current non-idle state; 0 when idle.
    timer: u32,
    /// Stamp of the last segmented-frame send, pacing the next one.
    pace: Option<u32>,
    /// Stamp of the last yield to a higher-priority peer.
    holdoff: Option<u32>,
    /// Frame consumed in [`State::Read`], awaiting [`State::Parse`].
    frame: Option<B::Frame>,
    rx: RxTransfer<MAX_BUFFER>,
    tx: TxTransfer<MAX_BUFFER>,
}

impl<B, C, H, const MAX_BUFFER: usize> MtpNode<B, C, H, MAX_BUFFER>
where
    B: BusAdapter,
    C: Clock,
    H: FnMut(u32, &[u8]),
{
    /// Create an engine with default timings.
    ///
    /// `address` is this node's own arbitration id; it doubles as the
    /// default id for sends and as the priority in collision resolution
    /// (lower wins).
    pub fn new(address: u32, bus: B, clock: C, on_message: H) -> Result<Self, MtpError> {
        Self::with_config(address, MtpConfig::default(), bus, clock, on_message)
    }

    /// Create an engine with explicit timings.
    pub fn with_config(
        address: u32,
        cfg: MtpConfig,
        bus: B,
        clock: C,
        on_message: H,
    ) -> Result<Self, MtpError> {
        cfg.validate()?;
        if MAX_BUFFER < 64 {
            return Err(MtpError::InvalidConfig);
        }
        if id_from_raw(address).is_none() {
            return Err(MtpError::InvalidArgument);
        }
        Ok(Self {
            bus,
            clock,
            on_message,
            cfg,
            address,
            state: State::Disabled,
            timer: 0,
            pace: None,
            holdoff: None,
            frame: None,
            rx: RxTransfer::new(),
            tx: TxTransfer::new(),
        })
    }

    /// This node's own arbitration id.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Current machine state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Start the machine. Calling again on a started engine is a no-op.
    pub fn begin(&mut self) {
        if self.state == State::Disabled {
            self.rx.clear();
            self.tx.clear();
            self.change_state(State::Idle);
        }
    }

    /// Advance the machine one step.
    ///
    /// Never blocks. The host must call this regularly; all bus access and
    /// all callback invocations happen inside it.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        if self.timer > now {
            // The millisecond counter wrapped; restart the obligation
            // window instead of aborting the transfer.
            self.timer = now;
        }
        if self.timer > 0 && now - self.timer > ms(self.cfg.state_timeout) {
            warn!("state timeout, dropping in-flight transfer");
            self.rx.clear();
            if self.tx.in_flight() {
                self.tx.clear();
            }
            self.frame = None;
            self.change_state(State::Idle);
            return;
        }

        match self.state {
            State::Disabled => {}
            State::Idle | State::CheckRead => self.poll_bus(now),
            State::Read => self.read_frame(now),
            State::Parse => self.parse_frame(),
            State::CheckSend => self.pick_send(),
            State::SendSingle => self.send_single(),
            State::SendFirst => self.send_first(now),
            State::SendConsecutive => self.send_consecutive(now),
            State::CheckCollision => self.check_collision(),
        }
    }

    /// Queue a message for transmission without blocking.
    ///
    /// Fails with [`MtpError::Busy`] unless the machine is idle. On
    /// success the payload is committed and transmission proceeds over
    /// subsequent ticks.
    pub fn try_send_to(&mut self, address: u32, payload: &[u8]) -> Result<(), MtpError> {
        if payload.is_empty()
            || payload.len() > usize::from(MAX_MESSAGE_LEN)
            || payload.len() > MAX_BUFFER
            || id_from_raw(address).is_none()
        {
            return Err(MtpError::InvalidArgument);
        }
        if self.state != State::Idle {
            return Err(MtpError::Busy);
        }
        self.tx.load(address, payload);
        self.change_state(State::CheckSend);
        Ok(())
    }

    /// Send a message under this node's own arbitration id.
    ///
    /// Blocks by ticking internally until the machine is free to take the
    /// message, up to [`MtpConfig::send_timeout`].
    pub fn send(&mut self, payload: &[u8]) -> Result<(), MtpError> {
        self.send_to(self.address, payload)
    }

    /// Send a message under an explicit arbitration id.
    ///
    /// Returns once the payload is committed; the frames themselves go out
    /// over subsequent ticks.
    pub fn send_to(&mut self, address: u32, payload: &[u8]) -> Result<(), MtpError> {
        let start = self.clock.now_ms();
        loop {
            match self.try_send_to(address, payload) {
                Err(MtpError::Busy) => {
                    if self.clock.now_ms().wrapping_sub(start) > ms(self.cfg.send_timeout) {
                        return Err(MtpError::Busy);
                    }
                    self.tick();
                }
                other => return other,
            }
        }
    }

    fn change_state(&mut self, next: State) {
        self.state = next;
        self.timer = if next == State::Idle {
            0
        } else {
            // 0 is the no-obligation sentinel; clamp the first millisecond.
            self.clock.now_ms().max(1)
        };
    }

    /// `Idle` and `CheckRead`: look for inbound frames, or start a pending
    /// transmission when the bus is quiet and nothing is being reassembled.
    fn poll_bus(&mut self, now: u32) {
        if self.bus.available() {
            self.change_state(State::Read);
        } else if self.state == State::Idle
            && !self.rx.in_progress()
            && self.tx.has_message()
            && !within(&mut self.holdoff, now, ms(self.cfg.holdoff_delay))
        {
            self.change_state(State::CheckSend);
        }
    }

    fn read_frame(&mut self, now: u32) {
        let frame = match self.bus.read() {
            Ok(frame) => frame,
            Err(_) => {
                warn!("bus read failed");
                self.change_state(State::CheckRead);
                return;
            }
        };
        let peer = raw_id(frame.id());

        if self.tx.has_message() {
            // The inbound frame crossed our outbound message on the wire.
            // Our transfer restarts from its opening frame either way; the
            // id decides who keeps the bus (lower wins arbitration).
            self.tx.rewind();
            if peer > self.address {
                debug!("collision: peer {=u32:x} yields to us", peer);
                self.rx.clear();
            } else {
                debug!("collision: yielding bus to peer {=u32:x}", peer);
                self.holdoff = Some(now);
            }
            self.change_state(State::CheckRead);
            return;
        }

        self.rx.address = peer;
        self.frame = Some(frame);
        self.change_state(State::Parse);
    }

    fn parse_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            self.change_state(State::CheckRead);
            return;
        };
        match pdu::decode(frame.data()) {
            Ok(Pdu::Single { data }) => {
                (self.on_message)(raw_id(frame.id()), data);
                self.change_state(State::Idle);
            }
            Ok(Pdu::First { size, data }) => {
                if usize::from(size) <= MAX_BUFFER {
                    if self.rx.in_progress() {
                        warn!("new opening frame replaces reassembly in progress");
                    }
                    self.rx.start(raw_id(frame.id()), size, data);
                } else {
                    warn!("declared size {=u16} exceeds buffer, dropping", size);
                }
                self.change_state(State::CheckRead);
            }
            Ok(Pdu::Consecutive { index, data }) => {
                if !self.rx.in_progress() {
                    // Stray continuation of a transfer we never saw open.
                    self.change_state(State::CheckRead);
                    return;
                }
                if index != self.rx.counter {
                    // The sequence index is carried on the wire but frames
                    // append by position; a mismatch is only worth noting.
                    debug!(
                        "sequence index {=u8} arrived, expected {=u8}",
                        index, self.rx.counter
                    );
                }
                if self.rx.append(index, data) {
                    (self.on_message)(self.rx.address, self.rx.completed());
                    self.rx.clear();
                    self.change_state(State::Idle);
                } else {
                    self.change_state(State::CheckRead);
                }
            }
            Ok(Pdu::Flow { .. }) => {
                // Flow control is not part of this exchange; drop it.
                self.change_state(State::CheckRead);
            }
            Err(_) => {
                warn!("malformed frame dropped");
                self.change_state(State::CheckRead);
            }
        }
    }

    fn pick_send(&mut self) {
        if !self.tx.has_message() {
            self.change_state(State::Idle);
        } else if usize::from(self.tx.size) <= MAX_SINGLE_PAYLOAD {
            self.change_state(State::SendSingle);
        } else if self.tx.position == 0 {
            self.change_state(State::SendFirst);
        } else {
            self.change_state(State::SendConsecutive);
        }
    }

    fn send_single(&mut self) {
        let frame = self.tx_frame(&Pdu::Single {
            data: self.tx.single(),
        });
        let sent = match frame {
            Some(frame) => self.bus.send(&frame).is_ok(),
            None => false,
        };
        if !sent {
            warn!("single frame send failed");
        }
        // Sent or failed, the transfer is finished: there is no retry.
        self.tx.clear();
        self.change_state(State::Idle);
    }

    fn send_first(&mut self, now: u32) {
        let frame = self.tx_frame(&Pdu::First {
            size: self.tx.size,
            data: self.tx.first_chunk(),
        });
        let sent = match frame {
            Some(frame) => self.bus.send(&frame).is_ok(),
            None => false,
        };
        if sent {
            self.tx.mark_first_sent();
            self.pace = Some(now);
            self.change_state(State::CheckCollision);
        } else {
            warn!("opening frame send failed, aborting transfer");
            self.tx.clear();
            self.change_state(State::Idle);
        }
    }

    fn send_consecutive(&mut self, now: u32) {
        if within(&mut self.pace, now, ms(self.cfg.wait_time)) {
            return;
        }
        let chunk = self.tx.next_chunk().len();
        let frame = self.tx_frame(&Pdu::Consecutive {
            index: self.tx.counter & 0x0F,
            data: self.tx.next_chunk(),
        });
        let sent = match frame {
            Some(frame) => self.bus.send(&frame).is_ok(),
            None => false,
        };
        if !sent {
            warn!("consecutive frame send failed, aborting transfer");
            self.tx.clear();
            self.change_state(State::Idle);
            return;
        }
        self.tx.advance(chunk);
        if self.tx.complete() {
            debug!("segmented send complete");
            self.tx.clear();
            self.change_state(State::Idle);
        } else {
            self.pace = Some(now);
            self.change_state(State::CheckCollision);
        }
    }

    /// After sending part of a segmented message, look at whatever showed
    /// up on the bus in the meantime: a foreign first or consecutive frame
    /// means another segmented transfer collided with ours.
    fn check_collision(&mut self) {
        if !self.bus.available() {
            self.change_state(State::SendConsecutive);
            return;
        }
        let frame = match self.bus.read() {
            Ok(frame) => frame,
            Err(_) => {
                warn!("bus read failed mid-transfer, aborting");
                self.rx.clear();
                self.tx.clear();
                self.change_state(State::Idle);
                return;
            }
        };
        match frame.data().first().map(|byte| pdu::classify(*byte)) {
            Some(pdu::CLASS_FIRST) | Some(pdu::CLASS_CONSECUTIVE) => {
                let peer = raw_id(frame.id());
                self.tx.rewind();
                if peer > self.address {
                    debug!("collision: peer {=u32:x} yields, restarting send", peer);
                    self.change_state(State::SendFirst);
                } else {
                    debug!("collision: yielding bus to peer {=u32:x}", peer);
                    self.change_state(State::CheckRead);
                }
            }
            _ => {
                // Single and flow frames do not contend with a segmented
                // transfer; drop them and carry on sending.
                self.change_state(State::SendConsecutive);
            }
        }
    }

    fn tx_frame(&self, pdu: &Pdu<'_>) -> Option<B::Frame> {
        let id = id_from_raw(self.tx.address)?;
        pdu::encode(id, pdu).ok()
    }
}

/// True while `now` is inside `window_ms` of the stamp; clears the stamp
/// once the window has passed. Wrap-safe.
fn within(stamp: &mut Option<u32>, now: u32, window_ms: u32) -> bool {
    match *stamp {
        Some(since) if now.wrapping_sub(since) < window_ms => true,
        Some(_) => {
            *stamp = None;
            false
        }
        None => false,
    }
}

fn ms(duration: Duration) -> u32 {
    duration.as_millis() as u32
}
