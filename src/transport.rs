use core::fmt::Debug;

use embedded_can::{blocking::Can, Frame};
use heapless::Vec;

use crate::frame::CanFrame;

/// An acceptance filter installed on the CAN controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Filter {
    /// Let every frame through
    AcceptAll,
    /// Let a frame through if `frame_id & mask == id & mask`
    Match { id: u16, mask: u16 },
}

impl Filter {
    pub fn accepts(&self, raw_id: u16) -> bool {
        match *self {
            Self::AcceptAll => true,
            Self::Match { id, mask } => raw_id & mask == id & mask,
        }
    }
}

/// The raw CAN driver a node sends through.
///
/// Received frames are not pulled through this trait: whatever owns the
/// driver's receive interrupt hands each accepted frame to
/// [`Node::receive`](crate::Node::receive).
pub trait Transport {
    type Error: Debug;

    /// Starts the controller at `bitrate` bits per second
    fn begin(&mut self, bitrate: u32) -> Result<(), Self::Error>;

    /// Queues one frame for transmission without blocking
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;

    /// Installs an acceptance filter. Called up to twice during
    /// [`Node::begin`](crate::Node::begin).
    fn watch_for(&mut self, filter: Filter) -> Result<(), Self::Error>;
}

/// A monotonic millisecond time source
pub trait Clock {
    fn now_millis(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_millis(&self) -> u64 {
        self()
    }
}

/// Most filters a node ever installs
const MAX_FILTERS: usize = 2;

/// Drives any [`embedded_can::blocking::Can`] peripheral as a node
/// transport.
///
/// The HAL owns bit timing and hardware filter banks, so `begin` only records
/// the requested rate and `watch_for` keeps the filters in software. The
/// receive path should check [`BlockingCan::accepts`] before handing a frame
/// to the node.
pub struct BlockingCan<C> {
    can: C,
    bitrate: Option<u32>,
    filters: Vec<Filter, MAX_FILTERS>,
}

impl<C: Can> BlockingCan<C> {
    pub fn new(can: C) -> Self {
        Self {
            can,
            bitrate: None,
            filters: Vec::new(),
        }
    }

    /// Whether any installed filter lets `raw_id` through. With no filters
    /// installed nothing is accepted.
    pub fn accepts(&self, raw_id: u16) -> bool {
        self.filters.iter().any(|filter| filter.accepts(raw_id))
    }

    /// Blocks until the peripheral yields a frame CANopen can carry. Frames
    /// rejected by the filters or not representable are skipped.
    pub fn receive(&mut self) -> Result<CanFrame, BlockingCanError<C::Error>> {
        loop {
            let frame = self.can.receive().map_err(BlockingCanError::Bus)?;

            match CanFrame::from_frame(&frame) {
                Ok(frame) if self.accepts(frame.raw_id()) => return Ok(frame),
                Ok(frame) => log::trace!("Filtered out frame {:#x}", frame.raw_id()),
                Err(err) => log::trace!("Skipped frame: {}", err),
            }
        }
    }

    pub fn bitrate(&self) -> Option<u32> {
        self.bitrate
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn inner(&mut self) -> &mut C {
        &mut self.can
    }

    pub fn into_inner(self) -> C {
        self.can
    }
}

impl<C: Can> Transport for BlockingCan<C> {
    type Error = BlockingCanError<C::Error>;

    fn begin(&mut self, bitrate: u32) -> Result<(), Self::Error> {
        self.bitrate = Some(bitrate);
        self.filters.clear();
        Ok(())
    }

    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        let frame = C::Frame::new(frame.id(), frame.data()).ok_or(BlockingCanError::Conversion)?;

        self.can.transmit(&frame).map_err(BlockingCanError::Bus)
    }

    fn watch_for(&mut self, filter: Filter) -> Result<(), Self::Error> {
        if filter == Filter::AcceptAll {
            self.filters.clear();
        }

        self.filters
            .push(filter)
            .map_err(BlockingCanError::FiltersExhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockingCanError<E: Debug> {
    #[error("The CAN peripheral reported an error ({0:?})")]
    Bus(E),
    #[error("The driver's frame type could not represent the frame")]
    Conversion,
    #[error("No room for another acceptance filter ({0:?})")]
    FiltersExhausted(Filter),
}
