use embedded_can::StandardId;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::frame::{CanFrame, HEARTBEAT_BASE, NODE_ID_MASK, NMT_ID};

/// The NMT state of a node. The discriminant is the code the node advertises
/// in its heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = NmtParseError, constructor = NmtParseError::UnrecognizedState))]
#[repr(u8)]
pub enum OperatingState {
    /// Transient state right after power-on, left on the first tick
    BootUp = 0x00,
    Stopped = 0x04,
    Operational = 0x05,
    PreOperational = 0x7F,
}

impl OperatingState {
    pub fn heartbeat_code(&self) -> u8 {
        (*self).into()
    }
}

/// Commands a master can send to change the state of one or all slaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = NmtParseError, constructor = NmtParseError::UnrecognizedCommand))]
#[repr(u8)]
pub enum NmtCommand {
    Start = 0x01,
    Stop = 0x02,
    EnterPreOperational = 0x80,
    /// Models a cold reset that lands the node in pre-operational
    ResetNode = 0x81,
}

impl NmtCommand {
    pub const fn target_state(&self) -> OperatingState {
        match self {
            Self::Start => OperatingState::Operational,
            Self::Stop => OperatingState::Stopped,
            Self::EnterPreOperational => OperatingState::PreOperational,
            Self::ResetNode => OperatingState::PreOperational,
        }
    }
}

/// A decoded NMT command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NmtFrame {
    pub command: NmtCommand,
    /// Addressed node, 0 for all nodes
    pub target: u8,
}

impl NmtFrame {
    pub fn new(command: NmtCommand, target: u8) -> Self {
        Self {
            command,
            target: target & NODE_ID_MASK as u8,
        }
    }

    /// Whether a node with ID `own_id` should obey this command
    pub fn addresses(&self, own_id: u8) -> bool {
        self.target == 0 || self.target == own_id
    }

    pub fn encode(&self) -> CanFrame {
        let data = [self.command.into(), self.target];

        CanFrame::new(StandardId::ZERO, &data).unwrap()
    }

    pub fn decode(frame: &CanFrame) -> Result<Self, NmtParseError> {
        if frame.raw_id() != NMT_ID {
            return Err(NmtParseError::WrongId(frame.raw_id()));
        }

        if frame.dlc() < 2 {
            return Err(NmtParseError::NotEnoughBytes(frame.dlc()));
        }

        let data = frame.data();

        Ok(Self {
            command: data[0].try_into()?,
            target: data[1],
        })
    }
}

/// Builds the single byte heartbeat (or boot-up) message of node `node_id`
pub fn encode_heartbeat(node_id: u8, state: OperatingState) -> CanFrame {
    let id = HEARTBEAT_BASE + (node_id as u16 & NODE_ID_MASK);

    CanFrame::from_raw(id, &[state.heartbeat_code()]).unwrap()
}

/// Splits a heartbeat message into the sending node ID and its state
pub fn decode_heartbeat(frame: &CanFrame) -> Result<(u8, OperatingState), NmtParseError> {
    let id = frame.raw_id();

    if id & !NODE_ID_MASK != HEARTBEAT_BASE {
        return Err(NmtParseError::WrongId(id));
    }

    let state = frame
        .data()
        .first()
        .ok_or(NmtParseError::NotEnoughBytes(0))?;

    Ok(((id & NODE_ID_MASK) as u8, (*state).try_into()?))
}

/// Various errors which can arise while decoding NMT and heartbeat frames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmtParseError {
    #[error("Received a frame ({0:#x}) on an ID that does not carry NMT traffic")]
    WrongId(u16),
    #[error("Received an NMT frame with too few bytes ({0:?})")]
    NotEnoughBytes(usize),
    #[error("Received an NMT command with an unrecognized specifier ({0:#x})")]
    UnrecognizedCommand(u8),
    #[error("Received a heartbeat with an unrecognized state ({0:#x})")]
    UnrecognizedState(u8),
}
