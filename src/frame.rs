use core::ops::RangeInclusive;

use embedded_can::{Frame, Id, StandardId};

/// COB-ID of NMT command frames (always broadcast on the bus)
pub const NMT_ID: u16 = 0x000;
/// Range of COB-IDs carrying process data objects (TPDO1 through RPDO4)
pub const PDO_ID_RANGE: RangeInclusive<u16> = 0x180..=0x57F;
/// COB-ID base of SDO responses (server to client)
pub const SDO_RESPONSE_BASE: u16 = 0x580;
/// COB-ID base of SDO requests (client to server)
pub const SDO_REQUEST_BASE: u16 = 0x600;
/// COB-ID base of heartbeat and boot-up messages
pub const HEARTBEAT_BASE: u16 = 0x700;

/// Mask selecting the node ID bits of a COB-ID
pub const NODE_ID_MASK: u16 = 0x7F;

/// Represents a classic CAN 2.0 data frame with an 11-bit identifier, which is
/// the only frame type CANopen uses.
///
/// The data is always stored as 8 bytes with the unused tail zeroed, so a
/// decoder may index past the DLC without panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: StandardId,
    dlc: u8,
    data: [u8; 8],
}

impl CanFrame {
    /// Creates a new data frame. `data` must have a length in the range 0..=8
    /// or else `None` will be returned instead.
    pub fn new(id: StandardId, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }

        let mut copy = [0u8; 8];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id,
            dlc: data.len() as u8,
            data: copy,
        })
    }

    /// Creates a new data frame from a raw identifier. Returns `None` if the
    /// identifier does not fit in 11 bits or the data is longer than 8 bytes.
    pub fn from_raw(id: u16, data: &[u8]) -> Option<Self> {
        Self::new(StandardId::new(id)?, data)
    }

    /// Converts a frame produced by a HAL driver. Only standard data frames
    /// can be carried.
    pub fn from_frame(frame: &impl Frame) -> Result<Self, FrameError> {
        let id = match frame.id() {
            Id::Standard(id) => id,
            Id::Extended(id) => return Err(FrameError::ExtendedId(id.as_raw())),
        };

        if frame.is_remote_frame() {
            return Err(FrameError::RemoteFrame(id.as_raw()));
        }

        Self::new(id, frame.data()).ok_or(FrameError::DataTooLong(frame.dlc()))
    }

    /// Gets the message ID of the frame
    pub fn id(&self) -> StandardId {
        self.id
    }

    /// Gets the message ID of the frame as a plain integer
    pub fn raw_id(&self) -> u16 {
        self.id.as_raw()
    }

    /// Gets the DLC (Data Length Code) of the frame
    pub fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// Gets the data associated with the frame (length will match DLC)
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// The full zero-padded 8 byte payload buffer
    pub(crate) fn padded_data(&self) -> &[u8; 8] {
        &self.data
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => CanFrame::new(id, data),
            Id::Extended(_) => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    #[error("Received a frame with an extended ID ({0:#x}) which CANopen does not use")]
    ExtendedId(u32),
    #[error("Received a remote frame ({0:#x}) which is not supported")]
    RemoteFrame(u16),
    #[error("Received a frame with a DLC ({0:?}) that was out of the valid range (0..=8)")]
    DataTooLong(usize),
}

/// The CANopen object a frame belongs to, as seen from one particular node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageKind {
    Nmt,
    Pdo,
    /// SDO request addressed to the classifying node
    SdoRequest,
    /// SDO response addressed to the classifying node
    SdoResponse,
    Heartbeat,
    /// Anything else (SYNC, EMCY, TIME, or SDO traffic for other nodes)
    Other,
}

impl MessageKind {
    /// Sorts a COB-ID into the object kind it carries for the node `own_id`
    pub fn classify(raw_id: u16, own_id: u8) -> Self {
        let own_id = own_id as u16 & NODE_ID_MASK;

        match raw_id {
            NMT_ID => Self::Nmt,
            id if PDO_ID_RANGE.contains(&id) => Self::Pdo,
            id if id == SDO_REQUEST_BASE + own_id => Self::SdoRequest,
            id if id == SDO_RESPONSE_BASE + own_id => Self::SdoResponse,
            id if (HEARTBEAT_BASE + 1..=HEARTBEAT_BASE + NODE_ID_MASK).contains(&id) => {
                Self::Heartbeat
            }
            _ => Self::Other,
        }
    }
}
