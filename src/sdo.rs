use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::frame::{CanFrame, NODE_ID_MASK, SDO_REQUEST_BASE, SDO_RESPONSE_BASE};

/// Largest payload an expedited transfer can carry
pub const MAX_EXPEDITED_DATA_LENGTH: usize = 4;

/// Offset of the payload within an SDO frame (command, index LE, sub-index)
const HEADER_LENGTH: usize = 4;

/// The command specifier (upper nibble of the first byte) of an expedited
/// SDO frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[num_enum(error_type(name = SdoParseError, constructor = SdoParseError::UnrecognizedCommand))]
#[repr(u8)]
pub enum SdoCommand {
    Write = 0x20,
    Read = 0x40,
    WriteAck = 0x60,
}

/// An expedited SDO request or response in its decoded form
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdoFrame {
    node_id: u8,
    cmd: SdoCommand,
    index: u16,
    sub_index: u8,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    data: Vec<u8, MAX_EXPEDITED_DATA_LENGTH>,
}

impl SdoFrame {
    /// Creates a new SDO frame. `data` must be at most 4 bytes long (only
    /// expedited transfers are supported) or else `None` will be returned
    /// instead. The node ID is masked to 7 bits.
    pub fn new(node_id: u8, cmd: SdoCommand, index: u16, sub_index: u8, data: &[u8]) -> Option<Self> {
        Some(Self {
            node_id: node_id & NODE_ID_MASK as u8,
            cmd,
            index,
            sub_index,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// A read (upload) request for one object dictionary entry
    pub fn read(node_id: u8, index: u16, sub_index: u8) -> Self {
        Self {
            node_id: node_id & NODE_ID_MASK as u8,
            cmd: SdoCommand::Read,
            index,
            sub_index,
            data: Vec::new(),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn cmd(&self) -> SdoCommand {
        self.cmd
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn sub_index(&self) -> u8 {
        self.sub_index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// The first byte of the frame: command specifier plus the size nibble
    /// of the expedited transfer convention (1 byte -> 0xF, 4 bytes -> 0x3)
    fn command_byte(&self) -> u8 {
        let mut byte: u8 = self.cmd.into();

        if !self.data.is_empty() {
            byte |= 0x0F - ((self.data.len() as u8 - 1) * 4);
        }

        byte
    }

    fn encode(&self, base: u16) -> CanFrame {
        let mut buf = [0u8; 8];

        buf[0] = self.command_byte();
        buf[1..3].copy_from_slice(&self.index.to_le_bytes());
        buf[3] = self.sub_index;
        buf[HEADER_LENGTH..HEADER_LENGTH + self.data.len()].copy_from_slice(&self.data);

        CanFrame::from_raw(base + self.node_id as u16, &buf).unwrap()
    }

    /// Encodes the frame as a request to the server `node_id` (COB-ID
    /// 0x600 + node ID)
    pub fn encode_request(&self) -> CanFrame {
        self.encode(SDO_REQUEST_BASE)
    }

    /// Encodes the frame as a response from the server `node_id` (COB-ID
    /// 0x580 + node ID)
    pub fn encode_response(&self) -> CanFrame {
        self.encode(SDO_RESPONSE_BASE)
    }

    /// Decodes a request or response received by node `own_id`. The COB-ID
    /// is not checked, the caller routes on it.
    pub fn decode(frame: &CanFrame, own_id: u8) -> Result<Self, SdoParseError> {
        if frame.dlc() < HEADER_LENGTH {
            return Err(SdoParseError::NotEnoughBytes(frame.dlc()));
        }

        let bytes = frame.padded_data();
        let cmd: SdoCommand = (bytes[0] & 0xF0).try_into()?;

        // A bare read request or write acknowledgement carries no size nibble
        let data_len = match bytes[0] {
            0x40 | 0x60 => 0,
            byte => (3 - ((byte & 0x0C) >> 2) as usize) + 1,
        };

        if frame.dlc() < HEADER_LENGTH + data_len {
            return Err(SdoParseError::TruncatedPayload(data_len, frame.dlc()));
        }

        Ok(Self {
            node_id: own_id & NODE_ID_MASK as u8,
            cmd,
            index: u16::from_le_bytes([bytes[1], bytes[2]]),
            sub_index: bytes[3],
            data: Vec::from_slice(&bytes[HEADER_LENGTH..HEADER_LENGTH + data_len]).unwrap(),
        })
    }
}

/// Various errors which can arise while decoding an expedited SDO frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdoParseError {
    #[error("Received an SDO frame with an unsupported command specifier ({0:#x})")]
    UnrecognizedCommand(u8),
    #[error("Received an SDO frame with fewer bytes ({0:?}) than the header needs")]
    NotEnoughBytes(usize),
    #[error("Received an SDO frame announcing ({0:?}) data bytes in a frame of ({1:?}) bytes")]
    TruncatedPayload(usize, usize),
}

#[cfg(test)]
mod tests {
    use super::{SdoCommand, SdoFrame, SdoParseError};
    use crate::frame::CanFrame;

    #[test]
    fn payload_bounds() {
        assert!(SdoFrame::new(1, SdoCommand::Write, 0x2000, 0, &[1, 2, 3, 4]).is_some());
        assert!(SdoFrame::new(1, SdoCommand::Write, 0x2000, 0, &[1, 2, 3, 4, 5]).is_none());
        assert_eq!(
            SdoFrame::new(0x85, SdoCommand::Read, 0x1000, 0, &[]).unwrap().node_id(),
            0x05
        );
    }

    #[test]
    fn encode_read_request() {
        let frame = SdoFrame::read(5, 0x1018, 1).encode_request();

        assert_eq!(frame.raw_id(), 0x605);
        assert_eq!(frame.dlc(), 8);
        assert_eq!(&frame.data()[..4], &[0x40, 0x18, 0x10, 0x01]);
    }

    #[test]
    fn size_nibble() {
        let cases: [(&[u8], u8); 4] = [
            (&[0xAA], 0x2F),
            (&[0xAA, 0xBB], 0x2B),
            (&[0xAA, 0xBB, 0xCC], 0x27),
            (&[0xAA, 0xBB, 0xCC, 0xDD], 0x23),
        ];

        for (payload, command_byte) in cases {
            let sdo = SdoFrame::new(0x10, SdoCommand::Write, 0x6040, 2, payload).unwrap();
            let frame = sdo.encode_response();

            assert_eq!(frame.raw_id(), 0x590);
            assert_eq!(frame.data()[0], command_byte);
            assert_eq!(&frame.data()[1..4], &[0x40, 0x60, 0x02]);
            assert_eq!(&frame.data()[4..4 + payload.len()], payload);
        }
    }

    #[test]
    fn expedited_round_trip() {
        let payload = [0x11, 0x22, 0x33, 0x44];

        for len in 1..=4 {
            for cmd in [SdoCommand::Write, SdoCommand::Read, SdoCommand::WriteAck] {
                let sdo = SdoFrame::new(7, cmd, 0x1234, 9, &payload[..len]).unwrap();
                let decoded = SdoFrame::decode(&sdo.encode_request(), 7).unwrap();

                assert_eq!(decoded, sdo);
            }
        }
    }

    #[test]
    fn decode_without_payload() {
        let ack = CanFrame::from_raw(0x585, &[0x60, 0x00, 0x20, 0x01, 0, 0, 0, 0]).unwrap();
        let decoded = SdoFrame::decode(&ack, 5).unwrap();

        assert_eq!(decoded.cmd(), SdoCommand::WriteAck);
        assert_eq!(decoded.index(), 0x2000);
        assert_eq!(decoded.sub_index(), 1);
        assert_eq!(decoded.data_len(), 0);
    }

    #[test]
    fn sdo_parse_errors() {
        assert_eq!(
            SdoFrame::decode(&CanFrame::from_raw(0x605, &[0x80, 0, 0]).unwrap(), 5),
            Err(SdoParseError::NotEnoughBytes(3))
        );

        assert_eq!(
            SdoFrame::decode(&CanFrame::from_raw(0x605, &[0x80, 0, 0, 0, 0, 0, 0, 0]).unwrap(), 5),
            Err(SdoParseError::UnrecognizedCommand(0x80))
        );

        assert_eq!(
            SdoFrame::decode(&CanFrame::from_raw(0x605, &[0x23, 0, 0, 0, 1]).unwrap(), 5),
            Err(SdoParseError::TruncatedPayload(4, 5))
        );
    }
}
