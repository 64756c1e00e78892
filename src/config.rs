use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_NODE_ID};

/// Whether the node drives the network or is driven by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Sends NMT commands, accepts every frame and is always operational
    Master,
    /// Obeys NMT commands addressed to its node ID or broadcast
    #[default]
    Slave,
}

/// A 7-bit CANopen node ID. Zero is reserved for "all nodes" in NMT
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(u8);

impl NodeId {
    pub const MAX: Self = Self(0x7F);

    /// Returns `None` if the value does not fit in 7 bits
    pub const fn new(value: u8) -> Option<Self> {
        if value > 0x7F {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Discards everything above the low 7 bits
    pub const fn from_masked(value: u8) -> Self {
        Self(value & 0x7F)
    }

    pub const fn as_raw(&self) -> u8 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::from_masked(DEFAULT_NODE_ID)
    }
}

impl From<NodeId> for u8 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// The nominal CAN bit rates a node can be started at. The discriminant is
/// the rate in kbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum BitRate {
    /// Transmits and receives at 10 Kbit/s
    Rate10Kbit = 10,
    /// Transmits and receives at 20 Kbit/s
    Rate20Kbit = 20,
    /// Transmits and receives at 50 Kbit/s
    Rate50Kbit = 50,
    /// Transmits and receives at 125 Kbit/s
    Rate125Kbit = 125,
    /// Transmits and receives at 250 Kbit/s
    #[default]
    Rate250Kbit = 250,
    /// Transmits and receives at 500 Kbit/s
    Rate500Kbit = 500,
    /// Transmits and receives at 800 Kbit/s
    Rate800Kbit = 800,
    /// Transmits and receives at 1 Mbit/s
    Rate1Mbit = 1000,
}

impl BitRate {
    pub const fn bits_per_second(&self) -> u32 {
        *self as u32 * 1000
    }
}

impl From<BitRate> for u32 {
    fn from(rate: BitRate) -> Self {
        rate.bits_per_second()
    }
}

/// Everything needed to bring a node up in one call, see
/// [`Node::begin_with`](crate::Node::begin_with)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub role: Role,
    pub bit_rate: BitRate,
    pub node_id: NodeId,
    pub heartbeat_interval_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::default(),
            bit_rate: BitRate::default(),
            node_id: NodeId::default(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl Config {
    pub fn master(node_id: NodeId) -> Self {
        Self {
            role: Role::Master,
            node_id,
            ..Default::default()
        }
    }

    pub fn slave(node_id: NodeId) -> Self {
        Self {
            role: Role::Slave,
            node_id,
            ..Default::default()
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: BitRate) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u32) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{BitRate, Config, NodeId, Role};

    #[test]
    fn node_id_bounds() {
        assert_eq!(NodeId::new(0x7F), Some(NodeId::MAX));
        assert_eq!(NodeId::new(0x80), None);
        assert_eq!(NodeId::from_masked(0x85).as_raw(), 0x05);
        assert_eq!(NodeId::default().as_raw(), 0x5F);
    }

    #[test]
    fn bit_rates() {
        assert_eq!(BitRate::default().bits_per_second(), 250_000);
        assert_eq!(u32::from(BitRate::Rate1Mbit), 1_000_000);
        assert_eq!(BitRate::try_from(125u16).ok(), Some(BitRate::Rate125Kbit));
        assert!(BitRate::try_from(42u16).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.role, Role::Slave);
        assert_eq!(config.heartbeat_interval_ms, 1000);

        let master = Config::master(NodeId::from_masked(1)).with_heartbeat_interval(50);
        assert_eq!(master.role, Role::Master);
        assert_eq!(master.bit_rate, BitRate::Rate250Kbit);
        assert_eq!(master.heartbeat_interval_ms, 50);
    }
}
