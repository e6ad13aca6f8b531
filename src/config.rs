use serde::{Deserialize, Serialize};

use crate::error::{PtpError, Result};
use crate::protocol::ptp::message::MessageType;

/// How the deprecated header control field is filled on send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlField {
    /// Treat control as reserved and send `0xFF`
    #[default]
    AllOnes,
    /// Send the PTPv1 per-type values (Sync 0, `Delay_Req` 1, ...)
    Legacy,
}

/// Configuration for the message pool and codecs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// PDU bytes per message slot; bounds TLV appends (default: 1500)
    pub capacity: usize,

    /// Bytes reserved ahead of the PDU for lower-layer framing (default: 24)
    pub headroom: usize,

    /// Upper bound on message slots (None = grow on demand)
    pub max_messages: Option<usize>,

    /// Upper bound on TLV descriptors (None = grow on demand)
    pub max_tlv_descriptors: Option<usize>,

    /// Treat one-step messages as two-step (works around broken peers)
    pub assume_two_step: bool,

    /// Control field fill policy (default: all ones)
    pub control_field: ControlField,

    /// Emit debug events with full header contents on decode/encode
    pub debug_headers: bool,
}

impl MessageConfig {
    /// Default PDU capacity (one Ethernet MTU)
    pub const DEFAULT_CAPACITY: usize = 1500;

    /// Default headroom: fits a VLAN Ethernet header and keeps the PDU 64-bit aligned
    pub const DEFAULT_HEADROOM: usize = 24;

    /// Create a new config builder
    #[must_use]
    pub fn builder() -> MessageConfigBuilder {
        MessageConfigBuilder::default()
    }

    /// Parse a JSON document, filling omitted fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON is malformed or fails [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the buffer geometry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the capacity cannot hold the largest fixed
    /// message or exceeds what `messageLength` can express, or if the
    /// headroom would misalign the PDU.
    pub fn validate(&self) -> Result<()> {
        let min = MessageType::largest_pdu_len();
        if self.capacity < min {
            return Err(PtpError::InvalidConfig {
                message: format!("capacity {} below largest message ({min})", self.capacity),
            });
        }
        if self.capacity > usize::from(u16::MAX) {
            return Err(PtpError::InvalidConfig {
                message: format!("capacity {} exceeds u16 message length", self.capacity),
            });
        }
        if self.headroom % 8 != 0 {
            return Err(PtpError::InvalidConfig {
                message: format!("headroom {} is not a multiple of 8", self.headroom),
            });
        }
        Ok(())
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            headroom: Self::DEFAULT_HEADROOM,
            max_messages: None,
            max_tlv_descriptors: None,
            assume_two_step: false,
            control_field: ControlField::AllOnes,
            debug_headers: false,
        }
    }
}

/// Builder for `MessageConfig`
#[derive(Debug, Clone, Default)]
pub struct MessageConfigBuilder {
    config: MessageConfig,
}

impl MessageConfigBuilder {
    /// Set PDU capacity per slot
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set headroom ahead of the PDU
    #[must_use]
    pub fn headroom(mut self, headroom: usize) -> Self {
        self.config.headroom = headroom;
        self
    }

    /// Cap the number of message slots
    #[must_use]
    pub fn max_messages(mut self, max: usize) -> Self {
        self.config.max_messages = Some(max);
        self
    }

    /// Cap the number of TLV descriptors
    #[must_use]
    pub fn max_tlv_descriptors(mut self, max: usize) -> Self {
        self.config.max_tlv_descriptors = Some(max);
        self
    }

    /// Treat one-step messages as two-step
    #[must_use]
    pub fn assume_two_step(mut self, enable: bool) -> Self {
        self.config.assume_two_step = enable;
        self
    }

    /// Set control field fill policy
    #[must_use]
    pub fn control_field(mut self, policy: ControlField) -> Self {
        self.config.control_field = policy;
        self
    }

    /// Enable header debug events
    #[must_use]
    pub fn debug_headers(mut self, enable: bool) -> Self {
        self.config.debug_headers = enable;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation.
    pub fn build(self) -> Result<MessageConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
