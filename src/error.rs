use thiserror::Error;

use crate::protocol::ptp::message::MessageType;

/// Why an inbound PDU was judged malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    /// Buffer shorter than the fixed layout of the declared message type
    #[error("buffer too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed
        needed: usize,
        /// Bytes actually available
        have: usize,
    },

    /// Message type nibble does not name a known message
    #[error("unknown message type: 0x{0:X}")]
    UnknownMessageType(u8),

    /// TLV declared an odd value length
    #[error("TLV 0x{tlv_type:04X} has odd length {length}")]
    OddTlvLength {
        /// TLV type code
        tlv_type: u16,
        /// Declared value length
        length: u16,
    },

    /// TLV declared more value bytes than the PDU carries
    #[error("TLV 0x{tlv_type:04X} length {length} exceeds remaining {remaining} bytes")]
    TlvOverrun {
        /// TLV type code
        tlv_type: u16,
        /// Declared value length
        length: u16,
        /// Bytes left after the TLV header
        remaining: usize,
    },

    /// TLV extent smaller than its own type/length header
    #[error("TLV extent of {length} bytes cannot hold a TLV header")]
    TlvTooShort {
        /// Requested extent in bytes
        length: usize,
    },

    /// A registered TLV hook refused the record
    #[error("TLV 0x{tlv_type:04X} rejected: {reason}")]
    TlvRejected {
        /// TLV type code
        tlv_type: u16,
        /// Description from the hook
        reason: String,
    },
}

/// Which pool ran out of backing memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Message slots
    Messages,
    /// TLV descriptors
    TlvDescriptors,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Messages => write!(f, "message"),
            Self::TlvDescriptors => write!(f, "TLV descriptor"),
        }
    }
}

/// Errors raised by the PTP message layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PtpError {
    // ===== Protocol Errors =====
    /// Inbound PDU failed structural checks
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] Malformed),

    /// Header carries a PTP version other than 2
    #[error("unsupported PTP version {found}")]
    ProtocolVersionMismatch {
        /// Version nibble found on the wire
        found: u8,
    },

    /// TLV operation on a message type without a TLV suffix
    #[error("TLV on {0} not allowed")]
    UnsupportedTlvPlacement(MessageType),

    /// TLV append would cross the end of the message buffer
    #[error("cannot fit TLV of length {length} at offset {offset} (capacity {capacity})")]
    InsufficientSpace {
        /// PDU offset where the TLV would start
        offset: usize,
        /// Requested TLV extent
        length: usize,
        /// Buffer capacity in bytes
        capacity: usize,
    },

    /// Event message without the send/receive timestamp it depends on
    #[error("received {0} without timestamp")]
    MissingTimestamp(MessageType),

    // ===== Resource Errors =====
    /// No backing memory for a new object
    #[error("{0} pool exhausted")]
    PoolExhausted(PoolKind),

    /// Handle refers to a slot that has since been recycled
    #[error("stale message handle")]
    StaleHandle,

    // ===== Configuration Errors =====
    /// Configuration could not be parsed or is inconsistent
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem
        message: String,
    },
}

impl PtpError {
    /// Whether the error describes a bad inbound PDU.
    ///
    /// The caller should drop and log the message; the daemon keeps running.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage(_)
                | Self::ProtocolVersionMismatch { .. }
                | Self::MissingTimestamp(_)
        )
    }

    /// Whether the error came from running out of pooled memory
    #[must_use]
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::PoolExhausted(_))
    }
}

impl From<serde_json::Error> for PtpError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Result type alias for message layer operations
pub type Result<T> = std::result::Result<T, PtpError>;
