//! Common 34-byte PTP header.

use byteorder::{BigEndian, ByteOrder};

use super::message::{MessageType, PortIdentity};
use crate::error::{Malformed, PtpError, Result};

/// IEEE 1588 PTP message header (34 bytes), host form.
///
/// The message type lives in the body variant and the version is fixed at
/// 2, so neither is stored here. Reserved fields are not stored either:
/// they are ignored on receive and sent as all ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtpHeader {
    /// Transport-specific nibble (upper 4 bits of byte 0).
    pub transport_specific: u8,
    /// Total message length including header and TLVs.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Flag field, octet 0 in the high byte (see [`super::message::flags`]).
    pub flags: u16,
    /// Correction field (nanoseconds * 2^16, signed).
    pub correction: i64,
    /// Source port identity.
    pub source_port_identity: PortIdentity,
    /// Sequence ID.
    pub sequence_id: u16,
    /// Control field as received (deprecated in v2).
    pub control: u8,
    /// Log message interval.
    pub log_message_interval: i8,
}

impl PtpHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 34;

    /// Supported PTP version.
    pub const VERSION: u8 = 2;

    /// Version bits of byte 1.
    pub const VERSION_MASK: u8 = 0x0F;

    /// Reserved flag bits set on send: octet 0 `0xF8`, octet 1 `0x80`.
    pub const FLAG_FILL: u16 = 0xF880;

    /// Control value sent when the field is treated as reserved.
    pub const RESERVED_CONTROL: u8 = 0xFF;

    /// Decode from the start of a PDU.
    ///
    /// The version nibble is checked before anything else is read.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if fewer than 34 bytes are given and
    /// `ProtocolVersionMismatch` if the version is not 2.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Malformed::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            }
            .into());
        }
        let version = data[1] & Self::VERSION_MASK;
        if version != Self::VERSION {
            return Err(PtpError::ProtocolVersionMismatch { found: version });
        }
        let source_port_identity =
            PortIdentity::decode(&data[20..30]).ok_or(Malformed::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            })?;
        Ok(Self {
            transport_specific: data[0] >> 4,
            message_length: BigEndian::read_u16(&data[2..4]),
            domain_number: data[4],
            flags: BigEndian::read_u16(&data[6..8]),
            correction: BigEndian::read_i64(&data[8..16]),
            source_port_identity,
            sequence_id: BigEndian::read_u16(&data[30..32]),
            control: data[32],
            log_message_interval: i8::from_be_bytes([data[33]]),
        })
    }

    /// Encode into the first 34 bytes of `out`.
    ///
    /// Reserved nibble, reserved byte, reserved flag bits and the reserved
    /// word are written as all ones.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::SIZE`].
    pub fn encode_into(&self, message_type: MessageType, control: u8, out: &mut [u8]) {
        out[0] = ((self.transport_specific & 0x0F) << 4) | (message_type as u8 & 0x0F);
        out[1] = 0xF0 | Self::VERSION;
        BigEndian::write_u16(&mut out[2..4], self.message_length);
        out[4] = self.domain_number;
        out[5] = 0xFF;
        BigEndian::write_u16(&mut out[6..8], self.flags | Self::FLAG_FILL);
        BigEndian::write_i64(&mut out[8..16], self.correction);
        out[16..20].fill(0xFF);
        self.source_port_identity.encode_into(&mut out[20..30]);
        BigEndian::write_u16(&mut out[30..32], self.sequence_id);
        out[32] = control;
        out[33] = self.log_message_interval.to_be_bytes()[0];
    }

    /// Encode to a fresh 34-byte array with the reserved control value.
    #[must_use]
    pub fn encode(&self, message_type: MessageType) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode_into(message_type, Self::RESERVED_CONTROL, &mut buf);
        buf
    }
}
