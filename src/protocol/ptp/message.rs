//! PTP message kinds, identities and the pooled message record.
//!
//! A [`PtpMessage`] owns one fixed-size frame: `headroom` bytes reserved
//! for lower-layer framing followed by `capacity` bytes of PDU. The frame
//! always holds the wire (network byte order) form; the typed
//! [`PtpHeader`] and [`MessageBody`] are the host form produced by decode
//! and consumed by encode.

use std::time::Instant;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use super::body::MessageBody;
use super::header::PtpHeader;
use super::timestamp::PtpTimestamp;
use super::tlv::TlvId;
use crate::config::ControlField;
use crate::error::{Malformed, PtpError, Result};

/// PTP message type identifiers (IEEE 1588 Section 13.3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Sync message (master → slave), carries T1.
    Sync = 0x0,
    /// Delay request (slave → master), sent at T3.
    DelayReq = 0x1,
    /// Peer delay request.
    PdelayReq = 0x2,
    /// Peer delay response, carries the request receipt time.
    PdelayResp = 0x3,
    /// Follow-up (master → slave), carries precise T1.
    FollowUp = 0x8,
    /// Delay response (master → slave), carries T4.
    DelayResp = 0x9,
    /// Peer delay response follow-up.
    PdelayRespFollowUp = 0xA,
    /// Announce (master → slave), clock properties.
    Announce = 0xB,
    /// Signaling, carries TLVs only.
    Signaling = 0xC,
    /// Management, carries a management TLV.
    Management = 0xD,
}

impl MessageType {
    /// Every message type, in nibble order.
    pub const ALL: [Self; 10] = [
        Self::Sync,
        Self::DelayReq,
        Self::PdelayReq,
        Self::PdelayResp,
        Self::FollowUp,
        Self::DelayResp,
        Self::PdelayRespFollowUp,
        Self::Announce,
        Self::Signaling,
        Self::Management,
    ];

    /// Parse from the lower 4 bits of a byte.
    ///
    /// # Errors
    /// Returns `Malformed::UnknownMessageType` for reserved nibbles.
    pub fn from_nibble(value: u8) -> std::result::Result<Self, Malformed> {
        match value & 0x0F {
            0x0 => Ok(Self::Sync),
            0x1 => Ok(Self::DelayReq),
            0x2 => Ok(Self::PdelayReq),
            0x3 => Ok(Self::PdelayResp),
            0x8 => Ok(Self::FollowUp),
            0x9 => Ok(Self::DelayResp),
            0xA => Ok(Self::PdelayRespFollowUp),
            0xB => Ok(Self::Announce),
            0xC => Ok(Self::Signaling),
            0xD => Ok(Self::Management),
            other => Err(Malformed::UnknownMessageType(other)),
        }
    }

    /// Whether this message type is an event message (requires timestamping).
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::Sync | Self::DelayReq | Self::PdelayReq | Self::PdelayResp
        )
    }

    /// Whether this message type is a general message.
    #[must_use]
    pub fn is_general(&self) -> bool {
        !self.is_event()
    }

    /// Whether a hardware/software send or receive timestamp must accompany it.
    #[must_use]
    pub fn requires_timestamp(&self) -> bool {
        self.is_event()
    }

    /// Whether TLVs may follow the fixed body.
    #[must_use]
    pub fn admits_tlv(&self) -> bool {
        !matches!(self, Self::Sync | Self::PdelayReq | Self::PdelayResp)
    }

    /// Fixed PDU length, header included.
    #[must_use]
    pub fn pdu_len(&self) -> usize {
        PtpHeader::SIZE
            + match self {
                Self::Sync | Self::DelayReq | Self::FollowUp => 10,
                Self::PdelayReq
                | Self::PdelayResp
                | Self::DelayResp
                | Self::PdelayRespFollowUp => 20,
                Self::Announce => 30,
                Self::Signaling => 10,
                Self::Management => 14,
            }
    }

    /// Longest fixed PDU of any message type.
    #[must_use]
    pub fn largest_pdu_len() -> usize {
        Self::ALL.iter().map(Self::pdu_len).max().unwrap_or(PtpHeader::SIZE)
    }

    /// PTPv1 control field value for this type.
    #[must_use]
    pub fn legacy_control(&self) -> u8 {
        match self {
            Self::Sync => 0x00,
            Self::DelayReq => 0x01,
            Self::FollowUp => 0x02,
            Self::DelayResp => 0x03,
            Self::Management => 0x04,
            _ => 0x05,
        }
    }

    /// Upper-case protocol name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "SYNC",
            Self::DelayReq => "DELAY_REQ",
            Self::PdelayReq => "PDELAY_REQ",
            Self::PdelayResp => "PDELAY_RESP",
            Self::FollowUp => "FOLLOW_UP",
            Self::DelayResp => "DELAY_RESP",
            Self::PdelayRespFollowUp => "PDELAY_RESP_FOLLOW_UP",
            Self::Announce => "ANNOUNCE",
            Self::Signaling => "SIGNALING",
            Self::Management => "MANAGEMENT",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// 8-byte clock identity, kept as an opaque byte string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    /// Build from a `u64`, most significant byte first.
    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl std::fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}.{:02x}{:02x}.{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// PTP port identity: 8-byte clock ID + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortIdentity {
    /// Clock identity (typically derived from a MAC address).
    pub clock_identity: ClockIdentity,
    /// Port number (1-based).
    pub port_number: u16,
}

impl PortIdentity {
    /// Wire size in bytes.
    pub const SIZE: usize = 10;

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: ClockIdentity, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Write the 10-byte wire form into `out`.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::SIZE`].
    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.clock_identity.0);
        BigEndian::write_u16(&mut out[8..10], self.port_number);
    }

    /// Encode as 10 bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Decode from 10 bytes.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let mut clock_identity = [0u8; 8];
        clock_identity.copy_from_slice(&data[0..8]);
        Some(Self {
            clock_identity: ClockIdentity(clock_identity),
            port_number: BigEndian::read_u16(&data[8..10]),
        })
    }
}

impl std::fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.clock_identity, self.port_number)
    }
}

/// Header flag bits, as a big-endian `u16` of the two flag octets.
pub mod flags {
    /// Alternate master.
    pub const ALTERNATE_MASTER: u16 = 0x0100;
    /// Two-step clock.
    pub const TWO_STEP: u16 = 0x0200;
    /// Unicast transmission.
    pub const UNICAST: u16 = 0x0400;
    /// PTP profile specific 1.
    pub const PROFILE_SPECIFIC_1: u16 = 0x2000;
    /// PTP profile specific 2.
    pub const PROFILE_SPECIFIC_2: u16 = 0x4000;
    /// Security.
    pub const SECURITY: u16 = 0x8000;
    /// Last minute of the day has 61 seconds.
    pub const LEAP_61: u16 = 0x0001;
    /// Last minute of the day has 59 seconds.
    pub const LEAP_59: u16 = 0x0002;
    /// Current UTC offset is valid.
    pub const UTC_OFFSET_VALID: u16 = 0x0004;
    /// Timescale is PTP.
    pub const PTP_TIMESCALE: u16 = 0x0008;
    /// Time traceable to a primary reference.
    pub const TIME_TRACEABLE: u16 = 0x0010;
    /// Frequency traceable to a primary reference.
    pub const FREQUENCY_TRACEABLE: u16 = 0x0020;
}

/// Timestamps attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageTimestamps {
    /// Monotonic instant captured on Announce receipt and `Delay_Req` send.
    pub host: Option<Instant>,
    /// Timestamp parsed from the PDU body.
    pub pdu: PtpTimestamp,
    /// Hardware or software send/receive timestamp supplied by the transport.
    pub hwts: Option<PtpTimestamp>,
}

/// One pooled PTP message: typed header/body, timestamps, TLV list and frame.
#[derive(Debug)]
pub struct PtpMessage {
    /// Common header (host form).
    pub header: PtpHeader,
    /// Type-specific body (host form).
    pub body: MessageBody,
    /// Captured timestamps.
    pub timestamps: MessageTimestamps,
    frame: Box<[u8]>,
    headroom: usize,
    pub(crate) tlv_list: Vec<TlvId>,
}

impl PtpMessage {
    pub(crate) fn with_geometry(headroom: usize, capacity: usize) -> Self {
        Self {
            header: PtpHeader::default(),
            body: MessageBody::default(),
            timestamps: MessageTimestamps::default(),
            frame: vec![0u8; headroom + capacity].into_boxed_slice(),
            headroom,
            tlv_list: Vec::new(),
        }
    }

    /// Zero the frame and typed fields. The TLV list must already be recycled.
    pub(crate) fn reset(&mut self) {
        debug_assert!(self.tlv_list.is_empty(), "reset with attached TLVs");
        self.header = PtpHeader::default();
        self.body = MessageBody::default();
        self.timestamps = MessageTimestamps::default();
        self.frame.fill(0);
        self.tlv_list.clear();
    }

    /// Copy frame contents, header, body and timestamps from `other`, leaving
    /// this message's TLV list untouched.
    pub(crate) fn copy_from(&mut self, other: &Self, len: usize) {
        let len = len.min(self.capacity()).min(other.capacity());
        self.header = other.header;
        self.body = other.body;
        self.timestamps = other.timestamps;
        self.pdu_mut()[..len].copy_from_slice(&other.pdu()[..len]);
    }

    /// Message type of the typed body.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Message type as found in the low nibble of the first frame byte.
    ///
    /// # Errors
    /// Returns `MalformedMessage` for a reserved nibble.
    pub fn wire_type(&self) -> Result<MessageType> {
        Ok(MessageType::from_nibble(self.pdu()[0])?)
    }

    /// Whether this message needs a send/receive timestamp.
    #[must_use]
    pub fn requires_timestamp(&self) -> bool {
        self.message_type().requires_timestamp()
    }

    /// Attach the transport's send or receive timestamp.
    pub fn set_hw_timestamp(&mut self, ts: PtpTimestamp) {
        self.timestamps.hwts = Some(ts);
    }

    /// Whether a send/receive timestamp is present and non-zero.
    #[must_use]
    pub fn sots_valid(&self) -> bool {
        self.timestamps.hwts.is_some_and(|ts| !ts.is_zero())
    }

    /// Whether this is an event message lacking its send/receive timestamp.
    #[must_use]
    pub fn sots_missing(&self) -> bool {
        self.requires_timestamp() && !self.sots_valid()
    }

    /// Replace the body and reset `messageLength` to the fixed PDU length.
    ///
    /// The type nibble of the first PDU byte follows the new body, so
    /// [`Self::wire_type`] agrees with [`Self::message_type`] before the
    /// message is encoded. Attached TLVs are not touched; append TLVs after
    /// calling this.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Fixed PDU lengths are at most 64 bytes"
    )]
    pub fn prepare(&mut self, body: MessageBody) {
        let kind = body.message_type();
        self.header.message_length = kind.pdu_len() as u16;
        self.body = body;
        let first = &mut self.frame[self.headroom];
        *first = ((self.header.transport_specific & 0x0F) << 4) | (kind as u8 & 0x0F);
    }

    /// Whether a header flag bit is set.
    #[must_use]
    pub fn flag_is_set(&self, flag: u16) -> bool {
        self.header.flags & flag != 0
    }

    /// Set or clear a header flag bit.
    pub fn set_flag(&mut self, flag: u16, on: bool) {
        if on {
            self.header.flags |= flag;
        } else {
            self.header.flags &= !flag;
        }
    }

    /// Two-step flag.
    #[must_use]
    pub fn two_step(&self) -> bool {
        self.flag_is_set(flags::TWO_STEP)
    }

    /// Unicast flag.
    #[must_use]
    pub fn unicast(&self) -> bool {
        self.flag_is_set(flags::UNICAST)
    }

    /// Alternate master flag.
    #[must_use]
    pub fn alternate_master(&self) -> bool {
        self.flag_is_set(flags::ALTERNATE_MASTER)
    }

    /// Leap-61 flag.
    #[must_use]
    pub fn leap61(&self) -> bool {
        self.flag_is_set(flags::LEAP_61)
    }

    /// Leap-59 flag.
    #[must_use]
    pub fn leap59(&self) -> bool {
        self.flag_is_set(flags::LEAP_59)
    }

    /// UTC offset valid flag.
    #[must_use]
    pub fn utc_offset_valid(&self) -> bool {
        self.flag_is_set(flags::UTC_OFFSET_VALID)
    }

    /// PTP timescale flag.
    #[must_use]
    pub fn ptp_timescale(&self) -> bool {
        self.flag_is_set(flags::PTP_TIMESCALE)
    }

    /// Time traceable flag.
    #[must_use]
    pub fn time_traceable(&self) -> bool {
        self.flag_is_set(flags::TIME_TRACEABLE)
    }

    /// Frequency traceable flag.
    #[must_use]
    pub fn frequency_traceable(&self) -> bool {
        self.flag_is_set(flags::FREQUENCY_TRACEABLE)
    }

    /// Whether the sender is a one-step clock.
    ///
    /// With `assume_two_step` every message is treated as two-step.
    #[must_use]
    pub fn is_one_step(&self, assume_two_step: bool) -> bool {
        !assume_two_step && !self.two_step()
    }

    /// One-line summary: type name and sequence id.
    #[must_use]
    pub fn summary(&self) -> String {
        self.to_string()
    }

    /// Bytes reserved ahead of the PDU.
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.headroom
    }

    /// PDU capacity in bytes (the TLV tail-room bound).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.frame.len() - self.headroom
    }

    /// The whole PDU region, wire form.
    #[must_use]
    pub fn pdu(&self) -> &[u8] {
        &self.frame[self.headroom..]
    }

    /// Mutable PDU region; the transport receives into this.
    pub fn pdu_mut(&mut self) -> &mut [u8] {
        &mut self.frame[self.headroom..]
    }

    /// Headroom followed by PDU, for transports that frame in place.
    pub fn frame_mut(&mut self) -> &mut [u8] {
        &mut self.frame
    }

    /// The first `messageLength` bytes of the PDU, capped at capacity.
    #[must_use]
    pub fn wire_bytes(&self) -> &[u8] {
        let len = usize::from(self.header.message_length).min(self.capacity());
        &self.pdu()[..len]
    }

    /// Owned copy of [`Self::wire_bytes`] for handing to a transport.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.wire_bytes())
    }

    /// Number of attached TLV records.
    #[must_use]
    pub fn tlv_count(&self) -> usize {
        self.tlv_list.len()
    }

    /// Decode header and fixed body from the first `cnt` PDU bytes.
    ///
    /// Returns the fixed PDU length; TLVs start there.
    pub(crate) fn decode_fixed(&mut self, cnt: usize) -> Result<usize> {
        if cnt > self.capacity() {
            return Err(PtpError::InsufficientSpace {
                offset: 0,
                length: cnt,
                capacity: self.capacity(),
            });
        }
        let header = PtpHeader::decode(&self.pdu()[..cnt])?;
        self.header = header;

        let kind = self.wire_type()?;
        let pdu_len = kind.pdu_len();
        if cnt < pdu_len {
            return Err(Malformed::TooShort {
                needed: pdu_len,
                have: cnt,
            }
            .into());
        }
        self.body = MessageBody::decode(kind, &self.pdu()[PtpHeader::SIZE..pdu_len])?;

        if let Some(ts) = self.body.pdu_timestamp() {
            self.timestamps.pdu = ts;
        }
        if kind == MessageType::Announce {
            self.timestamps.host = Some(Instant::now());
        }
        Ok(pdu_len)
    }

    /// Write the fixed body in wire form.
    pub(crate) fn encode_body(&mut self) {
        let kind = self.message_type();
        if kind == MessageType::DelayReq {
            self.timestamps.host = Some(Instant::now());
        }
        let body = self.body;
        body.encode_into(&mut self.pdu_mut()[PtpHeader::SIZE..kind.pdu_len()]);
    }

    /// Write the header in wire form, reserved fields filled with ones.
    pub(crate) fn encode_header(&mut self, control: ControlField) {
        let kind = self.message_type();
        let control = match control {
            ControlField::AllOnes => PtpHeader::RESERVED_CONTROL,
            ControlField::Legacy => kind.legacy_control(),
        };
        let header = self.header;
        header.encode_into(kind, control, &mut self.pdu_mut()[..PtpHeader::SIZE]);
    }

    /// Split borrow of the PDU and TLV list.
    pub(crate) fn pdu_and_tlvs(&mut self) -> (&mut [u8], &mut Vec<TlvId>) {
        let headroom = self.headroom;
        (&mut self.frame[headroom..], &mut self.tlv_list)
    }
}

impl std::fmt::Display for PtpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<10} sequenceId {:4}",
            self.message_type(),
            self.header.sequence_id
        )
    }
}
