//! Type-specific message bodies.
//!
//! Every body has a fixed wire layout that follows the 34-byte header.
//! Only timestamps, port numbers and the Announce integer fields change
//! representation; clock identities are copied as opaque bytes and
//! reserved body bytes are sent as all ones.

use byteorder::{BigEndian, ByteOrder};

use super::header::PtpHeader;
use super::message::{ClockIdentity, MessageType, PortIdentity};
use super::timestamp::PtpTimestamp;
use crate::error::{Malformed, Result};

/// Grandmaster clock quality carried in Announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockQuality {
    /// Clock class.
    pub clock_class: u8,
    /// Clock accuracy enumeration.
    pub clock_accuracy: u8,
    /// Scaled log variance of the clock offset.
    pub offset_scaled_log_variance: u16,
}

/// PTP message body variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody {
    /// Sync: origin timestamp (T1 if one-step, or approximate if two-step).
    Sync {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Delay request: origin timestamp (T3).
    DelayReq {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Peer delay request.
    PdelayReq {
        /// Origin timestamp, usually zero.
        origin_timestamp: PtpTimestamp,
    },
    /// Peer delay response.
    PdelayResp {
        /// When the responder received the `Pdelay_Req`.
        request_receipt_timestamp: PtpTimestamp,
        /// Port identity of the requester.
        requesting_port_identity: PortIdentity,
    },
    /// Follow-up: precise origin timestamp (T1).
    FollowUp {
        /// Precise origin timestamp from the associated Sync.
        precise_origin_timestamp: PtpTimestamp,
    },
    /// Delay response: receive timestamp (T4) and requesting port identity.
    DelayResp {
        /// Receive timestamp (when master received the `Delay_Req`).
        receive_timestamp: PtpTimestamp,
        /// Port identity of the requester.
        requesting_port_identity: PortIdentity,
    },
    /// Peer delay response follow-up.
    PdelayRespFollowUp {
        /// Precise send time of the `Pdelay_Resp`.
        response_origin_timestamp: PtpTimestamp,
        /// Port identity of the requester.
        requesting_port_identity: PortIdentity,
    },
    /// Announce: grandmaster properties.
    Announce {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
        /// Current UTC offset in seconds.
        current_utc_offset: i16,
        /// Grandmaster priority 1.
        grandmaster_priority1: u8,
        /// Grandmaster clock quality.
        grandmaster_clock_quality: ClockQuality,
        /// Grandmaster priority 2.
        grandmaster_priority2: u8,
        /// Grandmaster clock identity.
        grandmaster_identity: ClockIdentity,
        /// Hops between the grandmaster and the sender.
        steps_removed: u16,
        /// Time source enumeration.
        time_source: u8,
    },
    /// Signaling.
    Signaling {
        /// Port the signaling is addressed to.
        target_port_identity: PortIdentity,
    },
    /// Management.
    Management {
        /// Port the management message is addressed to.
        target_port_identity: PortIdentity,
        /// Boundary hops when first sent.
        starting_boundary_hops: u8,
        /// Remaining boundary hops.
        boundary_hops: u8,
        /// Action field (low nibble).
        action: u8,
    },
}

impl Default for MessageBody {
    /// A zeroed frame reads as a Sync with a zero timestamp.
    fn default() -> Self {
        Self::Sync {
            origin_timestamp: PtpTimestamp::ZERO,
        }
    }
}

impl MessageBody {
    /// Message type selected by this body.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Sync { .. } => MessageType::Sync,
            Self::DelayReq { .. } => MessageType::DelayReq,
            Self::PdelayReq { .. } => MessageType::PdelayReq,
            Self::PdelayResp { .. } => MessageType::PdelayResp,
            Self::FollowUp { .. } => MessageType::FollowUp,
            Self::DelayResp { .. } => MessageType::DelayResp,
            Self::PdelayRespFollowUp { .. } => MessageType::PdelayRespFollowUp,
            Self::Announce { .. } => MessageType::Announce,
            Self::Signaling { .. } => MessageType::Signaling,
            Self::Management { .. } => MessageType::Management,
        }
    }

    /// Body length on the wire (fixed PDU length minus the header).
    #[must_use]
    pub fn wire_len(&self) -> usize {
        self.message_type().pdu_len() - PtpHeader::SIZE
    }

    /// The timestamp the servo consumes from this body, if any.
    ///
    /// `Pdelay_Req`'s origin timestamp is informational and not reported.
    #[must_use]
    pub fn pdu_timestamp(&self) -> Option<PtpTimestamp> {
        match *self {
            Self::Sync { origin_timestamp }
            | Self::DelayReq { origin_timestamp }
            | Self::Announce {
                origin_timestamp, ..
            } => Some(origin_timestamp),
            Self::PdelayResp {
                request_receipt_timestamp,
                ..
            } => Some(request_receipt_timestamp),
            Self::FollowUp {
                precise_origin_timestamp,
            } => Some(precise_origin_timestamp),
            Self::DelayResp {
                receive_timestamp, ..
            } => Some(receive_timestamp),
            Self::PdelayRespFollowUp {
                response_origin_timestamp,
                ..
            } => Some(response_origin_timestamp),
            Self::PdelayReq { .. } | Self::Signaling { .. } | Self::Management { .. } => None,
        }
    }

    /// Decode the body that follows the header.
    ///
    /// `data` starts right after the header.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if `data` is shorter than the fixed body.
    pub fn decode(kind: MessageType, data: &[u8]) -> Result<Self> {
        let needed = kind.pdu_len() - PtpHeader::SIZE;
        if data.len() < needed {
            return Err(Malformed::TooShort {
                needed: kind.pdu_len(),
                have: PtpHeader::SIZE + data.len(),
            }
            .into());
        }
        // Lengths were checked above, so the fixed-size reads below cannot fail.
        let ts = |at: usize| PtpTimestamp::decode_wire(&data[at..]).unwrap_or_default();
        let port = |at: usize| PortIdentity::decode(&data[at..]).unwrap_or_default();

        let body = match kind {
            MessageType::Sync => Self::Sync {
                origin_timestamp: ts(0),
            },
            MessageType::DelayReq => Self::DelayReq {
                origin_timestamp: ts(0),
            },
            MessageType::PdelayReq => Self::PdelayReq {
                origin_timestamp: ts(0),
            },
            MessageType::PdelayResp => Self::PdelayResp {
                request_receipt_timestamp: ts(0),
                requesting_port_identity: port(10),
            },
            MessageType::FollowUp => Self::FollowUp {
                precise_origin_timestamp: ts(0),
            },
            MessageType::DelayResp => Self::DelayResp {
                receive_timestamp: ts(0),
                requesting_port_identity: port(10),
            },
            MessageType::PdelayRespFollowUp => Self::PdelayRespFollowUp {
                response_origin_timestamp: ts(0),
                requesting_port_identity: port(10),
            },
            MessageType::Announce => {
                let mut grandmaster_identity = [0u8; 8];
                grandmaster_identity.copy_from_slice(&data[19..27]);
                Self::Announce {
                    origin_timestamp: ts(0),
                    current_utc_offset: BigEndian::read_i16(&data[10..12]),
                    // data[12] reserved
                    grandmaster_priority1: data[13],
                    grandmaster_clock_quality: ClockQuality {
                        clock_class: data[14],
                        clock_accuracy: data[15],
                        offset_scaled_log_variance: BigEndian::read_u16(&data[16..18]),
                    },
                    grandmaster_priority2: data[18],
                    grandmaster_identity: ClockIdentity(grandmaster_identity),
                    steps_removed: BigEndian::read_u16(&data[27..29]),
                    time_source: data[29],
                }
            }
            MessageType::Signaling => Self::Signaling {
                target_port_identity: port(0),
            },
            MessageType::Management => Self::Management {
                target_port_identity: port(0),
                starting_boundary_hops: data[10],
                boundary_hops: data[11],
                action: data[12] & 0x0F,
                // data[13] reserved
            },
        };
        Ok(body)
    }

    /// Encode into `out`, which starts right after the header.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::wire_len`].
    pub fn encode_into(&self, out: &mut [u8]) {
        match *self {
            Self::Sync { origin_timestamp }
            | Self::DelayReq { origin_timestamp }
            | Self::FollowUp {
                precise_origin_timestamp: origin_timestamp,
            } => origin_timestamp.encode_wire(&mut out[0..10]),
            Self::PdelayReq { origin_timestamp } => {
                origin_timestamp.encode_wire(&mut out[0..10]);
                out[10..20].fill(0xFF);
            }
            Self::PdelayResp {
                request_receipt_timestamp: timestamp,
                requesting_port_identity,
            }
            | Self::DelayResp {
                receive_timestamp: timestamp,
                requesting_port_identity,
            }
            | Self::PdelayRespFollowUp {
                response_origin_timestamp: timestamp,
                requesting_port_identity,
            } => {
                timestamp.encode_wire(&mut out[0..10]);
                requesting_port_identity.encode_into(&mut out[10..20]);
            }
            Self::Announce {
                origin_timestamp,
                current_utc_offset,
                grandmaster_priority1,
                grandmaster_clock_quality,
                grandmaster_priority2,
                grandmaster_identity,
                steps_removed,
                time_source,
            } => {
                origin_timestamp.encode_wire(&mut out[0..10]);
                BigEndian::write_i16(&mut out[10..12], current_utc_offset);
                out[12] = 0xFF;
                out[13] = grandmaster_priority1;
                out[14] = grandmaster_clock_quality.clock_class;
                out[15] = grandmaster_clock_quality.clock_accuracy;
                BigEndian::write_u16(
                    &mut out[16..18],
                    grandmaster_clock_quality.offset_scaled_log_variance,
                );
                out[18] = grandmaster_priority2;
                out[19..27].copy_from_slice(&grandmaster_identity.0);
                BigEndian::write_u16(&mut out[27..29], steps_removed);
                out[29] = time_source;
            }
            Self::Signaling {
                target_port_identity,
            } => target_port_identity.encode_into(&mut out[0..10]),
            Self::Management {
                target_port_identity,
                starting_boundary_hops,
                boundary_hops,
                action,
            } => {
                target_port_identity.encode_into(&mut out[0..10]);
                out[10] = starting_boundary_hops;
                out[11] = boundary_hops;
                out[12] = 0xF0 | (action & 0x0F);
                out[13] = 0xFF;
            }
        }
    }
}
