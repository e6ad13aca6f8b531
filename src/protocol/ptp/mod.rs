//! Precision Time Protocol (PTP, IEEE 1588-2008) message layer.
//!
//! Converts PDUs between network byte order and typed host form, keeps
//! messages in a recycling pool and handles the TLV suffix.
//!
//! ## Pipelines
//!
//! ```text
//! inbound:  bytes -> allocate -> header decode -> body decode -> TLV parse -> handle
//! outbound: handle -> body encode -> TLV serialize -> header encode -> bytes
//! ```
//!
//! ## Message kinds
//!
//! - **Event** (timestamped): Sync, `Delay_Req`, `Pdelay_Req`, `Pdelay_Resp`.
//! - **General**: `Follow_Up`, `Delay_Resp`, `Pdelay_Resp_Follow_Up`,
//!   Announce, Signaling, Management.
//!
//! Sync, `Pdelay_Req` and `Pdelay_Resp` never carry TLVs.
//!
//! ## Example
//!
//! ```rust
//! use ptpmsg::protocol::ptp::{MessageBody, MessagePool, PtpTimestamp};
//!
//! # fn main() -> ptpmsg::error::Result<()> {
//! let mut pool = MessagePool::default();
//! let tx = pool.allocate()?;
//! pool.prepare(tx, MessageBody::FollowUp {
//!     precise_origin_timestamp: PtpTimestamp::new(10, 500),
//! })?;
//! let wire = pool.pre_send(tx)?.to_vec();
//!
//! let rx = pool.allocate()?;
//! pool.message_mut(rx)?.pdu_mut()[..wire.len()].copy_from_slice(&wire);
//! pool.post_recv(rx, wire.len())?;
//! assert_eq!(pool.message(rx)?.timestamps.pdu, PtpTimestamp::new(10, 500));
//!
//! pool.release(tx)?;
//! pool.release(rx)?;
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod header;
pub mod message;
pub mod pool;
pub mod timestamp;
pub mod tlv;

#[cfg(test)]
mod tests;

// Re-exports for convenient access.
pub use body::{ClockQuality, MessageBody};
pub use header::PtpHeader;
pub use message::{
    ClockIdentity, MessageTimestamps, MessageType, PortIdentity, PtpMessage, flags,
};
#[cfg(feature = "tokio-runtime")]
pub use pool::{SharedMessagePool, create_shared_pool};
pub use pool::{MessagePool, MsgHandle, PoolStats};
pub use timestamp::PtpTimestamp;
pub use tlv::{
    MinimumLength, TLV_HEADER_LEN, TlvHandler, TlvId, TlvRecord, TlvRecordMut, TlvRegistry,
    TlvType,
};
