//! # ptpmsg
//!
//! The message layer of a Precision Time Protocol (IEEE 1588-2008) daemon.
//!
//! ## Features
//!
//! - Header and body codecs for all ten PTP message kinds
//! - TLV suffix parsing and serialization with per-type hooks
//! - Recycling message pool with reference-counted handles
//! - Optional tokio-shared pool (`tokio-runtime` feature)
//!
//! ## Example
//!
//! ```rust
//! use ptpmsg::prelude::*;
//!
//! # fn main() -> Result<(), PtpError> {
//! let config = MessageConfig::builder().max_messages(16).build()?;
//! let mut pool = MessagePool::with_registry(config, TlvRegistry::with_standard_checks())?;
//!
//! let handle = pool.allocate()?;
//! pool.prepare(handle, MessageBody::Signaling {
//!     target_port_identity: PortIdentity::default(),
//! })?;
//! pool.push_tlv(handle, TlvType::OrganizationExtension.as_u16(), &[0, 0x1B, 0x19, 0, 0, 1])?;
//! assert_eq!(pool.pre_send(handle)?.len(), 44 + 10);
//! pool.release(handle)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Pool**: [`MessagePool`] owns every message buffer and TLV descriptor.
//! - **Codecs**: [`protocol::ptp::header`], [`protocol::ptp::body`] and
//!   [`protocol::ptp::tlv`] convert between wire and host form.
//! - **Configuration**: [`MessageConfig`] sets buffer geometry and send policy.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Configuration
pub mod config;
/// Error types
pub mod error;
pub mod protocol;

// Re-exports
pub use config::{ControlField, MessageConfig, MessageConfigBuilder};
pub use error::{Malformed, PoolKind, PtpError};
pub use protocol::ptp::{MessagePool, MsgHandle, PtpMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::protocol::ptp::{
        ClockIdentity, ClockQuality, MessageBody, MessageType, PortIdentity, PtpTimestamp,
        TlvHandler, TlvRegistry, TlvType,
    };
    pub use crate::{
        ControlField, MessageConfig, MessagePool, MsgHandle, PtpError, PtpMessage,
    };
}
