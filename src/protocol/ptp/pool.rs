//! Message pool and the receive/send pipelines.
//!
//! The pool is an arena of message slots addressed by [`MsgHandle`]. A
//! released slot goes on a free stack and is handed out again before any
//! new slot is created, so a steady alloc/release pattern never grows the
//! pool. Slot memory is only dropped by [`MessagePool::teardown`].
//!
//! Each handle carries the slot's generation. The generation moves on when
//! the last reference is released, which turns any copy of the old handle
//! into a [`PtpError::StaleHandle`] instead of aliasing the next user.

use super::body::MessageBody;
use super::message::{MessageType, PtpMessage};
use super::tlv::{self, TlvDescriptorPool, TlvId, TlvIter, TlvRecordMut, TlvRegistry};
use crate::config::MessageConfig;
use crate::error::{PoolKind, PtpError, Result};

#[cfg(feature = "tokio-runtime")]
use std::sync::Arc;

/// Reference to a pooled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgHandle {
    index: u32,
    generation: u32,
}

impl MsgHandle {
    /// Slot index inside the pool.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Display for MsgHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg#{}.{}", self.index, self.generation)
    }
}

/// Allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Objects ever created and not yet torn down.
    pub total: usize,
    /// Objects sitting on the free stack.
    pub count: usize,
    /// Objects currently handed out.
    pub used: usize,
}

impl PoolStats {
    pub(crate) fn new(total: usize, count: usize) -> Self {
        Self {
            total,
            count,
            used: total.saturating_sub(count),
        }
    }
}

#[derive(Debug)]
struct Slot {
    message: PtpMessage,
    refcount: u32,
    generation: u32,
}

/// Pool of PTP messages with a shared TLV descriptor sub-pool.
#[derive(Debug)]
pub struct MessagePool {
    config: MessageConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    tlv_descriptors: TlvDescriptorPool,
    registry: TlvRegistry,
    generation_floor: u32,
    sent: u64,
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::build(MessageConfig::default(), TlvRegistry::new())
    }
}

impl MessagePool {
    /// Create a pool with no TLV hooks.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(config: MessageConfig) -> Result<Self> {
        Self::with_registry(config, TlvRegistry::new())
    }

    /// Create a pool with the given TLV hooks.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn with_registry(config: MessageConfig, registry: TlvRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, registry))
    }

    fn build(config: MessageConfig, registry: TlvRegistry) -> Self {
        Self {
            tlv_descriptors: TlvDescriptorPool::new(config.max_tlv_descriptors),
            config,
            slots: Vec::new(),
            free: Vec::new(),
            registry,
            generation_floor: 0,
            sent: 0,
        }
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &MessageConfig {
        &self.config
    }

    /// TLV hooks.
    #[must_use]
    pub fn registry(&self) -> &TlvRegistry {
        &self.registry
    }

    /// Mutable TLV hooks.
    pub fn registry_mut(&mut self) -> &mut TlvRegistry {
        &mut self.registry
    }

    /// Message slot counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(self.slots.len(), self.free.len())
    }

    /// TLV descriptor counters.
    #[must_use]
    pub fn tlv_stats(&self) -> PoolStats {
        self.tlv_descriptors.stats()
    }

    /// Messages encoded by [`Self::pre_send`] over the pool's lifetime.
    ///
    /// Survives [`Self::teardown`].
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    fn slot_index(&self, handle: MsgHandle) -> Result<usize> {
        let index = handle.index as usize;
        match self.slots.get(index) {
            Some(slot) if slot.generation == handle.generation && slot.refcount > 0 => Ok(index),
            _ => Err(PtpError::StaleHandle),
        }
    }

    /// Hand out a zeroed message with one reference and no TLVs.
    ///
    /// The most recently released slot is reused first.
    ///
    /// # Errors
    /// Returns `PoolExhausted` if `max_messages` slots are all in use.
    pub fn allocate(&mut self) -> Result<MsgHandle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.message.reset();
            slot.refcount = 1;
            let handle = MsgHandle {
                index,
                generation: slot.generation,
            };
            let stats = self.stats();
            tracing::trace!(
                total = stats.total,
                count = stats.count,
                used = stats.used,
                "dequeue message"
            );
            return Ok(handle);
        }

        let total = self.slots.len();
        if self.config.max_messages.is_some_and(|max| total >= max) {
            tracing::debug!(total, "message pool exhausted");
            return Err(PtpError::PoolExhausted(PoolKind::Messages));
        }
        let index = u32::try_from(total).map_err(|_| PtpError::PoolExhausted(PoolKind::Messages))?;
        self.slots.push(Slot {
            message: PtpMessage::with_geometry(self.config.headroom, self.config.capacity),
            refcount: 1,
            generation: self.generation_floor,
        });
        let stats = self.stats();
        tracing::trace!(
            total = stats.total,
            count = stats.count,
            used = stats.used,
            "allocate message"
        );
        Ok(MsgHandle {
            index,
            generation: self.generation_floor,
        })
    }

    /// Add a reference.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn retain(&mut self, handle: MsgHandle) -> Result<()> {
        let index = self.slot_index(handle)?;
        let slot = &mut self.slots[index];
        debug_assert!(slot.refcount < u32::MAX, "message refcount overflow");
        slot.refcount = slot.refcount.saturating_add(1);
        Ok(())
    }

    /// Drop a reference. The last one recycles the TLVs and frees the slot.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn release(&mut self, handle: MsgHandle) -> Result<()> {
        let index = self.slot_index(handle)?;
        let slot = &mut self.slots[index];
        slot.refcount -= 1;
        if slot.refcount > 0 {
            return Ok(());
        }
        tlv::recycle_all(&mut slot.message.tlv_list, &mut self.tlv_descriptors);
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        let stats = self.stats();
        tracing::trace!(
            total = stats.total,
            count = stats.count,
            used = stats.used,
            "recycle message"
        );
        Ok(())
    }

    /// Current reference count.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn refcount(&self, handle: MsgHandle) -> Result<u32> {
        Ok(self.slots[self.slot_index(handle)?].refcount)
    }

    /// The message behind `handle`.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn message(&self, handle: MsgHandle) -> Result<&PtpMessage> {
        Ok(&self.slots[self.slot_index(handle)?].message)
    }

    /// The message behind `handle`, mutably.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn message_mut(&mut self, handle: MsgHandle) -> Result<&mut PtpMessage> {
        let index = self.slot_index(handle)?;
        Ok(&mut self.slots[index].message)
    }

    /// Message type from the low nibble of the first PDU byte.
    ///
    /// That byte is written on receive and by [`PtpMessage::prepare`].
    ///
    /// # Errors
    /// Returns `StaleHandle` for a released handle and `MalformedMessage`
    /// for a reserved nibble.
    pub fn type_of(&self, handle: MsgHandle) -> Result<MessageType> {
        self.message(handle)?.wire_type()
    }

    /// Whether the message needs a send/receive timestamp.
    ///
    /// # Errors
    /// Same as [`Self::type_of`].
    pub fn requires_timestamp(&self, handle: MsgHandle) -> Result<bool> {
        Ok(self.type_of(handle)?.requires_timestamp())
    }

    /// Whether the sender is a one-step clock, honouring the pool's
    /// `assume_two_step` setting.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn is_one_step(&self, handle: MsgHandle) -> Result<bool> {
        Ok(self
            .message(handle)?
            .is_one_step(self.config.assume_two_step))
    }

    /// Decode `cnt` received bytes sitting in the message's PDU.
    ///
    /// Header, body and (for types that carry them) TLVs are decoded.
    /// TLVs left from an earlier decode are recycled first.
    ///
    /// # Errors
    /// `ProtocolVersionMismatch` if the version is not 2 (nothing else is
    /// decoded), `MalformedMessage` for short buffers, unknown types and bad
    /// TLVs, `InsufficientSpace` if `cnt` exceeds the capacity.
    pub fn post_recv(&mut self, handle: MsgHandle, cnt: usize) -> Result<()> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        tlv::recycle_all(&mut message.tlv_list, &mut self.tlv_descriptors);

        let pdu_len = match message.decode_fixed(cnt) {
            Ok(len) => len,
            Err(err @ PtpError::ProtocolVersionMismatch { .. }) => {
                tracing::debug!(%handle, error = %err, "ignoring message");
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let kind = message.message_type();
        if self.config.debug_headers {
            tracing::debug!(%handle, kind = %kind, header = ?message.header, "decoded header");
        }
        if !kind.admits_tlv() {
            return Ok(());
        }
        let (pdu, list) = message.pdu_and_tlvs();
        tlv::parse_suffix(
            kind,
            pdu,
            pdu_len,
            cnt - pdu_len,
            list,
            &mut self.tlv_descriptors,
            &self.registry,
        )
    }

    /// Encode the message for transmission and return the wire bytes.
    ///
    /// Body, TLV headers and header are written in network order; the TLV
    /// list is consumed and [`Self::messages_sent`] moves on. Call
    /// [`PtpMessage::prepare`] (and append TLVs) beforehand so
    /// `messageLength` is right.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn pre_send(&mut self, handle: MsgHandle) -> Result<&[u8]> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        let kind = message.message_type();

        message.encode_body();
        if kind.admits_tlv() {
            let (pdu, list) = message.pdu_and_tlvs();
            tlv::serialize_suffix(kind, pdu, list, &mut self.tlv_descriptors, &self.registry);
        }
        message.encode_header(self.config.control_field);
        if self.config.debug_headers {
            tracing::debug!(%handle, kind = %kind, header = ?message.header, "encoded header");
        }
        self.sent = self.sent.wrapping_add(1);
        tracing::trace!(
            %handle,
            kind = %kind,
            sequence_id = message.header.sequence_id,
            sent = self.sent,
            "send message"
        );
        Ok(message.wire_bytes())
    }

    /// Reserve a TLV record of `length` bytes (4-byte header included) after
    /// the last attached one, and grow `messageLength` by `length`.
    ///
    /// The caller sets the type and writes the value through
    /// [`Self::tlv_mut`].
    ///
    /// # Errors
    /// `UnsupportedTlvPlacement` for Sync, `Pdelay_Req` and `Pdelay_Resp`;
    /// `MalformedMessage` if `length` is below 4 or leaves an odd value
    /// length; `InsufficientSpace` if the record would pass the capacity;
    /// `PoolExhausted` if no descriptor is available.
    pub fn append_tlv(&mut self, handle: MsgHandle, length: usize) -> Result<TlvId> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        let kind = message.message_type();
        let capacity = message.capacity();

        let result = tlv::append(
            kind,
            kind.pdu_len(),
            capacity,
            &mut message.tlv_list,
            &mut self.tlv_descriptors,
            length,
        );
        match result {
            Ok(id) => {
                // length <= capacity <= u16::MAX
                let grow = u16::try_from(length).unwrap_or(u16::MAX);
                message.header.message_length = message.header.message_length.saturating_add(grow);
                Ok(id)
            }
            Err(err @ PtpError::UnsupportedTlvPlacement(_)) => {
                tracing::error!(%handle, "TLV on {kind} not allowed");
                Err(err)
            }
            Err(err @ PtpError::InsufficientSpace { .. }) => {
                tracing::debug!(%handle, length, "cannot fit TLV into message");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Append a complete record: type plus value bytes.
    ///
    /// # Errors
    /// Same as [`Self::append_tlv`].
    pub fn push_tlv(&mut self, handle: MsgHandle, tlv_type: u16, value: &[u8]) -> Result<TlvId> {
        let id = self.append_tlv(handle, tlv::TLV_HEADER_LEN + value.len())?;
        let mut record = self.tlv_mut(handle, id)?;
        record.set_tlv_type(tlv_type);
        record.value_mut().copy_from_slice(value);
        Ok(id)
    }

    /// Mutable view of an attached record.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was released or `id` is not
    /// attached to this message.
    pub fn tlv_mut(&mut self, handle: MsgHandle, id: TlvId) -> Result<TlvRecordMut<'_>> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        if !message.tlv_list.contains(&id) {
            return Err(PtpError::StaleHandle);
        }
        let kind = message.message_type();
        let descriptor = self.tlv_descriptors.get_mut(id);
        let (start, end) = (descriptor.value_offset(), descriptor.end());
        Ok(TlvRecordMut::new(kind, descriptor, &mut message.pdu_mut()[start..end]))
    }

    /// Attached records, in order.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn tlvs(&self, handle: MsgHandle) -> Result<TlvIter<'_>> {
        let message = self.message(handle)?;
        Ok(TlvIter::new(
            &message.tlv_list,
            &self.tlv_descriptors,
            message.pdu(),
        ))
    }

    /// Parse `remaining` bytes of TLVs after the fixed body, replacing any
    /// attached records.
    ///
    /// # Errors
    /// `UnsupportedTlvPlacement` for types without a TLV suffix,
    /// `MalformedMessage` for bad records (the list is left empty),
    /// `InsufficientSpace` if the suffix would pass the capacity.
    pub fn parse_tlvs(&mut self, handle: MsgHandle, remaining: usize) -> Result<()> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        let kind = message.message_type();
        if !kind.admits_tlv() {
            tracing::error!(%handle, "TLV on {kind} not allowed");
            return Err(PtpError::UnsupportedTlvPlacement(kind));
        }
        let start = kind.pdu_len();
        let capacity = message.capacity();
        if start + remaining > capacity {
            return Err(PtpError::InsufficientSpace {
                offset: start,
                length: remaining,
                capacity,
            });
        }
        tlv::recycle_all(&mut message.tlv_list, &mut self.tlv_descriptors);
        let (pdu, list) = message.pdu_and_tlvs();
        tlv::parse_suffix(
            kind,
            pdu,
            start,
            remaining,
            list,
            &mut self.tlv_descriptors,
            &self.registry,
        )
    }

    /// Write attached TLV headers in network order and consume the list.
    ///
    /// # Errors
    /// `UnsupportedTlvPlacement` for types without a TLV suffix.
    pub fn serialize_tlvs(&mut self, handle: MsgHandle) -> Result<()> {
        let index = self.slot_index(handle)?;
        let message = &mut self.slots[index].message;
        let kind = message.message_type();
        if !kind.admits_tlv() {
            tracing::error!(%handle, "TLV on {kind} not allowed");
            return Err(PtpError::UnsupportedTlvPlacement(kind));
        }
        let (pdu, list) = message.pdu_and_tlvs();
        tlv::serialize_suffix(kind, pdu, list, &mut self.tlv_descriptors, &self.registry);
        Ok(())
    }

    /// Copy of a received message, decoded afresh from its first `cnt` bytes.
    ///
    /// The copy has one reference and its own TLV list.
    ///
    /// # Errors
    /// Any [`Self::post_recv`] error, or `MissingTimestamp` if the source is
    /// an event message without a send/receive timestamp. No handle leaks
    /// on failure.
    pub fn duplicate(&mut self, source: MsgHandle, cnt: usize) -> Result<MsgHandle> {
        let src = self.slot_index(source)?;
        let dup = self.allocate()?;
        let dst = dup.index as usize;

        let (from, to) = if src < dst {
            let (low, high) = self.slots.split_at_mut(dst);
            (&low[src], &mut high[0])
        } else {
            let (low, high) = self.slots.split_at_mut(src);
            (&high[0], &mut low[dst])
        };
        to.message.copy_from(&from.message, cnt);

        if let Err(err) = self.post_recv(dup, cnt) {
            match &err {
                PtpError::MalformedMessage(detail) => {
                    tracing::error!(%source, %detail, "duplicate: bad message");
                }
                PtpError::ProtocolVersionMismatch { .. } => {
                    tracing::debug!(%source, "duplicate: ignoring message");
                }
                _ => {}
            }
            self.release(dup)?;
            return Err(err);
        }

        // The copy carries the source's timestamps and its freshly decoded type.
        let copy = &self.slots[dst].message;
        if copy.sots_missing() {
            let kind = copy.message_type();
            tracing::error!(%source, "duplicate: received {kind} without timestamp");
            self.release(dup)?;
            return Err(PtpError::MissingTimestamp(kind));
        }
        Ok(dup)
    }

    /// Replace the body of a message and reset `messageLength`.
    ///
    /// # Errors
    /// Returns `StaleHandle` if the handle was already released.
    pub fn prepare(&mut self, handle: MsgHandle, body: MessageBody) -> Result<()> {
        self.message_mut(handle)?.prepare(body);
        Ok(())
    }

    /// Drop every slot and TLV descriptor. Outstanding handles become stale.
    ///
    /// Returns the number of messages that were still referenced.
    pub fn teardown(&mut self) -> usize {
        let live = self.stats().used;
        let live_tlvs = self.tlv_descriptors.stats().used;
        if live > 0 {
            tracing::warn!(live, live_tlvs, "message pool torn down with live handles");
        }
        self.generation_floor = self
            .slots
            .iter()
            .map(|slot| slot.generation.wrapping_add(1))
            .max()
            .unwrap_or(self.generation_floor)
            .max(self.generation_floor);
        self.slots = Vec::new();
        self.free = Vec::new();
        self.tlv_descriptors.teardown();
        live
    }
}

/// Pool shared between tasks; refcounts are only touched under the lock.
#[cfg(feature = "tokio-runtime")]
pub type SharedMessagePool = Arc<tokio::sync::Mutex<MessagePool>>;

/// Wrap a pool for sharing between tasks.
#[cfg(feature = "tokio-runtime")]
#[must_use]
pub fn create_shared_pool(pool: MessagePool) -> SharedMessagePool {
    Arc::new(tokio::sync::Mutex::new(pool))
}
