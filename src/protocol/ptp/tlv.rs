//! TLV suffix processing.
//!
//! TLV records follow the fixed body of the message types that admit them.
//! Each record is `type: u16`, `length: u16` (value bytes, always even) and
//! the value. Records stay in the message frame; a message only keeps an
//! ordered list of [`TlvId`]s pointing at descriptors in a shared
//! [`TlvDescriptorPool`].
//!
//! Per-type behaviour plugs in through [`TlvHandler`]s held by a
//! [`TlvRegistry`]: `post_recv` runs on every parsed record and may reject
//! it, `pre_send` runs just before the record header is written.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use super::message::MessageType;
use super::pool::PoolStats;
use crate::error::{Malformed, PoolKind, PtpError, Result};

/// Size of the `type` + `length` record header.
pub const TLV_HEADER_LEN: usize = 4;

/// Index of a descriptor in the [`TlvDescriptorPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlvId(u32);

impl TlvId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a TLV record lives in the PDU and what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlvDescriptor {
    /// Offset of the record header from the start of the PDU.
    pub offset: usize,
    /// TLV type, host order.
    pub tlv_type: u16,
    /// Value length in bytes, host order.
    pub length: u16,
}

impl TlvDescriptor {
    /// Offset of the first value byte.
    #[must_use]
    pub fn value_offset(&self) -> usize {
        self.offset + TLV_HEADER_LEN
    }

    /// Offset one past the last value byte.
    #[must_use]
    pub fn end(&self) -> usize {
        self.value_offset() + usize::from(self.length)
    }
}

/// Recycling allocator for TLV descriptors, shared by all messages of a pool.
#[derive(Debug, Default)]
pub struct TlvDescriptorPool {
    slots: Vec<TlvDescriptor>,
    free: Vec<u32>,
    max: Option<usize>,
}

impl TlvDescriptorPool {
    /// Create an empty sub-pool, optionally capped at `max` descriptors.
    #[must_use]
    pub fn new(max: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            max,
        }
    }

    /// Take a descriptor, reusing the most recently recycled one first.
    ///
    /// # Errors
    /// Returns `PoolExhausted` if the cap is reached and none are free.
    pub fn alloc(&mut self, descriptor: TlvDescriptor) -> Result<TlvId> {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = descriptor;
            return Ok(TlvId(index));
        }
        let total = self.slots.len();
        if self.max.is_some_and(|max| total >= max) {
            return Err(PtpError::PoolExhausted(PoolKind::TlvDescriptors));
        }
        let index =
            u32::try_from(total).map_err(|_| PtpError::PoolExhausted(PoolKind::TlvDescriptors))?;
        self.slots.push(descriptor);
        Ok(TlvId(index))
    }

    /// Return a descriptor to the free stack.
    pub fn recycle(&mut self, id: TlvId) {
        debug_assert!(!self.free.contains(&id.0), "TLV descriptor recycled twice");
        self.slots[id.index()] = TlvDescriptor::default();
        self.free.push(id.0);
    }

    /// Descriptor behind `id`.
    #[must_use]
    pub fn get(&self, id: TlvId) -> &TlvDescriptor {
        &self.slots[id.index()]
    }

    /// Mutable descriptor behind `id`.
    pub fn get_mut(&mut self, id: TlvId) -> &mut TlvDescriptor {
        &mut self.slots[id.index()]
    }

    /// Allocation counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(self.slots.len(), self.free.len())
    }

    /// Drop all descriptors. Returns how many were still attached.
    pub fn teardown(&mut self) -> usize {
        let live = self.slots.len() - self.free.len();
        self.slots = Vec::new();
        self.free = Vec::new();
        live
    }
}

/// TLV type codes (IEEE 1588-2008 Table 34).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TlvType {
    /// Management.
    Management = 0x0001,
    /// Management error status.
    ManagementErrorStatus = 0x0002,
    /// Organization extension.
    OrganizationExtension = 0x0003,
    /// Request unicast transmission.
    RequestUnicastTransmission = 0x0004,
    /// Grant unicast transmission.
    GrantUnicastTransmission = 0x0005,
    /// Cancel unicast transmission.
    CancelUnicastTransmission = 0x0006,
    /// Acknowledge cancel unicast transmission.
    AcknowledgeCancelUnicastTransmission = 0x0007,
    /// Path trace.
    PathTrace = 0x0008,
    /// Alternate time offset indicator.
    AlternateTimeOffsetIndicator = 0x0009,
    /// Authentication.
    Authentication = 0x2000,
    /// Authentication challenge.
    AuthenticationChallenge = 0x2001,
    /// Security association update.
    SecurityAssociationUpdate = 0x2002,
    /// Cumulative frequency scale factor offset.
    CumFreqScaleFactorOffset = 0x2003,
}

impl TlvType {
    /// Look up a known type code.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0x0001 => Self::Management,
            0x0002 => Self::ManagementErrorStatus,
            0x0003 => Self::OrganizationExtension,
            0x0004 => Self::RequestUnicastTransmission,
            0x0005 => Self::GrantUnicastTransmission,
            0x0006 => Self::CancelUnicastTransmission,
            0x0007 => Self::AcknowledgeCancelUnicastTransmission,
            0x0008 => Self::PathTrace,
            0x0009 => Self::AlternateTimeOffsetIndicator,
            0x2000 => Self::Authentication,
            0x2001 => Self::AuthenticationChallenge,
            0x2002 => Self::SecurityAssociationUpdate,
            0x2003 => Self::CumFreqScaleFactorOffset,
            _ => return None,
        })
    }

    /// Wire code.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Read-only view of an attached TLV record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    /// TLV type, host order.
    pub tlv_type: u16,
    /// Offset of the record header in the PDU.
    pub offset: usize,
    /// Value bytes.
    pub value: &'a [u8],
}

impl TlvRecord<'_> {
    /// Known type code, if any.
    #[must_use]
    pub fn known_type(&self) -> Option<TlvType> {
        TlvType::from_u16(self.tlv_type)
    }
}

/// Mutable view of a TLV record: its descriptor and value bytes.
///
/// The value length is fixed when the record is appended or parsed.
#[derive(Debug)]
pub struct TlvRecordMut<'a> {
    message_type: MessageType,
    descriptor: &'a mut TlvDescriptor,
    value: &'a mut [u8],
}

impl<'a> TlvRecordMut<'a> {
    pub(crate) fn new(
        message_type: MessageType,
        descriptor: &'a mut TlvDescriptor,
        value: &'a mut [u8],
    ) -> Self {
        Self {
            message_type,
            descriptor,
            value,
        }
    }

    /// Type of the message carrying this record.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// TLV type, host order.
    #[must_use]
    pub fn tlv_type(&self) -> u16 {
        self.descriptor.tlv_type
    }

    /// Set the TLV type written on send.
    pub fn set_tlv_type(&mut self, tlv_type: u16) {
        self.descriptor.tlv_type = tlv_type;
    }

    /// Value length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Value bytes.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.value
    }

    /// Mutable value bytes.
    pub fn value_mut(&mut self) -> &mut [u8] {
        self.value
    }
}

/// Per-TLV-type hooks.
pub trait TlvHandler: Send + Sync {
    /// Called for each parsed record, in order. An error discards every
    /// record of the message.
    ///
    /// # Errors
    /// Implementations return `MalformedMessage` to reject the record.
    fn post_recv(&self, record: &mut TlvRecordMut<'_>) -> Result<()> {
        let _ = record;
        Ok(())
    }

    /// Called for each record just before its header is written.
    fn pre_send(&self, record: &mut TlvRecordMut<'_>) {
        let _ = record;
    }
}

/// Rejects records whose value is shorter than a minimum or not a whole
/// number of fixed-size entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumLength {
    min: usize,
    multiple_of: usize,
}

impl MinimumLength {
    /// Require at least `min` value bytes.
    #[must_use]
    pub fn new(min: usize) -> Self {
        Self {
            min,
            multiple_of: 1,
        }
    }

    /// Additionally require the value length to be a multiple of `n`.
    #[must_use]
    pub fn multiple_of(mut self, n: usize) -> Self {
        self.multiple_of = n.max(1);
        self
    }
}

impl TlvHandler for MinimumLength {
    fn post_recv(&self, record: &mut TlvRecordMut<'_>) -> Result<()> {
        let len = record.len();
        if len < self.min {
            return Err(Malformed::TlvRejected {
                tlv_type: record.tlv_type(),
                reason: format!("value length {len} below minimum {}", self.min),
            }
            .into());
        }
        if len % self.multiple_of != 0 {
            return Err(Malformed::TlvRejected {
                tlv_type: record.tlv_type(),
                reason: format!("value length {len} not a multiple of {}", self.multiple_of),
            }
            .into());
        }
        Ok(())
    }
}

/// TLV hooks keyed by type code. Types without a handler pass through.
#[derive(Default)]
pub struct TlvRegistry {
    handlers: HashMap<u16, Box<dyn TlvHandler>>,
}

impl TlvRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with length checks for the standard TLV types.
    #[must_use]
    pub fn with_standard_checks() -> Self {
        let mut registry = Self::new();
        registry.register(TlvType::Management.as_u16(), MinimumLength::new(2));
        registry.register(TlvType::ManagementErrorStatus.as_u16(), MinimumLength::new(8));
        registry.register(TlvType::OrganizationExtension.as_u16(), MinimumLength::new(6));
        registry.register(TlvType::PathTrace.as_u16(), MinimumLength::new(0).multiple_of(8));
        registry
    }

    /// Install `handler` for `tlv_type`, replacing any previous one.
    pub fn register<H: TlvHandler + 'static>(&mut self, tlv_type: u16, handler: H) {
        self.handlers.insert(tlv_type, Box::new(handler));
    }

    /// Remove the handler for `tlv_type`.
    pub fn unregister(&mut self, tlv_type: u16) -> bool {
        self.handlers.remove(&tlv_type).is_some()
    }

    /// Whether a handler is installed for `tlv_type`.
    #[must_use]
    pub fn contains(&self, tlv_type: u16) -> bool {
        self.handlers.contains_key(&tlv_type)
    }

    fn post_recv(&self, record: &mut TlvRecordMut<'_>) -> Result<()> {
        match self.handlers.get(&record.tlv_type()) {
            Some(handler) => handler.post_recv(record),
            None => Ok(()),
        }
    }

    fn pre_send(&self, record: &mut TlvRecordMut<'_>) {
        if let Some(handler) = self.handlers.get(&record.tlv_type()) {
            handler.pre_send(record);
        }
    }
}

impl std::fmt::Debug for TlvRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        f.debug_struct("TlvRegistry")
            .field("types", &types)
            .finish()
    }
}

/// Iterator over the TLV records attached to a message.
#[derive(Debug)]
pub struct TlvIter<'a> {
    ids: std::slice::Iter<'a, TlvId>,
    descriptors: &'a TlvDescriptorPool,
    pdu: &'a [u8],
}

impl<'a> TlvIter<'a> {
    pub(crate) fn new(ids: &'a [TlvId], descriptors: &'a TlvDescriptorPool, pdu: &'a [u8]) -> Self {
        Self {
            ids: ids.iter(),
            descriptors,
            pdu,
        }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = TlvRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.descriptors.get(*self.ids.next()?);
        Some(TlvRecord {
            tlv_type: descriptor.tlv_type,
            offset: descriptor.offset,
            value: self.pdu.get(descriptor.value_offset()..descriptor.end())?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

/// Recycle every descriptor in `list` and clear it.
pub(crate) fn recycle_all(list: &mut Vec<TlvId>, descriptors: &mut TlvDescriptorPool) {
    for id in list.drain(..) {
        descriptors.recycle(id);
    }
}

/// Offset where the next record would start.
fn next_offset(list: &[TlvId], descriptors: &TlvDescriptorPool, start: usize) -> usize {
    list.last()
        .map_or(start, |id| descriptors.get(*id).end())
}

/// Parse `remaining` bytes of records starting at `start`.
///
/// Fewer than [`TLV_HEADER_LEN`] trailing bytes end the suffix. On any
/// error the whole list is recycled.
pub(crate) fn parse_suffix(
    message_type: MessageType,
    pdu: &mut [u8],
    start: usize,
    remaining: usize,
    list: &mut Vec<TlvId>,
    descriptors: &mut TlvDescriptorPool,
    registry: &TlvRegistry,
) -> Result<()> {
    let result = parse_records(message_type, pdu, start, remaining, list, descriptors, registry);
    if result.is_err() {
        recycle_all(list, descriptors);
    }
    result
}

fn parse_records(
    message_type: MessageType,
    pdu: &mut [u8],
    start: usize,
    mut remaining: usize,
    list: &mut Vec<TlvId>,
    descriptors: &mut TlvDescriptorPool,
    registry: &TlvRegistry,
) -> Result<()> {
    let mut offset = start;
    while remaining >= TLV_HEADER_LEN {
        let tlv_type = BigEndian::read_u16(&pdu[offset..offset + 2]);
        let length = BigEndian::read_u16(&pdu[offset + 2..offset + 4]);
        if length % 2 != 0 {
            return Err(Malformed::OddTlvLength { tlv_type, length }.into());
        }
        remaining -= TLV_HEADER_LEN;
        if usize::from(length) > remaining {
            return Err(Malformed::TlvOverrun {
                tlv_type,
                length,
                remaining,
            }
            .into());
        }
        remaining -= usize::from(length);

        let mut descriptor = TlvDescriptor {
            offset,
            tlv_type,
            length,
        };
        let (value_start, value_end) = (descriptor.value_offset(), descriptor.end());
        let mut record =
            TlvRecordMut::new(message_type, &mut descriptor, &mut pdu[value_start..value_end]);
        registry.post_recv(&mut record)?;

        list.push(descriptors.alloc(descriptor)?);
        offset = value_end;
    }
    Ok(())
}

/// Reserve a record of `length` bytes (header included) after the last one.
///
/// `start` is the end of the fixed body. The caller fills in the type and
/// value.
pub(crate) fn append(
    message_type: MessageType,
    start: usize,
    capacity: usize,
    list: &mut Vec<TlvId>,
    descriptors: &mut TlvDescriptorPool,
    length: usize,
) -> Result<TlvId> {
    if !message_type.admits_tlv() {
        return Err(PtpError::UnsupportedTlvPlacement(message_type));
    }
    if length < TLV_HEADER_LEN {
        return Err(Malformed::TlvTooShort { length }.into());
    }
    let offset = next_offset(list, descriptors, start);
    if offset + length > capacity {
        return Err(PtpError::InsufficientSpace {
            offset,
            length,
            capacity,
        });
    }
    let value_len = u16::try_from(length - TLV_HEADER_LEN).map_err(|_| {
        PtpError::InsufficientSpace {
            offset,
            length,
            capacity,
        }
    })?;
    if value_len % 2 != 0 {
        return Err(Malformed::OddTlvLength {
            tlv_type: 0,
            length: value_len,
        }
        .into());
    }
    let id = descriptors.alloc(TlvDescriptor {
        offset,
        tlv_type: 0,
        length: value_len,
    })?;
    list.push(id);
    Ok(id)
}

/// Run pre-send hooks and write each record header in wire order, then
/// recycle the list.
pub(crate) fn serialize_suffix(
    message_type: MessageType,
    pdu: &mut [u8],
    list: &mut Vec<TlvId>,
    descriptors: &mut TlvDescriptorPool,
    registry: &TlvRegistry,
) {
    for id in list.iter() {
        let descriptor = descriptors.get_mut(*id);
        let (value_start, value_end) = (descriptor.value_offset(), descriptor.end());
        let mut record =
            TlvRecordMut::new(message_type, descriptor, &mut pdu[value_start..value_end]);
        registry.pre_send(&mut record);

        let offset = descriptor.offset;
        BigEndian::write_u16(&mut pdu[offset..offset + 2], descriptor.tlv_type);
        BigEndian::write_u16(&mut pdu[offset + 2..offset + 4], descriptor.length);
    }
    recycle_all(list, descriptors);
}
