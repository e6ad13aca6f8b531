use crate::config::{ControlField, MessageConfig};
use crate::error::{Malformed, PoolKind, PtpError};
use crate::protocol::ptp::body::MessageBody;
use crate::protocol::ptp::message::{ClockIdentity, MessageType, PortIdentity, flags};
use crate::protocol::ptp::pool::*;
use crate::protocol::ptp::timestamp::PtpTimestamp;
use crate::protocol::ptp::tlv::TlvRegistry;

fn follow_up(seconds: u64) -> MessageBody {
    MessageBody::FollowUp {
        precise_origin_timestamp: PtpTimestamp::new(seconds, 0),
    }
}

fn sync_body() -> MessageBody {
    MessageBody::Sync {
        origin_timestamp: PtpTimestamp::new(100, 200),
    }
}

/// Encode `body` on a scratch handle and return the wire bytes.
fn wire(pool: &mut MessagePool, body: MessageBody, tlvs: &[(u16, &[u8])]) -> Vec<u8> {
    let h = pool.allocate().unwrap();
    pool.prepare(h, body).unwrap();
    pool.message_mut(h).unwrap().header.sequence_id = 9;
    for (tlv_type, value) in tlvs {
        pool.push_tlv(h, *tlv_type, value).unwrap();
    }
    let bytes = pool.pre_send(h).unwrap().to_vec();
    pool.release(h).unwrap();
    bytes
}

/// Copy `bytes` into a fresh handle's PDU without decoding.
fn receive_raw(pool: &mut MessagePool, bytes: &[u8]) -> MsgHandle {
    let h = pool.allocate().unwrap();
    pool.message_mut(h).unwrap().pdu_mut()[..bytes.len()].copy_from_slice(bytes);
    h
}

// ===== Lifecycle =====

#[test]
fn test_allocate_is_zeroed() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.message_mut(h).unwrap().pdu_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
    pool.release(h).unwrap();

    let h = pool.allocate().unwrap();
    let msg = pool.message(h).unwrap();
    assert!(msg.pdu().iter().all(|b| *b == 0));
    assert_eq!(msg.tlv_count(), 0);
    assert_eq!(pool.refcount(h).unwrap(), 1);
}

#[test]
fn test_lifo_reuse_same_memory() {
    let mut pool = MessagePool::default();
    let a = pool.allocate().unwrap();
    let b = pool.allocate().unwrap();
    let a_ptr = pool.message(a).unwrap().pdu().as_ptr();
    let b_ptr = pool.message(b).unwrap().pdu().as_ptr();
    pool.release(a).unwrap();
    pool.release(b).unwrap();

    let first = pool.allocate().unwrap();
    let second = pool.allocate().unwrap();
    assert_eq!(first.index(), b.index());
    assert_eq!(second.index(), a.index());
    assert_eq!(pool.message(first).unwrap().pdu().as_ptr(), b_ptr);
    assert_eq!(pool.message(second).unwrap().pdu().as_ptr(), a_ptr);
}

#[test]
fn test_no_growth_across_cycles() {
    let mut pool = MessagePool::default();
    for _ in 0..1000 {
        let h = pool.allocate().unwrap();
        pool.release(h).unwrap();
    }
    assert_eq!(
        pool.stats(),
        PoolStats {
            total: 1,
            count: 1,
            used: 0
        }
    );
}

#[test]
fn test_stats_track_usage() {
    let mut pool = MessagePool::default();
    let a = pool.allocate().unwrap();
    let _b = pool.allocate().unwrap();
    assert_eq!(pool.stats().used, 2);
    pool.release(a).unwrap();
    let stats = pool.stats();
    assert_eq!((stats.total, stats.count, stats.used), (2, 1, 1));
}

#[test]
fn test_retain_release_refcount() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.retain(h).unwrap();
    pool.retain(h).unwrap();
    assert_eq!(pool.refcount(h).unwrap(), 3);
    pool.release(h).unwrap();
    pool.release(h).unwrap();
    assert_eq!(pool.stats().used, 1);
    pool.release(h).unwrap();
    assert_eq!(pool.stats().used, 0);
}

#[test]
fn test_double_release_is_error() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.release(h).unwrap();
    assert_eq!(pool.release(h), Err(PtpError::StaleHandle));
    assert_eq!(pool.stats().count, 1);
}

#[test]
fn test_stale_handle_does_not_alias_reused_slot() {
    let mut pool = MessagePool::default();
    let old = pool.allocate().unwrap();
    pool.release(old).unwrap();
    let new = pool.allocate().unwrap();
    assert_eq!(old.index(), new.index());
    assert_ne!(old, new);
    assert!(matches!(pool.message(old), Err(PtpError::StaleHandle)));
    assert!(matches!(pool.retain(old), Err(PtpError::StaleHandle)));
    assert!(pool.message(new).is_ok());
}

#[test]
fn test_max_messages() {
    let config = MessageConfig::builder().max_messages(2).build().unwrap();
    let mut pool = MessagePool::new(config).unwrap();
    let a = pool.allocate().unwrap();
    let _b = pool.allocate().unwrap();
    let err = pool.allocate().unwrap_err();
    assert_eq!(err, PtpError::PoolExhausted(PoolKind::Messages));
    assert!(err.is_resource_error());
    pool.release(a).unwrap();
    assert!(pool.allocate().is_ok());
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = MessageConfig {
        capacity: 10,
        ..MessageConfig::default()
    };
    assert!(matches!(
        MessagePool::new(config),
        Err(PtpError::InvalidConfig { .. })
    ));
}

#[test]
fn test_release_recycles_tlvs() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    pool.push_tlv(h, 3, &[0; 6]).unwrap();
    pool.push_tlv(h, 3, &[0; 6]).unwrap();
    assert_eq!(pool.tlv_stats().used, 2);
    pool.release(h).unwrap();
    assert_eq!(pool.tlv_stats().used, 0);
    assert_eq!(pool.tlv_stats().count, 2);
}

#[test]
fn test_teardown() {
    let mut pool = MessagePool::default();
    let live = pool.allocate().unwrap();
    let freed = pool.allocate().unwrap();
    pool.release(freed).unwrap();
    assert_eq!(pool.teardown(), 1);
    assert_eq!(pool.stats(), PoolStats::default());
    assert_eq!(pool.tlv_stats(), PoolStats::default());
    assert!(matches!(pool.message(live), Err(PtpError::StaleHandle)));

    // A fresh slot at the same index does not revive the old handle.
    let again = pool.allocate().unwrap();
    assert_eq!(again.index(), live.index());
    assert!(matches!(pool.message(live), Err(PtpError::StaleHandle)));
    assert!(pool.message(again).is_ok());
}

// ===== Receive / send =====

#[test]
fn test_send_receive_roundtrip() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, follow_up(77), &[]);
    assert_eq!(bytes.len(), 44);

    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    let msg = pool.message(h).unwrap();
    assert_eq!(msg.body, follow_up(77));
    assert_eq!(msg.header.sequence_id, 9);
    assert_eq!(msg.header.message_length, 44);
    assert_eq!(msg.timestamps.pdu, PtpTimestamp::new(77, 0));
}

#[test]
fn test_post_recv_version_mismatch() {
    let mut pool = MessagePool::default();
    let mut bytes = wire(&mut pool, follow_up(1), &[]);
    bytes[1] = 0xF1;
    let h = receive_raw(&mut pool, &bytes);
    let err = pool.post_recv(h, bytes.len()).unwrap_err();
    assert_eq!(err, PtpError::ProtocolVersionMismatch { found: 1 });
    assert!(err.is_protocol_error());
    // Nothing was converted.
    let msg = pool.message(h).unwrap();
    assert_eq!(msg.header.sequence_id, 0);
    assert_eq!(msg.header.message_length, 0);
}

#[test]
fn test_post_recv_short_buffers() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, follow_up(1), &[]);
    let h = receive_raw(&mut pool, &bytes);
    assert!(matches!(
        pool.post_recv(h, 20),
        Err(PtpError::MalformedMessage(Malformed::TooShort { .. }))
    ));
    assert!(matches!(
        pool.post_recv(h, 43),
        Err(PtpError::MalformedMessage(Malformed::TooShort {
            needed: 44,
            have: 43
        }))
    ));
}

#[test]
fn test_post_recv_unknown_type() {
    let mut pool = MessagePool::default();
    let mut bytes = wire(&mut pool, follow_up(1), &[]);
    bytes[0] = 0x07;
    let h = receive_raw(&mut pool, &bytes);
    assert!(matches!(
        pool.post_recv(h, bytes.len()),
        Err(PtpError::MalformedMessage(Malformed::UnknownMessageType(7)))
    ));
}

#[test]
fn test_post_recv_parses_tlvs() {
    let mut pool = MessagePool::default();
    let bytes = wire(
        &mut pool,
        MessageBody::Signaling {
            target_port_identity: PortIdentity::default(),
        },
        &[(3, &[1, 2, 3, 4, 5, 6]), (8, &[0xAB; 8])],
    );
    assert_eq!(bytes.len(), 44 + 10 + 12);

    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    let records: Vec<_> = pool.tlvs(h).unwrap().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].tlv_type, 3);
    assert_eq!(records[0].value, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(records[1].tlv_type, 8);
    assert_eq!(records[1].offset, 54);
}

#[test]
fn test_post_recv_twice_does_not_leak_descriptors() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, follow_up(1), &[(3, &[0; 6])]);
    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    pool.post_recv(h, bytes.len()).unwrap();
    assert_eq!(pool.message(h).unwrap().tlv_count(), 1);
    assert_eq!(pool.tlv_stats().used, 1);
}

#[test]
fn test_post_recv_ignores_suffix_on_sync() {
    let mut pool = MessagePool::default();
    let mut bytes = wire(&mut pool, sync_body(), &[]);
    bytes.extend_from_slice(&[0x00, 0x03, 0x00, 0x01, 0xFF]);
    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    assert_eq!(pool.message(h).unwrap().tlv_count(), 0);
}

#[test]
fn test_post_recv_bad_tlv_leaves_no_records() {
    let mut pool = MessagePool::with_registry(
        MessageConfig::default(),
        TlvRegistry::with_standard_checks(),
    )
    .unwrap();
    let bytes = wire(&mut pool, follow_up(1), &[(3, &[0; 6]), (1, &[])]);
    let h = receive_raw(&mut pool, &bytes);
    assert!(matches!(
        pool.post_recv(h, bytes.len()),
        Err(PtpError::MalformedMessage(Malformed::TlvRejected { tlv_type: 1, .. }))
    ));
    assert_eq!(pool.message(h).unwrap().tlv_count(), 0);
    assert_eq!(pool.tlv_stats().used, 0);
}

#[test]
fn test_pre_send_consumes_tlv_list() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    pool.push_tlv(h, 3, &[0; 6]).unwrap();
    let len = pool.pre_send(h).unwrap().len();
    assert_eq!(len, 54);
    assert_eq!(pool.message(h).unwrap().tlv_count(), 0);
    assert_eq!(pool.tlv_stats().used, 0);
}

#[test]
fn test_pre_send_legacy_control() {
    let config = MessageConfig::builder()
        .control_field(ControlField::Legacy)
        .build()
        .unwrap();
    let mut pool = MessagePool::new(config).unwrap();
    let bytes = wire(&mut pool, sync_body(), &[]);
    assert_eq!(bytes[32], 0x00);
    assert_eq!(bytes[5], 0xFF);
}

#[test]
fn test_type_of_and_requires_timestamp() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, sync_body(), &[]);
    let h = receive_raw(&mut pool, &bytes);
    assert_eq!(pool.type_of(h).unwrap(), MessageType::Sync);
    assert!(pool.requires_timestamp(h).unwrap());

    let bytes = wire(&mut pool, follow_up(2), &[]);
    let g = receive_raw(&mut pool, &bytes);
    assert_eq!(pool.type_of(g).unwrap(), MessageType::FollowUp);
    assert!(!pool.requires_timestamp(g).unwrap());
}

#[test]
fn test_type_of_follows_prepared_body() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, MessageBody::DelayResp {
        receive_timestamp: PtpTimestamp::new(3, 4),
        requesting_port_identity: PortIdentity::default(),
    })
    .unwrap();
    assert_eq!(pool.type_of(h).unwrap(), MessageType::DelayResp);
    assert!(!pool.requires_timestamp(h).unwrap());
    assert_eq!(
        pool.requires_timestamp(h).unwrap(),
        pool.message(h).unwrap().requires_timestamp()
    );

    pool.prepare(h, MessageBody::Announce {
        origin_timestamp: PtpTimestamp::ZERO,
        current_utc_offset: 37,
        grandmaster_priority1: 128,
        grandmaster_clock_quality: Default::default(),
        grandmaster_priority2: 128,
        grandmaster_identity: ClockIdentity::from_u64(1),
        steps_removed: 0,
        time_source: 0xA0,
    })
    .unwrap();
    assert_eq!(pool.type_of(h).unwrap(), MessageType::Announce);
    assert!(!pool.requires_timestamp(h).unwrap());

    pool.prepare(h, MessageBody::PdelayReq {
        origin_timestamp: PtpTimestamp::ZERO,
    })
    .unwrap();
    assert_eq!(pool.type_of(h).unwrap(), MessageType::PdelayReq);
    assert!(pool.requires_timestamp(h).unwrap());
}

#[test]
fn test_type_of_after_reusing_received_frame() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, sync_body(), &[]);
    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    assert_eq!(pool.type_of(h).unwrap(), MessageType::Sync);

    pool.prepare(h, follow_up(1)).unwrap();
    assert_eq!(pool.type_of(h).unwrap(), MessageType::FollowUp);
    assert!(!pool.requires_timestamp(h).unwrap());
}

#[test]
fn test_messages_sent_counts_pre_send() {
    let mut pool = MessagePool::default();
    assert_eq!(pool.messages_sent(), 0);

    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    pool.pre_send(h).unwrap();
    pool.pre_send(h).unwrap();
    assert_eq!(pool.messages_sent(), 2);
    pool.release(h).unwrap();

    // Receiving does not count.
    let bytes = wire(&mut pool, sync_body(), &[]);
    assert_eq!(pool.messages_sent(), 3);
    let g = receive_raw(&mut pool, &bytes);
    pool.post_recv(g, bytes.len()).unwrap();
    assert_eq!(pool.messages_sent(), 3);

    pool.teardown();
    assert_eq!(pool.messages_sent(), 3);
}

#[test]
fn test_pool_is_one_step_honours_config() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, sync_body()).unwrap();
    assert!(pool.is_one_step(h).unwrap());
    pool.message_mut(h).unwrap().set_flag(flags::TWO_STEP, true);
    assert!(!pool.is_one_step(h).unwrap());

    let config = MessageConfig::builder().assume_two_step(true).build().unwrap();
    let mut pool = MessagePool::new(config).unwrap();
    let h = pool.allocate().unwrap();
    pool.prepare(h, sync_body()).unwrap();
    assert!(!pool.is_one_step(h).unwrap());

    pool.release(h).unwrap();
    assert!(matches!(pool.is_one_step(h), Err(PtpError::StaleHandle)));
}

#[test]
fn test_announce_captures_host_instant() {
    let mut pool = MessagePool::default();
    let body = MessageBody::Announce {
        origin_timestamp: PtpTimestamp::new(1, 1),
        current_utc_offset: 37,
        grandmaster_priority1: 1,
        grandmaster_clock_quality: Default::default(),
        grandmaster_priority2: 2,
        grandmaster_identity: ClockIdentity::from_u64(5),
        steps_removed: 1,
        time_source: 0x20,
    };
    let bytes = wire(&mut pool, body, &[]);
    let h = receive_raw(&mut pool, &bytes);
    pool.post_recv(h, bytes.len()).unwrap();
    let msg = pool.message(h).unwrap();
    assert!(msg.timestamps.host.is_some());
    assert_eq!(msg.body, body);
}

// ===== TLV operations =====

#[test]
fn test_append_tlv_grows_message_length() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    pool.append_tlv(h, 10).unwrap();
    pool.append_tlv(h, 4).unwrap();
    let msg = pool.message(h).unwrap();
    assert_eq!(msg.header.message_length, 58);
    assert_eq!(msg.tlv_count(), 2);
}

#[test]
fn test_append_tlv_boundary() {
    let config = MessageConfig::builder().capacity(64).build().unwrap();
    let mut pool = MessagePool::new(config).unwrap();
    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    pool.message_mut(h).unwrap().pdu_mut()[44..].fill(0xEE);

    // 44 + 20 == 64 fits exactly; one more unit does not.
    pool.append_tlv(h, 16).unwrap();
    assert_eq!(
        pool.append_tlv(h, 6),
        Err(PtpError::InsufficientSpace {
            offset: 60,
            length: 6,
            capacity: 64
        })
    );
    pool.append_tlv(h, 4).unwrap();
    assert_eq!(
        pool.append_tlv(h, 4),
        Err(PtpError::InsufficientSpace {
            offset: 64,
            length: 4,
            capacity: 64
        })
    );
    assert_eq!(pool.message(h).unwrap().header.message_length, 64);
    assert_eq!(pool.message(h).unwrap().tlv_count(), 2);
}

#[test]
fn test_tlv_ops_unsupported_placement() {
    let mut pool = MessagePool::default();
    let bodies = [
        sync_body(),
        MessageBody::PdelayReq {
            origin_timestamp: PtpTimestamp::ZERO,
        },
        MessageBody::PdelayResp {
            request_receipt_timestamp: PtpTimestamp::ZERO,
            requesting_port_identity: PortIdentity::default(),
        },
    ];
    for body in bodies {
        let kind = body.message_type();
        let h = pool.allocate().unwrap();
        pool.prepare(h, body).unwrap();
        let expected = Err(PtpError::UnsupportedTlvPlacement(kind));
        assert_eq!(pool.append_tlv(h, 8).map(|_| ()), expected);
        assert_eq!(pool.parse_tlvs(h, 8), expected);
        assert_eq!(pool.serialize_tlvs(h), expected);
        pool.release(h).unwrap();
    }
}

#[test]
fn test_tlv_mut_writes_payload() {
    let mut pool = MessagePool::default();
    let h = pool.allocate().unwrap();
    pool.prepare(h, follow_up(1)).unwrap();
    let id = pool.append_tlv(h, 8).unwrap();
    {
        let mut record = pool.tlv_mut(h, id).unwrap();
        assert_eq!(record.len(), 4);
        record.set_tlv_type(0x2001);
        record.value_mut().copy_from_slice(&[1, 2, 3, 4]);
    }
    pool.serialize_tlvs(h).unwrap();
    assert_eq!(
        &pool.message(h).unwrap().pdu()[44..52],
        &[0x20, 0x01, 0x00, 0x04, 1, 2, 3, 4]
    );
    assert!(matches!(pool.tlv_mut(h, id), Err(PtpError::StaleHandle)));
}

#[test]
fn test_parse_tlvs_explicit() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, follow_up(1), &[(3, &[0; 6])]);
    let h = receive_raw(&mut pool, &bytes);
    pool.message_mut(h).unwrap().prepare(follow_up(1));
    pool.parse_tlvs(h, 10).unwrap();
    assert_eq!(pool.message(h).unwrap().tlv_count(), 1);

    assert!(matches!(
        pool.parse_tlvs(h, 1500),
        Err(PtpError::InsufficientSpace { .. })
    ));
}

// ===== Duplicate =====

#[test]
fn test_duplicate_general_message() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, follow_up(3), &[(3, &[9; 6])]);
    let src = receive_raw(&mut pool, &bytes);
    pool.post_recv(src, bytes.len()).unwrap();

    let dup = pool.duplicate(src, bytes.len()).unwrap();
    assert_ne!(dup, src);
    assert_eq!(pool.refcount(dup).unwrap(), 1);
    let msg = pool.message(dup).unwrap();
    assert_eq!(msg.body, follow_up(3));
    assert_eq!(msg.tlv_count(), 1);
    assert_eq!(pool.tlv_stats().used, 2);

    pool.release(src).unwrap();
    let records: Vec<_> = pool.tlvs(dup).unwrap().collect();
    assert_eq!(records[0].value, &[9; 6]);
}

#[test]
fn test_duplicate_event_with_timestamp() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, sync_body(), &[]);
    let src = receive_raw(&mut pool, &bytes);
    pool.message_mut(src)
        .unwrap()
        .set_hw_timestamp(PtpTimestamp::new(100, 250));
    let dup = pool.duplicate(src, bytes.len()).unwrap();
    let msg = pool.message(dup).unwrap();
    assert_eq!(msg.timestamps.hwts, Some(PtpTimestamp::new(100, 250)));
    assert_eq!(msg.timestamps.pdu, PtpTimestamp::new(100, 200));
}

#[test]
fn test_duplicate_missing_timestamp() {
    let mut pool = MessagePool::default();
    let bytes = wire(&mut pool, sync_body(), &[]);
    let src = receive_raw(&mut pool, &bytes);
    let before = pool.stats().used;
    assert_eq!(
        pool.duplicate(src, bytes.len()),
        Err(PtpError::MissingTimestamp(MessageType::Sync))
    );
    assert_eq!(pool.stats().used, before);
}

#[test]
fn test_duplicate_malformed_releases_copy() {
    let mut pool = MessagePool::default();
    let mut bytes = wire(&mut pool, follow_up(1), &[]);
    bytes[1] = 0x03;
    let src = receive_raw(&mut pool, &bytes);
    let before = pool.stats().used;
    assert_eq!(
        pool.duplicate(src, bytes.len()),
        Err(PtpError::ProtocolVersionMismatch { found: 3 })
    );
    assert!(pool.duplicate(src, 10).is_err());
    assert_eq!(pool.stats().used, before);
}

#[test]
fn test_duplicate_stale_source() {
    let mut pool = MessagePool::default();
    let src = pool.allocate().unwrap();
    pool.release(src).unwrap();
    assert_eq!(pool.duplicate(src, 44), Err(PtpError::StaleHandle));
}

// ===== Shared pool =====

#[cfg(feature = "tokio-runtime")]
#[tokio::test]
async fn test_shared_pool_across_tasks() {
    let shared = create_shared_pool(MessagePool::default());
    let mut tasks = Vec::new();
    for i in 0..4u64 {
        let shared = std::sync::Arc::clone(&shared);
        tasks.push(tokio::spawn(async move {
            let mut pool = shared.lock().await;
            let h = pool.allocate().unwrap();
            pool.prepare(h, follow_up(i)).unwrap();
            let len = pool.pre_send(h).unwrap().len();
            pool.release(h).unwrap();
            len
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 44);
    }
    let pool = shared.lock().await;
    assert_eq!(pool.stats().used, 0);
    assert_eq!(pool.stats().total, 1);
}

#[cfg(feature = "tokio-runtime")]
#[test]
fn test_shared_pool_from_sync_code() {
    let shared = create_shared_pool(MessagePool::default());
    let handle = tokio_test::block_on(async {
        let mut pool = shared.lock().await;
        let h = pool.allocate().unwrap();
        pool.retain(h).unwrap();
        h
    });
    let mut pool = shared.try_lock().unwrap();
    assert_eq!(pool.refcount(handle).unwrap(), 2);
    pool.release(handle).unwrap();
    pool.release(handle).unwrap();
    assert_eq!(pool.stats().used, 0);
}
