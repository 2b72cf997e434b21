//! Failure paths: block fetch fallback, dead letters and fatal ingest.

use super::harness::{next_matching, note, Cluster};
use shared_bus::FlowExit;
use td_thread_adapter::{AdapterConfig, AdapterEvent, DeadLetterPayload, EventFilter, FlowKind};

#[tokio::test]
async fn test_block_fetch_fallback_recovers_after_transient_failures() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let writer = cluster.service.add_member(cluster.thread, "writer")?;
    let bob = cluster.join("bob")?;
    let mut events = bob.events();
    bob.adapter.start().await?;

    bob.codec.set_direct_decode(false);
    bob.network.fail_next_fetches(2);
    cluster.append_events(writer, &[note("n1", "fetched")])?;

    next_matching(&mut events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    assert_eq!(bob.network.calls().fetches, 3);
    assert_eq!(bob.store.instance("notes", "n1"), Some(b"fetched".to_vec()));
    assert_eq!(bob.adapter.stats().items_failed, 0);

    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_unfetchable_record_is_dead_lettered_and_ingest_continues() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let writer = cluster.service.add_member(cluster.thread, "writer")?;
    let bob = cluster.join("bob")?;
    let mut events = bob.events();
    bob.adapter.start().await?;

    // The event block never reached this peer: direct decode fails and
    // every fetch comes back empty.
    let lost = cluster.append_events(writer, &[note("lost", "x")])?;
    cluster.service.evict_block(lost.value().block_id());
    let failed = next_matching(&mut events, |e| matches!(e, AdapterEvent::ItemFailed { .. })).await?;

    cluster.append_events(writer, &[note("kept", "y")])?;
    next_matching(&mut events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;

    assert!(bob.store.instance("notes", "lost").is_none());
    assert!(bob.store.instance("notes", "kept").is_some());

    let letters = bob.adapter.take_dead_letters();
    assert_eq!(letters.len(), 1);
    let letter = &letters[0];
    assert_eq!(letter.flow, FlowKind::Ingest);
    assert_eq!(letter.attempts, 3);
    assert_eq!(bob.network.calls().fetches, 3);
    assert!(matches!(failed, AdapterEvent::ItemFailed { dead_letter: Some(id), .. } if id == letter.id));
    match &letter.payload {
        DeadLetterPayload::Record(record) => assert_eq!(record.value().cid(), lost.value().cid()),
        other => panic!("unexpected payload {other:?}"),
    }

    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_malformed_and_rejected_records_do_not_stop_ingest() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let writer = cluster.service.add_member(cluster.thread, "writer")?;
    let bob = cluster.join("bob")?;
    let mut events = bob.events();
    bob.adapter.start().await?;

    // Not an event at all.
    cluster.service.append_malformed(cluster.thread, writer)?;
    // Decodes, but the store refuses to create a duplicate.
    cluster.append_events(writer, &[note("dup", "1")])?;
    cluster.append_events(writer, &[note("dup", "2")])?;
    cluster.append_events(writer, &[note("last", "3")])?;

    let mut failures = 0;
    let mut applied = 0;
    while failures + applied < 4 {
        match next_matching(&mut events, |e| {
            matches!(e, AdapterEvent::ItemFailed { .. } | AdapterEvent::RecordApplied { .. })
        })
        .await?
        {
            AdapterEvent::ItemFailed { .. } => failures += 1,
            _ => applied += 1,
        }
    }
    assert_eq!((failures, applied), (2, 2));
    assert_eq!(bob.store.instance("notes", "dup"), Some(b"1".to_vec()));
    assert!(bob.store.instance("notes", "last").is_some());
    assert_eq!(bob.adapter.stats().items_failed, 2);

    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_publish_dead_lettered_then_republished_to_peers() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let bob = cluster.join("bob")?;
    let mut alice_events = alice.events();
    let mut bob_events = bob.events();
    alice.adapter.start().await?;
    bob.adapter.start().await?;

    let config = alice.adapter.config().clone();
    alice.network.fail_next_creates(config.publish_attempts);
    alice.store.commit(vec![note("c1", "first")])?;
    next_matching(&mut alice_events, |e| {
        matches!(e, AdapterEvent::ItemFailed { flow: FlowKind::Publish, .. })
    })
    .await?;

    // The failed change does not hold back the next one.
    alice.store.commit(vec![note("c2", "second")])?;
    next_matching(&mut bob_events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    assert!(bob.store.instance("notes", "c1").is_none());
    assert!(bob.store.instance("notes", "c2").is_some());

    assert_eq!(alice.adapter.republish_dead_letters().await?, 1);
    next_matching(&mut bob_events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    assert_eq!(bob.store.instance("notes", "c1"), Some(b"first".to_vec()));

    assert_eq!(
        alice.network.calls().create_attempts.len() as u32,
        config.publish_attempts + 2
    );
    assert!(alice.adapter.take_dead_letters().is_empty());

    alice.adapter.close().await?;
    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_dead_letter_buffer_evicts_oldest() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let config = AdapterConfig {
        dead_letter_capacity: 2,
        publish_attempts: 1,
        ..AdapterConfig::for_testing()
    };
    let alice = cluster.join_with("alice", config, true)?;
    let mut events = alice.adapter.subscribe_events(EventFilter::from_flows(vec![FlowKind::Publish]));
    alice.adapter.start().await?;

    alice.network.fail_next_creates(3);
    let first = alice.store.commit(vec![note("a", "1")])?;
    let second = alice.store.commit(vec![note("b", "2")])?;
    let third = alice.store.commit(vec![note("c", "3")])?;
    for _ in 0..3 {
        next_matching(&mut events, |e| matches!(e, AdapterEvent::ItemFailed { .. })).await?;
    }

    let stats = alice.adapter.stats();
    assert_eq!(stats.items_failed, 3);
    assert_eq!(stats.dead_letters_evicted, 1);

    let kept: Vec<_> = alice
        .adapter
        .take_dead_letters()
        .into_iter()
        .filter_map(|l| match l.payload {
            DeadLetterPayload::Change(node) => Some(node.cid()),
            DeadLetterPayload::Record(_) => None,
        })
        .collect();
    assert_eq!(kept, vec![second.cid(), third.cid()]);
    assert_ne!(kept[0], first.cid());

    alice.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_read_key_stops_ingest_only() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let writer = cluster.service.add_member(cluster.thread, "writer")?;
    let bob = cluster.join_with("bob", AdapterConfig::for_testing(), false)?;
    let mut events = bob.events();
    bob.adapter.start().await?;

    cluster.append_events(writer, &[note("secret", "x")])?;
    let terminated = next_matching(&mut events, |e| {
        matches!(e, AdapterEvent::FlowTerminated { flow: FlowKind::Ingest, .. })
    })
    .await?;
    assert!(matches!(
        terminated,
        AdapterEvent::FlowTerminated { exit: FlowExit::Fatal(_), .. }
    ));
    assert!(bob.store.dispatched().is_empty());

    // Publishing does not need the read key.
    bob.store.commit(vec![note("mine", "y")])?;
    next_matching(&mut events, |e| matches!(e, AdapterEvent::ChangePublished { .. })).await?;

    bob.adapter.close().await?;
    Ok(())
}
