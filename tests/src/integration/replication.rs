//! Two peers on one thread: local commits on either side reach the other,
//! in order, and never come back to their author.

use super::harness::{edit, next_matching, note, Cluster};
use rand::{distributions::Alphanumeric, Rng};
use td_thread_adapter::{AdapterEvent, EventFilter, EventTopic};

#[tokio::test]
async fn test_two_peers_replicate_both_ways() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let bob = cluster.join("bob")?;
    let mut alice_events = alice.events();
    let mut bob_events = bob.events();
    alice.adapter.start().await?;
    bob.adapter.start().await?;

    alice.store.commit(vec![note("a1", "from alice")])?;
    next_matching(&mut bob_events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;

    bob.store.commit(vec![note("b1", "from bob")])?;
    next_matching(&mut alice_events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;

    assert_eq!(bob.store.instance("notes", "a1"), Some(b"from alice".to_vec()));
    assert_eq!(alice.store.instance("notes", "b1"), Some(b"from bob".to_vec()));
    assert_eq!(alice.store.instance_count(), 2);
    assert_eq!(bob.store.instance_count(), 2);

    // Each side dispatched exactly the other side's change.
    assert_eq!(alice.store.dispatched().len(), 1);
    assert_eq!(bob.store.dispatched().len(), 1);

    alice.adapter.close().await?;
    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_own_records_are_never_dispatched() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let mut events = alice.events();
    alice.adapter.start().await?;

    for i in 0..3 {
        alice.store.commit(vec![note(&format!("n{i}"), "x")])?;
    }
    for _ in 0..3 {
        let echo = next_matching(&mut events, |e| matches!(e, AdapterEvent::EchoSuppressed { .. })).await?;
        assert!(matches!(echo, AdapterEvent::EchoSuppressed { log_id } if log_id == alice.log));
    }

    assert!(alice.store.dispatched().is_empty());
    let stats = alice.adapter.stats();
    assert_eq!(stats.echoes_suppressed, 3);
    assert_eq!(stats.records_applied, 0);
    assert_eq!(stats.changes_published, 3);

    alice.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_local_changes_published_in_commit_order() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let bob = cluster.join("bob")?;
    let mut published = alice.adapter.subscribe_events(EventFilter::topics(vec![EventTopic::Publish]));
    let mut applied = bob.adapter.subscribe_events(EventFilter::topics(vec![EventTopic::Ingest]));
    alice.adapter.start().await?;
    bob.adapter.start().await?;

    // A create followed by edits only applies cleanly in commit order.
    let c1 = alice.store.commit(vec![note("doc", "v1")])?;
    let c2 = alice.store.commit(vec![edit("doc", "v2")])?;
    let c3 = alice.store.commit(vec![edit("doc", "v3")])?;
    for _ in 0..3 {
        next_matching(&mut published, |_| true).await?;
        next_matching(&mut applied, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    }

    let attempts: Vec<_> = alice.network.calls().create_attempts.iter().map(|n| n.cid()).collect();
    assert_eq!(attempts, vec![c1.cid(), c2.cid(), c3.cid()]);

    let created = alice.network.calls().created;
    assert_eq!(created[0].value().prev, None);
    assert_eq!(created[1].value().prev, Some(created[0].value().cid()));
    assert_eq!(created[2].value().prev, Some(created[1].value().cid()));

    assert_eq!(bob.store.instance("notes", "doc"), Some(b"v3".to_vec()));
    assert_eq!(bob.adapter.stats().items_failed, 0);

    alice.adapter.close().await?;
    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_records_dispatched_in_delivery_order() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let writer = cluster.service.add_member(cluster.thread, "writer")?;
    let bob = cluster.join("bob")?;
    let mut events = bob.events();
    bob.adapter.start().await?;

    let bodies: Vec<String> = (0..5)
        .map(|_| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(12)
                .map(char::from)
                .collect()
        })
        .collect();
    cluster.append_events(writer, &[note("doc", &bodies[0])])?;
    for body in &bodies[1..] {
        cluster.append_events(writer, &[edit("doc", body)])?;
    }
    for _ in 0..bodies.len() {
        next_matching(&mut events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    }

    let dispatched: Vec<Vec<u8>> = bob
        .store
        .dispatched()
        .into_iter()
        .map(|batch| batch[0].payload.clone())
        .collect();
    let expected: Vec<Vec<u8>> = bodies.iter().map(|b| b.as_bytes().to_vec()).collect();
    assert_eq!(dispatched, expected);
    assert_eq!(bob.store.instance("notes", "doc"), expected.last().cloned());

    bob.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_multi_event_change_dispatched_as_one_batch() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let bob = cluster.join("bob")?;
    let mut events = bob.events();
    alice.adapter.start().await?;
    bob.adapter.start().await?;

    alice
        .store
        .commit(vec![note("x", "1"), note("y", "2"), note("z", "3")])?;
    let applied = next_matching(&mut events, |e| matches!(e, AdapterEvent::RecordApplied { .. })).await?;
    assert!(matches!(applied, AdapterEvent::RecordApplied { events: 3, log_id, .. } if log_id == alice.log));

    let batches = bob.store.dispatched();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);

    alice.adapter.close().await?;
    bob.adapter.close().await?;
    Ok(())
}
