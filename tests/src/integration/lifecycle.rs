//! Start/close semantics seen from outside the adapter.

use super::harness::{next_matching, note, Cluster};
use futures::future::join_all;
use shared_bus::FlowExit;
use std::time::Duration;
use td_thread_adapter::{AdapterError, AdapterEvent, AdapterState, EventFilter, EventTopic, FlowKind};

#[tokio::test]
async fn test_concurrent_start_launches_flows_once() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;

    let results = join_all((0..4).map(|_| {
        let adapter = alice.adapter.clone();
        async move { adapter.start().await }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(alice.network.calls().subscriptions, 1);
    assert_eq!(alice.store.active_listeners(), 1);
    assert_eq!(alice.adapter.own_log(), Some(alice.log));

    let results = join_all((0..4).map(|_| {
        let adapter = alice.adapter.clone();
        async move { adapter.close().await }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(alice.adapter.state(), AdapterState::Closed);
    assert_eq!(alice.store.discarded_listeners(), 1);
    Ok(())
}

#[tokio::test]
async fn test_lifecycle_events_in_order() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let mut events = alice
        .adapter
        .subscribe_events(EventFilter::topics(vec![EventTopic::Lifecycle]));

    alice.adapter.start().await?;
    alice.adapter.close().await?;

    let mut seen = Vec::new();
    while let Ok(Some(event)) = events.try_recv() {
        seen.push(event);
    }
    let ready = seen
        .iter()
        .position(|e| matches!(e, AdapterEvent::FlowReady { .. }))
        .expect("flow ready");
    let started = seen
        .iter()
        .position(|e| matches!(e, AdapterEvent::Started { .. }))
        .expect("started");
    let closed = seen
        .iter()
        .position(|e| matches!(e, AdapterEvent::Closed { .. }))
        .expect("closed");
    assert!(ready < started && started < closed);

    let terminated: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            AdapterEvent::FlowTerminated { flow, exit } => Some((*flow, exit.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(terminated.len(), 2);
    assert!(terminated.iter().all(|(_, exit)| *exit == FlowExit::Shutdown));
    let terminated_before_closed = seen[..closed]
        .iter()
        .filter(|e| matches!(e, AdapterEvent::FlowTerminated { .. }))
        .count();
    assert_eq!(terminated_before_closed, 2);
    Ok(())
}

#[tokio::test]
async fn test_nothing_flows_after_close() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let bob = cluster.join("bob")?;
    alice.adapter.start().await?;
    bob.adapter.start().await?;

    bob.adapter.close().await?;
    let calls_at_close = bob.network.calls();

    alice.store.commit(vec![note("late", "x")])?;
    bob.store.commit(vec![note("local", "y")])?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(bob.store.instance("notes", "late").is_none());
    assert!(bob.store.dispatched().is_empty());
    let calls = bob.network.calls();
    assert!(calls.create_attempts.is_empty());
    assert_eq!(calls.get_thread, calls_at_close.get_thread);
    assert_eq!(calls.fetches, calls_at_close.fetches);
    assert_eq!(bob.store.active_listeners(), 0);

    assert!(matches!(bob.adapter.start().await, Err(AdapterError::AdapterClosed)));
    alice.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_thread_stream_end_stops_ingest_only() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let mut events = alice.events();
    alice.adapter.start().await?;

    cluster.service.close_subscriptions(cluster.thread);
    let terminated = next_matching(&mut events, |e| matches!(e, AdapterEvent::FlowTerminated { .. })).await?;
    assert!(matches!(
        terminated,
        AdapterEvent::FlowTerminated {
            flow: FlowKind::Ingest,
            exit: FlowExit::StreamClosed
        }
    ));

    alice.store.commit(vec![note("n1", "x")])?;
    next_matching(&mut events, |e| matches!(e, AdapterEvent::ChangePublished { .. })).await?;
    assert_eq!(alice.adapter.state(), AdapterState::Started);

    alice.adapter.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_local_queue_end_stops_publish_and_releases_listener() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let mut events = alice.events();
    alice.adapter.start().await?;

    alice.store.close_queue();
    let terminated = next_matching(&mut events, |e| matches!(e, AdapterEvent::FlowTerminated { .. })).await?;
    assert!(matches!(
        terminated,
        AdapterEvent::FlowTerminated {
            flow: FlowKind::Publish,
            exit: FlowExit::QueueClosed
        }
    ));
    assert_eq!(alice.store.discarded_listeners(), 1);

    alice.adapter.close().await?;
    assert_eq!(alice.store.discarded_listeners(), 1);
    Ok(())
}

#[tokio::test]
async fn test_start_failure_leaves_adapter_restartable() -> anyhow::Result<()> {
    let cluster = Cluster::new();
    let alice = cluster.join("alice")?;
    let mut events = alice
        .adapter
        .subscribe_events(EventFilter::topics(vec![EventTopic::Lifecycle]));

    alice.network.fail_subscribe(true);
    let err = alice.adapter.start().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, AdapterError::SubscriptionFailed(_)));
    assert_eq!(alice.adapter.state(), AdapterState::NotStarted);
    assert_eq!(alice.adapter.own_log(), None);
    assert_eq!(alice.store.active_listeners(), 0);

    // The publish flow came up and went down again; the failure closes
    // the sequence.
    let mut seen = Vec::new();
    while let Ok(Some(event)) = events.try_recv() {
        seen.push(event);
    }
    assert!(!seen.iter().any(|e| matches!(e, AdapterEvent::Started { .. })));
    let terminated = seen
        .iter()
        .position(|e| {
            matches!(
                e,
                AdapterEvent::FlowTerminated {
                    flow: FlowKind::Publish,
                    exit: FlowExit::Shutdown
                }
            )
        })
        .expect("publish flow terminated");
    let failed = seen
        .iter()
        .position(|e| matches!(e, AdapterEvent::StartFailed { .. }))
        .expect("start failure reported");
    assert!(terminated < failed);
    assert_eq!(failed, seen.len() - 1);

    alice.network.fail_subscribe(false);
    alice.adapter.start().await?;
    assert_eq!(alice.adapter.state(), AdapterState::Started);
    alice.adapter.close().await?;
    Ok(())
}
