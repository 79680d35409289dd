use std::sync::Arc;
use std::time::Duration;

use heartwire_core::protocol::{
    ACC_START_COMMAND, ECG_START_COMMAND, HEART_RATE_MEASUREMENT, PMD_CONTROL, PMD_DATA,
};
use heartwire_core::{NotifyChannel, RawNotification, TickCollector, TickSource};
use heartwire_dispatch::{
    MockFailure, MockJournal, MockTransport, PartialSubscriptionPolicy, Session, SessionConfig,
    SessionOutcome, SessionStage, SessionState, TransportCall,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn ecg(values: &[i32]) -> RawNotification {
    let mut payload = vec![0x00; 10];
    for v in values {
        payload.extend_from_slice(&v.to_le_bytes()[..3]);
    }
    RawNotification::new(PMD_DATA, payload)
}

fn heart_rate(bpm: u8, rr: u16) -> RawNotification {
    let [lo, hi] = rr.to_le_bytes();
    RawNotification::new(HEART_RATE_MEASUREMENT, vec![0x10, bpm, lo, hi])
}

fn handshake_calls() -> Vec<TransportCall> {
    vec![
        TransportCall::Connect,
        TransportCall::Read(PMD_CONTROL),
        TransportCall::Write(PMD_CONTROL, ECG_START_COMMAND.to_vec()),
        TransportCall::Write(PMD_CONTROL, ACC_START_COMMAND.to_vec()),
        TransportCall::Subscribe(PMD_DATA),
        TransportCall::Subscribe(HEART_RATE_MEASUREMENT),
    ]
}

fn session(
    transport: MockTransport,
    policy: PartialSubscriptionPolicy,
) -> (Session<MockTransport, Arc<TickCollector>>, Arc<TickCollector>) {
    let collector = Arc::new(TickCollector::new());
    let config = SessionConfig {
        on_partial_subscription: policy,
        teardown_timeout_ms: 500,
    };
    (
        Session::new(transport, config, Arc::clone(&collector)),
        collector,
    )
}

#[tokio::test]
async fn handshake_is_ordered_and_teardown_unsubscribes_before_disconnect() {
    let transport = MockTransport::scripted(vec![ecg(&[10, 20]), heart_rate(60, 1024)]);
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Abort);
    let status = session.status();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::LinkLost);
    assert_eq!(status.borrow().state, SessionState::Disconnected);

    let mut expected = handshake_calls();
    expected.extend([
        TransportCall::Notifications,
        TransportCall::Unsubscribe(PMD_DATA),
        TransportCall::Unsubscribe(HEART_RATE_MEASUREMENT),
        TransportCall::Disconnect,
    ]);
    assert_eq!(journal.calls(), expected);

    let sources: Vec<TickSource> = collector.take().iter().map(|t| t.source).collect();
    assert_eq!(
        sources,
        vec![
            TickSource::Ecg,
            TickSource::Ecg,
            TickSource::HeartRate,
            TickSource::RrInterval
        ]
    );
}

#[tokio::test]
async fn connect_failure_ends_disconnected_without_further_calls() {
    let transport = MockTransport::scripted(vec![]).fail_on(MockFailure::Connect);
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Abort);
    let status = session.status();

    let outcome = session.run(CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            stage: SessionStage::Connect,
            ..
        }
    ));
    assert!(outcome.is_failure());
    assert_eq!(status.borrow().state, SessionState::Disconnected);
    assert_eq!(status.borrow().device, None);
    assert_eq!(journal.calls(), vec![TransportCall::Connect]);
    assert!(collector.is_empty());
}

#[tokio::test]
async fn handshake_failure_still_disconnects() {
    let transport = MockTransport::scripted(vec![]).fail_on(MockFailure::Write);
    let journal = transport.journal();
    let (session, _) = session(transport, PartialSubscriptionPolicy::Abort);

    let outcome = session.run(CancellationToken::new()).await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            stage: SessionStage::Handshake,
            ..
        }
    ));
    assert_eq!(
        journal.calls(),
        vec![
            TransportCall::Connect,
            TransportCall::Read(PMD_CONTROL),
            TransportCall::Write(PMD_CONTROL, ECG_START_COMMAND.to_vec()),
            TransportCall::Disconnect,
        ]
    );
}

#[tokio::test]
async fn partial_subscription_aborts_by_default() {
    let transport = MockTransport::scripted(vec![ecg(&[1])])
        .fail_on(MockFailure::Subscribe(NotifyChannel::HeartRate));
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Abort);

    let outcome = session.run(CancellationToken::new()).await;

    match outcome {
        SessionOutcome::Failed { stage, reason } => {
            assert_eq!(stage, SessionStage::Subscribe);
            assert!(reason.contains("heart-rate"));
        }
        other => panic!("expected a subscribe failure, got {other:?}"),
    }

    let mut expected = handshake_calls();
    expected.extend([
        TransportCall::Unsubscribe(PMD_DATA),
        TransportCall::Disconnect,
    ]);
    assert_eq!(journal.calls(), expected);
    assert!(collector.is_empty());
}

#[tokio::test]
async fn partial_subscription_can_stream_degraded() {
    let transport = MockTransport::scripted(vec![ecg(&[5, 6, 7]), heart_rate(70, 900)])
        .fail_on(MockFailure::Subscribe(NotifyChannel::HeartRate));
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Degraded);
    let status = session.status();

    let outcome = session.run(CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::LinkLost);
    assert!(status.borrow().degraded);

    let mut expected = handshake_calls();
    expected.extend([
        TransportCall::Notifications,
        TransportCall::Unsubscribe(PMD_DATA),
        TransportCall::Disconnect,
    ]);
    assert_eq!(journal.calls(), expected);

    // Heart rate never subscribed, so it resolves to zero throughout.
    let ticks = collector.take();
    assert_eq!(ticks.len(), 3);
    assert!(ticks.iter().all(|t| t.resolve().0[1] == 0.0));
}

#[tokio::test]
async fn cancellation_stops_streaming_and_tears_down() {
    let transport = MockTransport::scripted(vec![heart_rate(64, 960)]).hold_open();
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Abort);
    let mut status = session.status();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));

    status
        .wait_for(|s| s.state == SessionState::StreamingActive)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("session should stop promptly")
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Stopped);
    assert_eq!(collector.len(), 2);

    let calls = journal.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &[
            TransportCall::Unsubscribe(PMD_DATA),
            TransportCall::Unsubscribe(HEART_RATE_MEASUREMENT),
            TransportCall::Disconnect,
        ]
    );
}

async fn stop_once_journaled(
    handle: JoinHandle<SessionOutcome>,
    journal: &MockJournal,
    call: TransportCall,
    cancel: CancellationToken,
) -> SessionOutcome {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !journal.calls().contains(&call) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stalled call should be journaled");
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("session should stop promptly")
        .unwrap()
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_connect() {
    let transport = MockTransport::scripted(vec![]).stall_on(MockFailure::Connect);
    let journal = transport.journal();
    let (session, collector) = session(transport, PartialSubscriptionPolicy::Abort);
    let status = session.status();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));
    let outcome = stop_once_journaled(handle, &journal, TransportCall::Connect, cancel).await;

    assert_eq!(outcome, SessionOutcome::Stopped);
    assert_eq!(status.borrow().state, SessionState::Disconnected);
    assert_eq!(journal.calls(), vec![TransportCall::Connect, TransportCall::Disconnect]);
    assert!(collector.is_empty());
}

#[tokio::test]
async fn cancellation_interrupts_a_stalled_subscribe_and_unwinds_the_rest() {
    let transport = MockTransport::scripted(vec![])
        .stall_on(MockFailure::Subscribe(NotifyChannel::HeartRate));
    let journal = transport.journal();
    let (session, _) = session(transport, PartialSubscriptionPolicy::Abort);
    let status = session.status();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(session.run(cancel.clone()));
    let stalled = TransportCall::Subscribe(HEART_RATE_MEASUREMENT);
    let outcome = stop_once_journaled(handle, &journal, stalled, cancel).await;

    assert_eq!(outcome, SessionOutcome::Stopped);
    assert_eq!(status.borrow().state, SessionState::Disconnected);

    let mut expected = handshake_calls();
    expected.extend([
        TransportCall::Unsubscribe(PMD_DATA),
        TransportCall::Disconnect,
    ]);
    assert_eq!(journal.calls(), expected);
}

#[tokio::test]
async fn status_reports_device_once_connected() {
    let transport = MockTransport::scripted(vec![]);
    let device = transport.device().clone();
    let (session, _) = session(transport, PartialSubscriptionPolicy::Abort);
    let status = session.status();
    let session_id = session.id();

    session.run(CancellationToken::new()).await;

    let last = status.borrow().clone();
    assert_eq!(last.session_id, session_id);
    assert_eq!(last.device, Some(device));
    assert!(!last.degraded);
}
