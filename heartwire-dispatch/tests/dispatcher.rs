use std::time::Duration;

use heartwire_core::RawNotification;
use heartwire_core::protocol::{HEART_RATE_MEASUREMENT, PMD_DATA};
use heartwire_dispatch::{
    Config, DispatchError, MemorySink, MockTransport, OutletSink, SessionOutcome, TransportCall,
    run_dispatcher,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn local_config() -> Config {
    let mut config = Config::default();
    config.server.http_addr = "127.0.0.1:0".parse().unwrap();
    config.outlet.addr = "127.0.0.1:0".parse().unwrap();
    config.session.teardown_timeout_ms = 500;
    config
}

fn script() -> Vec<RawNotification> {
    let mut ecg = vec![0x00; 10];
    for v in [12i32, -7] {
        ecg.extend_from_slice(&v.to_le_bytes()[..3]);
    }
    vec![
        RawNotification::new(PMD_DATA, ecg),
        RawNotification::new(HEART_RATE_MEASUREMENT, vec![0x10, 66, 0x00, 0x04]),
    ]
}

#[tokio::test]
async fn status_port_in_use_fails_before_touching_the_device() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = local_config();
    config.server.http_addr = taken.local_addr().unwrap();

    let transport = MockTransport::scripted(vec![]).hold_open();
    let journal = transport.journal();

    let result = run_dispatcher(
        transport,
        MemorySink::new(),
        config,
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(DispatchError::HttpBind { .. })));
    assert!(journal.calls().is_empty());
}

#[tokio::test]
async fn outlet_port_in_use_stops_and_tears_down_the_session() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = local_config();
    config.outlet.addr = taken.local_addr().unwrap();
    let sink = OutletSink::new(&config.outlet);

    let transport = MockTransport::scripted(script()).hold_open();
    let journal = transport.journal();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_dispatcher(transport, sink, config, CancellationToken::new()),
    )
    .await
    .expect("a failed sink should end the run without a stop signal");

    assert!(matches!(result, Err(DispatchError::Sink(_))));
    let calls = journal.calls();
    assert_eq!(calls.first(), Some(&TransportCall::Connect));
    assert_eq!(calls.last(), Some(&TransportCall::Disconnect));
}

#[tokio::test]
async fn link_loss_ends_the_run_after_draining_every_tick() {
    let sink = MemorySink::new();
    let transport = MockTransport::scripted(script());
    let journal = transport.journal();

    let summary = run_dispatcher(
        transport,
        sink.clone(),
        local_config(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::LinkLost);
    assert_eq!(summary.drain.delivered, 4);
    assert_eq!(summary.drain.failed, 0);
    assert_eq!(sink.len(), 4);
    assert_eq!(journal.calls().last(), Some(&TransportCall::Disconnect));
}

#[tokio::test]
async fn shutdown_stops_a_running_session() {
    let transport = MockTransport::scripted(script()).hold_open();
    let journal = transport.journal();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(run_dispatcher(
        transport,
        MemorySink::new(),
        local_config(),
        shutdown.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("dispatcher should stop promptly")
        .unwrap()
        .unwrap();

    assert_eq!(summary.outcome, SessionOutcome::Stopped);
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
