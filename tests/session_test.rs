//! End-to-end tests for `SyncSession` against the fake backend.

mod common;

use std::time::Duration;

use common::{BackendConfig, FakeBackend, Protocol, created, updated};
use ticketwatch::models::BadgeState;
use ticketwatch::notify::NullNotifier;
use ticketwatch::session::{SessionConfig, SessionUpdate, SyncSession};
use ticketwatch::sync::connection::ConnectionState;
use ticketwatch::sync::engine::EventOutcome;
use ticketwatch::transport::{StreamConfig, StreamProtocol};

fn session_config(backend: &FakeBackend) -> SessionConfig {
    let mut stream = StreamConfig::new(backend.stream_url());
    stream.protocol = match backend.protocol {
        Protocol::Json => StreamProtocol::Json,
        Protocol::Stomp => StreamProtocol::Stomp,
    };
    SessionConfig::new(backend.api_base(), stream)
}

/// Drive the session until `count` stream events have been applied.
async fn collect_events(session: &mut SyncSession, count: usize) -> Vec<EventOutcome> {
    let mut outcomes = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while outcomes.len() < count {
            match session.next_update().await {
                SessionUpdate::Event(outcome) => outcomes.push(outcome),
                SessionUpdate::Closed => panic!("session closed early"),
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for events");
    outcomes
}

async fn check_round_trip(protocol: Protocol) {
    let backend = FakeBackend::start(BackendConfig::new(protocol).with_events(vec![
        created("t-200", "Refund request"),
        updated("t-101", "Dark mode, again"),
    ]));
    let mut session = SyncSession::start(session_config(&backend), Box::new(NullNotifier)).unwrap();

    let outcomes = collect_events(&mut session, 2).await;
    assert!(matches!(&outcomes[0], EventOutcome::Created { id, .. } if id == "t-200"));
    assert!(matches!(&outcomes[1], EventOutcome::Updated { id, .. } if id == "t-101"));

    let engine = session.engine();
    let ids = engine.ids();
    assert_eq!(ids, vec!["t-101", "t-200", "t-100", "t-102"]);
    assert_eq!(engine.badge_of("t-200"), BadgeState::New);
    assert_eq!(engine.badge_of("t-101"), BadgeState::Updated);
    assert_eq!(engine.unread_count(), 2);
    assert!(session.connection().state().is_connected());

    session.shutdown().await;
    assert_eq!(session.connection().state(), &ConnectionState::Disconnected);
    assert_eq!(session.engine().unread_count(), 0);
}

#[tokio::test]
async fn test_session_json_round_trip() {
    check_round_trip(Protocol::Json).await;
}

#[tokio::test]
async fn test_session_stomp_round_trip() {
    check_round_trip(Protocol::Stomp).await;
}

#[tokio::test]
async fn test_session_detail_fetch() {
    let backend = FakeBackend::start(BackendConfig::new(Protocol::Json));
    let mut session = SyncSession::start(session_config(&backend), Box::new(NullNotifier)).unwrap();

    let ticket = session.fetch_detail("t-100").await.unwrap();
    let contents: Vec<&str> = ticket
        .chronological_messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["clicking checkout does nothing", "still broken"]);

    let missing = session.fetch_detail("missing").await;
    assert!(matches!(missing, Err(ticketwatch::Error::NotFound(_))));

    session.shutdown().await;
}

#[tokio::test]
async fn test_session_snapshot_failure_still_streams() {
    let backend = FakeBackend::start(
        BackendConfig::new(Protocol::Json)
            .with_snapshot_status(axum::http::StatusCode::SERVICE_UNAVAILABLE)
            .with_events(vec![created("t-900", "Only ticket")]),
    );
    let mut session = SyncSession::start(session_config(&backend), Box::new(NullNotifier)).unwrap();

    loop {
        match session.next_update().await {
            SessionUpdate::Snapshot { seeded, error } => {
                assert_eq!(seeded, 0);
                assert!(error.unwrap().contains("503"));
                break;
            }
            SessionUpdate::Connection(_) => {}
            other => panic!("expected snapshot update, got {:?}", other),
        }
    }
    assert!(!session.is_loading());

    collect_events(&mut session, 1).await;
    assert_eq!(session.engine().ids(), vec!["t-900"]);
    session.shutdown().await;
}

#[tokio::test]
async fn test_session_reports_unreachable_stream() {
    let backend = FakeBackend::start(BackendConfig::new(Protocol::Json));
    let mut config = session_config(&backend);
    config.stream.url = "ws://127.0.0.1:1/ws".to_string();
    config.stream.reconnect = false;
    let mut session = SyncSession::start(config, Box::new(NullNotifier)).unwrap();

    let mut states = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match session.next_update().await {
                SessionUpdate::Connection(state) => states.push(state),
                SessionUpdate::Closed => break,
                _ => {}
            }
        }
    })
    .await
    .expect("session never closed");

    assert_eq!(
        states,
        vec![ConnectionState::Connecting { attempt: 1 }, ConnectionState::Disconnected]
    );
    assert_eq!(session.engine().len(), 3);
}
