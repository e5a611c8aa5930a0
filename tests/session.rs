//! Session lifecycle integration tests
//!
//! Covers the state surface, epoch-guarded dispatch, error classification,
//! and the rolling log — all without network or audio hardware.

use voicewire::session::{SessionEvent, SessionEventKind, SessionManager};
use voicewire::session::wire::WebSource;
use voicewire::ui::UiState;
use voicewire::{Config, ErrorCode};

fn offline_manager() -> SessionManager {
    SessionManager::new(Config {
        api_key: None,
        ..Config::default()
    })
}

#[tokio::test]
async fn test_connect_without_credential_surfaces_auth_missing() {
    let mut manager = offline_manager();

    assert!(manager.connect().await.is_err());

    let snapshot = manager.snapshot();
    assert!(!snapshot.connected);
    assert!(!snapshot.speaking);
    assert_eq!(snapshot.error, Some(ErrorCode::AuthMissing));
    assert_eq!(snapshot.error.unwrap().as_str(), "ERR_AUTH_MISSING");
}

#[tokio::test]
async fn test_disconnect_twice_and_before_connect() {
    let mut manager = offline_manager();

    manager.disconnect();
    manager.disconnect();
    assert!(!manager.is_connected());

    let _ = manager.connect().await;
    manager.disconnect();
    manager.disconnect();
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_events_from_torn_down_session_are_ignored() {
    let mut manager = offline_manager();
    let old_epoch = manager.epoch();

    // Teardown races ahead of late-arriving callbacks
    manager.disconnect();

    for kind in [
        SessionEventKind::Audio(vec![0.1; 100]),
        SessionEventKind::Speaking(true),
        SessionEventKind::Closed(ErrorCode::NetworkOrAuth),
    ] {
        manager.handle_event(SessionEvent {
            epoch: old_epoch,
            kind,
        });
    }

    let snapshot = manager.snapshot();
    assert!(!snapshot.connected);
    assert!(!snapshot.speaking);
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn test_remote_close_classifies_and_tears_down() {
    let mut manager = offline_manager();

    manager.handle_event(SessionEvent {
        epoch: manager.epoch(),
        kind: SessionEventKind::Closed(ErrorCode::SafetyFilter),
    });

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.error, Some(ErrorCode::SafetyFilter));
    assert!(!manager.is_connected());

    // The failure bumped the epoch; replaying the close is a no-op
    let epoch_after = manager.epoch();
    manager.handle_event(SessionEvent {
        epoch: epoch_after - 1,
        kind: SessionEventKind::Closed(ErrorCode::SessionDrop),
    });
    assert_eq!(manager.snapshot().error, Some(ErrorCode::SafetyFilter));
}

#[tokio::test]
async fn test_log_collects_transcript_and_deduplicated_citations() {
    let mut manager = offline_manager();
    let epoch = manager.epoch();

    let web = |uri: &str| WebSource {
        uri: uri.to_string(),
        title: None,
    };

    manager.handle_event(SessionEvent {
        epoch,
        kind: SessionEventKind::Transcript("first fragment".to_string()),
    });
    manager.handle_event(SessionEvent {
        epoch,
        kind: SessionEventKind::Citations(vec![web("https://a"), web("https://b")]),
    });
    manager.handle_event(SessionEvent {
        epoch,
        kind: SessionEventKind::Citations(vec![web("https://a"), web("https://c")]),
    });

    assert_eq!(manager.log().len(), 1);
    let uris: Vec<_> = manager
        .log()
        .citations()
        .iter()
        .map(|c| c.uri.as_str())
        .collect();
    assert_eq!(uris, vec!["https://a", "https://b", "https://c"]);
}

#[test]
fn test_error_classification_table() {
    let cases = [
        ("HTTP/1.1 401 Unauthorized", ErrorCode::NetworkOrAuth),
        ("403 Forbidden", ErrorCode::NetworkOrAuth),
        ("model not found", ErrorCode::NotFound),
        ("429 Too Many Requests", ErrorCode::QuotaExceeded),
        ("resource exhausted: quota", ErrorCode::QuotaExceeded),
        ("content blocked by safety policy", ErrorCode::SafetyFilter),
        ("abnormal closure", ErrorCode::SessionDrop),
    ];

    for (message, expected) in cases {
        assert_eq!(
            ErrorCode::classify_message(message),
            expected,
            "message: {message}"
        );
    }
}

#[test]
fn test_ui_state_follows_session_lifecycle() {
    let mut manager = offline_manager();
    let mut ui = UiState::RequestingPermission;

    // Still waiting on permission while disconnected
    ui = UiState::derive(ui, &manager.snapshot());
    assert_eq!(ui, UiState::RequestingPermission);

    // Classified failure surfaces as error
    manager.handle_event(SessionEvent {
        epoch: manager.epoch(),
        kind: SessionEventKind::Closed(ErrorCode::MicDenied),
    });
    ui = UiState::derive(ui, &manager.snapshot());
    assert_eq!(ui, UiState::Error);
}
