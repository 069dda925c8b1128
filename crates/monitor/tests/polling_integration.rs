//! Integration tests for polling.
//!
//! These tests drive full poll cycles through the public API:
//! - Scheduler against the scripted mock transport
//! - Scheduler against a fake manager over real TCP
//! - Concurrent readers during polling

use std::sync::Arc;
use std::time::Duration;

use ami::{AmiCodec, Message};
use monitor::{
    AmiTransport, ManagerEndpoint, MockReply, MockTransport, PollEvent, PollScheduler,
    SessionManager, Severity, Status, Target, TargetRegistry,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

fn endpoint(port: u16) -> ManagerEndpoint {
    ManagerEndpoint::new("127.0.0.1", port, "admin", "secret")
}

/// Scheduler over the mock with the given targets.
fn mock_scheduler(
    mock: &MockTransport,
    extensions: &[&str],
    mailboxes: &[&str],
) -> PollScheduler<MockTransport> {
    let registry = Arc::new(
        TargetRegistry::new(extensions.iter().copied(), mailboxes.iter().copied()).unwrap(),
    );
    PollScheduler::new(SessionManager::new(mock.clone(), endpoint(5038)), registry)
}

fn status_of<T: monitor::ManagerTransport>(scheduler: &PollScheduler<T>, target: &Target) -> Status {
    scheduler.registry().status_of(target).unwrap().status
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<PollEvent>) -> Vec<PollEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Scheduler Tests (mock transport)
// =============================================================================

#[tokio::test]
async fn test_every_target_has_status_before_and_after_ticks() {
    let mock = MockTransport::connected();
    let mut scheduler = mock_scheduler(&mock, &["1001", "1002"], &["1001@default"]);

    let targets = scheduler.registry().all_targets().to_vec();
    for target in &targets {
        assert!(scheduler.registry().status_of(target).is_ok());
    }

    for _ in 0..3 {
        let report = scheduler.tick().await;
        assert_eq!(report.polled, targets.len());
        for target in &targets {
            assert!(scheduler.registry().status_of(target).is_ok());
        }
    }
}

#[tokio::test]
async fn test_disconnected_session_makes_no_manager_calls() {
    let mock = MockTransport::new().with_connect_error("connection refused");
    let mut scheduler = mock_scheduler(&mock, &["1001"], &["1001@default"]);

    scheduler.tick().await;

    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Disconnected);
    assert!(status_of(&scheduler, &Target::Extension("1001".into())).is_unknown());
    assert!(status_of(&scheduler, &Target::Mailbox("1001@default".into())).is_unknown());
    assert!(mock.sent_actions().is_empty());
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test]
async fn test_extension_ok_status() {
    let mock = MockTransport::connected();
    mock.on_peer(
        "1001",
        MockReply::response([("Response", "Success"), ("Status", "OK")]),
    );
    let mut scheduler = mock_scheduler(&mock, &["1001"], &[]);

    scheduler.tick().await;

    assert_eq!(
        status_of(&scheduler, &Target::Extension("1001".into())),
        Status::Value("OK".into())
    );
}

#[tokio::test]
async fn test_mailbox_error_reported_exactly_once_per_tick() {
    let mock = MockTransport::connected();
    mock.on_mailbox(
        "voicemail1",
        MockReply::response([("Response", "Error"), ("Message", "bad peer")]),
    );
    let mut scheduler = mock_scheduler(&mock, &[], &["voicemail1"]);
    let mut rx = scheduler.subscribe();

    scheduler.tick().await;

    assert!(status_of(&scheduler, &Target::Mailbox("voicemail1".into())).is_unknown());
    let diagnostics: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            PollEvent::Diagnostic(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].target, Target::Mailbox("voicemail1".into()));
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert_eq!(diagnostics[0].message, "bad peer");
}

#[tokio::test]
async fn test_failure_is_isolated_to_one_target() {
    let mock = MockTransport::connected();
    mock.on_mailbox(
        "a",
        MockReply::response([("Response", "Error"), ("Message", "bad peer")]),
    );
    mock.on_mailbox(
        "b",
        MockReply::response([("Response", "Success"), ("Waiting", "1")]),
    );
    let mut scheduler = mock_scheduler(&mock, &[], &["a", "b"]);

    let report = scheduler.tick().await;

    assert_eq!(report.failed, 1);
    assert!(status_of(&scheduler, &Target::Mailbox("a".into())).is_unknown());
    assert_eq!(
        status_of(&scheduler, &Target::Mailbox("b".into())),
        Status::Value("1".into())
    );
    assert_eq!(mock.sent_count("MailboxStatus"), 2);
}

#[tokio::test]
async fn test_exchange_failure_keeps_link_for_later_targets() {
    let mock = MockTransport::connected();
    mock.on_peer("1001", MockReply::Fail("garbled response".into()));
    mock.on_peer(
        "1002",
        MockReply::response([("Response", "Success"), ("Status", "OK")]),
    );
    mock.on_mailbox(
        "1001@default",
        MockReply::response([("Response", "Success"), ("Waiting", "2")]),
    );
    let mut scheduler = mock_scheduler(&mock, &["1001", "1002"], &["1001@default"]);

    for _ in 0..2 {
        let report = scheduler.tick().await;
        assert_eq!(report.failed, 1);
        assert!(report.connected);
    }

    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Connected);
    assert!(status_of(&scheduler, &Target::Extension("1001".into())).is_unknown());
    assert_eq!(
        status_of(&scheduler, &Target::Extension("1002".into())),
        Status::Value("OK".into())
    );
    assert_eq!(
        status_of(&scheduler, &Target::Mailbox("1001@default".into())),
        Status::Value("2".into())
    );
    assert_eq!(mock.connect_attempts(), 0);
}

#[tokio::test]
async fn test_dropped_link_recovers_next_tick() {
    let mock = MockTransport::connected();
    mock.on_peer("1001", MockReply::Disconnect);
    let mut scheduler = mock_scheduler(&mock, &["1001"], &[]);

    let report = scheduler.tick().await;
    assert_eq!(report.failed, 1);
    assert!(!scheduler.session().connected());

    mock.on_peer(
        "1001",
        MockReply::response([("Response", "Success"), ("Status", "OK")]),
    );
    scheduler.tick().await;
    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Disconnected);
    assert_eq!(mock.connect_attempts(), 1);
    assert_eq!(
        status_of(&scheduler, &Target::Extension("1001".into())),
        Status::Value("OK".into())
    );
}

#[tokio::test]
async fn test_repeated_ticks_are_idempotent() {
    let mock = MockTransport::connected();
    mock.on_peer(
        "1001",
        MockReply::response([("Response", "Success"), ("Status", "OK (12 ms)")]),
    );
    mock.on_mailbox(
        "1001@default",
        MockReply::response([("Response", "Success"), ("Waiting", "4")]),
    );
    let mut scheduler = mock_scheduler(&mock, &["1001"], &["1001@default"]);
    let reader = scheduler.registry().reader();

    scheduler.tick().await;
    let first = reader.snapshot();
    scheduler.tick().await;
    let second = reader.snapshot();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.status, b.status);
        assert_eq!(b.revision, a.revision + 1);
    }
}

#[tokio::test]
async fn test_connection_extension_mailbox_scenario() {
    let mock = MockTransport::connected();
    mock.on_peer(
        "1001",
        MockReply::response([("Response", "Success"), ("Status", "OK (5 ms)")]),
    );
    mock.on_mailbox(
        "voicemail1",
        MockReply::response([("Response", "Error"), ("Message", "bad peer")]),
    );
    let mut scheduler = mock_scheduler(&mock, &["1001"], &["voicemail1"]);

    let report = scheduler.tick().await;

    assert_eq!(report.failed, 1);
    let snapshot = scheduler.registry().reader().snapshot();
    let rendered: Vec<_> = snapshot
        .iter()
        .map(|s| (s.name.as_str(), s.status.as_str()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            ("Asterisk Connection", "connected"),
            ("Asterisk Extension 1001", "OK (5 ms)"),
            ("Asterisk Mailbox voicemail1", "unknown"),
        ]
    );
}

#[tokio::test]
async fn test_readers_on_other_threads_see_consistent_records() {
    let mock = MockTransport::connected();
    mock.on_peer(
        "1001",
        MockReply::response([("Response", "Success"), ("Status", "OK")]),
    );
    let mut scheduler = mock_scheduler(&mock, &["1001"], &[]);
    let reader = scheduler.registry().reader();

    let handle = std::thread::spawn(move || {
        let target = Target::Extension("1001".into());
        for _ in 0..500 {
            let record = reader.status_of(&target).unwrap();
            if record.revision == 0 {
                assert!(record.status.is_unknown());
            } else {
                assert_eq!(record.status, Status::Value("OK".into()));
            }
        }
    });

    for _ in 0..50 {
        scheduler.tick().await;
    }
    handle.join().unwrap();
}

// =============================================================================
// Scheduler Tests (fake manager over TCP)
// =============================================================================

const BANNER: &str = "Asterisk Call Manager/5.0.1\r\n";

async fn read_action<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Option<Message> {
    let mut codec = AmiCodec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        if let Ok(Some(message)) = codec.decode_line(&line) {
            return Some(message);
        }
    }
}

/// Answer for one action from a fake Asterisk with peer 1001, a peer 9999
/// whose status line is oversized, and the mailbox `1001@default`
/// (2 waiting).
fn answer(action: &Message) -> String {
    let id = action.action_id().unwrap_or_default();
    let name = action.get_header_or("Action", "").to_ascii_lowercase();
    let (response, body) = match name.as_str() {
        "login" if action.get_header("Secret") == Some("secret") => {
            ("Success", "Message: Authentication accepted\r\n".to_string())
        }
        "login" => ("Error", "Message: Authentication failed\r\n".to_string()),
        "sipshowpeer" => match action.get_header("Peer") {
            Some("1001") => ("Success", "ObjectName: 1001\r\nStatus: OK (5 ms)\r\n".to_string()),
            Some("9999") => ("Success", format!("Status: {}\r\n", "x".repeat(10_000))),
            _ => ("Error", "Message: Peer not found\r\n".to_string()),
        },
        "mailboxstatus" => match action.get_header("Mailbox") {
            Some("1001@default") => ("Success", "Mailbox: 1001@default\r\nWaiting: 2\r\n".to_string()),
            _ => ("Error", "Message: bad peer\r\n".to_string()),
        },
        "logoff" => ("Goodbye", "Message: Thanks for all the fish.\r\n".to_string()),
        _ => ("Error", "Message: Invalid/unknown command\r\n".to_string()),
    };

    // An unsolicited event ahead of every response.
    format!(
        "Event: PeerStatus\r\nPeer: SIP/1002\r\nPeerStatus: Reachable\r\n\r\n\
         Response: {}\r\nActionID: {}\r\n{}\r\n",
        response, id, body
    )
}

async fn spawn_fake_manager() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read_half, mut write_half) = tokio::io::split(stream);
                let mut reader = BufReader::new(read_half);
                if write_half.write_all(BANNER.as_bytes()).await.is_err() {
                    return;
                }
                while let Some(action) = read_action(&mut reader).await {
                    let logoff = action
                        .get_header("Action")
                        .is_some_and(|a| a.eq_ignore_ascii_case("logoff"));
                    if write_half.write_all(answer(&action).as_bytes()).await.is_err() || logoff {
                        break;
                    }
                }
            });
        }
    });
    port
}

fn tcp_scheduler(port: u16, secret: &str) -> PollScheduler<AmiTransport> {
    let registry =
        Arc::new(TargetRegistry::new(["1001", "2002"], ["1001@default", "voicemail1"]).unwrap());
    let transport = AmiTransport::new(Duration::from_secs(5), Duration::from_secs(5));
    let endpoint = ManagerEndpoint::new("127.0.0.1", port, "admin", secret);
    PollScheduler::new(SessionManager::new(transport, endpoint), registry)
}

#[tokio::test]
async fn test_poll_over_tcp() {
    let port = spawn_fake_manager().await;
    let mut scheduler = tcp_scheduler(port, "secret");

    // First tick connects; the connection shows its pre-attempt state.
    scheduler.tick().await;
    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Disconnected);

    let report = scheduler.tick().await;
    assert!(report.connected);
    assert_eq!(report.failed, 1);

    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Connected);
    assert_eq!(
        status_of(&scheduler, &Target::Extension("1001".into())),
        Status::Value("OK (5 ms)".into())
    );
    assert!(status_of(&scheduler, &Target::Extension("2002".into())).is_unknown());
    assert_eq!(
        status_of(&scheduler, &Target::Mailbox("1001@default".into())),
        Status::Value("2".into())
    );
    assert!(status_of(&scheduler, &Target::Mailbox("voicemail1".into())).is_unknown());

    scheduler.session_mut().close().await;
    assert!(!scheduler.session().connected());
}

#[tokio::test]
async fn test_oversized_reply_over_tcp_keeps_link() {
    let port = spawn_fake_manager().await;
    let registry = Arc::new(TargetRegistry::new(["9999", "1001"], ["1001@default"]).unwrap());
    let transport = AmiTransport::new(Duration::from_secs(5), Duration::from_secs(5));
    let mut scheduler =
        PollScheduler::new(SessionManager::new(transport, endpoint(port)), registry);

    scheduler.tick().await;
    let report = scheduler.tick().await;

    assert!(report.connected);
    assert_eq!(report.failed, 1);
    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Connected);
    assert!(status_of(&scheduler, &Target::Extension("9999".into())).is_unknown());
    assert_eq!(
        status_of(&scheduler, &Target::Extension("1001".into())),
        Status::Value("OK (5 ms)".into())
    );
    assert_eq!(
        status_of(&scheduler, &Target::Mailbox("1001@default".into())),
        Status::Value("2".into())
    );
}

#[tokio::test]
async fn test_rejected_login_over_tcp() {
    let port = spawn_fake_manager().await;
    let mut scheduler = tcp_scheduler(port, "wrong");
    let mut rx = scheduler.subscribe();

    scheduler.tick().await;
    scheduler.tick().await;

    assert!(!scheduler.session().connected());
    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Disconnected);
    assert!(status_of(&scheduler, &Target::Extension("1001".into())).is_unknown());

    let warnings = drain(&mut rx)
        .into_iter()
        .filter(|event| {
            matches!(event, PollEvent::Diagnostic(d)
                if d.target == Target::Connection && d.severity == Severity::Warning)
        })
        .count();
    assert_eq!(warnings, 2);
}

#[tokio::test]
async fn test_unreachable_manager_over_tcp() {
    // Bind then drop to get a port with nothing listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut scheduler = tcp_scheduler(port, "secret");

    let report = scheduler.tick().await;

    assert!(!report.connected);
    for status in scheduler.registry().reader().snapshot().iter().skip(1) {
        assert!(status.status.is_unknown());
    }
    assert_eq!(status_of(&scheduler, &Target::Connection), Status::Disconnected);
}
