mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use memcache_client::{
    AsciiOperationFactory, AuthConfig, AuthDescriptor, AuthOutcome, AuthThreadMonitor,
    BinaryOperationFactory, MechanismRegistry, MechanismRequest, NodeId, OperationKind,
    SaslError, SaslMechanism, SaslMechanismProvider, StatusCode,
};
use protocol_memcache::binary::Opcode;

use common::{MockConnection, MockNode, Written, binary_response};

fn fast_config() -> AuthConfig {
    AuthConfig {
        retry_delay: Duration::from_millis(5),
        shutdown_poll_interval: Duration::from_millis(10),
        ..AuthConfig::default()
    }
}

/// Answers every challenge with `reply:<challenge>`.
struct Echo;

impl SaslMechanism for Echo {
    fn mechanism_name(&self) -> &str {
        "ECHO"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        Ok([b"reply:".as_slice(), challenge].concat())
    }

    fn is_complete(&self) -> bool {
        false
    }
}

struct EchoProvider;

impl SaslMechanismProvider for EchoProvider {
    fn create_mechanism(
        &self,
        request: &MechanismRequest<'_>,
    ) -> Result<Option<Box<dyn SaslMechanism>>, SaslError> {
        if request.mechanisms.iter().any(|m| m == "ECHO") {
            Ok(Some(Box::new(Echo)))
        } else {
            Ok(None)
        }
    }
}

/// Poll `condition` for up to five seconds.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn only(outcomes: Vec<(NodeId, AuthOutcome)>) -> AuthOutcome {
    assert_eq!(outcomes.len(), 1, "{outcomes:?}");
    outcomes.into_iter().next().unwrap().1
}

#[test]
fn test_ascii_auth_stores_credentials() {
    let conn = MockConnection::new(|_| Some(b"STORED\r\n".to_vec()));
    let node = MockNode::new("cache-1:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(AsciiOperationFactory::new()),
            Arc::new(AuthDescriptor::typical("user", "pass")),
            node.clone(),
        )
        .unwrap();

    assert_eq!(only(monitor.join_all()), AuthOutcome::Authenticated);
    let written = conn.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].bytes, b"set ignore 0 0 9\r\nuser pass\r\n");
    assert_eq!(node.auth_completions(), 1);
}

#[test]
fn test_ascii_auth_rejected() {
    let conn = MockConnection::new(|_| Some(b"CLIENT_ERROR auth failure\r\n".to_vec()));
    let node = MockNode::new("cache-1:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(AsciiOperationFactory::new()),
            Arc::new(AuthDescriptor::typical("user", "wrong")),
            node.clone(),
        )
        .unwrap();

    match only(monitor.join_all()) {
        AuthOutcome::Failed(status) => assert_eq!(status.code(), StatusCode::ClientError),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(node.auth_completions(), 0);
}

#[test]
fn test_binary_challenge_then_success() {
    let conn = MockConnection::new(|w: &Written| match w.header().opcode {
        Opcode::SaslAuth => Some(binary_response(Opcode::SaslAuth, 0x21, w.opaque, b"", b"nonce")),
        Opcode::SaslStep => Some(binary_response(Opcode::SaslStep, 0, w.opaque, b"", b"")),
        _ => None,
    });
    let node = MockNode::new("cache-2:11211");
    let registry = MechanismRegistry::with_defaults().with_provider(Arc::new(EchoProvider));
    let monitor = AuthThreadMonitor::with_config(fast_config()).with_registry(registry);
    let descriptor = AuthDescriptor::new(
        Some(vec!["ECHO".to_string()]),
        Arc::new(memcache_client::PlainCredentials::new("user", "pass")),
    );

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(BinaryOperationFactory::new()),
            Arc::new(descriptor),
            node.clone(),
        )
        .unwrap();

    assert_eq!(only(monitor.join_all()), AuthOutcome::Authenticated);
    let written = conn.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].kind, OperationKind::SaslAuth);
    assert_eq!(written[0].body(), b"ECHOreply:");
    assert_eq!(written[1].kind, OperationKind::SaslStep);
    assert_eq!(written[1].body(), b"ECHOreply:nonce");
    assert_eq!(node.auth_completions(), 1);
}

#[test]
fn test_binary_lists_mechanisms_when_unspecified() {
    let conn = MockConnection::new(|w: &Written| match w.header().opcode {
        Opcode::SaslListMechs => Some(binary_response(
            Opcode::SaslListMechs,
            0,
            w.opaque,
            b"",
            b"CRAM-MD5 PLAIN",
        )),
        Opcode::SaslAuth => Some(binary_response(Opcode::SaslAuth, 0, w.opaque, b"", b"")),
        _ => None,
    });
    let node = MockNode::new("cache-3:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());
    let descriptor = AuthDescriptor::new(
        None,
        Arc::new(memcache_client::PlainCredentials::new("user", "pass")),
    );

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(BinaryOperationFactory::new()),
            Arc::new(descriptor),
            node.clone(),
        )
        .unwrap();

    assert_eq!(only(monitor.join_all()), AuthOutcome::Authenticated);
    let written = conn.written();
    assert_eq!(written[0].kind, OperationKind::SaslMechs);
    assert_eq!(written[1].kind, OperationKind::SaslAuth);
    assert_eq!(written[1].body(), b"PLAIN\0user\0pass");
}

#[test]
fn test_binary_retries_until_limit() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let conn = MockConnection::new(move |w: &Written| {
        seen.fetch_add(1, Ordering::SeqCst);
        Some(binary_response(Opcode::SaslAuth, 0x20, w.opaque, b"", b"Auth failure"))
    });
    let node = MockNode::new("cache-4:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(BinaryOperationFactory::new()),
            Arc::new(AuthDescriptor::typical("user", "wrong").with_allowed_attempts(3)),
            node.clone(),
        )
        .unwrap();

    match only(monitor.join_all()) {
        AuthOutcome::Failed(status) => assert_eq!(status.code(), StatusCode::AuthError),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(node.auth_completions(), 0);
}

#[test]
fn test_binary_mechanism_unavailable() {
    let conn = MockConnection::silent();
    let node = MockNode::new("cache-5:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());
    let descriptor = AuthDescriptor::new(
        Some(vec!["GSSAPI".to_string()]),
        Arc::new(memcache_client::PlainCredentials::new("user", "pass")),
    );

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(BinaryOperationFactory::new()),
            Arc::new(descriptor),
            node,
        )
        .unwrap();

    assert_eq!(only(monitor.join_all()), AuthOutcome::MechanismUnavailable);
    assert!(conn.written().is_empty());
}

#[test]
fn test_second_auth_interrupts_first() {
    let conn = MockConnection::silent();
    let node = MockNode::new("cache-6:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());
    let factory = Arc::new(BinaryOperationFactory::new());
    let descriptor = Arc::new(AuthDescriptor::typical("user", "pass"));

    monitor
        .auth_connection(conn.clone(), factory.clone(), descriptor.clone(), node.clone())
        .unwrap();
    assert!(wait_until(|| conn.written().len() == 1));

    monitor
        .auth_connection(conn.clone(), factory.clone(), descriptor.clone(), node.clone())
        .unwrap();

    // the replacement cancels the first task's parked operation on its own
    assert!(wait_until(|| conn.parked_cancelled() == 1));
    assert_eq!(monitor.pending_count(), 1);
    assert!(monitor.is_pending(&NodeId::new("cache-6:11211")));
    assert!(wait_until(|| conn.written().len() == 2));
    assert_eq!(conn.parked_cancelled(), 1);

    monitor.interrupt_all_pending_auth();
    assert_eq!(monitor.pending_count(), 0);
    assert!(!monitor.is_pending(&NodeId::new("cache-6:11211")));

    let outcomes = monitor.join_all();
    assert!(!outcomes.is_empty());
    assert!(
        outcomes
            .iter()
            .all(|(_, outcome)| *outcome == AuthOutcome::Interrupted)
    );
    assert_eq!(conn.parked_cancelled(), conn.written().len());
    assert_eq!(node.auth_completions(), 0);
}

#[test]
fn test_interrupt_all_covers_every_node() {
    let conn = MockConnection::silent();
    let monitor = AuthThreadMonitor::with_config(fast_config());
    let factory = Arc::new(AsciiOperationFactory::new());
    let descriptor = Arc::new(AuthDescriptor::typical("user", "pass"));

    for i in 0..4 {
        let node = MockNode::new(&format!("cache-{i}:11211"));
        monitor
            .auth_connection(conn.clone(), factory.clone(), descriptor.clone(), node)
            .unwrap();
    }
    assert_eq!(monitor.pending_count(), 4);

    monitor.interrupt_all_pending_auth();
    assert_eq!(monitor.pending_count(), 0);

    let outcomes = monitor.join_all();
    assert_eq!(outcomes.len(), 4);
    assert!(
        outcomes
            .iter()
            .all(|(_, outcome)| *outcome == AuthOutcome::Interrupted)
    );
}

#[test]
fn test_connection_shutdown_ends_task() {
    let conn = MockConnection::silent();
    let node = MockNode::new("cache-7:11211");
    let monitor = AuthThreadMonitor::with_config(fast_config());

    monitor
        .auth_connection(
            conn.clone(),
            Arc::new(BinaryOperationFactory::new()),
            Arc::new(AuthDescriptor::typical("user", "pass")),
            node.clone(),
        )
        .unwrap();

    conn.shut_down();
    assert_eq!(only(monitor.join_all()), AuthOutcome::ConnectionShutdown);
    assert_eq!(node.auth_completions(), 0);
}
