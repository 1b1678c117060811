//! End-to-end client tests against the reference backend, served in-process
//! on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use statehub_cli::{
    lock_info, with_lock, CompareEngine, Credentials, HttpStateTransport, SessionContext,
    StateTransport, VersionCatalog,
};
use statehub_common::{ChangeKind, Error, LockMetadata, StateObjectKey, WritePrecondition};
use statehub_web::{serve_on, AppState, TokenTable};

async fn start_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let tokens = TokenTable::parse("alice:tok-alice,bob:tok-bob").unwrap();
    tokio::spawn(serve_on(listener, Arc::new(AppState::new(tokens))));
    format!("http://{}", addr)
}

fn client(endpoint: &str, user: &str) -> Arc<HttpStateTransport> {
    let session = SessionContext::with_credentials(Credentials::new(user, format!("tok-{user}")));
    Arc::new(HttpStateTransport::new(endpoint, Duration::from_secs(5), Arc::new(session)).unwrap())
}

fn key() -> StateObjectKey {
    StateObjectKey::new("proj-1", "main").unwrap()
}

async fn push(transport: &HttpStateTransport, body: &str) -> u64 {
    transport
        .write_state(&key(), body.as_bytes().to_vec(), &WritePrecondition::none())
        .await
        .unwrap()
        .version
}

#[tokio::test]
async fn unwritten_state_is_empty() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    let catalog = VersionCatalog::new(transport.clone());

    let split = catalog.get_current_and_previous(&key()).await.unwrap();
    assert!(split.current.is_none());
    assert!(split.previous.is_empty());
    assert!(!catalog.exists(&key()).await);
    assert!(transport.read_state(&key(), None).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn three_versions_list_and_compare() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    for body in [r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#] {
        push(&transport, body).await;
    }

    let catalog = VersionCatalog::new(transport.clone());
    let split = catalog.get_current_and_previous(&key()).await.unwrap();
    assert_eq!(split.current.as_ref().map(|v| v.version), Some(3));
    assert_eq!(split.current.as_ref().map(|v| v.created_by.as_str()), Some("alice"));
    let previous: Vec<u64> = split.previous.iter().map(|v| v.version).collect();
    assert_eq!(previous, vec![2, 1]);
    assert!(catalog.exists(&key()).await);

    let engine = CompareEngine::new(transport.clone());
    let diff = engine.compare_versions(&key(), 2, 3).await.unwrap().unwrap();
    assert_eq!(diff.changed_lines(), 1);
    let changed = diff.rows.iter().find(|r| r.kind != ChangeKind::Equal).unwrap();
    assert!(changed.left.as_ref().unwrap().text.contains("2"));
    assert!(changed.right.as_ref().unwrap().text.contains("3"));

    let same = engine.compare_versions(&key(), 3, 3).await.unwrap().unwrap();
    assert!(same.is_identical());
}

#[tokio::test]
async fn read_returns_exact_bytes() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    let raw = "{\n\"serial\": 4,   \"lineage\": \"x\"}";
    push(&transport, raw).await;
    push(&transport, "{}").await;

    assert_eq!(transport.read_state(&key(), Some(1)).await.unwrap(), raw.as_bytes());
    assert_eq!(transport.read_state(&key(), None).await.unwrap(), b"{}");
}

#[tokio::test]
async fn stale_expected_version_is_rejected() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    for i in 1..=6 {
        push(&transport, &format!(r#"{{"serial":{i}}}"#)).await;
    }

    let err = transport
        .write_state(&key(), b"{}".to_vec(), &WritePrecondition::expect_version(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::VersionConflict { expected: 5, current: Some(6), .. }
    ));

    let written = transport
        .write_state(&key(), b"{}".to_vec(), &WritePrecondition::expect_version(6))
        .await
        .unwrap();
    assert_eq!(written.version, 7);
}

#[tokio::test]
async fn expected_version_zero_creates() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    let first = transport
        .write_state(&key(), b"{}".to_vec(), &WritePrecondition::expect_version(0))
        .await
        .unwrap();
    assert_eq!(first.version, 1);

    let err = transport
        .write_state(&key(), b"{}".to_vec(), &WritePrecondition::expect_version(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionConflict { .. }));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    transport.delete_state(&key(), Some(42)).await.unwrap();
    transport.delete_state(&key(), None).await.unwrap();

    push(&transport, "{}").await;
    push(&transport, r#"{"a":1}"#).await;
    transport.delete_state(&key(), Some(1)).await.unwrap();
    transport.delete_state(&key(), Some(1)).await.unwrap();

    let index = transport.list_versions(&key()).await.unwrap();
    let remaining: Vec<u64> = index.iter().map(|v| v.version).collect();
    assert_eq!(remaining, vec![2]);

    transport.delete_state(&key(), None).await.unwrap();
    assert!(transport.list_versions(&key()).await.unwrap().is_empty());

    // Numbers are not handed out twice
    assert_eq!(push(&transport, "{}").await, 3);
}

#[tokio::test]
async fn second_locker_waits_for_release() {
    let endpoint = start_backend().await;
    let alice = client(&endpoint, "alice");
    let bob = client(&endpoint, "bob");
    let alice_lock = LockMetadata::new().with("who", "alice");
    let bob_lock = LockMetadata::new().with("who", "bob");

    alice.acquire_lock(&key(), &alice_lock).await.unwrap();
    match bob.acquire_lock(&key(), &bob_lock).await.unwrap_err() {
        Error::LockConflict { holder, .. } => {
            assert_eq!(holder.unwrap().who(), Some("alice"));
        }
        other => panic!("unexpected {other:?}"),
    }

    alice.release_lock(&key(), &alice_lock).await.unwrap();
    let handle = bob.acquire_lock(&key(), &bob_lock).await.unwrap();
    assert_eq!(handle.metadata, bob_lock);
}

#[tokio::test]
async fn locked_writes_need_the_lock_id() {
    let endpoint = start_backend().await;
    let alice = client(&endpoint, "alice");
    let bob = client(&endpoint, "bob");
    let info = lock_info("apply", "alice");
    let id = info.lock_id().unwrap().to_string();

    let version = with_lock(alice.as_ref(), &key(), &info, || async {
        let err = bob
            .write_state(&key(), b"{}".to_vec(), &WritePrecondition::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockConflict { .. }));

        let written = alice
            .write_state(&key(), b"{}".to_vec(), &WritePrecondition::none().with_lock_id(id.as_str()))
            .await?;
        Ok::<_, Error>(written.version)
    })
    .await
    .unwrap();
    assert_eq!(version, 1);

    // Released on the way out
    bob.acquire_lock(&key(), &LockMetadata::new().with("who", "bob"))
        .await
        .unwrap();
}

#[tokio::test]
async fn with_lock_releases_when_work_fails() {
    let endpoint = start_backend().await;
    let alice = client(&endpoint, "alice");
    let info = lock_info("apply", "alice");

    let result: statehub_common::Result<()> = with_lock(alice.as_ref(), &key(), &info, || async {
        Err(Error::Network("plan failed".to_string()))
    })
    .await;
    assert!(matches!(result, Err(Error::Network(_))));

    alice.acquire_lock(&key(), &info).await.unwrap();
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let endpoint = start_backend().await;
    let session = SessionContext::with_credentials(Credentials::new("mallory", "wrong"));
    let transport =
        HttpStateTransport::new(&endpoint, Duration::from_secs(5), Arc::new(session)).unwrap();
    let err = transport.list_versions(&key()).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert!(transport.health_check().await);
}

#[tokio::test]
async fn logout_ends_access() {
    let endpoint = start_backend().await;
    let session = Arc::new(SessionContext::with_credentials(Credentials::new("alice", "tok-alice")));
    let transport =
        HttpStateTransport::new(&endpoint, Duration::from_secs(5), session.clone()).unwrap();
    transport.list_versions(&key()).await.unwrap();

    session.logout();
    assert!(matches!(
        transport.list_versions(&key()).await,
        Err(Error::Unauthorized(_))
    ));
}

#[tokio::test]
async fn keys_with_reserved_characters_round_trip() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    let odd = StateObjectKey::new("team a", "env/prod").unwrap();
    transport
        .write_state(&odd, b"{}".to_vec(), &WritePrecondition::none())
        .await
        .unwrap();
    assert_eq!(transport.list_versions(&odd).await.unwrap().len(), 1);
    assert!(transport.list_versions(&key()).await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_lock_push_and_release_from_the_cli() {
    use statehub_cli::commands::lock::{self as lock_cmd, LockCommands};
    use statehub_cli::commands::state::{self as state_cmd, StateCommands};
    use statehub_cli::output::OutputFormat;

    let endpoint = start_backend().await;
    let alice = client(&endpoint, "alice");
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("terraform.tfstate");
    std::fs::write(&file, r#"{"serial":1}"#).unwrap();

    lock_cmd::execute(
        LockCommands::Acquire {
            key: key(),
            operation: "apply".to_string(),
            id: Some("ci-1".to_string()),
            meta: Vec::new(),
        },
        alice.clone(),
        OutputFormat::Json,
    )
    .await
    .unwrap();

    // A push without the lock ID is refused while the lock is held
    let refused = state_cmd::execute(
        StateCommands::Push {
            key: key(),
            file: file.clone(),
            expected_version: None,
            lock: false,
            lock_id: None,
        },
        alice.clone(),
        OutputFormat::Json,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        refused.downcast_ref::<Error>(),
        Some(Error::LockConflict { .. })
    ));

    state_cmd::execute(
        StateCommands::Push {
            key: key(),
            file,
            expected_version: Some(0),
            lock: false,
            lock_id: Some("ci-1".to_string()),
        },
        alice.clone(),
        OutputFormat::Json,
    )
    .await
    .unwrap();

    lock_cmd::execute(
        LockCommands::Release {
            key: key(),
            id: Some("ci-1".to_string()),
            meta: Vec::new(),
        },
        alice.clone(),
        OutputFormat::Json,
    )
    .await
    .unwrap();

    assert_eq!(alice.read_state(&key(), None).await.unwrap(), br#"{"serial":1}"#);
}

#[tokio::test]
async fn locked_deletes_need_the_lock_id() {
    let endpoint = start_backend().await;
    let alice = client(&endpoint, "alice");
    let bob = client(&endpoint, "bob");
    push(&alice, "{}").await;
    push(&alice, r#"{"a":1}"#).await;

    let info = lock_info("apply", "alice");
    let id = info.lock_id().unwrap().to_string();
    alice.acquire_lock(&key(), &info).await.unwrap();

    let err = bob.delete_state(&key(), None).await.unwrap_err();
    assert!(matches!(err, Error::LockConflict { .. }));
    bob.delete_state(&key(), Some(99)).await.unwrap();
    assert_eq!(alice.list_versions(&key()).await.unwrap().len(), 2);

    alice
        .delete_state_locked(&key(), Some(1), Some(id.as_str()))
        .await
        .unwrap();
    alice.release_lock(&key(), &info).await.unwrap();

    let remaining: Vec<u64> = alice
        .list_versions(&key())
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(remaining, vec![2]);
}

#[tokio::test]
async fn large_state_round_trips() {
    let endpoint = start_backend().await;
    let transport = client(&endpoint, "alice");
    let body = format!(r#"{{"filler":"{}"}}"#, "x".repeat(3 * 1024 * 1024));

    let written = transport
        .write_state(&key(), body.clone().into_bytes(), &WritePrecondition::none())
        .await
        .unwrap();
    assert_eq!(written.size_bytes, body.len() as u64);
    assert_eq!(transport.read_state(&key(), None).await.unwrap(), body.as_bytes());
}
