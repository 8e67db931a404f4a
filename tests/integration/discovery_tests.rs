//! Integration tests for following-list discovery

use crate::support::*;
use chrono::Utc;
use follow_harvester::events::HarvestEvent;
use follow_harvester::storage::{self, Storage};
use follow_harvester::HarvestError;
use tokio_util::sync::CancellationToken;

const FOLLOWING_URL: &str = "https://x.com/tracked/following";

#[tokio::test]
async fn test_discovery_collects_roster_across_reveals() {
    let storage = memory_storage();
    store_session(&storage);

    // Overlapping frames, then a list that stops growing
    let frames = vec![
        following(&["alice", "bob"]),
        following(&["bob", "carol"]),
        following(&["bob", "carol", "dave"]),
    ];
    let driver = ScriptedDriver::new()
        .page(FOLLOWING_URL, ScriptedPage::frames(frames))
        .rotating_to("rotated");
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let count = orchestrator.run_discovery(&CancellationToken::new()).await.unwrap();

    assert_eq!(count, 4);
    assert_eq!(drain(&mut events), vec![HarvestEvent::FollowingsUpdated { count: 4 }]);

    let roster = storage::lock(&storage).unwrap().list_accounts(OWNER).unwrap();
    let names: Vec<_> = roster.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol", "dave"]);
    assert_eq!(roster[0].display_name.as_deref(), Some("alice display"));
    assert_eq!(roster[0].profile_url.as_deref(), Some("https://x.com/alice"));
    assert!(roster.iter().all(|a| a.last_update.is_none()));

    // Rotated cookies are written back after a successful pass
    let session = orchestrator.session().require().unwrap();
    assert_eq!(session.credential_data[0].value, "rotated");
}

#[tokio::test]
async fn test_cancelled_discovery_keeps_first_frame() {
    let storage = memory_storage();
    store_session(&storage);

    let frames = vec![following(&["alice", "bob"]), following(&["carol", "dave"])];
    let driver = ScriptedDriver::new().page(FOLLOWING_URL, ScriptedPage::frames(frames));
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let count = orchestrator.run_discovery(&cancel).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(drain(&mut events), vec![HarvestEvent::FollowingsUpdated { count: 2 }]);
    assert_eq!(storage::lock(&storage).unwrap().count_accounts(OWNER).unwrap(), 2);
}

#[tokio::test]
async fn test_rediscovery_keeps_crawl_history() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice"]);
    let crawled_at = Utc::now() - chrono::Duration::hours(3);
    storage::lock(&storage)
        .unwrap()
        .record_crawl_attempt(OWNER, "alice", crawled_at, None, 7)
        .unwrap();

    let driver = ScriptedDriver::new().page(FOLLOWING_URL, ScriptedPage::single(following(&["alice", "alice"])));
    let (orchestrator, _events) = orchestrator(test_config(24.0, 10), &storage, driver);

    assert_eq!(orchestrator.run_discovery(&CancellationToken::new()).await.unwrap(), 1);

    let alice = account(&storage, "alice");
    assert_eq!(alice.posts_collected, 7);
    assert_eq!(
        alice.last_update.map(|t| t.timestamp_millis()),
        Some(crawled_at.timestamp_millis())
    );
    assert_eq!(alice.display_name.as_deref(), Some("alice display"));
}

#[tokio::test]
async fn test_discovery_respects_roster_cap() {
    let storage = memory_storage();
    store_session(&storage);

    let names: Vec<String> = (0..150).map(|i| format!("user{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let driver = ScriptedDriver::new().page(FOLLOWING_URL, ScriptedPage::single(following(&refs)));
    let (orchestrator, _events) = orchestrator(test_config(24.0, 10), &storage, driver);

    // The test config caps discovery at 100 accounts
    assert_eq!(orchestrator.run_discovery(&CancellationToken::new()).await.unwrap(), 100);
    assert_eq!(storage::lock(&storage).unwrap().count_accounts(OWNER).unwrap(), 100);
}

#[tokio::test]
async fn test_discovery_without_session_requires_auth() {
    let storage = memory_storage();
    let driver = ScriptedDriver::new().page(FOLLOWING_URL, ScriptedPage::single(following(&["alice"])));
    let visits = driver.visits();
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let err = orchestrator.run_discovery(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, HarvestError::Authentication(_)));
    assert_eq!(drain(&mut events), vec![HarvestEvent::AuthRequired {}]);
    assert!(visits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_discovery_login_wall_requires_auth() {
    let storage = memory_storage();
    store_session(&storage);

    let wall = ScriptedPage {
        final_url: Some("https://x.com/login".to_string()),
        ..ScriptedPage::single("<html><body>Log in</body></html>".to_string())
    };
    let driver = ScriptedDriver::new().page(FOLLOWING_URL, wall);
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    assert!(matches!(
        orchestrator.run_discovery(&CancellationToken::new()).await,
        Err(HarvestError::Authentication(_))
    ));
    assert!(drain(&mut events).contains(&HarvestEvent::AuthRequired {}));
}
