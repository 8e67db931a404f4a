//! Integration tests for content cycles

use crate::support::*;
use chrono::Utc;
use follow_harvester::browser::BrowserlessDriver;
use follow_harvester::events::HarvestEvent;
use follow_harvester::model::{InaccessibleKind, ACCOUNT_NOT_ACCESSIBLE};
use follow_harvester::storage::{self, Storage};
use follow_harvester::{CycleResult, HarvestError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post_ready_count(events: &[HarvestEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, HarvestEvent::PostReadyForProcessing { .. }))
        .count()
}

#[tokio::test]
async fn test_suspended_account_is_recorded_and_cycle_continues() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice", "ghost"]);

    let driver = ScriptedDriver::new()
        .page("https://x.com/alice", ScriptedPage::single(timeline("alice", &[1, 2])))
        .page(
            "https://x.com/ghost",
            ScriptedPage::single(
                "<html><body><div><span>Account suspended</span></div></body></html>".to_string(),
            ),
        );
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let before = Utc::now();
    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();
    let after = Utc::now();

    assert_eq!(
        result,
        CycleResult {
            accounts_attempted: 2,
            accounts_succeeded: 1,
            accounts_errored: 1,
            posts_found: 2,
        }
    );

    let ghost = account(&storage, "ghost");
    assert_eq!(ghost.last_error.as_deref(), Some(ACCOUNT_NOT_ACCESSIBLE));
    assert_eq!(ghost.posts_collected, 0);
    let updated = ghost.last_update.expect("attempt recorded");
    assert!(updated >= before - chrono::Duration::milliseconds(1) && updated <= after);

    let events = drain(&mut events);
    assert!(events.contains(&HarvestEvent::CrawlError {
        account: "ghost".to_string(),
        reason: ACCOUNT_NOT_ACCESSIBLE.to_string(),
        inaccessible: Some(InaccessibleKind::Suspended),
    }));
    assert_eq!(
        events.last(),
        Some(&HarvestEvent::ContentUpdated {
            processed_account_count: 2
        })
    );
}

#[tokio::test]
async fn test_post_quoting_suspension_notice_is_harvested() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice"]);

    let page = timeline("alice", &[7, 8]).replace("Post 7 from alice", "My old Account suspended again");
    let driver = ScriptedDriver::new().page("https://x.com/alice", ScriptedPage::single(page));
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        result,
        CycleResult {
            accounts_attempted: 1,
            accounts_succeeded: 1,
            accounts_errored: 0,
            posts_found: 2,
        }
    );
    assert_eq!(account(&storage, "alice").last_error, None);
    assert!(drain(&mut events).contains(&HarvestEvent::PostReadyForProcessing {
        text: "My old Account suspended again".to_string(),
        author_username: "alice".to_string(),
        url: Some("https://x.com/alice/status/7".to_string()),
    }));
}

#[tokio::test]
async fn test_repeated_persistence_failures_abort_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("harvest.db");
    let storage = storage::open_shared(&db_path).unwrap();
    store_session(&storage);
    seed_roster(&storage, &["alice", "bob"]);

    // Every post write fails from here on; roster bookkeeping still works
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_posts BEFORE INSERT ON posts
             BEGIN SELECT RAISE(ABORT, 'disk is full'); END;",
        )
        .unwrap();

    let driver = ScriptedDriver::new()
        .page("https://x.com/alice", ScriptedPage::single(timeline("alice", &[1, 2, 3])))
        .page("https://x.com/bob", ScriptedPage::single(timeline("bob", &[4])));
    let visits = driver.visits();
    let mut config = test_config(24.0, 10);
    config.limits.max_persistence_failures = 2;
    let (orchestrator, mut events) = orchestrator(config, &storage, driver);

    let err = orchestrator
        .run_content_cycle(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Persistence(_)));
    assert_eq!(*visits.lock().unwrap(), vec!["https://x.com/alice".to_string()]);

    let events = drain(&mut events);
    assert_eq!(post_ready_count(&events), 0);
    assert!(!events
        .iter()
        .any(|e| matches!(e, HarvestEvent::ContentUpdated { .. })));

    let alice = account(&storage, "alice");
    assert!(alice.last_update.is_some());
    assert!(alice.last_error.is_some());
    assert_eq!(account(&storage, "bob").last_update, None);
}

#[tokio::test]
async fn test_posts_are_delivered_once_across_cycles() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice"]);

    let driver = ScriptedDriver::new().page(
        "https://x.com/alice",
        ScriptedPage::single(timeline("alice", &[10, 11, 12])),
    );
    // Zero minimum staleness keeps the account due on every cycle
    let (orchestrator, mut events) = orchestrator(test_config(0.0, 10), &storage, driver);
    let cancel = CancellationToken::new();

    let first = orchestrator.run_content_cycle(&cancel).await.unwrap();
    assert_eq!(first.posts_found, 3);
    let first_events = drain(&mut events);
    assert_eq!(post_ready_count(&first_events), 3);
    assert!(first_events.contains(&HarvestEvent::PostReadyForProcessing {
        text: "Post 10 from alice".to_string(),
        author_username: "alice".to_string(),
        url: Some("https://x.com/alice/status/10".to_string()),
    }));

    let second = orchestrator.run_content_cycle(&cancel).await.unwrap();
    assert_eq!(second.accounts_attempted, 1);
    assert_eq!(second.posts_found, 0);
    assert_eq!(post_ready_count(&drain(&mut events)), 0);

    let alice = account(&storage, "alice");
    assert_eq!(alice.posts_collected, 3);
    assert_eq!(alice.last_error, None);

    let store = storage::lock(&storage).unwrap();
    assert_eq!(store.count_posts().unwrap(), 3);
    assert_eq!(store.count_processed(OWNER).unwrap(), 3);
    let stored = store.get_post("10").unwrap().expect("post stored");
    assert_eq!(stored.metrics.replies, Some(0));
    assert_eq!(stored.metrics.likes, Some(1_200));
    assert_eq!(stored.metrics.views, None);
}

#[tokio::test]
async fn test_missing_session_fails_fast() {
    let storage = memory_storage();
    seed_roster(&storage, &["alice"]);

    let driver = ScriptedDriver::new().page("https://x.com/alice", ScriptedPage::single(timeline("alice", &[1])));
    let visits = driver.visits();
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let err = orchestrator
        .run_content_cycle(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Authentication(_)));
    assert_eq!(drain(&mut events), vec![HarvestEvent::AuthRequired {}]);
    assert!(visits.lock().unwrap().is_empty());
    assert_eq!(account(&storage, "alice").last_update, None);
}

#[tokio::test]
async fn test_login_wall_aborts_cycle() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice", "bob"]);

    let wall = ScriptedPage {
        final_url: Some("https://x.com/i/flow/login?redirect_after_login=%2Falice".to_string()),
        ..ScriptedPage::single("<html><body>Sign in</body></html>".to_string())
    };
    let driver = ScriptedDriver::new()
        .page("https://x.com/alice", wall)
        .page("https://x.com/bob", ScriptedPage::single(timeline("bob", &[1])));
    let visits = driver.visits();
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let err = orchestrator
        .run_content_cycle(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Authentication(_)));
    assert!(drain(&mut events).contains(&HarvestEvent::AuthRequired {}));
    assert_eq!(*visits.lock().unwrap(), vec!["https://x.com/alice".to_string()]);
    assert_eq!(account(&storage, "bob").last_update, None);
}

#[tokio::test]
async fn test_empty_timeline_is_not_an_error() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["quiet"]);

    let driver = ScriptedDriver::new().page(
        "https://x.com/quiet",
        ScriptedPage::single("<html><body><h2>No posts yet</h2></body></html>".to_string()),
    );
    let (orchestrator, _events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.accounts_succeeded, 1);
    assert_eq!(result.accounts_errored, 0);
    let quiet = account(&storage, "quiet");
    assert!(quiet.last_update.is_some());
    assert_eq!(quiet.last_error, None);
}

#[tokio::test]
async fn test_navigation_timeout_is_isolated() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice", "broken"]);

    // No page scripted for "broken": navigation times out
    let driver = ScriptedDriver::new().page("https://x.com/alice", ScriptedPage::single(timeline("alice", &[1])));
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.accounts_attempted, 2);
    assert_eq!(result.accounts_errored, 1);
    assert_eq!(result.posts_found, 1);

    let broken = account(&storage, "broken");
    assert!(broken.last_update.is_some());
    assert!(broken
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Navigation timeout")));

    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        HarvestEvent::CrawlError { account, inaccessible: None, .. } if account == "broken"
    )));
}

#[tokio::test]
async fn test_cycle_cap_and_staleness_order() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["a_recent", "b_never", "c_stale"]);
    {
        let mut store = storage::lock(&storage).unwrap();
        let now = Utc::now();
        store
            .record_crawl_attempt(OWNER, "a_recent", now - chrono::Duration::hours(10), None, 0)
            .unwrap();
        store
            .record_crawl_attempt(OWNER, "c_stale", now - chrono::Duration::hours(30), None, 0)
            .unwrap();
    }

    let driver = ScriptedDriver::new()
        .page("https://x.com/a_recent", ScriptedPage::single(timeline("a_recent", &[1])))
        .page("https://x.com/b_never", ScriptedPage::single(timeline("b_never", &[2])))
        .page("https://x.com/c_stale", ScriptedPage::single(timeline("c_stale", &[3])));
    let visits = driver.visits();
    let (orchestrator, _events) = orchestrator(test_config(24.0, 2), &storage, driver);

    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.accounts_attempted, 2);
    assert_eq!(
        *visits.lock().unwrap(),
        vec!["https://x.com/b_never".to_string(), "https://x.com/c_stale".to_string()]
    );
}

#[tokio::test]
async fn test_cancelled_cycle_stops_between_accounts() {
    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice", "bob"]);

    let driver = ScriptedDriver::new();
    let visits = driver.visits();
    let (orchestrator, mut events) = orchestrator(test_config(24.0, 10), &storage, driver);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orchestrator.run_content_cycle(&cancel).await.unwrap();

    assert_eq!(result.accounts_attempted, 0);
    assert!(visits.lock().unwrap().is_empty());
    assert_eq!(
        drain(&mut events),
        vec![HarvestEvent::ContentUpdated {
            processed_account_count: 0
        }]
    );
}

#[tokio::test]
async fn test_full_cycle_through_render_service() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_partial_json(json!({
            "url": "https://x.com/alice",
            "cookies": [{ "name": "auth_token", "value": "secret" }],
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-response-code", "200")
                .set_body_string(timeline("alice", &[101, 102])),
        )
        .mount(&server)
        .await;

    let storage = memory_storage();
    store_session(&storage);
    seed_roster(&storage, &["alice"]);

    let config = test_config(24.0, 10);
    let mut browser = config.browser.clone();
    browser.endpoint = server.uri();
    let driver = BrowserlessDriver::new(&browser).unwrap();
    let (orchestrator, mut events) = orchestrator(config, &storage, driver);

    let result = orchestrator.run_content_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(result.posts_found, 2);
    assert_eq!(post_ready_count(&drain(&mut events)), 2);
    assert_eq!(account(&storage, "alice").posts_collected, 2);
}
