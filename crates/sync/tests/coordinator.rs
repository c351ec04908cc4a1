//! Integration tests for the migration state coordinator, with the
//! remote surfaces mocked. Realtime delivery is exercised separately
//! in `link.rs` and end-to-end in `e2e.rs`; here events are fed
//! straight into the merge path.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mailshift_api::{AuthClient, Backend, Endpoints};
use mailshift_notify::{Level, NotificationEvent, Notifier};
use mailshift_session::persist::SessionFile;
use mailshift_session::SessionStore;
use mailshift_sync::{CommandError, Coordinator, CoordinatorConfig, LinkConfig, RealtimeLink};
use mailshift_types::{JobStatus, JobUpdate, MigrationCategory};

use common::wait_until;

struct Fixture {
    coordinator: Arc<Coordinator>,
    notifier: Notifier,
    store: Arc<SessionStore>,
    _dir: tempfile::TempDir,
}

async fn fixture(server: &mockito::ServerGuard) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Notifier::new();
    let store = Arc::new(SessionStore::with_file(
        AuthClient::new(reqwest::Client::new(), server.url()),
        notifier.clone(),
        SessionFile::at(dir.path().join("session.json")),
    ));
    let endpoints = Endpoints {
        auth_url: server.url(),
        migration_url: server.url(),
        status_url: server.url(),
        realtime_url: "ws://127.0.0.1:1/ws".into(),
    };
    let backend = Backend::new(endpoints).unwrap();
    let link = Arc::new(RealtimeLink::new(LinkConfig::new("ws://127.0.0.1:1/ws")));
    let coordinator = Arc::new(Coordinator::with_config(
        Arc::clone(&store),
        backend,
        notifier.clone(),
        link,
        CoordinatorConfig {
            reconcile_delay: Duration::from_millis(50),
        },
    ));
    Fixture {
        coordinator,
        notifier,
        store,
        _dir: dir,
    }
}

async fn sign_in(server: &mut mockito::ServerGuard, fx: &Fixture) {
    server
        .mock("POST", "/api/auth/login")
        .with_status(200)
        .with_body(r#"{"success":true,"token":"jwt-1","userId":"u-1","name":"Ana"}"#)
        .create_async()
        .await;
    fx.store.sign_in("ana@example.com", "hunter22").await.unwrap();
}

async fn authorize_both(server: &mut mockito::ServerGuard, fx: &Fixture) {
    server
        .mock("GET", "/api/oauth/tokens/u-1")
        .with_status(200)
        .with_body(r#"{"outlook":{"accessToken":"o-1"},"gmail":{"accessToken":"g-1"}}"#)
        .create_async()
        .await;
    fx.store.refresh_authorizations().await.unwrap();
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn posted_with_level(events: &[NotificationEvent], level: Level) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            NotificationEvent::Posted(n) if n.level == level => Some(n.message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn start_without_authorizations_makes_zero_remote_calls() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    let start_mock = server
        .mock("POST", "/api/migration/start")
        .expect(0)
        .create_async()
        .await;

    let err = fx
        .coordinator
        .start_migration(MigrationCategory::Mail)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::MissingAuthorization));
    assert!(fx.coordinator.current_job().is_none());
    start_mock.assert_async().await;
}

#[tokio::test]
async fn start_requires_a_session() {
    let server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    let err = fx
        .coordinator
        .start_migration(MigrationCategory::Mail)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotSignedIn));
}

#[tokio::test]
async fn start_installs_placeholder_and_schedules_confirmation_poll() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;
    authorize_both(&mut server, &fx).await;

    server
        .mock("POST", "/api/migration/start")
        .with_status(200)
        .with_body(r#"{"jobId":"job-123"}"#)
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/api/status/job/job-123")
        .with_status(200)
        .with_body(r#"{"jobId":"job-123","status":"in_progress","progress":5}"#)
        .create_async()
        .await;

    let job_id = fx
        .coordinator
        .start_migration(MigrationCategory::Mail)
        .await
        .unwrap();
    assert_eq!(job_id, "job-123");

    // Placeholder goes up before any confirmation arrives.
    let placeholder = fx.coordinator.current_job().unwrap();
    assert_eq!(placeholder.job_id, "job-123");
    assert_eq!(placeholder.status, JobStatus::InProgress);
    assert_eq!(placeholder.progress, 0);
    assert_eq!(placeholder.migration_type, Some(MigrationCategory::Mail));

    // The short-delay confirmation poll corrects it.
    wait_until(|| fx.coordinator.current_job().unwrap().progress == 5).await;
    poll.assert_async().await;
}

#[tokio::test]
async fn start_failure_surfaces_error_and_changes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;
    authorize_both(&mut server, &fx).await;
    let mut rx = fx.notifier.subscribe();

    server
        .mock("POST", "/api/migration/start")
        .with_status(500)
        .with_body(r#"{"message":"no capacity"}"#)
        .create_async()
        .await;

    let err = fx
        .coordinator
        .start_migration(MigrationCategory::Drive)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Api(_)));
    assert!(fx.coordinator.current_job().is_none());

    let events = drain(&mut rx);
    let errors = posted_with_level(&events, Level::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("no capacity"));
    // The loading toast was posted and then dismissed.
    assert!(events
        .iter()
        .any(|event| matches!(event, NotificationEvent::Dismissed(_))));
}

#[tokio::test]
async fn list_jobs_replaces_the_set_wholesale() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    server
        .mock("GET", "/api/status/user/jobs/u-1")
        .with_status(200)
        .with_body_from_request(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                br#"[{"jobId":"job-1","status":"completed","progress":100},
                     {"jobId":"job-2","status":"in_progress","progress":40}]"#
                    .to_vec()
            } else {
                br#"[{"jobId":"job-2","status":"in_progress","progress":55}]"#.to_vec()
            }
        })
        .expect(2)
        .create_async()
        .await;

    let first = fx.coordinator.list_jobs().await;
    assert_eq!(first.len(), 2);

    let second = fx.coordinator.list_jobs().await;
    assert_eq!(second.len(), 1);
    let jobs = fx.coordinator.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, "job-2");
    assert_eq!(jobs[0].progress, 55);
}

#[tokio::test]
async fn list_jobs_failure_leaves_local_set_unchanged() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    server
        .mock("GET", "/api/status/user/jobs/u-1")
        .with_status(200)
        .with_body(r#"[{"jobId":"job-1","status":"in_progress","progress":10}]"#)
        .create_async()
        .await;
    assert_eq!(fx.coordinator.list_jobs().await.len(), 1);

    // Take the status surface away entirely.
    server.reset_async().await;

    let fetched = fx.coordinator.list_jobs().await;
    assert!(fetched.is_empty());
    // Local set untouched by the failed refresh.
    assert_eq!(fx.coordinator.jobs().len(), 1);
}

#[tokio::test]
async fn cancel_clears_current_and_refreshes_the_list() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;
    authorize_both(&mut server, &fx).await;

    server
        .mock("POST", "/api/migration/start")
        .with_status(200)
        .with_body(r#"{"jobId":"job-123"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/migration/cancel/job-123")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;
    let refresh = server
        .mock("GET", "/api/status/user/jobs/u-1")
        .with_status(200)
        .with_body(r#"[{"jobId":"job-123","status":"cancelled","progress":40}]"#)
        .create_async()
        .await;
    // The confirmation poll from start may or may not land before the
    // cancel; keep it satisfied either way.
    server
        .mock("GET", "/api/status/job/job-123")
        .with_status(200)
        .with_body(r#"{"jobId":"job-123","status":"in_progress","progress":1}"#)
        .create_async()
        .await;

    let mut rx = fx.notifier.subscribe();
    fx.coordinator
        .start_migration(MigrationCategory::Contacts)
        .await
        .unwrap();
    fx.coordinator.cancel("job-123").await.unwrap();

    assert!(fx.coordinator.current_job().is_none());
    refresh.assert_async().await;
    let jobs = fx.coordinator.jobs();
    assert_eq!(jobs[0].status, JobStatus::Cancelled);

    let events = drain(&mut rx);
    assert_eq!(
        posted_with_level(&events, Level::Warning),
        vec!["Migration cancelled".to_string()]
    );
    assert!(events
        .iter()
        .any(|event| matches!(event, NotificationEvent::Dismissed(_))));
}

#[tokio::test]
async fn pause_and_resume_schedule_reconciliation_polls() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    server
        .mock("POST", "/api/migration/pause/job-5")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/api/migration/resume/job-5")
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;
    let polls = server
        .mock("GET", "/api/status/job/job-5")
        .with_status(200)
        .with_body(r#"{"jobId":"job-5","status":"paused","progress":30}"#)
        .expect(2)
        .create_async()
        .await;

    let mut rx = fx.notifier.subscribe();
    fx.coordinator.pause("job-5").await.unwrap();
    fx.coordinator.resume("job-5").await.unwrap();

    // Both reconciliation polls run after the short delay.
    tokio::time::sleep(Duration::from_millis(300)).await;
    polls.assert_async().await;

    let events = drain(&mut rx);
    let infos = posted_with_level(&events, Level::Info);
    assert_eq!(infos, vec!["Migration paused", "Migration resumed"]);
}

#[tokio::test]
async fn terminal_event_side_effects_fire_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    let refresh = server
        .mock("GET", "/api/status/user/jobs/u-1")
        .with_status(200)
        .with_body(r#"[{"jobId":"job-9","status":"completed","progress":100}]"#)
        .create_async()
        .await;

    let mut rx = fx.notifier.subscribe();

    fx.coordinator
        .apply_event(JobUpdate {
            job_id: "job-9".into(),
            status: Some(JobStatus::InProgress),
            progress: Some(45),
            ..Default::default()
        })
        .await;
    assert!(posted_with_level(&drain(&mut rx), Level::Success).is_empty());

    let completed = JobUpdate {
        job_id: "job-9".into(),
        status: Some(JobStatus::Completed),
        progress: Some(100),
        message: Some("Done".into()),
        ..Default::default()
    };
    fx.coordinator.apply_event(completed.clone()).await;
    refresh.assert_async().await;

    let events = drain(&mut rx);
    assert_eq!(
        posted_with_level(&events, Level::Success),
        vec!["Migration completed! Done".to_string()]
    );

    // Duplicate delivery (e.g. private queue + global feed): no-op.
    fx.coordinator.apply_event(completed).await;
    assert!(posted_with_level(&drain(&mut rx), Level::Success).is_empty());
}

#[tokio::test]
async fn failed_event_emits_error_with_message() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;
    let mut rx = fx.notifier.subscribe();

    fx.coordinator
        .apply_event(JobUpdate {
            job_id: "job-3".into(),
            status: Some(JobStatus::InProgress),
            ..Default::default()
        })
        .await;
    fx.coordinator
        .apply_event(JobUpdate {
            job_id: "job-3".into(),
            status: Some(JobStatus::Failed),
            message: Some("mailbox quota exceeded".into()),
            ..Default::default()
        })
        .await;

    let errors = posted_with_level(&drain(&mut rx), Level::Error);
    assert_eq!(errors, vec!["Migration failed: mailbox quota exceeded"]);
}

#[tokio::test]
async fn poll_result_for_departed_context_is_discarded() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    server
        .mock("GET", "/api/status/job/job-gone")
        .with_status(200)
        .with_body(r#"{"jobId":"job-gone","status":"in_progress","progress":50}"#)
        .create_async()
        .await;

    // No current job, nothing in the list: the response is stale.
    assert!(fx.coordinator.poll_job_status("job-gone").await.is_none());
    assert!(fx.coordinator.current_job().is_none());
    assert!(fx.coordinator.jobs().is_empty());
}

#[tokio::test]
async fn poll_errors_are_swallowed() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    server
        .mock("GET", "/api/status/job/job-1")
        .with_status(500)
        .create_async()
        .await;

    assert!(fx.coordinator.poll_job_status("job-1").await.is_none());
}

#[tokio::test]
async fn event_adopts_current_job_when_none_is_set() {
    let mut server = mockito::Server::new_async().await;
    let fx = fixture(&server).await;
    sign_in(&mut server, &fx).await;

    fx.coordinator
        .apply_event(JobUpdate {
            job_id: "job-X".into(),
            status: Some(JobStatus::InProgress),
            progress: Some(20),
            ..Default::default()
        })
        .await;

    let current = fx.coordinator.current_job().unwrap();
    assert_eq!(current.job_id, "job-X");
    assert_eq!(current.progress, 20);

    // Explicit reset puts the pointer back to absent.
    fx.coordinator.reset_current();
    assert!(fx.coordinator.current_job().is_none());
}
