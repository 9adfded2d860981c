//! End-to-end session flows against the in-memory fake backend.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lab_api::{CellPatch, ResourceId};
use notebook::fake_api::FakeApi;
use notebook::{NotebookSession, SessionConfig, SessionEvent};
use tokio::sync::mpsc;

const QUIET: Duration = Duration::from_millis(40);
const SETTLE: Duration = Duration::from_millis(250);

async fn open(
    api: Arc<FakeApi>,
) -> (NotebookSession, mpsc::UnboundedReceiver<SessionEvent>) {
    NotebookSession::open_with(
        api,
        ResourceId::from("nb-1"),
        SessionConfig { quiet_period: QUIET },
    )
    .await
    .expect("fixture notebook should open")
}

#[tokio::test]
async fn test_typical_edit_then_autosave_flow() {
    let api = Arc::new(FakeApi::new());
    api.seed_cell(1, 0, "");
    let (session, _events) = open(api.clone()).await;
    let id = ResourceId::from(1);

    session.edit_cell(&id, "print(1)");

    // Optimistic edit is visible immediately, before any request.
    assert_eq!(session.cells()[0].code, "print(1)");
    assert!(api.update_calls.lock().unwrap().is_empty());

    tokio::time::sleep(SETTLE).await;

    let calls = api.update_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, CellPatch::code("print(1)"));
    drop(calls);

    // Store reflects the server's echoed row.
    let cells = session.cells();
    assert_eq!(cells[0].code, "print(1)");
    assert!(cells[0].updated_at.is_some());
}

#[tokio::test]
async fn test_install_triggers_status_refresh_regardless_of_result() {
    let api = Arc::new(FakeApi::new());
    let (session, _events) = open(api.clone()).await;

    let before = api.status_calls.load(Ordering::Acquire);
    assert!(session.install_package("numpy").await);

    assert_eq!(api.install_calls.lock().unwrap().as_slice(), ["numpy"]);
    assert_eq!(api.status_calls.load(Ordering::Acquire), before + 1);
    assert_eq!(
        session.last_install_output().unwrap().stdout,
        "Successfully installed numpy"
    );

    // Same refresh happens when the install itself fails.
    api.fail_install.store(true, Ordering::Release);
    assert!(session.install_package("pandas").await);
    assert_eq!(api.status_calls.load(Ordering::Acquire), before + 2);
}

#[tokio::test]
async fn test_removing_cell_mid_edit_sends_no_update() {
    let api = Arc::new(FakeApi::new());
    api.seed_cell(1, 0, "");
    api.seed_cell(2, 1, "");
    let (session, _events) = open(api.clone()).await;

    session.edit_cell(&ResourceId::from(2), "x = 2");
    assert!(session.remove_cell(&ResourceId::from(2)));

    tokio::time::sleep(SETTLE).await;

    // No update for cell 2 was ever issued.
    assert!(api.update_calls.lock().unwrap().is_empty());
    assert_eq!(session.cells().len(), 1);
}

#[tokio::test]
async fn test_close_cancels_all_pending_saves() {
    let api = Arc::new(FakeApi::new());
    api.seed_cell(1, 0, "");
    api.seed_cell(2, 1, "");
    let (session, _events) = open(api.clone()).await;

    session.edit_cell(&ResourceId::from(1), "a");
    session.edit_cell(&ResourceId::from(2), "b");
    session.close();

    tokio::time::sleep(SETTLE).await;
    assert!(api.update_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_late_save_response_does_not_clobber_run_output() {
    let api = Arc::new(FakeApi::new());
    api.seed_cell(1, 0, "print(0)");
    // Save responses are slow: the run below finishes first.
    *api.update_latency.lock().unwrap() = Some(Duration::from_millis(120));
    let (session, _events) = open(api.clone()).await;
    let id = ResourceId::from(1);

    session.edit_cell(&id, "print(1)");
    // Let the debounce fire so the save request is in flight.
    tokio::time::sleep(QUIET + Duration::from_millis(20)).await;

    assert!(session.run_cell(&id).await);

    // Run already reconciled; the save response is still pending.
    let cells = session.cells();
    assert_eq!(cells[0].last_stdout.as_deref(), Some("stdout::print(1)"));

    tokio::time::sleep(SETTLE).await;

    // The late save merged only the code it owns; run output survived.
    let cells = session.cells();
    assert_eq!(cells[0].code, "print(1)");
    assert_eq!(cells[0].last_stdout.as_deref(), Some("stdout::print(1)"));
    assert_eq!(cells[0].last_exit_code, Some(0));
}

#[tokio::test]
async fn test_continue_typing_while_run_in_flight() {
    let api = Arc::new(FakeApi::new());
    api.seed_cell(1, 0, "print(1)");
    *api.run_latency.lock().unwrap() = Some(Duration::from_millis(100));
    let (session, _events) = open(api.clone()).await;
    let session = Arc::new(session);
    let id = ResourceId::from(1);

    let run = tokio::spawn({
        let session = Arc::clone(&session);
        let id = id.clone();
        async move { session.run_cell(&id).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Save and run are independent axes: editing during a run is fine.
    session.edit_cell(&id, "print(2)");
    assert!(run.await.unwrap());

    tokio::time::sleep(SETTLE).await;

    let cells = session.cells();
    // The run executed the code as of its start; the newer edit kept its text.
    assert_eq!(cells[0].code, "print(2)");
    assert_eq!(cells[0].last_stdout.as_deref(), Some("stdout::print(1)"));
}
