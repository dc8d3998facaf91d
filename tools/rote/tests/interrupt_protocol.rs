use rote::config::ExecutionConfig;
use rote::driver::{BrowserDriver, FakeDriver};
use rote::errors::RoteError;
use rote::executor::{RunStatus, INTERRUPTED_TOOL_NAME};
use rote::sequence_store::SequenceStore;
use rote::substitution::Variables;
use rote::types::{Action, NewSequence};
use rote::workbench::Workbench;
use serde_json::json;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn keys_sequence(count: usize) -> NewSequence {
    NewSequence {
        name: "keys".to_string(),
        description: "press keys".to_string(),
        trigger_pattern: None,
        actions: (0..count)
            .map(|n| {
                Action::new(
                    "press_key",
                    json!({ "key": format!("F{n}") })
                        .as_object()
                        .cloned()
                        .expect("object"),
                )
            })
            .collect(),
    }
}

fn setup(steps: usize) -> (Arc<Workbench>, Arc<FakeDriver>, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let store = SequenceStore::open(dir.path().join("rote.sqlite")).expect("store");
    store.save_sequence(keys_sequence(steps)).expect("save");
    let driver = Arc::new(FakeDriver::new());
    let bench = Arc::new(Workbench::new(
        store,
        driver.clone() as Arc<dyn BrowserDriver>,
        &ExecutionConfig::default(),
    ));
    (bench, driver, dir)
}

#[test]
fn interrupt_from_another_thread_stops_at_step_boundary() {
    let (bench, driver, _dir) = setup(5);

    // Step 3 blocks until the test releases it, so the interrupt lands mid-step.
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    driver.on_call(move |index| {
        if index == 2 {
            entered_tx.lock().expect("entered").send(()).expect("signal");
            release_rx.lock().expect("release").recv().expect("release");
        }
    });

    let runner = {
        let bench = Arc::clone(&bench);
        thread::spawn(move || bench.run_sequence("keys", &Variables::new()))
    };

    entered_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("step 3 started");
    let running = bench.running_sequence().expect("marker set");
    assert_eq!(running.sequence_name, "keys");

    assert_eq!(bench.interrupt_sequence().expect("interrupt"), "keys");
    assert!(bench
        .running_sequence()
        .expect("still running")
        .interrupt_requested);
    release_tx.send(()).expect("release step 3");

    let outcome = runner.join().expect("join").expect("run");
    assert_eq!(outcome.status, RunStatus::Interrupted);
    assert_eq!(outcome.completed_steps, 3);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(driver.call_count(), 3);
    assert!(bench.running_sequence().is_none());

    let history = bench.execution_history(Some(10)).expect("history");
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].tool_name, INTERRUPTED_TOOL_NAME);
    assert_eq!(history[0].parameters["completed_steps"], json!(3));
    assert_eq!(history[0].parameters["total_steps"], json!(5));
    assert!(history[1..].iter().all(|row| row.success));
}

#[test]
fn concurrent_run_is_rejected_and_stale_interrupts_do_not_leak() {
    let (bench, driver, _dir) = setup(3);

    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    driver.on_call(move |index| {
        if index == 0 {
            entered_tx.lock().expect("entered").send(()).expect("signal");
            release_rx.lock().expect("release").recv().expect("release");
        }
    });

    let runner = {
        let bench = Arc::clone(&bench);
        thread::spawn(move || bench.run_sequence("keys", &Variables::new()))
    };
    entered_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("first step started");

    let err = bench
        .run_sequence("keys", &Variables::new())
        .expect_err("second run rejected");
    assert!(matches!(err, RoteError::AlreadyRunning(name) if name == "keys"));

    let err = bench
        .run_sequence("missing", &Variables::new())
        .expect_err("unknown sequence");
    assert!(matches!(err, RoteError::NotFound(_)));

    bench.interrupt_sequence().expect("interrupt");
    release_tx.send(()).expect("release");
    let first = runner.join().expect("join").expect("run");
    assert_eq!(first.status, RunStatus::Interrupted);
    assert_eq!(first.completed_steps, 1);

    // The next run gets a fresh token and completes.
    let second = bench
        .run_sequence("keys", &Variables::new())
        .expect("second run");
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.completed_steps, 3);

    assert!(matches!(
        bench.interrupt_sequence().expect_err("idle"),
        RoteError::NotRunning
    ));
}
