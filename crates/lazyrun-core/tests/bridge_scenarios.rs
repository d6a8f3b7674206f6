//! Integration tests: end-to-end bridge scenarios against scripted runtimes.
//!
//! Each scripted runtime lets the test decide when (and whether) the load
//! completes and records every input that reaches the entry point, so the
//! ordering and exactly-once guarantees can be checked from the outside.

use async_trait::async_trait;
use lazyrun_core::{
    Bridge, EvalFunction, EvalOutput, EvalResult, LoadError, LoadSettings, LoaderState,
    RUNTIME_UNAVAILABLE_MESSAGE, RuntimeModule, RuntimeSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};

#[derive(Clone, Copy)]
enum Verdict {
    Succeed,
    FailFetch,
    FailInitialize,
    PanicInitialize,
}

struct ScriptedRuntime {
    fetches: AtomicUsize,
    calls: Arc<Mutex<Vec<String>>>,
    release: Notify,
    verdict: Verdict,
}

impl ScriptedRuntime {
    fn new(verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
            release: Notify::new(),
            verdict,
        })
    }

    fn open(&self) {
        self.release.notify_one();
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl RuntimeSource for ScriptedRuntime {
    fn location(&self) -> String {
        "mem:scripted".to_string()
    }

    async fn fetch(&self) -> Result<RuntimeModule, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        match self.verdict {
            Verdict::FailFetch => Err(LoadError::Fetch {
                location: self.location(),
                source: std::io::Error::other("connection reset"),
            }),
            _ => Ok(RuntimeModule::new(self.location(), b"\0asm".to_vec())),
        }
    }

    async fn initialize(&self, module: RuntimeModule) -> Result<Arc<dyn EvalFunction>, LoadError> {
        match self.verdict {
            Verdict::FailInitialize => {
                return Err(LoadError::MissingEntryPoint {
                    location: module.location,
                    reason: "no `eval` export".to_string(),
                });
            }
            Verdict::PanicInitialize => panic!("instantiate trapped: unreachable"),
            _ => {}
        }
        let calls = Arc::clone(&self.calls);
        Ok(Arc::new(move |input: &str| -> EvalResult {
            calls.lock().expect("calls lock").push(input.to_string());
            match input {
                "(+ 1 2)" => Ok(Some("3".to_string())),
                "(car '())" => Err("car: expected pair, got ()".into()),
                "(void)" => Ok(None),
                other => Ok(Some(format!("={other}"))),
            }
        }))
    }
}

type Log = Arc<Mutex<Vec<(String, EvalOutput)>>>;

fn submit_logged(bridge: &Bridge, log: &Log, input: &str) {
    let log = Arc::clone(log);
    let tag = input.to_string();
    bridge.run(input, move |output| {
        log.lock().expect("log lock").push((tag, output));
    });
}

fn bridge_over(runtime: &Arc<ScriptedRuntime>) -> Bridge {
    Bridge::new(
        Arc::clone(runtime) as Arc<dyn RuntimeSource>,
        LoadSettings::default(),
        Handle::current(),
    )
}

#[tokio::test]
async fn queued_request_receives_runtime_result() {
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = bridge_over(&runtime);

    let (tx, rx) = oneshot::channel();
    bridge.run("(+ 1 2)", move |output| {
        let _ = tx.send(output);
    });
    assert_eq!(bridge.state(), LoaderState::Loading);
    assert_eq!(bridge.queued(), 1);

    runtime.open();
    assert_eq!(rx.await.expect("callback fired"), EvalOutput::ok("3"));
    assert_eq!(bridge.settled().await, LoaderState::Ready);
}

#[tokio::test]
async fn rapid_submissions_are_delivered_in_order() {
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = bridge_over(&runtime);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    submit_logged(&bridge, &log, "a");
    submit_logged(&bridge, &log, "b");

    runtime.open();
    assert_eq!(bridge.settled().await, LoaderState::Ready);
    assert_eq!(
        *log.lock().expect("log lock"),
        vec![
            ("a".to_string(), EvalOutput::ok("=a")),
            ("b".to_string(), EvalOutput::ok("=b")),
        ]
    );
    assert_eq!(runtime.calls(), vec!["a", "b"]);
}

#[tokio::test]
async fn many_submissions_trigger_one_fetch_and_no_duplicates() {
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = bridge_over(&runtime);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let inputs: Vec<String> = (0..50).map(|i| format!("n{i}")).collect();
    for input in &inputs {
        submit_logged(&bridge, &log, input);
    }
    bridge.preload();

    // Let the load task reach the gate before releasing it.
    tokio::task::yield_now().await;
    runtime.open();
    assert_eq!(bridge.settled().await, LoaderState::Ready);

    assert_eq!(runtime.fetches(), 1);
    assert_eq!(runtime.calls(), inputs);
    let delivered: Vec<String> = log
        .lock()
        .expect("log lock")
        .iter()
        .map(|(input, _)| input.clone())
        .collect();
    assert_eq!(delivered, inputs);
}

#[tokio::test]
async fn fetch_failure_reaches_every_request_without_calling_runtime() {
    let runtime = ScriptedRuntime::new(Verdict::FailFetch);
    let bridge = bridge_over(&runtime);
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    submit_logged(&bridge, &log, "before-1");
    submit_logged(&bridge, &log, "before-2");
    runtime.open();
    assert_eq!(bridge.settled().await, LoaderState::Failed);

    let after = bridge.run_async("after").await;
    assert_eq!(after, EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE));

    let log = log.lock().expect("log lock");
    assert_eq!(log.len(), 2);
    assert!(
        log.iter()
            .all(|(_, out)| *out == EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE))
    );
    assert!(runtime.calls().is_empty());
    assert_eq!(runtime.fetches(), 1);
    assert!(
        bridge
            .load_error()
            .expect("load error recorded")
            .contains("connection reset")
    );
}

#[tokio::test]
async fn initialize_failure_is_terminal() {
    let runtime = ScriptedRuntime::new(Verdict::FailInitialize);
    let bridge = bridge_over(&runtime);

    bridge.preload();
    bridge.preload();
    runtime.open();
    assert_eq!(bridge.settled().await, LoaderState::Failed);

    assert_eq!(
        bridge.run_async("(+ 1 2)").await,
        EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE)
    );
    assert_eq!(bridge.state(), LoaderState::Failed);
    assert_eq!(runtime.fetches(), 1);
}

#[tokio::test]
async fn panicking_initialize_fails_queued_and_later_requests() {
    let runtime = ScriptedRuntime::new(Verdict::PanicInitialize);
    let bridge = Bridge::new(
        Arc::clone(&runtime) as Arc<dyn RuntimeSource>,
        LoadSettings {
            integrity: None,
            timeout: Some(Duration::from_millis(200)),
        },
        Handle::current(),
    );
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    submit_logged(&bridge, &log, "(+ 1 2)");
    runtime.open();
    let settled = tokio::time::timeout(Duration::from_secs(2), bridge.settled())
        .await
        .expect("load should settle");
    assert_eq!(settled, LoaderState::Failed);
    assert_eq!(bridge.queued(), 0);

    assert_eq!(
        *log.lock().expect("log lock"),
        vec![(
            "(+ 1 2)".to_string(),
            EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE)
        )]
    );
    assert_eq!(
        bridge.run_async("later").await,
        EvalOutput::error(RUNTIME_UNAVAILABLE_MESSAGE)
    );
    assert!(
        bridge
            .load_error()
            .expect("load error recorded")
            .contains("instantiate trapped")
    );
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn evaluation_error_is_local_to_its_request() {
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = bridge_over(&runtime);
    bridge.preload();
    runtime.open();
    assert_eq!(bridge.settled().await, LoaderState::Ready);

    assert_eq!(
        bridge.run_async("(car '())").await,
        EvalOutput::error("car: expected pair, got ()")
    );
    assert_eq!(bridge.run_async("(+ 1 2)").await, EvalOutput::ok("3"));
    assert_eq!(bridge.run_async("(void)").await, EvalOutput::ok(""));
    assert_eq!(bridge.state(), LoaderState::Ready);
}

#[tokio::test]
async fn ready_bridge_delivers_before_run_returns() {
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = bridge_over(&runtime);
    bridge.preload();
    runtime.open();
    bridge.settled().await;

    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    bridge.run("x", move |output| {
        *sink.lock().expect("slot lock") = Some(output);
    });
    assert_eq!(
        slot.lock().expect("slot lock").take(),
        Some(EvalOutput::ok("=x"))
    );
}

#[test]
fn blocking_callers_share_one_load() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime should build");
    let runtime = ScriptedRuntime::new(Verdict::Succeed);
    let bridge = Bridge::new(
        Arc::clone(&runtime) as Arc<dyn RuntimeSource>,
        LoadSettings::default(),
        rt.handle().clone(),
    );

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let bridge = bridge.clone();
            std::thread::spawn(move || bridge.run_blocking(format!("t{i}")))
        })
        .collect();

    runtime.open();
    let mut outputs: Vec<String> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker thread").output)
        .collect();
    outputs.sort();

    let mut expected: Vec<String> = (0..8).map(|i| format!("=t{i}")).collect();
    expected.sort();
    assert_eq!(outputs, expected);
    assert_eq!(runtime.fetches(), 1);
}
