//! Concurrent runs that resolve to the same fingerprint and cache root
use cairn_core::{FieldSpec, FieldType, Record, Result, SpecBase, SpecInfo};
use cairn_task::{FunctionRegistry, FunctionSignature, FunctionTask, Task, TaskCore, TaskResult};
use serde_json::{json, Value};
use serial_test::serial;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const WORKERS: usize = 8;

fn spawn_workers<F>(make_run: F) -> Vec<Result<TaskResult>>
where
    F: Fn() -> Box<dyn FnOnce() -> Result<TaskResult> + Send> + Send + Sync,
{
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let run = make_run();
            thread::spawn(move || {
                barrier.wait();
                run()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

#[test]
#[serial]
fn test_resumable_task_executes_once() {
    let cache = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let registry = Arc::new(FunctionRegistry::new());
    let counter = Arc::clone(&calls);
    registry.register(
        "slow_square",
        FunctionSignature::new().param("x", FieldType::Int),
        move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            let x = args.get("x").and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(x * x).into())
        },
    );

    let root = cache.path().to_path_buf();
    let results = spawn_workers(|| {
        let registry = Arc::clone(&registry);
        let root = root.clone();
        Box::new(move || {
            let mut task = FunctionTask::from_registry(&registry, "slow_square", None)?
                .with_cache_dir(root);
            task.run([("x", json!(9))])
        })
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in &results {
        let result = result.as_ref().unwrap();
        assert_eq!(result.output_value("out"), Some(&json!(81)));
    }
    let first = results[0].as_ref().unwrap();
    assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
}

/// Non-resumable task that records how many executions overlap
struct Exclusive {
    core: TaskCore,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

impl Exclusive {
    fn new(root: PathBuf, active: Arc<AtomicUsize>, max_active: Arc<AtomicUsize>, runs: Arc<AtomicUsize>) -> Self {
        let inputs = SpecInfo::new("Inputs", SpecBase::Base)
            .field(FieldSpec::new("label", FieldType::Str).with_default("same"))
            .build()
            .unwrap();
        let outputs = SpecInfo::new("Output", SpecBase::Base)
            .field(FieldSpec::new("out", FieldType::Any))
            .build()
            .unwrap();
        let mut core = TaskCore::new("Exclusive", "exclusive", Record::new(inputs), outputs);
        core.set_cache_dir(root);
        Self {
            core,
            active,
            max_active,
            runs,
        }
    }
}

impl Task for Exclusive {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_outputs(&self) -> Result<Vec<Value>> {
        Ok(vec![json!("done")])
    }
}

#[test]
#[serial]
fn test_non_resumable_runs_never_overlap() {
    let cache = TempDir::new().unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let root = cache.path().to_path_buf();
    let results = spawn_workers(|| {
        let mut task = Exclusive::new(
            root.clone(),
            Arc::clone(&active),
            Arc::clone(&max_active),
            Arc::clone(&runs),
        );
        Box::new(move || task.run(Vec::<(String, Value)>::new()))
    });

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(runs.load(Ordering::SeqCst), WORKERS);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}
