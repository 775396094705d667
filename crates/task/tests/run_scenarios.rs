//! End-to-end runs of function, shell and container tasks
use cairn_core::{AuditFlags, FieldType, Result, ERROR_FILE, RESULT_FILE, TASK_SNAPSHOT_FILE};
use cairn_cache::{CacheStore, KernelConfig, MonitorConfig};
use cairn_task::{
    Arguments, CommandLine, ContainerTask, FileMessenger, FunctionRegistry, FunctionSignature,
    FunctionTask, ReturnAnnotation, Returned, ShellCommandTask, Task,
};
use serde_json::{json, Value};
use serial_test::serial;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn add(args: &Arguments) -> Result<Returned> {
    let x = args.get("x").and_then(Value::as_i64).unwrap_or_default();
    let y = args.get("y").and_then(Value::as_i64).unwrap_or_default();
    Ok(json!(x + y).into())
}

fn add_task(registry: &FunctionRegistry) -> FunctionTask {
    registry.register(
        "add",
        FunctionSignature::new()
            .param("x", FieldType::Int)
            .param("y", FieldType::Int),
        add,
    );
    FunctionTask::from_registry(registry, "add", None).unwrap()
}

fn no_overrides() -> Vec<(String, Value)> {
    Vec::new()
}

#[test]
#[serial]
fn test_function_task_add() {
    let cache = TempDir::new().unwrap();
    let registry = FunctionRegistry::new();
    let mut task = add_task(&registry).with_cache_dir(cache.path());

    let result = task.run([("x", json!(2)), ("y", json!(3))]).unwrap();

    assert_eq!(result.output_value("out"), Some(&json!(5)));
    let entry = task.output_dir().unwrap().unwrap();
    assert!(entry.join(RESULT_FILE).is_file());
    assert!(entry.join(TASK_SNAPSHOT_FILE).is_file());
}

#[test]
#[serial]
#[cfg(unix)]
fn test_shell_task_echo() {
    let cache = TempDir::new().unwrap();
    let mut task = ShellCommandTask::new("echo")
        .unwrap()
        .with_cache_dir(cache.path())
        .with_inputs([("args", json!(["echo", "hi"]))])
        .unwrap();

    assert_eq!(task.cmdline().unwrap(), "echo hi");

    let result = task.run(no_overrides()).unwrap();
    assert_eq!(result.output_value("return_code"), Some(&json!(0)));
    assert_eq!(result.output_value("stdout"), Some(&json!("hi\n")));

    let checksum = task.checksum().unwrap();
    assert!(checksum.starts_with("ShellCommandTask_"));
    assert!(cache.path().join(&checksum).join(RESULT_FILE).is_file());
}

#[test]
#[serial]
#[cfg(unix)]
fn test_shell_task_runs_in_entry_directory() {
    let cache = TempDir::new().unwrap();
    let before = std::env::current_dir().unwrap();
    let mut task = ShellCommandTask::new("pwd")
        .unwrap()
        .with_cache_dir(cache.path())
        .with_inputs([("executable", json!("pwd"))])
        .unwrap();

    let result = task.run(no_overrides()).unwrap();

    let entry = task.output_dir().unwrap().unwrap();
    let printed = result.output_value("stdout").and_then(Value::as_str).unwrap().trim();
    assert_eq!(
        fs::canonicalize(printed).unwrap(),
        fs::canonicalize(entry).unwrap()
    );
    assert_eq!(std::env::current_dir().unwrap(), before);
}

#[test]
fn test_docker_command_line() {
    let task = ContainerTask::docker("list")
        .unwrap()
        .with_inputs([
            ("image", json!("busybox")),
            ("bindings", json!([["/host", "/cont", "ro"]])),
            ("args", json!(["ls"])),
        ])
        .unwrap();

    assert_eq!(
        task.command_line().unwrap(),
        ["docker", "run", "-v", "/host:/cont:ro", "busybox", "ls"]
    );
}

#[test]
#[serial]
fn test_container_task_without_image_fails() {
    let cache = TempDir::new().unwrap();
    let mut task = ContainerTask::docker("broken")
        .unwrap()
        .with_cache_dir(cache.path())
        .with_inputs([("args", json!(["ls"]))])
        .unwrap();

    let err = task.run(no_overrides()).unwrap_err();
    assert!(err.is_configuration());

    let entry = task.output_dir().unwrap().unwrap();
    assert!(entry.join(ERROR_FILE).is_file());
}

#[test]
fn test_function_output_inference() {
    let registry = FunctionRegistry::new();
    registry.register("plain", FunctionSignature::new(), |_| Ok(Value::Null.into()));
    registry.register(
        "named",
        FunctionSignature::new().returns(ReturnAnnotation::Named {
            name: "Record".to_string(),
            fields: vec![
                ("a".to_string(), FieldType::Int),
                ("b".to_string(), FieldType::Str),
            ],
        }),
        |_| Ok(Returned::Tuple(vec![json!(1), json!("b")])),
    );
    registry.register(
        "pair",
        FunctionSignature::new().returns(ReturnAnnotation::Tuple(vec![FieldType::Any, FieldType::Any])),
        |_| Ok(Returned::Tuple(vec![json!(1), json!(2)])),
    );

    let names = |id: &str| -> Vec<String> {
        FunctionTask::from_registry(&registry, id, None)
            .unwrap()
            .core()
            .output_type()
            .field_names()
            .map(str::to_string)
            .collect()
    };

    assert_eq!(names("plain"), ["out"]);
    assert_eq!(names("named"), ["a", "b"]);
    assert_eq!(names("pair"), ["out1", "out2"]);
}

#[test]
fn test_fingerprint_determinism() {
    let registry = FunctionRegistry::new();
    let first = add_task(&registry)
        .with_inputs([("x", json!(1)), ("y", json!(2))])
        .unwrap();
    let second = add_task(&registry)
        .with_inputs([("y", json!(2)), ("x", json!(1))])
        .unwrap();
    let changed = add_task(&registry)
        .with_inputs([("x", json!(1)), ("y", json!(3))])
        .unwrap();
    let versioned = add_task(&registry)
        .with_version("2")
        .with_inputs([("x", json!(1)), ("y", json!(2))])
        .unwrap();

    assert_eq!(first.checksum().unwrap(), first.checksum().unwrap());
    assert_eq!(first.checksum().unwrap(), second.checksum().unwrap());
    assert_ne!(first.checksum().unwrap(), changed.checksum().unwrap());
    assert_ne!(first.checksum().unwrap(), versioned.checksum().unwrap());
}

#[test]
#[serial]
#[cfg(unix)]
fn test_non_resumable_entry_is_wiped() {
    let cache = TempDir::new().unwrap();
    let mut task = ShellCommandTask::new("echo")
        .unwrap()
        .with_cache_dir(cache.path())
        .with_inputs([("args", json!(["echo", "wipe"]))])
        .unwrap();

    task.run(no_overrides()).unwrap();
    let entry = task.output_dir().unwrap().unwrap();
    fs::write(entry.join("stray.txt"), "left behind").unwrap();

    task.run(no_overrides()).unwrap();
    assert!(!entry.join("stray.txt").exists());
    assert!(entry.join(RESULT_FILE).is_file());
}

#[test]
#[serial]
fn test_resumable_entry_survives() {
    let cache = TempDir::new().unwrap();
    let registry = FunctionRegistry::new();
    let mut task = add_task(&registry)
        .with_cache_dir(cache.path())
        .with_inputs([("x", json!(1)), ("y", json!(1))])
        .unwrap();

    let entry = cache.path().join(task.checksum().unwrap());
    fs::create_dir_all(&entry).unwrap();
    fs::write(entry.join("partial.txt"), "kept").unwrap();

    task.run(no_overrides()).unwrap();
    task.run(no_overrides()).unwrap();

    assert_eq!(fs::read_to_string(entry.join("partial.txt")).unwrap(), "kept");
}

#[test]
#[serial]
fn test_failed_run_cleans_up() {
    let cache = TempDir::new().unwrap();
    let before = std::env::current_dir().unwrap();
    let should_fail = Arc::new(AtomicBool::new(true));

    let registry = FunctionRegistry::new();
    let flag = Arc::clone(&should_fail);
    registry.register(
        "flaky",
        FunctionSignature::new().param("x", FieldType::Int),
        move |args| {
            if flag.load(Ordering::SeqCst) {
                return Err(cairn_core::Error::execution("flaky", "first attempt fails"));
            }
            Ok(args.get("x").cloned().unwrap_or(Value::Null).into())
        },
    );

    let config = KernelConfig {
        lock: cairn_utils::LockConfig {
            timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut first = FunctionTask::from_registry(&registry, "flaky", None)
        .unwrap()
        .with_cache_dir(cache.path())
        .with_config(config.clone());
    let err = first.run([("x", json!(7))]).unwrap_err();
    assert!(matches!(err, cairn_core::Error::Execution { .. }));
    assert_eq!(std::env::current_dir().unwrap(), before);

    let checksum = first.checksum().unwrap();
    let store = CacheStore::new(cache.path());
    let entry = store.entry_dir(&checksum);
    assert!(store.has_error(&entry));
    let partial = store.load(&entry).unwrap().unwrap();
    assert!(partial.is_failed());
    assert_eq!(partial.output_value("out"), None);
    assert!(!store.lock_path(&checksum).exists());

    should_fail.store(false, Ordering::SeqCst);
    let mut second = FunctionTask::from_registry(&registry, "flaky", None)
        .unwrap()
        .with_cache_dir(cache.path())
        .with_config(config);
    let result = second.run([("x", json!(7))]).unwrap();
    assert_eq!(result.output_value("out"), Some(&json!(7)));
    assert!(!store.has_error(&entry));
}

#[test]
#[serial]
fn test_interrupted_retry_does_not_leave_a_cache_hit() {
    let cache = TempDir::new().unwrap();
    let before = std::env::current_dir().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let registry = FunctionRegistry::new();
    let counter = Arc::clone(&attempts);
    registry.register(
        "fragile",
        FunctionSignature::new().param("x", FieldType::Int),
        move |args| match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(cairn_core::Error::execution("fragile", "first attempt fails")),
            1 => panic!("second attempt is interrupted"),
            _ => Ok(args.get("x").cloned().unwrap_or(Value::Null).into()),
        },
    );
    let fragile = || {
        FunctionTask::from_registry(&registry, "fragile", None)
            .unwrap()
            .with_cache_dir(cache.path())
    };

    fragile().run([("x", json!(7))]).unwrap_err();

    let mut interrupted = fragile();
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| interrupted.run([("x", json!(7))])));
    assert!(unwound.is_err());
    assert_eq!(std::env::current_dir().unwrap(), before);

    let result = fragile().run([("x", json!(7))]).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.output_value("out"), Some(&json!(7)));
}

#[test]
#[serial]
fn test_cache_locations_are_consulted() {
    let shared = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let registry = FunctionRegistry::new();

    let mut producer = add_task(&registry).with_cache_dir(shared.path());
    producer.run([("x", json!(4)), ("y", json!(4))]).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.register(
        "add",
        FunctionSignature::new()
            .param("x", FieldType::Int)
            .param("y", FieldType::Int),
        move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            add(args)
        },
    );
    let config = KernelConfig {
        cache_locations: vec![shared.path().to_path_buf()],
        ..Default::default()
    };
    let mut consumer = FunctionTask::from_registry(&registry, "add", None)
        .unwrap()
        .with_cache_dir(local.path())
        .with_config(config);

    let result = consumer.run([("x", json!(4)), ("y", json!(4))]).unwrap();
    assert_eq!(result.output_value("out"), Some(&json!(8)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(local
        .path()
        .join(consumer.checksum().unwrap())
        .join(RESULT_FILE)
        .is_file());
}

#[test]
#[serial]
fn test_provenance_and_resource_audit() {
    let cache = TempDir::new().unwrap();
    let messages = TempDir::new().unwrap();
    let registry = FunctionRegistry::new();

    let config = KernelConfig {
        monitor: MonitorConfig {
            interval: Duration::from_millis(20),
        },
        ..Default::default()
    };
    let mut task = add_task(&registry)
        .with_cache_dir(cache.path())
        .with_config(config)
        .with_audit(AuditFlags::all())
        .with_messenger(Arc::new(FileMessenger::new(messages.path())));

    let result = task.run([("x", json!(1)), ("y", json!(2))]).unwrap();

    assert!(result.runtime.is_some());
    let entry = task.output_dir().unwrap().unwrap();
    let log = format!("proc-{}.log", std::process::id());
    assert!(entry.join(log).is_file());

    // task, monitor, runtime entity and generation; start and end share a file
    let written = fs::read_dir(messages.path()).unwrap().count();
    assert_eq!(written, 4);
}
