//! End-to-end runs through the command runner and a local python3

mod common;

use assert_matches::assert_matches;
use codejail::{
    CodejailConfig, ExecError, ExecutionRequest, IsolationRunner, RunnerCommand, RunnerLimits,
    SafeExec, StrategyKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn isolated(python: std::path::PathBuf) -> SafeExec {
    common::setup_test_logging();
    let config = common::local_python_config(python.clone());
    let runner: Arc<dyn IsolationRunner> = Arc::new(common::local_python_runner(python));
    let service = SafeExec::with_runner(&config, runner).unwrap();
    assert_eq!(service.strategy(), StrategyKind::Isolated);
    service
}

#[tokio::test]
async fn test_simple_assignment() {
    let python = require_python!();
    let service = isolated(python);

    let state = service
        .execute(ExecutionRequest::new("x = 1 + 1").with_slug("simple"))
        .await
        .unwrap();

    assert_eq!(state.output, "");
    assert_eq!(state.display["x"], json!(2));
    assert_eq!(state.full["x"], json!(2));
    assert!(!state.full.contains_key("__builtins__"));
    assert!(!state.display.contains_key("__builtins__"));

    match state.payload.decode().unwrap() {
        serde_pickle::Value::Dict(map) => {
            assert_eq!(
                map.get(&serde_pickle::HashableValue::String("x".to_string())),
                Some(&serde_pickle::Value::I64(2))
            );
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_globals_and_printed_output() {
    let python = require_python!();
    let service = isolated(python);

    let request = ExecutionRequest::new("y = x + 1\nprint('y is', y)\nprint('__CODEJAIL_FRAME__ 0')")
        .with_global("x", 20)
        .with_global("name", "widget");
    let state = service.execute(request).await.unwrap();

    assert_eq!(state.output, "y is 21\n__CODEJAIL_FRAME__ 0\n");
    assert_eq!(state.full["y"], json!(21));
    assert_eq!(state.full["x"], json!(20));
    assert_eq!(state.full["name"], json!("widget"));
}

#[tokio::test]
async fn test_exception_is_an_execution_error() {
    let python = require_python!();
    let service = isolated(python);

    let err = service
        .execute(ExecutionRequest::new("raise ValueError('boom')"))
        .await
        .unwrap_err();

    assert_matches!(&err, ExecError::Execution(stderr) if stderr.contains("ValueError: boom"));
}

#[tokio::test]
async fn test_numbers_cross_back_exactly() {
    let python = require_python!();
    let service = isolated(python);

    let state = service
        .execute(ExecutionRequest::new(common::NUMBERS_CODE).with_slug("numbers"))
        .await
        .unwrap();

    common::assert_numbers_exact(&state);
}

#[tokio::test]
async fn test_renderings_follow_the_display_bound() {
    let python = require_python!();
    let service = isolated(python);

    let code = "\
s = 'a' * 100
short = 'a' * 97

class Blank:
    def __str__(self):
        return ''

class Loud:
    def __str__(self):
        raise RuntimeError('no')

blank = Blank()
loud = Loud()
nan = float('nan')
";
    let state = service.execute(ExecutionRequest::new(code)).await.unwrap();

    assert!(!state.display.contains_key("s"));
    assert_eq!(state.full["s"], json!("a".repeat(100)));
    assert_eq!(state.display["short"], json!("a".repeat(97)));

    assert!(!state.display.contains_key("blank"));
    assert!(!state.full.contains_key("blank"));

    // str() raised, so both tiers fall back to the type name
    let loud = state.display["loud"].as_str().unwrap();
    assert!(loud.starts_with("<class '") && loud.contains("Loud"));
    assert_eq!(state.full["loud"], state.display["loud"]);
    assert_eq!(state.full["nan"], json!("nan"));
}

#[tokio::test]
async fn test_inline_and_staged_files_are_readable() {
    let python = require_python!();
    let service = isolated(python);

    let source = tempfile::tempdir().unwrap();
    let answers = source.path().join("answers.txt");
    std::fs::write(&answers, "42").unwrap();
    let lib = source.path().join("course_lib");
    std::fs::create_dir(&lib).unwrap();
    std::fs::write(lib.join("helper_mod.py"), "VALUE = 7\n").unwrap();

    let code = "\
with open('data.txt') as f:
    data = f.read()
with open('answers.txt') as f:
    answer = int(f.read())
import helper_mod
value = helper_mod.VALUE
";
    let request = ExecutionRequest::new(code)
        .with_inline_file("data.txt", b"hello".to_vec())
        .with_file(&answers)
        .with_python_path(&lib);
    let state = service.execute(request).await.unwrap();

    assert_eq!(state.full["data"], json!("hello"));
    assert_eq!(state.full["answer"], json!(42));
    assert_eq!(state.full["value"], json!(7));
}

#[tokio::test]
async fn test_path_separator_inline_name_is_rejected() {
    let python = require_python!();
    let service = isolated(python);

    let request = ExecutionRequest::new("pass").with_inline_file("sub/data.txt", b"x".to_vec());
    assert_matches!(service.execute(request).await, Err(ExecError::Packaging(_)));
}

#[tokio::test]
async fn test_unsafe_values_do_not_cross_back() {
    let python = require_python!();
    let service = isolated(python);

    let code = "\
import os
raw = b'bytes'
items = {1, 2}
nested = {'k': [1, (2, 3)]}
";
    let state = service.execute(ExecutionRequest::new(code)).await.unwrap();

    assert_eq!(state.full["nested"], json!({"k": [1, [2, 3]]}));
    assert_eq!(state.full["raw"], json!("b'bytes'"));
    assert_eq!(state.full["items"], json!("{1, 2}"));
    assert!(state.full["os"].as_str().unwrap().starts_with("<module 'os'"));
}

#[tokio::test]
async fn test_concurrent_invocations_are_independent() {
    let python = require_python!();
    let service = isolated(python);

    let (a, b) = tokio::join!(
        service.execute(ExecutionRequest::new("n = 1").with_slug("a")),
        service.execute(ExecutionRequest::new("n = 2").with_slug("b")),
    );

    assert_eq!(a.unwrap().full["n"], json!(1));
    assert_eq!(b.unwrap().full["n"], json!(2));
}

#[tokio::test]
async fn test_runaway_code_is_killed() {
    let python = require_python!();
    common::setup_test_logging();
    let config = CodejailConfig::default().with_runner(
        "python",
        RunnerCommand::new(python).with_limits(RunnerLimits {
            max_duration: Some(Duration::from_millis(500)),
        }),
    );
    let service = SafeExec::from_config(&config).unwrap();

    let err = service
        .execute(ExecutionRequest::new("while True:\n    pass"))
        .await
        .unwrap_err();
    assert_matches!(err, ExecError::Execution(msg) if msg.contains("timed out"));
}
