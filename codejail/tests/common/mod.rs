//! Shared helpers for codejail integration tests

#![allow(dead_code)]

use codejail::{CodejailConfig, ProcessRunner, ReducedState, RunnerCommand, RunnerLimits};
use std::path::PathBuf;
use std::time::Duration;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("codejail=debug")
        .with_test_writer()
        .try_init();
}

/// First `python3` on `PATH`, if any
pub fn find_python3() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join("python3"))
        .find(|candidate| candidate.is_file())
}

/// Config pointing the `python` runner at a local interpreter
pub fn local_python_config(python: PathBuf) -> CodejailConfig {
    CodejailConfig::default().with_runner(
        "python",
        RunnerCommand::new(python).with_limits(RunnerLimits {
            max_duration: Some(Duration::from_secs(20)),
        }),
    )
}

pub fn local_python_runner(python: PathBuf) -> ProcessRunner {
    local_python_config(python).process_runner()
}

/// Floats that are hard to parse, their `repr`s, and ints wider than 64 bits
pub const NUMBERS_CODE: &str = "\
import math, random
random.seed(1234)
vals = [random.random() * 10 ** random.randint(-300, 300) for _ in range(2000)]
reprs = [repr(v) for v in vals]
big = math.factorial(25)
wide = 2 ** 64 + 1
neg = -(2 ** 70)
";

/// Every number from `NUMBERS_CODE` must come back with Python's own digits
pub fn assert_numbers_exact(state: &ReducedState) {
    let vals = state.full["vals"].as_array().expect("vals in full");
    let reprs = state.full["reprs"].as_array().expect("reprs in full");
    assert_eq!(vals.len(), 2000);

    let changed: Vec<_> = vals
        .iter()
        .zip(reprs)
        .filter(|(value, repr)| Some(value.to_string().as_str()) != repr.as_str())
        .collect();
    assert!(
        changed.is_empty(),
        "{} floats changed, e.g. {:?}",
        changed.len(),
        changed.first()
    );

    for tier in [&state.display, &state.full] {
        assert_eq!(tier["big"].to_string(), "15511210043330985984000000");
        assert_eq!(tier["wide"].to_string(), "18446744073709551617");
        assert_eq!(tier["neg"].to_string(), "-1180591620717411303424");
    }
}

/// Bail out of a test early when no interpreter is installed
#[macro_export]
macro_rules! require_python {
    () => {
        match common::find_python3() {
            Some(python) => python,
            None => {
                eprintln!("python3 not found on PATH, skipping");
                return;
            }
        }
    };
}
