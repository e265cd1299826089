//! CLI command implementations

use anyhow::{bail, Context, Result};
use codejail::{
    reduce_to_json_safe, CodejailConfig, ExecError, ExecutionRequest, JsonNamespace, Namespace,
    ReducedState, SafeExec, StrategyDecision, StrategySelector, Value,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Arguments of the `run` command
pub struct RunArgs {
    pub file: PathBuf,
    pub globals: Option<String>,
    pub files: Vec<PathBuf>,
    pub python_path: Vec<PathBuf>,
    pub inline: Vec<String>,
    pub slug: Option<String>,
}

/// Load the given config file, or the default one
pub fn load_config(path: Option<&Path>) -> Result<CodejailConfig> {
    let config = match path {
        Some(path) => CodejailConfig::load(path)?,
        None => CodejailConfig::load_default()?,
    };
    debug!(
        runners = config.runners.len(),
        always_be_unsafe = config.always_be_unsafe,
        "Loaded configuration"
    );
    Ok(config)
}

/// Execute a code file.
///
/// The outer error is a usage problem; the inner one is the execution's own
/// outcome.
pub async fn execute_run(
    config: &CodejailConfig,
    args: RunArgs,
) -> Result<std::result::Result<ReducedState, ExecError>> {
    let code = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut request = ExecutionRequest::new(code).with_namespace(parse_globals(args.globals.as_deref())?);
    request.files = args.files;
    request.python_path = args.python_path;
    for entry in &args.inline {
        let (name, path) = parse_inline(entry)?;
        let contents =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        request = request.with_inline_file(name, contents);
    }
    if let Some(slug) = args.slug {
        request = request.with_slug(slug);
    }

    let service = SafeExec::from_config(config)?;
    Ok(service.execute(request).await)
}

/// JSON-safe part of a JSON object
pub fn execute_filter(json: &str) -> Result<JsonNamespace> {
    Ok(reduce_to_json_safe(&parse_globals(Some(json))?))
}

/// Which strategy the configuration leads to
pub fn execute_check(config: &CodejailConfig) -> StrategyDecision {
    StrategySelector::new(config).decide(&config.process_runner())
}

fn parse_globals(json: Option<&str>) -> Result<Namespace> {
    let Some(json) = json else {
        return Ok(Namespace::new());
    };
    let value: serde_json::Value = serde_json::from_str(json).context("Globals are not valid JSON")?;
    let serde_json::Value::Object(map) = value else {
        bail!("Globals must be a JSON object");
    };
    Ok(map
        .into_iter()
        .map(|(name, value)| (name, Value::from(value)))
        .collect())
}

/// Split `NAME=PATH`
fn parse_inline(entry: &str) -> Result<(String, PathBuf)> {
    match entry.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => bail!("Expected NAME=PATH, got {:?}", entry),
    }
}
