//! Output unpacker: split the far side's frames back into a `ReducedState`

use crate::error::ExecError;
use crate::package::FRAME_MARKER;
use crate::reduce::{encoded_len, is_reserved, DISPLAY_LIMIT};
use crate::types::{JsonNamespace, OpaquePayload, ReducedState, SandboxResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const FRAME_COUNT: usize = 4;

/// Turn a finished jailed run into a `ReducedState`.
///
/// A non-zero status is an execution failure carrying the captured stderr.
/// Anything other than exactly four well-formed frames is a protocol error.
pub fn unpack(result: SandboxResult) -> Result<ReducedState, ExecError> {
    if !result.success() {
        return Err(ExecError::Execution(
            String::from_utf8_lossy(&result.stderr).into_owned(),
        ));
    }

    let frames = split_frames(&result.stdout)?;
    let [output, payload, display, full] = frames;

    let output = String::from_utf8_lossy(output).into_owned();
    let payload = STANDARD
        .decode(payload)
        .map(OpaquePayload::new)
        .map_err(|err| ExecError::protocol(format!("Payload is not valid base64: {}", err)))?;
    let display = decode_mapping("display", display)?
        .into_iter()
        .filter(|(_, value)| fits_display(value))
        .collect();
    let full = decode_mapping("full", full)?;

    Ok(ReducedState {
        output,
        payload,
        display,
        full,
    })
}

/// Split `stdout` into exactly four `MARKER <len>\n<bytes>` frames
fn split_frames(stdout: &[u8]) -> Result<[&[u8]; FRAME_COUNT], ExecError> {
    let mut frames = [&stdout[..0]; FRAME_COUNT];
    let mut rest = stdout;

    for (index, slot) in frames.iter_mut().enumerate() {
        let newline = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| ExecError::protocol(format!("Frame {} has no header", index)))?;
        let header = std::str::from_utf8(&rest[..newline])
            .map_err(|_| ExecError::protocol(format!("Frame {} header is not text", index)))?;
        let len = header
            .strip_prefix(FRAME_MARKER)
            .and_then(|tail| tail.strip_prefix(' '))
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| {
                ExecError::protocol(format!("Frame {} has a malformed header {:?}", index, header))
            })?;
        let body = &rest[newline + 1..];
        if body.len() < len {
            return Err(ExecError::protocol(format!(
                "Frame {} is truncated: expected {} bytes, got {}",
                index,
                len,
                body.len()
            )));
        }
        *slot = &body[..len];
        rest = &body[len..];
    }

    if !rest.is_empty() {
        return Err(ExecError::protocol(format!(
            "{} unexpected bytes after the last frame",
            rest.len()
        )));
    }
    Ok(frames)
}

/// Strings pass: a type-name fallback has no length bound. Anything else
/// must be short JSON.
fn fits_display(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::String(_) => true,
        other => encoded_len(other) <= DISPLAY_LIMIT,
    }
}

fn decode_mapping(label: &str, bytes: &[u8]) -> Result<JsonNamespace, ExecError> {
    let mapping: JsonNamespace = serde_json::from_slice(bytes).map_err(|err| {
        ExecError::protocol(format!("The {} mapping is not a JSON object: {}", label, err))
    })?;
    Ok(mapping
        .into_iter()
        .filter(|(name, _)| !is_reserved(name))
        .collect())
}
