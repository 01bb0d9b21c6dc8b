//! Converts between newline-delimited JSON files and the model server's
//! request/response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::error::{InferenceError, InferenceResult};

#[derive(Serialize)]
struct InstancesEnvelope {
    instances: Vec<Value>,
}

#[derive(Deserialize)]
struct PredictionsEnvelope {
    #[serde(default)]
    predictions: Vec<Value>,
    #[serde(default)]
    error: String,
}

/// Wrap the JSON lines of one input file as an `{"instances": [...]}` request.
///
/// Every non-empty line must parse as one JSON value; the first line that
/// doesn't aborts the whole file. An empty file yields an empty instances
/// array, which is still submitted.
pub fn encode_request(raw: &[u8]) -> InferenceResult<Vec<u8>> {
    let mut instances = Vec::new();
    for (number, line) in raw.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_slice(line).map_err(|e| {
            InferenceError::Format(format!("input line {}: {e}", number + 1))
        })?;
        instances.push(value);
    }
    serde_json::to_vec(&InstancesEnvelope { instances })
        .map_err(|e| InferenceError::Format(e.to_string()))
}

/// Unwrap a predict response into newline-delimited JSON, one prediction per
/// line, in submission order.
///
/// A non-empty `error` field fails the file with the server's message. A
/// response carrying neither `predictions` nor `error` yields zero lines.
///
/// With `escape_backslashes` set, every backslash in the body is doubled
/// before parsing. Some model server builds emit predictions containing
/// embedded arrays encoded as strings that are otherwise not valid JSON;
/// the doubling makes those bodies parseable at the cost of one extra level
/// of escaping on any backslash the server emits legitimately.
pub fn decode_response(body: &[u8], escape_backslashes: bool) -> InferenceResult<Vec<u8>> {
    let escaped;
    let body = if escape_backslashes && body.contains(&b'\\') {
        escaped = double_backslashes(body);
        escaped.as_slice()
    } else {
        body
    };

    let envelope: PredictionsEnvelope = serde_json::from_slice(body).map_err(|e| {
        InferenceError::Format(format!("predict response is not valid json: {e}"))
    })?;
    if !envelope.error.is_empty() {
        return Err(InferenceError::Prediction(envelope.error));
    }

    let mut out = Vec::new();
    for prediction in &envelope.predictions {
        serde_json::to_writer(&mut out, prediction)
            .map_err(|e| InferenceError::Format(e.to_string()))?;
        out.push(b'\n');
    }
    Ok(out)
}

fn double_backslashes(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for &b in body {
        out.push(b);
        if b == b'\\' {
            out.push(b'\\');
        }
    }
    out
}
