//! Mapping upstream documents into [`NormalizedPayload`].
//!
//! Only JSON arrays and objects are accepted. Anything else means the
//! upstream returned something structurally unusable, which the engine
//! records as a fatal failure even though the transport succeeded.

use chrono::{DateTime, Utc};
use serde_json::Value;
use synclane_domain::{DataType, NormalizedPayload, PayloadMetadata};
use thiserror::Error;

use super::ports::GatewayResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("expected a JSON array or object, got {0}")]
    UnsupportedShape(&'static str),
}

/// Wrap a successful response. `data` keeps the upstream document verbatim.
pub fn normalize(
    response: &GatewayResponse,
    fetched_at: DateTime<Utc>,
) -> Result<NormalizedPayload, NormalizationError> {
    let (data_type, record_count) = match &response.body {
        Value::Array(items) => (DataType::List, items.len()),
        Value::Object(fields) => (DataType::Object, fields.len()),
        other => return Err(NormalizationError::UnsupportedShape(shape_name(other))),
    };

    Ok(NormalizedPayload {
        data: response.body.clone(),
        metadata: PayloadMetadata {
            source_url: response.url.clone(),
            method: response.method.clone(),
            fetched_at,
            record_count,
            data_type,
        },
    })
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
