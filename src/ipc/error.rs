use crate::validate::ValidationError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// The rejection reason goes out verbatim so front ends can show it as-is.
pub fn validation_err(id: &str, e: &ValidationError) -> serde_json::Value {
    tracing::info!(kind = e.kind(), field = %e.field().key(), "input rejected");
    err(
        id,
        "validation_failed",
        e.to_string(),
        Some(json!({
            "kind": e.kind(),
            "field": e.field().key(),
        })),
    )
}
