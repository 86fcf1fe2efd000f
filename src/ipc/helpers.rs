use crate::ipc::error::err;
use crate::ipc::types::Request;
use serde_json::json;

/// Reads a user-entered field as raw text. Strings pass through untouched,
/// numbers are rendered as text so they go through the same validator, null
/// and absent read as empty. Any other JSON type is a `bad_params` reply.
pub fn raw_field(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(String::new()),
        Some(v) => scalar_text(v).ok_or_else(|| not_text(req, key)),
    }
}

/// `marks` as ordered (subject, raw) pairs. Accepts an object keyed by subject
/// or an array of `{subject, marks}` objects.
pub fn raw_marks(req: &Request) -> Result<Vec<(String, String)>, serde_json::Value> {
    let Some(v) = req.params.get("marks") else {
        return Ok(Vec::new());
    };
    match v {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(subject, raw)| {
                scalar_text(raw)
                    .map(|text| (subject.clone(), text))
                    .ok_or_else(|| not_text(req, subject))
            })
            .collect(),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Some(subject) = item.get("subject").and_then(|s| s.as_str()) else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        "each marks entry needs a subject",
                        None,
                    ));
                };
                let raw = match item.get("marks") {
                    None => String::new(),
                    Some(v) => scalar_text(v).ok_or_else(|| not_text(req, subject))?,
                };
                out.push((subject.to_string(), raw));
            }
            Ok(out)
        }
        _ => Err(err(
            &req.id,
            "bad_params",
            "marks must be an object or an array",
            None,
        )),
    }
}

fn scalar_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => Some(String::new()),
        _ => None,
    }
}

fn not_text(req: &Request, field: &str) -> serde_json::Value {
    err(
        &req.id,
        "bad_params",
        format!("{field} must be a string or a number"),
        Some(json!({ "field": field })),
    )
}
