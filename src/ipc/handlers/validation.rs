use crate::ipc::error::{ok, validation_err};
use crate::ipc::helpers::{raw_field, raw_marks};
use crate::ipc::types::{AppState, Request};
use crate::validate;
use serde_json::json;

/// Dry run of `students.save` validation so forms can check before submit.
fn handle_validate_student(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match raw_field(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let roll_no = match raw_field(req, "rollNo") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let marks = match raw_marks(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    match validate::validate_student_data(&name, &roll_no, marks) {
        Ok(s) => {
            let marks: Vec<_> = s
                .marks
                .iter()
                .map(|m| json!({ "subject": m.subject, "marks": m.marks }))
                .collect();
            ok(
                &req.id,
                json!({ "name": s.name, "rollNo": s.roll_no, "marks": marks }),
            )
        }
        Err(e) => validation_err(&req.id, &e),
    }
}

fn handle_validate_search_term(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match raw_field(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match validate::validate_search_term(&raw) {
        Ok(term) => ok(&req.id, json!({ "term": term })),
        Err(e) => validation_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "validate.student" => Some(handle_validate_student(state, req)),
        "validate.searchTerm" => Some(handle_validate_search_term(state, req)),
        _ => None,
    }
}
