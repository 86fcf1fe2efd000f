use crate::db::{self, SaveError};
use crate::ipc::error::{err, ok, validation_err};
use crate::ipc::helpers::{raw_field, raw_marks};
use crate::ipc::types::{AppState, Request};
use crate::validate;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    match db::list_students(conn) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let raw = match raw_field(req, "rollNo") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let roll_no = match validate::validate_roll_number(&raw) {
        Ok(v) => v,
        Err(e) => return validation_err(&req.id, &e),
    };

    match db::get_student(conn, roll_no) {
        Ok(Some(student)) => ok(&req.id, json!({ "student": student })),
        Ok(None) => err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "rollNo": roll_no })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

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

    let student = match validate::validate_student_data(&name, &roll_no, marks) {
        Ok(s) => s,
        Err(e) => return validation_err(&req.id, &e),
    };

    match db::save_student(conn, &student) {
        Ok(summary) => {
            tracing::info!(
                roll_no = student.roll_no,
                created = summary.created,
                marks_written = summary.marks_written,
                "student saved"
            );
            ok(
                &req.id,
                json!({
                    "rollNo": student.roll_no,
                    "name": student.name,
                    "created": summary.created,
                    "marksWritten": summary.marks_written,
                }),
            )
        }
        Err(SaveError::UnknownSubject(subject)) => err(
            &req.id,
            "unknown_subject",
            format!("unknown subject: {subject}"),
            Some(json!({ "subject": subject })),
        ),
        Err(SaveError::Db(e)) => {
            tracing::warn!(error = %e, "student save failed");
            err(
                &req.id,
                "db_write_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        }
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let raw = match raw_field(req, "rollNo") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let roll_no = match validate::validate_roll_number(&raw) {
        Ok(v) => v,
        Err(e) => return validation_err(&req.id, &e),
    };

    match db::delete_student(conn, roll_no) {
        Ok(true) => {
            tracing::info!(roll_no, "student deleted");
            ok(&req.id, json!({ "deleted": true, "rollNo": roll_no }))
        }
        Ok(false) => err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "rollNo": roll_no })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "student delete failed");
            err(&req.id, "db_write_failed", e.to_string(), None)
        }
    }
}

fn handle_students_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match raw_field(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match validate::validate_search_term(&raw) {
        Ok(t) => t,
        Err(e) => return validation_err(&req.id, &e),
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    match db::search_students(conn, &term) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.save" => Some(handle_students_save(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.search" => Some(handle_students_search(state, req)),
        _ => None,
    }
}
