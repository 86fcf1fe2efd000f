use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;
use std::fs::File;
use std::path::PathBuf;

fn handle_stats_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let students = match state.db.as_ref() {
        Some(conn) => match db::list_students(conn) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        None => Vec::new(),
    };
    ok(&req.id, json!(report::summarize(&students)))
}

fn handle_export_students_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    let loaded = db::list_subjects(conn).and_then(|s| Ok((s, db::list_students(conn)?)));
    let (subjects, students) = match loaded {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subjects: Vec<String> = subjects.into_iter().map(|s| s.name).collect();

    let out = PathBuf::from(out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    let written = File::create(&out)
        .map_err(csv::Error::from)
        .and_then(|f| report::write_students_csv(f, &subjects, &students));
    match written {
        Ok(rows) => {
            tracing::info!(out = out_path, rows, "students csv exported");
            ok(&req.id, json!({ "rowsExported": rows, "path": out_path }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "csv export failed");
            err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.summary" => Some(handle_stats_summary(state, req)),
        "reports.exportStudentsCsv" => Some(handle_export_students_csv(state, req)),
        _ => None,
    }
}
