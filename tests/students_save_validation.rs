use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_marksd");
    let mut child = Command::new(exe)
        .env_remove("MARKSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_of(value: &serde_json::Value) -> (String, String) {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    let error = value.get("error").expect("error object");
    (
        error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
    )
}

#[test]
fn save_rejections_surface_the_first_failing_field() {
    let workspace = temp_dir("marksd-save-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cases = [
        (
            json!({ "name": "A", "rollNo": "5", "marks": { "Science": "50" } }),
            "Name must be at least 2 characters long",
        ),
        (
            json!({ "name": "Robert'); DROP TABLE STUDENTS;--", "rollNo": "5" }),
            "Invalid characters detected in name",
        ),
        (
            json!({ "name": "Priya", "rollNo": "0", "marks": { "Science": "500" } }),
            "Roll Number must be a positive number",
        ),
        (
            json!({ "name": "Priya", "rollNo": "1 OR 1=1" }),
            "Invalid characters detected in Roll Number",
        ),
        (
            json!({ "name": "Priya", "rollNo": 7, "marks": { "Maths": "12.5", "Science": "101" } }),
            "Marks for Maths must be a valid integer",
        ),
        (
            json!({ "name": "Priya", "rollNo": 7, "marks": { "Science": "101" } }),
            "Marks for Science cannot exceed 100",
        ),
        (
            json!({ "name": "", "rollNo": 7 }),
            "Name cannot be empty",
        ),
    ];

    for (i, (params, expected)) in cases.into_iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("v{i}"),
            "students.save",
            params,
        );
        let (code, message) = error_of(&resp);
        assert_eq!(code, "validation_failed");
        assert_eq!(message, expected);
    }

    // Nothing reached the database.
    let list = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(
        list.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn validation_details_name_kind_and_field() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "validate.student",
        json!({ "name": "Ravi", "rollNo": "12", "marks": { "Hindi": "-1" } }),
    );
    let details = resp
        .get("error")
        .and_then(|e| e.get("details"))
        .cloned()
        .expect("details");
    assert_eq!(details.get("kind").and_then(|v| v.as_str()), Some("out_of_range"));
    assert_eq!(details.get("field").and_then(|v| v.as_str()), Some("marks.Hindi"));

    let okay = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "validate.student",
        json!({ "name": "  Ravi Kumar ", "rollNo": "12", "marks": { "Hindi": "", "English": 64 } }),
    );
    assert_eq!(okay.get("name").and_then(|v| v.as_str()), Some("Ravi Kumar"));
    assert_eq!(okay.get("rollNo").and_then(|v| v.as_u64()), Some(12));
    assert_eq!(
        okay.get("marks"),
        Some(&json!([{ "subject": "English", "marks": 64 }]))
    );

    let term = request(
        &mut stdin,
        &mut reader,
        "3",
        "validate.searchTerm",
        json!({ "term": "x' OR '1'='1" }),
    );
    let (code, message) = error_of(&term);
    assert_eq!(code, "validation_failed");
    assert_eq!(message, "Invalid characters detected in search term");
}

#[test]
fn unknown_subject_is_refused_without_partial_write() {
    let workspace = temp_dir("marksd-unknown-subject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({ "name": "Lena", "rollNo": "31", "marks": { "Science": "40", "Latin": "90" } }),
    );
    let (code, _) = error_of(&resp);
    assert_eq!(code, "unknown_subject");

    let got = request(&mut stdin, &mut reader, "3", "students.get", json!({ "rollNo": 31 }));
    let (code, _) = error_of(&got);
    assert_eq!(code, "not_found");

    drop(stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_text_field_values_are_bad_params() {
    let workspace = temp_dir("marksd-bad-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cases = [
        ("students.save", json!({ "name": "Priya", "rollNo": true })),
        ("students.save", json!({ "name": ["Priya"], "rollNo": "4" })),
        ("students.save", json!({ "name": "Priya", "rollNo": "4", "marks": { "Maths": false } })),
        ("students.get", json!({ "rollNo": { "eq": 4 } })),
        ("students.search", json!({ "term": true })),
        ("validate.student", json!({ "name": "Priya", "rollNo": false })),
    ];
    for (i, (method, params)) in cases.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("b{i}"), method, params);
        let (code, message) = error_of(&resp);
        assert_eq!(code, "bad_params", "{method}");
        assert!(message.ends_with("must be a string or a number"), "{message}");
    }

    let list = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(list["students"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn repeated_subject_in_array_marks_keeps_the_last_entry() {
    let workspace = temp_dir("marksd-dup-subject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.save",
        json!({
            "name": "Nisha Rao",
            "rollNo": "44",
            "marks": [
                { "subject": "Maths", "marks": "35" },
                { "subject": "Maths", "marks": "88" }
            ]
        }),
    );
    assert_eq!(saved["marksWritten"], 1);

    let entries = request_ok(&mut stdin, &mut reader, "3", "marks.list", json!({}));
    assert_eq!(
        entries["entries"],
        json!([{ "name": "Nisha Rao", "rollNo": 44, "subject": "Maths", "marks": 88 }])
    );

    drop(stdin);
    let _ = std::fs::remove_dir_all(workspace);
}
