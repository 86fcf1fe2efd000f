use crate::validate::ValidatedStudent;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "marks.sqlite3";

/// Subject catalog seeded into every workspace.
pub const DEFAULT_SUBJECTS: [(i64, &str); 6] = [
    (101, "Science"),
    (102, "Social"),
    (103, "Maths"),
    (104, "English"),
    (105, "Hindi"),
    (106, "Kannada"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub subject: String,
    pub marks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub roll_no: i64,
    pub name: String,
    /// One entry per subject in subject-id order.
    pub marks: Vec<SubjectScore>,
    /// Sum of recorded marks; 0 when none are recorded.
    pub total: i64,
    /// Mean of recorded marks rounded to 2 places; None when none are recorded.
    pub average: Option<f64>,
}

impl StudentRow {
    fn new(roll_no: i64, name: String, marks: Vec<SubjectScore>) -> Self {
        let recorded: Vec<i64> = marks.iter().filter_map(|m| m.marks).collect();
        let total = recorded.iter().sum();
        let average = if recorded.is_empty() {
            None
        } else {
            Some(round2(total as f64 / recorded.len() as f64))
        };
        StudentRow {
            roll_no,
            name,
            marks,
            total,
            average,
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub name: String,
    pub roll_no: i64,
    pub subject: String,
    pub marks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub created: bool,
    pub marks_written: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            subj_id INTEGER PRIMARY KEY,
            subj_name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    for (id, name) in DEFAULT_SUBJECTS {
        conn.execute(
            "INSERT OR IGNORE INTO subjects(subj_id, subj_name) VALUES(?, ?)",
            (id, name),
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll_no INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            roll_no INTEGER NOT NULL,
            subj_id INTEGER NOT NULL,
            marks INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(roll_no) REFERENCES students(roll_no),
            FOREIGN KEY(subj_id) REFERENCES subjects(subj_id),
            UNIQUE(roll_no, subj_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_roll_no ON marks(roll_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_subj ON marks(subj_id)",
        [],
    )?;

    Ok(())
}

pub fn list_subjects(conn: &Connection) -> rusqlite::Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT subj_id, subj_name FROM subjects ORDER BY subj_id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Subject {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Insert or replace a student keyed by roll number. Each provided mark
/// replaces the stored mark for that subject; subjects not provided are left
/// alone. All-or-nothing.
pub fn save_student(conn: &Connection, student: &ValidatedStudent) -> Result<SaveSummary, SaveError> {
    let subject_ids: HashMap<String, i64> = list_subjects(conn)?
        .into_iter()
        .map(|s| (s.name, s.id))
        .collect();
    let mut resolved = Vec::with_capacity(student.marks.len());
    for m in &student.marks {
        let Some(subj_id) = subject_ids.get(&m.subject) else {
            return Err(SaveError::UnknownSubject(m.subject.clone()));
        };
        resolved.push((*subj_id, i64::from(m.marks)));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let roll_no = i64::from(student.roll_no);

    let tx = conn.unchecked_transaction()?;
    let existed: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM students WHERE roll_no = ?",
            [roll_no],
            |r| r.get(0),
        )
        .optional()?;
    tx.execute(
        "INSERT INTO students(roll_no, name, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(roll_no) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
        (roll_no, &student.name, &now),
    )?;

    for (subj_id, marks) in &resolved {
        tx.execute(
            "DELETE FROM marks WHERE roll_no = ? AND subj_id = ?",
            (roll_no, subj_id),
        )?;
        tx.execute(
            "INSERT INTO marks(id, roll_no, subj_id, marks, updated_at) VALUES(?, ?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), roll_no, subj_id, marks, &now),
        )?;
    }
    tx.commit()?;

    Ok(SaveSummary {
        created: existed.is_none(),
        marks_written: resolved.len(),
    })
}

pub fn get_student(conn: &Connection, roll_no: u32) -> rusqlite::Result<Option<StudentRow>> {
    let rows = query_students(
        conn,
        "SELECT roll_no, name FROM students WHERE roll_no = ?1",
        rusqlite::params![i64::from(roll_no)],
    )?;
    Ok(rows.into_iter().next())
}

pub fn list_students(conn: &Connection) -> rusqlite::Result<Vec<StudentRow>> {
    query_students(
        conn,
        "SELECT roll_no, name FROM students ORDER BY roll_no",
        rusqlite::params![],
    )
}

/// Case-insensitive substring match on the roll number's digits or the name.
/// The term is expected to have passed `validate_search_term`. Matching runs
/// here rather than in SQL because SQLite's `lower()` only folds ASCII.
pub fn search_students(conn: &Connection, term: &str) -> rusqlite::Result<Vec<StudentRow>> {
    let students = list_students(conn)?;
    if term.is_empty() {
        return Ok(students);
    }
    let needle = term.to_lowercase();
    Ok(students
        .into_iter()
        .filter(|s| {
            s.roll_no.to_string().contains(&needle) || s.name.to_lowercase().contains(&needle)
        })
        .collect())
}

pub fn list_mark_entries(conn: &Connection) -> rusqlite::Result<Vec<MarkEntry>> {
    let mut stmt = conn.prepare(
        "SELECT s.name, m.roll_no, sub.subj_name, m.marks
         FROM marks m
         JOIN students s ON m.roll_no = s.roll_no
         JOIN subjects sub ON m.subj_id = sub.subj_id
         ORDER BY m.roll_no, m.subj_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MarkEntry {
            name: row.get(0)?,
            roll_no: row.get(1)?,
            subject: row.get(2)?,
            marks: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Returns false when the student did not exist.
pub fn delete_student(conn: &Connection, roll_no: u32) -> rusqlite::Result<bool> {
    let roll_no = i64::from(roll_no);
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM marks WHERE roll_no = ?", [roll_no])?;
    let removed = tx.execute("DELETE FROM students WHERE roll_no = ?", [roll_no])?;
    tx.commit()?;
    Ok(removed > 0)
}

fn query_students(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<StudentRow>> {
    let subjects = list_subjects(conn)?;

    let mut stmt = conn.prepare(sql)?;
    let students = stmt
        .query_map(params, |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut marks_stmt = conn.prepare("SELECT subj_id, marks FROM marks WHERE roll_no = ?")?;
    let mut out = Vec::with_capacity(students.len());
    for (roll_no, name) in students {
        let stored: HashMap<i64, i64> = marks_stmt
            .query_map([roll_no], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        let marks = subjects
            .iter()
            .map(|s| SubjectScore {
                subject: s.name.clone(),
                marks: stored.get(&s.id).copied(),
            })
            .collect();
        out.push(StudentRow::new(roll_no, name, marks));
    }
    Ok(out)
}
