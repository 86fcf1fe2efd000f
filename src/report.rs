use crate::db::{round2, StudentRow};
use serde::Serialize;
use std::io::Write;

/// Placeholder written to CSV cells for a subject with no recorded mark.
pub const MISSING_MARK: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub roll_no: i64,
    pub name: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub average: Option<f64>,
    pub marks_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_students: usize,
    /// Mean of per-student averages; students with no marks are skipped.
    pub class_average: Option<f64>,
    pub top_performer: Option<TopPerformer>,
    pub subject_averages: Vec<SubjectAverage>,
}

/// Class statistics over pivoted rows. The first student reaching the highest
/// average is the top performer.
pub fn summarize(students: &[StudentRow]) -> StatsSummary {
    let averages: Vec<f64> = students.iter().filter_map(|s| s.average).collect();
    let class_average = mean(&averages);

    let mut top_performer: Option<TopPerformer> = None;
    for s in students {
        let Some(avg) = s.average else { continue };
        if top_performer.as_ref().map_or(true, |t| avg > t.average) {
            top_performer = Some(TopPerformer {
                roll_no: s.roll_no,
                name: s.name.clone(),
                average: avg,
            });
        }
    }

    // Every row carries the same subjects in the same order.
    let subjects: Vec<&str> = students
        .first()
        .map(|s| s.marks.iter().map(|m| m.subject.as_str()).collect())
        .unwrap_or_default();
    let subject_averages = subjects
        .iter()
        .enumerate()
        .map(|(i, subject)| {
            let recorded: Vec<f64> = students
                .iter()
                .filter_map(|s| s.marks.get(i).and_then(|m| m.marks))
                .map(|m| m as f64)
                .collect();
            SubjectAverage {
                subject: subject.to_string(),
                average: mean(&recorded),
                marks_count: recorded.len(),
            }
        })
        .collect();

    StatsSummary {
        total_students: students.len(),
        class_average,
        top_performer,
        subject_averages,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(round2(values.iter().sum::<f64>() / values.len() as f64))
    }
}

/// Writes the student table as CSV: `Roll No`, `Name`, one column per subject
/// in `subjects` order, then `Total` and `Average`. Returns the row count.
pub fn write_students_csv<W: Write>(
    out: W,
    subjects: &[String],
    students: &[StudentRow],
) -> csv::Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);

    let mut header = vec!["Roll No".to_string(), "Name".to_string()];
    header.extend(subjects.iter().cloned());
    header.extend(["Total".to_string(), "Average".to_string()]);
    wtr.write_record(&header)?;

    for s in students {
        let mut record = vec![s.roll_no.to_string(), s.name.clone()];
        for subject in subjects {
            let cell = s
                .marks
                .iter()
                .find(|m| &m.subject == subject)
                .and_then(|m| m.marks)
                .map(|m| m.to_string())
                .unwrap_or_else(|| MISSING_MARK.to_string());
            record.push(cell);
        }
        record.push(s.total.to_string());
        record.push(
            s.average
                .map(|a| format!("{a:.2}"))
                .unwrap_or_else(|| MISSING_MARK.to_string()),
        );
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(students.len())
}
