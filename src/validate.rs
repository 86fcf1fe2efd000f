//! Input validation for everything a front end hands us before it reaches SQL.
//!
//! The injection screen is a heuristic blocklist, not a parser. It will flag
//! some honest input (a name like "Anderson = Smith" trips the `AND ... =`
//! rule) and that is accepted. It sits in front of parameter binding in
//! `db`, never in place of it.

use regex::{Regex, RegexSet};
use std::fmt;
use std::sync::LazyLock;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const SEARCH_MAX_CHARS: usize = 100;
pub const ROLL_NO_MIN: i64 = 1;
pub const ROLL_NO_MAX: i64 = 999_999;
pub const MARKS_MIN: i64 = 0;
pub const MARKS_MAX: i64 = 100;

static INJECTION_SIGNALS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|TRUNCATE|ALTER|CREATE|EXEC|EXECUTE|UNION|GRANT|REVOKE)\b",
        r"-{2,}",
        r";",
        r"/\*|\*/",
        r"(?i)\bOR\b.*=",
        r"(?i)\bAND\b.*=",
        r"'.*--",
        r"(?i)\bxp_\w+",
        r"(?i)\bsp_\w+",
    ])
    .expect("valid injection patterns")
});

static NAME_ALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s'\-.]+$").expect("valid name pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Name,
    RollNumber,
    Marks(String),
    SearchTerm,
}

impl Field {
    /// Short key for machine consumers ("name", "rollNo", "marks.Science", ...).
    pub fn key(&self) -> String {
        match self {
            Field::Name => "name".to_string(),
            Field::RollNumber => "rollNo".to_string(),
            Field::Marks(subject) => format!("marks.{subject}"),
            Field::SearchTerm => "term".to_string(),
        }
    }

    fn injection_phrase(&self) -> String {
        match self {
            Field::Name => "name".to_string(),
            Field::RollNumber => "Roll Number".to_string(),
            Field::Marks(subject) => format!("{subject} marks"),
            Field::SearchTerm => "search term".to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => f.write_str("Name"),
            Field::RollNumber => f.write_str("Roll Number"),
            Field::Marks(subject) => write!(f, "Marks for {subject}"),
            Field::SearchTerm => f.write_str("Search term"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    EmptyInput { field: Field },
    #[error("{field} must be at least {min} characters long")]
    TooShort { field: Field, min: usize },
    #[error("{field} cannot exceed {max} characters")]
    TooLong { field: Field, max: usize },
    #[error("{}", out_of_range_message(.field, .value, .min, .max))]
    OutOfRange {
        field: Field,
        value: i128,
        min: i64,
        max: i64,
    },
    #[error("{field} must be a valid integer")]
    NotAnInteger { field: Field },
    #[error("Invalid characters detected in {}", .field.injection_phrase())]
    InjectionSignalDetected { field: Field },
    #[error(
        "{field} can only contain letters, digits, spaces, underscores, hyphens, apostrophes, and periods"
    )]
    DisallowedCharacters { field: Field },
}

fn out_of_range_message(field: &Field, value: &i128, min: &i64, max: &i64) -> String {
    if *value < i128::from(*min) {
        if *min > 0 {
            format!("{field} must be a positive number")
        } else {
            format!("{field} cannot be negative")
        }
    } else {
        format!("{field} cannot exceed {max}")
    }
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyInput { .. } => "empty_input",
            ValidationError::TooShort { .. } => "too_short",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::NotAnInteger { .. } => "not_an_integer",
            ValidationError::InjectionSignalDetected { .. } => "injection_signal_detected",
            ValidationError::DisallowedCharacters { .. } => "disallowed_characters",
        }
    }

    pub fn field(&self) -> &Field {
        match self {
            ValidationError::EmptyInput { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::NotAnInteger { field }
            | ValidationError::InjectionSignalDetected { field }
            | ValidationError::DisallowedCharacters { field } => field,
        }
    }
}

pub type Outcome<T> = Result<T, ValidationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectMark {
    pub subject: String,
    pub marks: u8,
}

/// A student record whose every field passed validation. Only this type is
/// accepted by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStudent {
    pub name: String,
    pub roll_no: u32,
    /// Provided marks only, one per subject, ordered by each subject's last
    /// appearance in the caller's input.
    pub marks: Vec<SubjectMark>,
}

pub fn contains_sql_injection(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    INJECTION_SIGNALS.is_match(value)
}

/// Strip NUL bytes and surrounding whitespace.
pub fn sanitize(value: &str) -> String {
    value.replace('\0', "").trim().to_string()
}

pub fn validate_name(raw: &str) -> Outcome<String> {
    let field = Field::Name;
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyInput { field });
    }

    let len = name.chars().count();
    if len < NAME_MIN_CHARS {
        return Err(ValidationError::TooShort {
            field,
            min: NAME_MIN_CHARS,
        });
    }
    if len > NAME_MAX_CHARS {
        return Err(ValidationError::TooLong {
            field,
            max: NAME_MAX_CHARS,
        });
    }
    if contains_sql_injection(name) {
        return Err(ValidationError::InjectionSignalDetected { field });
    }
    if !NAME_ALLOWED.is_match(name) {
        return Err(ValidationError::DisallowedCharacters { field });
    }

    Ok(sanitize(name))
}

pub fn validate_roll_number(raw: &str) -> Outcome<u32> {
    let field = Field::RollNumber;
    let roll_no = raw.trim();
    if roll_no.is_empty() {
        return Err(ValidationError::EmptyInput { field });
    }
    if contains_sql_injection(roll_no) {
        return Err(ValidationError::InjectionSignalDetected { field });
    }

    let value = parse_integer(roll_no, &field)?;
    check_range(value, ROLL_NO_MIN, ROLL_NO_MAX, field)?;
    // Range check above guarantees the value fits.
    Ok(value as u32)
}

/// Empty input means "not provided" and yields `Ok(None)`.
pub fn validate_marks(raw: &str, subject: &str) -> Outcome<Option<u8>> {
    let field = Field::Marks(subject.to_string());
    let marks = raw.trim();
    if marks.is_empty() {
        return Ok(None);
    }
    if contains_sql_injection(marks) {
        return Err(ValidationError::InjectionSignalDetected { field });
    }

    let value = parse_integer(marks, &field)?;
    check_range(value, MARKS_MIN, MARKS_MAX, field)?;
    Ok(Some(value as u8))
}

/// Screens the sanitized term, so stripping NULs can never assemble a
/// blocklisted token after the check.
pub fn validate_search_term(raw: &str) -> Outcome<String> {
    let field = Field::SearchTerm;
    let term = sanitize(raw);
    if term.is_empty() {
        return Ok(term);
    }
    if contains_sql_injection(&term) {
        return Err(ValidationError::InjectionSignalDetected { field });
    }
    if term.chars().count() > SEARCH_MAX_CHARS {
        return Err(ValidationError::TooLong {
            field,
            max: SEARCH_MAX_CHARS,
        });
    }
    Ok(term)
}

/// Name, then roll number, then marks in caller order. Stops at the first
/// rejection. A subject given more than once takes its last value, blank
/// included.
pub fn validate_student_data<I, S, M>(name: &str, roll_no: &str, marks: I) -> Outcome<ValidatedStudent>
where
    I: IntoIterator<Item = (S, M)>,
    S: AsRef<str>,
    M: AsRef<str>,
{
    let name = validate_name(name)?;
    let roll_no = validate_roll_number(roll_no)?;

    let mut validated: Vec<SubjectMark> = Vec::new();
    for (subject, raw) in marks {
        let subject = subject.as_ref();
        let value = validate_marks(raw.as_ref(), subject)?;
        validated.retain(|m| m.subject != subject);
        if let Some(value) = value {
            validated.push(SubjectMark {
                subject: subject.to_string(),
                marks: value,
            });
        }
    }

    Ok(ValidatedStudent {
        name,
        roll_no,
        marks: validated,
    })
}

// Integral text that merely overflows is out of range, not malformed.
fn parse_integer(text: &str, field: &Field) -> Outcome<i128> {
    match text.parse::<i128>() {
        Ok(v) => Ok(v),
        Err(e) => match e.kind() {
            std::num::IntErrorKind::PosOverflow => Ok(i128::MAX),
            std::num::IntErrorKind::NegOverflow => Ok(i128::MIN),
            _ => Err(ValidationError::NotAnInteger {
                field: field.clone(),
            }),
        },
    }
}

fn check_range(value: i128, min: i64, max: i64, field: Field) -> Outcome<()> {
    if value < i128::from(min) || value > i128::from(max) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
