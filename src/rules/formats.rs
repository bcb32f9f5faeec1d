use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@,]+@[^\s@,]+\.[^\s@,]+$").expect("email pattern is valid"));

static STUDENT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{5}$").expect("student number pattern is valid"));

static ACADEMIC_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("academic year pattern is valid"));

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// `NNNN-NNNNN`, e.g. `2021-00123`.
pub fn is_student_number(value: &str) -> bool {
    STUDENT_NUMBER.is_match(value)
}

/// `YYYY-YYYY` spanning exactly one year.
pub fn is_academic_year(value: &str) -> bool {
    ACADEMIC_YEAR
        .captures(value)
        .and_then(|caps| {
            let start: u32 = caps[1].parse().ok()?;
            let end: u32 = caps[2].parse().ok()?;
            Some(end == start + 1)
        })
        .unwrap_or(false)
}

/// Which identifier shapes a value may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Email,
    StudentNumber,
    Auto,
}

impl IdentifierKind {
    /// Unknown tokens fall back to `Auto`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_lowercase().as_str() {
            "email" => IdentifierKind::Email,
            "student_number" => IdentifierKind::StudentNumber,
            _ => IdentifierKind::Auto,
        }
    }

    /// Resolve `Auto` against the value itself.
    pub fn detect(value: &str) -> Option<Self> {
        if is_email(value) {
            Some(IdentifierKind::Email)
        } else if is_student_number(value) {
            Some(IdentifierKind::StudentNumber)
        } else {
            None
        }
    }

    pub fn accepts(self, value: &str) -> bool {
        match self {
            IdentifierKind::Email => is_email(value),
            IdentifierKind::StudentNumber => is_student_number(value),
            IdentifierKind::Auto => Self::detect(value).is_some(),
        }
    }
}
