// src/rules/mod.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod formats;
pub mod validate;

pub const COURSE_IMPORT: &str = "course_import";
pub const ENROLLMENT_IMPORT: &str = "enrollment_import";
pub const SECTION_BULK_CREATE: &str = "section_bulk_create";

/// Declarative description of one import screen's columns and checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub fields: Vec<FieldRule>,
    /// Columns whose values identify a row in failure listings.
    #[serde(default)]
    pub key_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub column: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub format: Option<FieldFormat>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldFormat {
    Email,
    StudentNumber,
    /// Email or student number, optionally narrowed by a sibling kind column.
    Identifier {
        #[serde(default)]
        kind_field: Option<String>,
    },
    OneOf {
        values: Vec<String>,
        #[serde(default)]
        default: Option<String>,
    },
    Integer {
        min: i64,
        max: i64,
    },
    AcademicYear,
}

impl FieldRule {
    pub fn required(column: &str) -> Self {
        FieldRule {
            column: column.to_lowercase(),
            required: true,
            format: None,
            max_length: None,
        }
    }

    pub fn optional(column: &str) -> Self {
        FieldRule {
            required: false,
            ..FieldRule::required(column)
        }
    }

    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

impl RuleSet {
    /// Columns that must appear in the header.
    pub fn required_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.column.as_str())
            .collect()
    }

    /// Built-in rule set by name.
    pub fn builtin(name: &str) -> Option<RuleSet> {
        match name {
            COURSE_IMPORT => Some(Self::course_import()),
            ENROLLMENT_IMPORT => Some(Self::enrollment_import()),
            SECTION_BULK_CREATE => Some(Self::section_bulk_create()),
            _ => None,
        }
    }

    pub fn builtins() -> Vec<RuleSet> {
        vec![
            Self::course_import(),
            Self::enrollment_import(),
            Self::section_bulk_create(),
        ]
    }

    pub fn course_import() -> RuleSet {
        RuleSet {
            name: COURSE_IMPORT.into(),
            fields: vec![
                FieldRule::required("name").with_max_length(200),
                FieldRule::required("classCode").with_max_length(32),
                FieldRule::required("instructor"),
                FieldRule::required("program"),
                FieldRule::required("yearLevel").with_format(FieldFormat::Integer { min: 1, max: 4 }),
                FieldRule::required("semester").with_format(semester_values()),
                FieldRule::required("academicYear").with_format(FieldFormat::AcademicYear),
            ],
            key_fields: vec!["classcode".into()],
        }
    }

    pub fn enrollment_import() -> RuleSet {
        RuleSet {
            name: ENROLLMENT_IMPORT.into(),
            fields: vec![
                FieldRule::required("student_identifier").with_format(FieldFormat::Identifier {
                    kind_field: Some("identifier_type".into()),
                }),
                FieldRule::required("section_identifier"),
                FieldRule::optional("identifier_type").with_format(FieldFormat::OneOf {
                    values: vec!["email".into(), "student_number".into(), "auto".into()],
                    default: Some("auto".into()),
                }),
                FieldRule::optional("notes").with_max_length(500),
            ],
            key_fields: vec!["student_identifier".into(), "section_identifier".into()],
        }
    }

    pub fn section_bulk_create() -> RuleSet {
        RuleSet {
            name: SECTION_BULK_CREATE.into(),
            fields: vec![
                FieldRule::required("classCode").with_max_length(32),
                FieldRule::required("section_name").with_max_length(64),
                FieldRule::required("academicYear").with_format(FieldFormat::AcademicYear),
                FieldRule::required("semester").with_format(semester_values()),
                FieldRule::optional("instructor"),
                FieldRule::optional("capacity").with_format(FieldFormat::Integer { min: 1, max: 500 }),
            ],
            key_fields: vec!["classcode".into(), "section_name".into()],
        }
    }
}

fn semester_values() -> FieldFormat {
    FieldFormat::OneOf {
        values: vec!["first".into(), "second".into(), "summer".into()],
        default: None,
    }
}

/// Verdict attached to a row after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reasons", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid(Vec<String>),
}

impl Verdict {
    /// `Valid` when there are no reasons; `Invalid` is never empty.
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Invalid(reasons)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Verdict::Valid => &[],
            Verdict::Invalid(reasons) => reasons,
        }
    }
}

/// A raw record projected onto a rule set's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRow {
    pub line: usize,
    pub fields: BTreeMap<String, String>,
    pub verdict: Verdict,
}

impl CandidateRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(&column.to_lowercase()).map(String::as_str)
    }

    /// Identifying values for display, e.g. `"a@b.edu / CS101-A"`.
    pub fn key(&self, key_fields: &[String]) -> String {
        let parts: Vec<&str> = key_fields
            .iter()
            .filter_map(|k| self.get(k))
            .filter(|v| !v.is_empty())
            .collect();
        if parts.is_empty() {
            format!("line {}", self.line)
        } else {
            parts.join(" / ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        for rs in RuleSet::builtins() {
            assert_eq!(RuleSet::builtin(&rs.name), Some(rs.clone()));
        }
        assert!(RuleSet::builtin("grades_import").is_none());
    }

    #[test]
    fn required_columns_are_lower_cased() {
        assert_eq!(
            RuleSet::course_import().required_columns(),
            vec!["name", "classcode", "instructor", "program", "yearlevel", "semester", "academicyear"]
        );
        assert_eq!(
            RuleSet::enrollment_import().required_columns(),
            vec!["student_identifier", "section_identifier"]
        );
    }

    #[test]
    fn rule_set_from_yaml() {
        let yaml = r#"
name: advisers
key_fields: [email]
fields:
  - column: email
    required: true
    format: { type: email }
  - column: load
    format: { type: integer, min: 0, max: 6 }
  - column: kind
    format: { type: one_of, values: [full, part], default: full }
"#;
        let rs: RuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rs.required_columns(), vec!["email"]);
        assert_eq!(rs.fields[1].format, Some(FieldFormat::Integer { min: 0, max: 6 }));
        assert!(!rs.fields[2].required);
    }

    #[test]
    fn verdict_never_invalid_without_reasons() {
        assert_eq!(Verdict::from_reasons(vec![]), Verdict::Valid);
        let v = Verdict::from_reasons(vec!["x".into()]);
        assert!(!v.is_valid());
        assert_eq!(v.reasons(), ["x".to_string()]);
    }

    #[test]
    fn key_falls_back_to_line() {
        let row = CandidateRow {
            line: 7,
            fields: BTreeMap::from([("classcode".to_string(), String::new())]),
            verdict: Verdict::Valid,
        };
        assert_eq!(row.key(&["classcode".to_string()]), "line 7");
    }
}
