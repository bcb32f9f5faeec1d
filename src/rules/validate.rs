use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

use super::formats::{is_academic_year, is_email, is_student_number, IdentifierKind};
use super::{CandidateRow, FieldFormat, FieldRule, RuleSet, Verdict};
use crate::parse::{ParsedInput, RawRecord};

/// Validate one record against `rules`.
///
/// Every rule is checked; the verdict lists one reason per violation in the
/// order the rules are declared. Pure: the same record and rule set always
/// give the same row.
pub fn validate(raw: &RawRecord, rules: &RuleSet) -> CandidateRow {
    let mut fields = BTreeMap::new();
    let mut reasons = Vec::new();

    for rule in &rules.fields {
        let column = rule.column.to_lowercase();
        let value = raw.get(&column).map(str::trim).unwrap_or_default();
        let value = check_field(rule, &column, value, raw, &mut reasons);
        fields.insert(column, value);
    }

    CandidateRow {
        line: raw.line,
        fields,
        verdict: Verdict::from_reasons(reasons),
    }
}

/// Validate every parsed line, folding malformed lines in as rejected rows.
/// Output is ordered by line number.
pub fn validate_all(parsed: &ParsedInput, rules: &RuleSet) -> Vec<CandidateRow> {
    let mut rows: Vec<CandidateRow> = parsed
        .records
        .par_iter()
        .map(|raw| validate(raw, rules))
        .collect();

    rows.extend(parsed.malformed.iter().map(|err| CandidateRow {
        line: err.line(),
        fields: BTreeMap::new(),
        verdict: Verdict::Invalid(vec![err.to_string()]),
    }));
    rows.sort_by_key(|row| row.line);

    debug!(
        rule_set = %rules.name,
        rows = rows.len(),
        valid = rows.iter().filter(|r| r.verdict.is_valid()).count(),
        "validated rows"
    );
    rows
}

/// Returns the normalised value to store on the candidate row.
fn check_field(
    rule: &FieldRule,
    column: &str,
    value: &str,
    raw: &RawRecord,
    reasons: &mut Vec<String>,
) -> String {
    if value.is_empty() {
        if rule.required {
            reasons.push(format!("{column}: required field is empty"));
        }
        return match &rule.format {
            Some(FieldFormat::OneOf {
                default: Some(default),
                ..
            }) => default.to_lowercase(),
            _ => String::new(),
        };
    }

    if let Some(max) = rule.max_length {
        let len = value.chars().count();
        if len > max {
            reasons.push(format!("{column}: {len} characters exceeds limit of {max}"));
        }
    }

    let Some(format) = &rule.format else {
        return value.to_string();
    };

    match format {
        FieldFormat::Email => {
            if !is_email(value) {
                reasons.push(format!("{column}: invalid email format '{value}'"));
            }
        }
        FieldFormat::StudentNumber => {
            if !is_student_number(value) {
                reasons.push(format!(
                    "{column}: invalid student number format '{value}' (expected NNNN-NNNNN)"
                ));
            }
        }
        FieldFormat::Identifier { kind_field } => {
            let kind = kind_field
                .as_deref()
                .and_then(|k| raw.get(k))
                .map(IdentifierKind::from_token)
                .unwrap_or(IdentifierKind::Auto);
            if !kind.accepts(value) {
                let expected = match kind {
                    IdentifierKind::Email => "an email address",
                    IdentifierKind::StudentNumber => "a student number like 2021-00123",
                    IdentifierKind::Auto => "an email address or a student number like 2021-00123",
                };
                reasons.push(format!(
                    "{column}: invalid identifier format '{value}' (expected {expected})"
                ));
            }
        }
        FieldFormat::OneOf { values, .. } => {
            let token = value.to_lowercase();
            if values.iter().any(|v| v.eq_ignore_ascii_case(&token)) {
                return token;
            }
            reasons.push(format!(
                "{column}: '{value}' is not one of {}",
                values.join(", ")
            ));
        }
        FieldFormat::Integer { min, max } => match value.parse::<i64>() {
            Ok(n) if (*min..=*max).contains(&n) => {}
            Ok(n) => reasons.push(format!("{column}: {n} is outside {min}..={max}")),
            Err(_) => reasons.push(format!("{column}: '{value}' is not a whole number")),
        },
        FieldFormat::AcademicYear => {
            if !is_academic_year(value) {
                reasons.push(format!(
                    "{column}: '{value}' is not an academic year like 2024-2025"
                ));
            }
        }
    }
    value.to_string()
}
