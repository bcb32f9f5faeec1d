pub mod config;
pub mod import;
pub mod parse;
pub mod rules;
pub mod submit;

pub use import::{
    report::{ImportProgress, ImportReport, ImportStatus},
    ImportError, ImportSettings, Importer,
};
pub use parse::{parse, ParseError, ParsedInput, RawRecord, RowParseError};
pub use rules::{validate::validate, CandidateRow, RuleSet, Verdict};
pub use submit::{RowOutcome, SubmitError, Submitter};
