// src/config.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};
use tracing::debug;
use url::Url;

use crate::import::ImportSettings;
use crate::rules::RuleSet;

pub const AUTH_TOKEN_ENV: &str = "BULKIMPORT_AUTH_TOKEN";

/// Settings file, e.g. `bulkimport.yaml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: Option<Url>,
    pub auth_token: Option<String>,
    pub batch_size: usize,
    pub concurrency_per_batch: usize,
    pub submit_timeout_secs: u64,
    pub max_displayed_failures: usize,
    /// Extra rule sets; a name shared with a built-in replaces it.
    pub rule_sets: Vec<RuleSet>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = ImportSettings::default();
        Config {
            endpoint: None,
            auth_token: None,
            batch_size: settings.batch_size,
            concurrency_per_batch: settings.concurrency_per_batch,
            submit_timeout_secs: settings.submit_timeout.as_secs(),
            max_displayed_failures: settings.max_displayed_failures,
            rule_sets: Vec::new(),
        }
    }
}

impl Config {
    /// Read a YAML settings file. The auth token falls back to
    /// `BULKIMPORT_AUTH_TOKEN` when the file does not set one.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.apply_env();
        debug!(path = %path.display(), rule_sets = config.rule_sets.len(), "loaded config");
        Ok(config)
    }

    /// Defaults plus environment, for runs without a settings file.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if self.auth_token.is_none() {
            self.auth_token = env::var(AUTH_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        }
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            batch_size: self.batch_size,
            concurrency_per_batch: self.concurrency_per_batch,
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            max_displayed_failures: self.max_displayed_failures,
        }
    }

    /// Configured rule set by name, falling back to the built-ins.
    pub fn rule_set(&self, name: &str) -> Option<RuleSet> {
        self.rule_sets
            .iter()
            .find(|rs| rs.name == name)
            .cloned()
            .or_else(|| RuleSet::builtin(name))
    }

    pub fn rule_set_names(&self) -> Vec<String> {
        let mut names: Vec<String> = RuleSet::builtins().into_iter().map(|rs| rs.name).collect();
        for rs in &self.rule_sets {
            if !names.contains(&rs.name) {
                names.push(rs.name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn omitted_keys_take_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "endpoint: https://eval.example.edu/api/enrollments")?;
        writeln!(file, "batch_size: 25")?;
        writeln!(file, "auth_token: abc")?;

        let config = Config::load(file.path())?;
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.concurrency_per_batch, 5);
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert_eq!(
            config.endpoint.as_ref().map(Url::as_str),
            Some("https://eval.example.edu/api/enrollments")
        );

        let settings = config.import_settings();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.submit_timeout, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn custom_rule_set_overrides_builtin() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"
rule_sets:
  - name: enrollment_import
    key_fields: [student_identifier]
    fields:
      - column: student_identifier
        required: true
        format: {{ type: student_number }}
      - column: section_identifier
        required: true
  - name: adviser_import
    fields:
      - column: email
        required: true
        format: {{ type: email }}
"#
        )?;

        let config = Config::load(file.path())?;
        let enrollment = config.rule_set("enrollment_import").unwrap();
        assert_eq!(enrollment.key_fields, vec!["student_identifier"]);
        assert_eq!(enrollment.fields.len(), 2);
        assert!(config.rule_set("course_import").is_some());
        assert_eq!(
            config.rule_set_names(),
            vec!["course_import", "enrollment_import", "section_bulk_create", "adviser_import"]
        );
        Ok(())
    }

    #[test]
    fn example_config_loads() -> Result<()> {
        let config = Config::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/config/bulkimport.example.yaml"
        ))?;
        let advisers = config.rule_set("adviser_import").unwrap();
        assert_eq!(advisers.required_columns(), vec!["email", "department"]);
        assert_eq!(config.import_settings(), ImportSettings::default());
        Ok(())
    }

    #[test]
    fn unknown_keys_are_errors() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "batchsize: 3")?;
        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config file"));
        Ok(())
    }
}
