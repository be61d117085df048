//! `strata validate` command implementation.
//!
//! Loads the configuration and reports problems the handler would only hit at
//! runtime:
//! - buffering and mapping settings rejected by validation
//! - unknown database types (which fall back to the generic dialect)
//! - topic schemas that do not compile or declare unsupported field types
//! - table and column names that are not plain identifiers
//! - mappings without a content identifier column or without a schema

use anyhow::{Context, Result};
use std::path::Path;
use strata_core::{EventSchema, EventTopics, FieldPath, StrataConfig, TableMapping};
use strata_sql::Dialect;

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Check that produced the finding.
    pub category: &'static str,
    pub message: String,
    /// Topic the finding is about, if any.
    pub topic: Option<String>,
}

impl CheckFinding {
    fn new(severity: Severity, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            topic: None,
        }
    }

    fn error(category: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    fn warning(category: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn info(category: &'static str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    fn for_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn push(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// Print findings, most severe first.
    pub fn print_summary(&self) {
        let mut findings: Vec<_> = self.findings.iter().collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| Ord::cmp(&a.category, &b.category))
        });

        for finding in findings {
            let topic = finding
                .topic
                .as_deref()
                .map(|t| format!(" [{}]", t))
                .unwrap_or_default();
            println!(
                "  {} [{}]{}: {}",
                finding.severity, finding.category, topic, finding.message
            );
        }

        println!();
        let errors = self.count(Severity::Error);
        let warnings = self.count(Severity::Warning);
        if errors == 0 && warnings == 0 {
            println!("All checks passed");
        } else {
            println!("Summary: {} error(s), {} warning(s)", errors, warnings);
        }
    }
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run every check without printing.
pub fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let config = StrataConfig::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let mut results = CheckResults::default();

    if let Err(e) = config.validate() {
        results.push(CheckFinding::error("config", e.to_string()));
    }

    let dialect = match Dialect::parse_tag(&config.handler.database_type) {
        Some(dialect) => dialect,
        None => {
            results.push(CheckFinding::warning(
                "dialect",
                format!(
                    "Unknown database type '{}', the generic dialect will be used",
                    config.handler.database_type
                ),
            ));
            Dialect::Generic
        }
    };

    if let Err(e) = config.connection_pool.connection_url() {
        results.push(CheckFinding::warning("connection-pool", e.to_string()));
    }

    let topics = match config.event_topics(super::base_dir(config_path)) {
        Ok(topics) => topics,
        Err(e) => {
            results.push(CheckFinding::error("schema", e.to_string()));
            EventTopics::new()
        }
    };

    for topic in topics.topics() {
        if let Some(schema) = topics.schema(topic)
            && let Err(e) = jsonschema::validator_for(schema.as_value())
        {
            results.push(
                CheckFinding::error("schema", format!("Invalid JSON schema: {}", e)).for_topic(topic),
            );
        }
        if config.handler.table_mapping(topic).is_none() {
            results.push(
                CheckFinding::warning("mapping", "Topic has a schema but no table mapping")
                    .for_topic(topic),
            );
        }
    }

    for mapping in &config.handler.table_mappings {
        check_mapping(mapping, topics.schema(&mapping.event), dialect, &mut results);
    }

    Ok(results)
}

/// Run all checks, print the findings and fail when there are errors.
pub fn run(config_path: &Path) -> Result<()> {
    println!("Checking strata configuration {}", config_path.display());
    println!();

    let results = run_quiet(config_path)?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!(
            "Configuration check failed with {} error(s)",
            results.count(Severity::Error)
        );
    }
    Ok(())
}

fn check_mapping(
    mapping: &TableMapping,
    schema: Option<&EventSchema>,
    dialect: Dialect,
    results: &mut CheckResults,
) {
    let topic = mapping.event.as_str();

    if mapping.id_column().is_none() {
        results.push(
            CheckFinding::warning("mapping", "The '_id' field is not mapped, reads by id will fail")
                .for_topic(topic),
        );
    }

    for ident in std::iter::once(mapping.table.as_str()).chain(mapping.fields().map(|(_, c)| c)) {
        if let Err(e) = dialect.quote_identifier(ident) {
            results.push(CheckFinding::error("identifier", e.to_string()).for_topic(topic));
        }
    }

    let Some(schema) = schema else {
        results.push(
            CheckFinding::warning(
                "schema",
                "No schema configured, field types are inferred from event values",
            )
            .for_topic(topic),
        );
        return;
    };

    for (field, _) in mapping.fields() {
        match schema.field_kind(&FieldPath::parse(field)) {
            Ok(Some(_)) => {}
            Ok(None) => results.push(
                CheckFinding::info(
                    "schema",
                    format!("Field '{}' has no declared type, it is inferred per event", field),
                )
                .for_topic(topic),
            ),
            Err(e) => results.push(CheckFinding::error("schema", e.to_string()).for_topic(topic)),
        }
    }
}
