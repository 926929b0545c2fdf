//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying conflict
//! analyses, compiled policies, and apply results in text or JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::analyzer::{AggregateConflictResult, ConflictReport, Severity};
use crate::policy::{CompiledPolicy, PolicyHasher, top_level_conjuncts};
use crate::reconciler::ApplyResult;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Difference row for table display.
#[derive(Tabled)]
struct DifferenceRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Live")]
    live: String,
    #[tabled(rename = "Desired")]
    desired: String,
}

/// Attribute mapping row for table display.
#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "Attribute")]
    attribute: String,
    #[tabled(rename = "Assertion")]
    assertion: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a conflict analysis for display.
    #[must_use]
    pub fn format_analysis(&self, analysis: &AggregateConflictResult, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(analysis).unwrap_or_default(),
            OutputFormat::Text => Self::format_analysis_text(analysis, detailed),
        }
    }

    /// Formats an analysis as text.
    fn format_analysis_text(analysis: &AggregateConflictResult, detailed: bool) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "\nConflict analysis");

        for report in analysis.creations() {
            let _ = writeln!(
                output,
                "  {} {} '{}' does not exist and will be created",
                "+".green(),
                report.kind,
                report.resource_id
            );
        }

        let rows: Vec<DifferenceRow> = analysis
            .reports
            .iter()
            .flat_map(|report| {
                report.differences.iter().map(|d| DifferenceRow {
                    resource: report.resource_id.clone(),
                    field: d.field.clone(),
                    severity: Self::format_severity(d.severity),
                    live: Self::truncate(d.live.as_deref().unwrap_or("-"), 40),
                    desired: Self::truncate(d.desired.as_deref().unwrap_or("-"), 40),
                })
            })
            .collect();

        if !rows.is_empty() {
            let table = Table::new(rows).to_string();
            output.push('\n');
            output.push_str(&table);
            output.push('\n');
        }

        if detailed || !analysis.can_proceed {
            for report in analysis.conflicting() {
                Self::append_suggestions(&mut output, report);
            }
        }

        let verdict = if analysis.can_proceed {
            format!("{} {}", "✓".green(), analysis.summary)
        } else {
            format!("{} {}", "✗".red(), analysis.summary)
        };
        let _ = write!(output, "\n{verdict}\n{}\n", analysis.recommended_action);

        output
    }

    /// Appends the full suggestion list for one report.
    fn append_suggestions(output: &mut String, report: &ConflictReport) {
        if report.suggestions.is_empty() {
            return;
        }

        let _ = write!(
            output,
            "\nOptions for {} '{}':\n",
            report.kind, report.resource_id
        );

        for suggestion in &report.suggestions {
            let marker = if suggestion.recommended {
                "*".green().to_string()
            } else {
                String::from("-")
            };
            let _ = writeln!(
                output,
                "  {marker} [{}] {}",
                suggestion.strategy, suggestion.title
            );
            let _ = writeln!(output, "      {}", suggestion.rationale);
        }
    }

    /// Formats a compiled policy for display.
    #[must_use]
    pub fn format_policy(&self, compiled: &CompiledPolicy) -> String {
        let hasher = PolicyHasher::new();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "attribute_mapping": compiled.attribute_mapping,
                "condition": compiled.condition,
                "fingerprint": hasher.fingerprint(compiled),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => Self::format_policy_text(compiled, &hasher),
        }
    }

    /// Formats a compiled policy as text.
    fn format_policy_text(compiled: &CompiledPolicy, hasher: &PolicyHasher) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "\nCompiled trust policy (fingerprint {})\n",
            hasher.short_fingerprint(compiled)
        );

        let rows: Vec<MappingRow> = compiled
            .attribute_mapping
            .iter()
            .map(|(target, assertion)| MappingRow {
                attribute: target.to_string(),
                assertion: assertion.to_string(),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());

        let _ = write!(output, "\n\nCondition:\n");
        for (i, clause) in top_level_conjuncts(&compiled.condition).iter().enumerate() {
            let prefix = if i == 0 { "   " } else { "&& " };
            let _ = writeln!(output, "  {prefix}{clause}");
        }

        output
    }

    /// Formats an apply result for display.
    #[must_use]
    pub fn format_apply(&self, result: &ApplyResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\n{} Federation applied", "✓".green());
                for name in &result.created {
                    let _ = writeln!(output, "  {} created {name}", "+".green());
                }
                for name in &result.updated {
                    let _ = writeln!(output, "  {} updated {name}", "~".yellow());
                }
                for name in &result.reused {
                    let _ = writeln!(output, "    reused {name}");
                }
                if result.trust_binding_written {
                    let _ = writeln!(output, "  {} trust binding written", "+".green());
                }
                output
            }
        }
    }

    /// Colors a severity label.
    fn format_severity(severity: Severity) -> String {
        match severity {
            Severity::Info => severity.to_string().normal().to_string(),
            Severity::Warning => severity.to_string().yellow().to_string(),
            Severity::Critical => severity.to_string().red().bold().to_string(),
        }
    }

    /// Truncates a string for table display.
    fn truncate(value: &str, max: usize) -> String {
        if value.len() <= max {
            value.to_string()
        } else {
            format!("{}...", &value[..max.saturating_sub(3)])
        }
    }
}
