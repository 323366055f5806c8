//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ProviderConfig, ValidationResult};
use crate::identity::short_identity;
use crate::planner::{DiffResult, ExecutionPlan, ExecutionResult};
use crate::resource::{Diagnostic, ResourceResponse, ResourceSchema, Severity, Verb};
use crate::state::{LockInfo, ProviderState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Working dir")]
    working_dir: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Stored unit row for table display.
#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Last")]
    last_verb: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Working dir")]
    working_dir: String,
}

/// Execution result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Attribute row for schema display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an execution plan for display.
    ///
    /// With `detailed`, the field-level changes from `diff` are listed too.
    #[must_use]
    pub fn format_plan(&self, plan: &ExecutionPlan, diff: &DiffResult, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "plan": plan,
                "diff": diff,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, diff, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ExecutionPlan, diff: &DiffResult, detailed: bool) -> String {
        if plan.is_empty() {
            return format!("{} No units declared or stored.\n", "✓".green());
        }

        let mut output = String::from("\nExecution Plan\n\n");

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_verb(a.verb),
                unit: a.unit.clone(),
                working_dir: Self::truncate(a.working_dir().unwrap_or("-"), 40),
                reason: Self::truncate(&a.reason, 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for resource_diff in diff.diffs.iter().filter(|d| !d.details.is_empty()) {
                let _ = writeln!(output, "\n  {}:", resource_diff.name.bold());
                for detail in &resource_diff.details {
                    let _ = writeln!(
                        output,
                        "    {} {} -> {}",
                        detail.field,
                        detail.old_value.as_deref().unwrap_or("(unset)").red(),
                        detail.new_value.as_deref().unwrap_or("(unset)").green()
                    );
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to forget, {} to refresh\n",
            diff.creates.to_string().green(),
            diff.updates.to_string().yellow(),
            diff.deletes.to_string().red(),
            diff.refreshes
        );

        if !diff.has_changes() {
            let _ = writeln!(
                output,
                "{} No changes. Stored identities will be refreshed.",
                "✓".green()
            );
        }

        output
    }

    /// Formats the result of running a plan.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                if !result.results.is_empty() {
                    let rows: Vec<ResultRow> = result
                        .results
                        .iter()
                        .map(|r| ResultRow {
                            unit: r.unit.clone(),
                            action: Self::format_verb(r.verb),
                            result: if r.success {
                                "ok".green().to_string()
                            } else {
                                "failed".red().to_string()
                            },
                            id: r.id.as_deref().map_or_else(|| String::from("-"), short_identity),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                for r in &result.results {
                    for diagnostic in &r.diagnostics {
                        let line = Self::format_diagnostic(&r.unit, diagnostic);
                        let _ = writeln!(output, "{line}");
                    }
                }

                let status = if result.all_successful() {
                    format!("{} {result}", "✓".green())
                } else {
                    format!("{} {result}", "✗".red())
                };
                let _ = writeln!(output, "\n{status}");

                output
            }
        }
    }

    /// Formats the response to a single request such as an import.
    #[must_use]
    pub fn format_response(&self, unit: &str, verb: Verb, response: &ResourceResponse) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "unit": unit,
                "verb": verb,
                "response": response,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for diagnostic in &response.diagnostics {
                    let _ = writeln!(output, "{}", Self::format_diagnostic(unit, diagnostic));
                }
                if !response.has_error() {
                    let id = response
                        .state
                        .as_ref()
                        .and_then(|r| r.id.as_deref())
                        .unwrap_or("-");
                    let _ = writeln!(output, "{} {verb} '{unit}': {id}", "✓".green());
                }
                output
            }
        }
    }

    /// Formats a validation result with a short configuration summary.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        config: &ProviderConfig,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
                "units": config.unit_names(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "  - {error}");
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  - {warning}");
                    }
                }

                let _ = writeln!(output, "\nConfiguration summary:");
                let _ = writeln!(output, "  Terraform: {}", config.terraform.binary);
                let _ = writeln!(output, "  State file: {}", config.state_file);
                if let Some(timeout) = config.timeout_secs {
                    let _ = writeln!(output, "  Timeout: {timeout}s");
                }
                let _ = writeln!(output, "  Units: {}", config.units.len());

                output
            }
        }
    }

    /// Formats the stored state and its lock.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "state": state,
                "lock": lock,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::from("\nState\n\n");

                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Units: {}", state.units.len());
                if let Some(lock) = lock {
                    let _ = writeln!(
                        output,
                        "   Locked by {} ({}s left)",
                        lock.holder.yellow(),
                        lock.remaining_secs()
                    );
                }

                if !state.units.is_empty() {
                    let rows: Vec<UnitRow> = state
                        .units
                        .values()
                        .map(|u| UnitRow {
                            name: u.name.clone(),
                            id: u
                                .record
                                .id
                                .as_deref()
                                .map_or_else(|| String::from("-"), short_identity),
                            last_verb: u.last_verb.to_string(),
                            updated: u.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                            working_dir: Self::truncate(&u.record.working_dir, 40),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.verb,
                            entry.unit
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a resource schema.
    #[must_use]
    pub fn format_schema(&self, schema: &ResourceSchema) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(schema).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "\n{} (v{})\n{}\n\n",
                    schema.type_name.bold(),
                    schema.version,
                    schema.description
                );
                let rows: Vec<AttributeRow> = schema
                    .attributes
                    .iter()
                    .map(|a| AttributeRow {
                        name: a.name.to_string(),
                        kind: Self::debug_snake(&a.kind),
                        mode: Self::debug_snake(&a.mode),
                        description: a.description.to_string(),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, severity: Severity, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": severity, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => match severity {
                Severity::Error => format!("{} {message}", "✗".red()),
                Severity::Warning => format!("{} {message}", "⚠".yellow()),
            },
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "success", "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {message}", "✓".green()),
        }
    }

    /// Formats a diagnostic attached to `unit`.
    fn format_diagnostic(unit: &str, diagnostic: &Diagnostic) -> String {
        let label = match diagnostic.severity {
            Severity::Error => "Error".red().bold(),
            Severity::Warning => "Warning".yellow().bold(),
        };
        format!("{label} [{unit}] {}: {}", diagnostic.summary, diagnostic.detail)
    }

    /// Formats a verb with color.
    fn format_verb(verb: Verb) -> String {
        match verb {
            Verb::Create => "+create".green().to_string(),
            Verb::Update => "~update".yellow().to_string(),
            Verb::Delete => "-forget".red().to_string(),
            Verb::Read => "refresh".dimmed().to_string(),
            Verb::Import => "import".cyan().to_string(),
        }
    }

    /// Serialized (snake case) name of a schema enum.
    fn debug_snake<T: serde::Serialize>(value: &T) -> String {
        serde_json::to_value(value)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default()
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitConfig;
    use crate::planner::DiffEngine;
    use crate::resource::{apply_resource_schema, ApplyRecord};

    fn plan_and_diff() -> (ExecutionPlan, DiffResult) {
        let config = ProviderConfig {
            units: vec![UnitConfig {
                name: String::from("first"),
                working_dir: String::from("/srv/first"),
                args: vec![String::from("-var=x=2")],
            }],
            ..ProviderConfig::default()
        };
        let mut state = ProviderState::new();
        state.set_unit(
            "first",
            ApplyRecord::new("/srv/first", vec![String::from("-var=x=1")]).with_id("d1"),
            Verb::Create,
        );
        let diff = DiffEngine::new("/srv").compute_diff(&config, Some(&state));
        (ExecutionPlan::from_diff(&diff), diff)
    }

    #[test]
    fn test_plan_json() {
        let (plan, diff) = plan_and_diff();
        let out = OutputFormatter::new(OutputFormat::Json).format_plan(&plan, &diff, false);
        let json: serde_json::Value = serde_json::from_str(&out).expect("valid json");

        assert_eq!(json["plan"]["actions"][0]["verb"], "update");
        assert_eq!(json["diff"]["updates"], 1);
    }

    #[test]
    fn test_plan_text_detailed() {
        colored::control::set_override(false);
        let (plan, diff) = plan_and_diff();
        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&plan, &diff, true);

        assert!(out.contains("~update"));
        assert!(out.contains("args [\"-var=x=1\"] -> [\"-var=x=2\"]"));
        assert!(out.contains("0 to create, 1 to update"));
    }

    #[test]
    fn test_schema_text() {
        colored::control::set_override(false);
        let out = OutputFormatter::new(OutputFormat::Text).format_schema(&apply_resource_schema());

        assert!(out.contains("pteraform_apply"));
        assert!(out.contains("list_of_string"));
        assert!(out.contains("What directory to run `terraform apply` in."));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a-very-long-path", 8), "a-ver...");
    }
}
