// Human and JSON rendering of command results

use crate::OutputFormat;
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use glueform_core::{ActionKind, ApplyReport, OutcomeStatus, Plan};
use glueform_etl::{Snapshot, TableDescription};
use serde_json::json;
use std::fmt::Write;

pub(crate) fn print_plan(plan: &Plan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print!("{}", render_plan(plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
    }
    Ok(())
}

pub(crate) fn print_report(report: &ApplyReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print!("{}", render_report(report)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "summary": report.summary(),
                "outcomes": report.outcomes,
            }))?
        ),
    }
    Ok(())
}

pub(crate) fn print_preview(
    description: &TableDescription,
    batch: &RecordBatch,
    snapshots: &[Snapshot],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{description}");
            println!("{}", pretty_format_batches(std::slice::from_ref(batch))?);
            println!("{} snapshot(s)", snapshots.len());
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "description": description,
                "row_count": batch.num_rows(),
                "snapshots": snapshots,
            }))?
        ),
    }
    Ok(())
}

pub(crate) fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for action in &plan.actions {
        let marker = match action.kind {
            ActionKind::Create => '+',
            ActionKind::Update => '~',
            ActionKind::Noop => '=',
        };
        let _ = writeln!(out, "  {marker} {:<7} {}", action.kind.to_string(), action.resource);
        for change in &action.changes {
            let _ = writeln!(
                out,
                "        {}: {} -> {}",
                change.key,
                change.observed.as_deref().unwrap_or("(unset)"),
                change.desired
            );
        }
    }

    if plan.is_noop() {
        out.push_str("\nNo changes. Remote state matches the configuration.\n");
    } else {
        let _ = writeln!(
            out,
            "\nPlan: {} to create, {} to update, {} unchanged.",
            plan.count(ActionKind::Create),
            plan.count(ActionKind::Update),
            plan.count(ActionKind::Noop)
        );
    }
    out
}

fn render_report(report: &ApplyReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let marker = match outcome.status {
            OutcomeStatus::Created | OutcomeStatus::Updated => "ok",
            OutcomeStatus::Unchanged => "--",
            OutcomeStatus::Failed { .. } => "!!",
            OutcomeStatus::Blocked { .. } => "..",
        };
        let _ = writeln!(
            out,
            "  {marker} {:<40} {}",
            outcome.resource.to_string(),
            outcome.status
        );
    }
    let _ = writeln!(out, "\nApply: {}.", report.summary());
    out
}
