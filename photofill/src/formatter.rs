//! Console output for a finished run

use anyhow::Result;
use colored::*;
use photofill_core::pipeline::Skip;
use photofill_core::{FillOutcome, SkipReason};

/// Print the run summary with colors
pub fn print_human(outcome: &FillOutcome) {
    let summary = &outcome.summary;
    println!(
        "{} {}",
        "Done. Written:".green().bold(),
        summary.written.to_string().bold()
    );

    if !summary.skipped.is_empty() {
        println!("{}", "Skipped:".yellow().bold());
        for skip in &summary.skipped {
            println!("{}", skip_line(skip));
        }
    }

    println!("{} {}", "Saved to:".bold(), outcome.output.display());
}

fn skip_line(skip: &Skip) -> String {
    let entry = &skip.entry;
    let reason = match skip.reason {
        SkipReason::SheetNotFound { .. } => skip.reason.to_string().red(),
        _ => skip.reason.to_string().normal(),
    };
    format!(
        "  - {} | {} / Q{}: {}",
        entry.category.to_string().cyan(),
        entry.location(),
        entry.qnum,
        reason
    )
}

/// Print the run summary as JSON
pub fn print_json(outcome: &FillOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&json_summary(outcome))?);
    Ok(())
}

fn json_summary(outcome: &FillOutcome) -> serde_json::Value {
    let skipped: Vec<_> = outcome
        .summary
        .skipped
        .iter()
        .map(|skip| {
            serde_json::json!({
                "category": skip.entry.category,
                "block": skip.entry.block.to_string(),
                "level": skip.entry.level,
                "side": skip.entry.side,
                "question": skip.entry.qnum,
                "count": skip.entry.count,
                "reason": skip.reason.to_string(),
                "kind": skip.reason.kind(),
            })
        })
        .collect();

    serde_json::json!({
        "written": outcome.summary.written,
        "skipped": skipped,
        "output": outcome.output.display().to_string(),
    })
}
