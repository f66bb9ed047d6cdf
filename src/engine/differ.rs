//! Plan preview and run summary display

use colored::Colorize;
use convergence::{NodeOutcome, RunReport};

use crate::ui;

/// Resources that would change, with their action descriptions
///
/// The first line of each description is the action summary; the rest are
/// detail lines (field diffs, content diffs) that are already indented.
pub fn plan_lines(report: &RunReport) -> Vec<(String, Vec<Vec<String>>)> {
    report
        .nodes
        .iter()
        .filter(|node| !node.actions.is_empty())
        .map(|node| (node.label.clone(), node.actions.clone()))
        .collect()
}

/// Display the actions a dry run planned
pub fn display_plan(report: &RunReport) {
    let changes = plan_lines(report);

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        format!("Plan: {}", report.goal).bold()
    );
    println!("│");

    for (label, actions) in &changes {
        println!("│ {}", label.bold());
        for description in actions {
            let mut lines = description.iter();
            if let Some(summary) = lines.next() {
                println!("│   {} {}", "~".yellow(), summary);
            }
            for detail in lines {
                println!("│   {}", detail.dimmed());
            }
        }
        println!("│");
    }

    let failed: Vec<_> = report
        .nodes
        .iter()
        .filter(|node| node.outcome.is_failed())
        .collect();
    for node in &failed {
        if let NodeOutcome::Failed { error } = &node.outcome {
            println!("│ {} {}: {}", "✗".red(), node.label, error);
        }
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} actions across {} resources",
        report.action_count().to_string().bold(),
        changes.len().to_string().bold()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// One line per failed or skipped node, naming the error or the failure
/// that caused the skip
pub fn problem_lines(report: &RunReport) -> Vec<String> {
    report
        .nodes
        .iter()
        .filter(|node| !node.outcome.is_done())
        .map(|node| ui::outcome_line(&node.label, &node.outcome))
        .collect()
}

/// Print the final summary of a run
pub fn print_summary(report: &RunReport) {
    let changed = report
        .nodes
        .iter()
        .filter(|node| matches!(node.outcome, NodeOutcome::Done { actions } if actions > 0))
        .count();
    let unchanged = report.done() - changed;

    println!();
    if report.is_success() {
        println!("  {} {} completed", "✓".green().bold(), report.goal);
    } else {
        println!("  {} {} completed with errors", "⚠".yellow().bold(), report.goal);
    }

    if changed > 0 {
        let verb = if report.dry_run { "would change" } else { "changed" };
        println!("    • {changed} resources {verb}");
    }
    if unchanged > 0 {
        println!("    • {unchanged} resources already up to date");
    }
    if report.skipped() > 0 {
        println!("    • {} resources skipped", report.skipped());
    }
    if report.failed() > 0 {
        println!("    • {} {} failed", report.failed(), "resources".red());
    }

    for (node, line) in report
        .nodes
        .iter()
        .filter(|node| !node.outcome.is_done())
        .zip(problem_lines(report))
    {
        let symbol = if node.outcome.is_failed() {
            "✗".red()
        } else {
            "⊘".yellow()
        };
        println!("      {symbol} {line}");
    }
}
