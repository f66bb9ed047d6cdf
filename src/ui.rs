use colored::{ColoredString, Colorize};
use convergence::{ConfirmCallback, Frontend, Goal, NodeId, NodeOutcome, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

fn symbol(outcome: &NodeOutcome) -> ColoredString {
    match outcome {
        NodeOutcome::Done { actions: 0 } => "○".dimmed(),
        NodeOutcome::Done { .. } => "✓".green(),
        NodeOutcome::Failed { .. } => "✗".red(),
        NodeOutcome::Skipped { .. } => "⊘".yellow(),
    }
}

/// One line per finished node, without the status symbol
pub fn outcome_line(label: &str, outcome: &NodeOutcome) -> String {
    match outcome {
        NodeOutcome::Done { actions: 0 } => format!("{label} (no changes)"),
        NodeOutcome::Done { actions: 1 } => format!("{label} (1 action)"),
        NodeOutcome::Done { actions } => format!("{label} ({actions} actions)"),
        NodeOutcome::Failed { error } => format!("{label}: {error}"),
        NodeOutcome::Skipped { reason } => format!("{label} skipped: {reason}"),
    }
}

/// Console frontend: a progress bar plus one line per finished node
///
/// Lines are printed through `ProgressBar::suspend` so they never tear the
/// bar, whichever worker thread reports them.
pub struct Console {
    bar: ProgressBar,
    quiet: bool,
    verbose: bool,
    show_actions: AtomicBool,
}

impl Console {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
            );
            bar
        };
        Self {
            bar,
            quiet,
            verbose,
            show_actions: AtomicBool::new(false),
        }
    }

    fn print(&self, line: String) {
        if !self.quiet {
            self.bar.suspend(|| println!("{line}"));
        }
    }
}

impl Frontend for Console {
    fn on_run_start(&self, goal: &Goal, total: usize, dry_run: bool) {
        // Read-only goals exist to print their action lines
        self.show_actions
            .store(self.verbose || dry_run || !goal.mutating, Ordering::Relaxed);
        self.bar.set_length(total as u64);
        self.bar.set_message(goal.name.clone());
        if dry_run {
            self.print(format!("{} Dry run - no changes will be made", "ℹ".blue()));
        }
    }

    fn on_node_start(&self, _node: NodeId, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn on_action(&self, _node: NodeId, label: &str, description: &[String]) {
        log::info!("{label}: {}", description.first().map_or("", String::as_str));
        if !self.show_actions.load(Ordering::Relaxed) {
            return;
        }
        for line in description {
            self.print(format!("    {}", line.dimmed()));
        }
    }

    fn on_node_complete(&self, _node: NodeId, label: &str, outcome: &NodeOutcome) {
        self.bar.inc(1);
        self.print(format!("  {} {}", symbol(outcome), outcome_line(label, outcome)));
    }

    fn on_run_finish(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}

/// Interactive confirmation through a terminal prompt
pub struct Prompt;

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        use anyhow::Context;
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Confirmation needs a terminal (use --unattended to skip it)")?;

        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convergence::{Graph, SkipReason};

    #[test]
    fn test_outcome_line_done() {
        assert_eq!(
            outcome_line("directory 'app'", &NodeOutcome::Done { actions: 0 }),
            "directory 'app' (no changes)"
        );
        assert_eq!(
            outcome_line("directory 'app'", &NodeOutcome::Done { actions: 1 }),
            "directory 'app' (1 action)"
        );
        assert_eq!(
            outcome_line("directory 'app'", &NodeOutcome::Done { actions: 3 }),
            "directory 'app' (3 actions)"
        );
    }

    #[test]
    fn test_outcome_line_failed_and_skipped() {
        let failed = NodeOutcome::Failed {
            error: "permission denied".into(),
        };
        assert_eq!(
            outcome_line("file 'motd'", &failed),
            "file 'motd': permission denied"
        );

        let skipped = NodeOutcome::Skipped {
            reason: SkipReason::DeadlineExceeded,
        };
        assert_eq!(
            outcome_line("file 'motd'", &skipped),
            "file 'motd' skipped: deadline exceeded"
        );
    }

    #[test]
    fn test_quiet_console_accepts_notifications() {
        let mut graph = Graph::new();
        let app = graph.add_node("directory", Some("app".into()));
        let console = Console::new(true, false);
        let goal = Goal::describe();
        console.on_run_start(&goal, 2, false);
        assert!(console.show_actions.load(Ordering::Relaxed));
        console.on_node_complete(
            app,
            "directory 'app'",
            &NodeOutcome::Done { actions: 1 },
        );
        assert_eq!(console.bar.position(), 1);
    }
}
