//! Run orchestration - from command line to finished report

use anyhow::Result;
use convergence::{
    AutoConfirm, ConfirmCallback, ExecuteOptions, FailurePolicy, Frontend, Goal, GoalRegistry,
    NoProgress, NodeId, RunReport, Workspace, execute,
};
use std::time::Duration;

use super::differ;
use crate::cli::Cli;
use crate::config::{self, Settings, Terracefile};
use crate::paths;
use crate::resource::KindRegistry;
use crate::ui::{self, Console, Prompt};

const DEFAULT_JOBS: usize = 4;

/// How a run ended
#[derive(Debug)]
pub enum Outcome {
    /// The goal ran; the report may still contain failures
    Applied(RunReport),
    /// Nothing to do
    NoChanges(RunReport),
    /// The user declined the plan
    Declined,
}

/// Entry point for `terrace [SELECTOR ...] GOAL`
pub fn run(cli: &Cli) -> Result<()> {
    let path = paths::locate(cli.file.as_deref())?;
    let file = Terracefile::load(&path)?;
    log::debug!(
        "Loaded {} resources from {}: {:?}",
        file.resources.len(),
        path.display(),
        config::kind_counts(&file)
    );

    let kinds = KindRegistry::with_builtins();
    let workspace = file.build(&kinds, &paths::base_dir(&path))?;

    let goals = GoalRegistry::with_builtins();
    let goal = goals.get(cli.goal())?;
    let roots = select_roots(&workspace, cli.selectors())?;
    let opts = options(&file.settings, cli);

    let console = Console::new(cli.quiet || cli.json, cli.verbose > 0);
    let mut confirm: Box<dyn ConfirmCallback> = if cli.unattended {
        Box::new(AutoConfirm)
    } else {
        Box::new(Prompt)
    };

    let outcome = converge(
        &workspace,
        goal,
        &roots,
        &opts,
        confirm.as_mut(),
        &console,
        !cli.unattended,
    )?;
    finish(outcome, cli.json)
}

/// The selected nodes, or every node when no selectors are given
pub fn select_roots(workspace: &Workspace, selectors: &[String]) -> Result<Vec<NodeId>> {
    if selectors.is_empty() {
        return Ok(workspace.graph().ids().collect());
    }
    let roots = workspace.selector()?.find_required(selectors)?;
    log::debug!("Selected {} resources with {:?}", roots.len(), selectors);
    Ok(roots)
}

/// Merge Terracefile settings with command-line flags; flags win
pub fn options(settings: &Settings, cli: &Cli) -> ExecuteOptions {
    let jobs = cli.jobs.or(settings.jobs).unwrap_or(DEFAULT_JOBS).max(1);
    let base = if cli.serial || settings.serial {
        ExecuteOptions::serial()
    } else {
        ExecuteOptions::parallel(jobs)
    };
    let policy = if cli.fail_fast || settings.fail_fast {
        FailurePolicy::Halt
    } else {
        FailurePolicy::Continue
    };
    let deadline = cli.timeout.or(settings.timeout_secs).map(Duration::from_secs);

    let mut opts = base
        .dry_run(cli.dry_run)
        .failure_policy(policy)
        .deadline(deadline);
    opts.verbose = cli.verbose > 0;
    opts
}

/// Run `goal`, previewing and confirming first when interactive
///
/// The preview is a dry run of the same goal over the same roots, so it
/// lists exactly the actions the real run would plan.
pub fn converge(
    workspace: &Workspace,
    goal: &Goal,
    roots: &[NodeId],
    opts: &ExecuteOptions,
    confirm: &mut dyn ConfirmCallback,
    frontend: &dyn Frontend,
    interactive: bool,
) -> Result<Outcome> {
    if goal.mutating && interactive && !opts.dry_run {
        let preview_opts = opts.clone().dry_run(true);
        let preview = execute(
            workspace.graph(),
            workspace,
            goal,
            roots,
            &preview_opts,
            &NoProgress,
        )?;

        // Planning failures are reported without asking
        if !preview.is_success() {
            return Ok(Outcome::Applied(preview));
        }
        if !preview.has_changes() {
            return Ok(Outcome::NoChanges(preview));
        }

        differ::display_plan(&preview);
        if !confirm.confirm(&format!("Run {} on these resources?", goal.name))? {
            return Ok(Outcome::Declined);
        }
    }

    let report = execute(workspace.graph(), workspace, goal, roots, opts, frontend)?;
    if report.is_success() && !report.has_changes() {
        return Ok(Outcome::NoChanges(report));
    }
    Ok(Outcome::Applied(report))
}

fn finish(outcome: Outcome, json: bool) -> Result<()> {
    match outcome {
        Outcome::Declined => {
            println!();
            ui::warn("Aborted");
            Ok(())
        }
        Outcome::NoChanges(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                ui::success("no changes");
            }
            Ok(())
        }
        Outcome::Applied(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                differ::print_summary(&report);
            }
            report.into_result()?;
            Ok(())
        }
    }
}
