use std::fmt::Write as _;

use crate::spool::job::{Job, JobState};
use crate::spool::store::JobStore;

/// Renders the human-readable job table: a header, one row per active
/// job, then one row per finished job (those also show the exit code).
pub fn render(store: &JobStore) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4}{:<10}{:<20}{:<8}{:<37}",
        "ID", "State", "Output", "E-Level", "Command"
    );

    for job in store.active() {
        let _ = writeln!(
            out,
            "{:<4}{:<10}{:<20}{:<8}{:<37}",
            job.id,
            job.state,
            output_descriptor(job),
            "",
            job.command
        );
    }

    for job in store.finished() {
        let _ = writeln!(
            out,
            "{:<4}{:<10}{:<20}{:<8}{:<37}",
            job.id,
            job.state,
            output_descriptor(job),
            job.exit_code.unwrap_or(-1),
            job.command
        );
    }

    out
}

fn output_descriptor(job: &Job) -> String {
    if !job.store_output {
        return "stdout".to_string();
    }
    match job.state {
        JobState::Queued => "(file)".to_string(),
        // A running job may not have its path attached yet; that window
        // is a legal transient, not an error.
        JobState::Running => job
            .output_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(...)".to_string()),
        JobState::Finished => job
            .output_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string()),
    }
}
