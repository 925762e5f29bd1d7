// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal colors for job views.
//!
//! Colors follow the state being shown rather than the words used to show
//! it: a [`Tone`] is derived from a job, a stage visit or a worker, then
//! painted onto whatever label the view prints.

use std::io::IsTerminal;

use rj_core::{Job, JobStatus, StageOutcome};
use rj_runner::WorkerStatus;

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Finished cleanly (green)
    Done,
    /// In flight or waiting on someone (yellow)
    Active,
    /// Failed, cancelled or gone (red)
    Broken,
    /// Ids and timestamps (dark grey)
    Muted,
    /// Field names in detail views (grey)
    Label,
    /// Section and column headings (steel blue)
    Heading,
}

impl Tone {
    fn escape(self) -> &'static str {
        match self {
            Tone::Done => "\x1b[32m",
            Tone::Active => "\x1b[33m",
            Tone::Broken => "\x1b[31m",
            Tone::Muted => "\x1b[38;5;240m",
            Tone::Label => "\x1b[38;5;245m",
            Tone::Heading => "\x1b[38;5;74m",
        }
    }

    /// A completed job reads as active until its post-processing settles.
    /// Failed post-processing does not make the job itself broken.
    pub fn of_job(job: &Job) -> Self {
        match job.status {
            JobStatus::Completed => match job.feedback_status {
                Some(feedback) if !feedback.is_settled() => Tone::Active,
                _ => Tone::Done,
            },
            JobStatus::Failed | JobStatus::Cancelled => Tone::Broken,
            _ => Tone::Active,
        }
    }

    pub fn of_outcome(outcome: &StageOutcome) -> Self {
        match outcome {
            StageOutcome::Completed => Tone::Done,
            StageOutcome::Running | StageOutcome::Suspended => Tone::Active,
            StageOutcome::Failed(_) => Tone::Broken,
        }
    }

    pub fn of_worker(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Running => Tone::Active,
            WorkerStatus::Completed => Tone::Done,
            WorkerStatus::Failed | WorkerStatus::NotFound => Tone::Broken,
        }
    }

    pub fn of_verdict(allowed: bool) -> Self {
        if allowed {
            Tone::Done
        } else {
            Tone::Broken
        }
    }
}

/// `NO_COLOR=1` disables, `COLOR=1` forces, otherwise color only a TTY.
pub fn should_colorize() -> bool {
    if crate::env::no_color() {
        return false;
    }
    if crate::env::force_color() {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Wrap `text` in the tone's escape codes. The caller has decided color
/// is on.
pub(crate) fn apply(text: &str, tone: Tone) -> String {
    format!("{}{}{}", tone.escape(), text, RESET)
}

/// [`apply`] when stdout is colored, else `text` unchanged.
pub fn paint(text: &str, tone: Tone) -> String {
    if should_colorize() {
        apply(text, tone)
    } else {
        text.to_string()
    }
}

pub fn header(text: &str) -> String {
    paint(text, Tone::Heading)
}

pub fn label(text: &str) -> String {
    paint(text, Tone::Label)
}

pub fn muted(text: &str) -> String {
    paint(text, Tone::Muted)
}

#[cfg(test)]
#[path = "color_tests.rs"]
mod tests;
