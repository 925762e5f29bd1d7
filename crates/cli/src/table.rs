// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job list table for `rj list`.
//!
//! Column widths come from the data and the last column is never padded.
//! Color is applied after padding so escape codes don't skew alignment.

use std::io::{self, Write};

use rj_core::{Job, JobStatus};

use crate::color::{self, Tone};
use crate::output::format_time_ago;

/// Column separator
const SEP: &str = "  ";

/// Ids are shown by their first eight characters.
const ID_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobColumn {
    Id,
    Owner,
    Stage,
    Updated,
    Retries,
    Status,
}

impl JobColumn {
    fn header(self) -> &'static str {
        match self {
            JobColumn::Id => "ID",
            JobColumn::Owner => "OWNER",
            JobColumn::Stage => "STAGE",
            JobColumn::Updated => "UPDATED",
            JobColumn::Retries => "RETRIES",
            JobColumn::Status => "STATUS",
        }
    }

    fn right_aligned(self) -> bool {
        self == JobColumn::Retries
    }

    fn cell(self, job: &Job) -> Cell {
        match self {
            JobColumn::Id => Cell {
                text: job.id.as_str().chars().take(ID_WIDTH).collect(),
                tone: Some(Tone::Muted),
            },
            JobColumn::Owner => Cell::plain(job.owner.to_string()),
            JobColumn::Stage => Cell::plain(stage_cell(job)),
            JobColumn::Updated => Cell::plain(format_time_ago(job.updated_at_ms)),
            JobColumn::Retries => Cell::plain(format!("{}/{}", job.retry_count, job.max_retries)),
            JobColumn::Status => Cell {
                text: status_cell(job),
                tone: Some(Tone::of_job(job)),
            },
        }
    }
}

struct Cell {
    text: String,
    tone: Option<Tone>,
}

impl Cell {
    fn plain(text: String) -> Self {
        Self { text, tone: None }
    }

    fn width(&self) -> usize {
        self.text.chars().count()
    }
}

/// Where the job is, or where it stopped. Post-processing stages of a
/// completed job are marked as such; jobs with nothing running show `-`.
pub fn stage_cell(job: &Job) -> String {
    match job.status {
        JobStatus::Failed | JobStatus::Cancelled => job.failed_stage.map(|s| s.to_string()),
        JobStatus::Completed => job.current_stage().map(|s| format!("{s} (feedback)")),
        _ => job.current_stage().map(|s| s.to_string()),
    }
    .unwrap_or_else(|| "-".to_string())
}

/// Status with the post-processing sub-status when present.
pub fn status_cell(job: &Job) -> String {
    match job.feedback_status {
        Some(feedback) => format!("{} (feedback: {})", job.status, feedback),
        None => job.status.to_string(),
    }
}

pub struct JobTable {
    columns: Vec<JobColumn>,
    rows: Vec<Vec<Cell>>,
}

impl JobTable {
    /// RETRIES only appears when some job has been retried.
    pub fn new(jobs: &[Job]) -> Self {
        let mut columns = vec![
            JobColumn::Id,
            JobColumn::Owner,
            JobColumn::Stage,
            JobColumn::Updated,
        ];
        if jobs.iter().any(|j| j.retry_count > 0) {
            columns.push(JobColumn::Retries);
        }
        columns.push(JobColumn::Status);

        let rows = jobs
            .iter()
            .map(|job| columns.iter().map(|col| col.cell(job)).collect())
            .collect();
        Self { columns, rows }
    }

    /// Header plus one line per job. Nothing is written for an empty table.
    pub fn render(&self, out: &mut impl Write, colorize: bool) -> io::Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let widths = self.widths();
        let last = self.columns.len() - 1;
        let paint = |text: String, tone: Option<Tone>| match tone {
            Some(tone) if colorize => color::apply(&text, tone),
            _ => text,
        };

        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let text = pad(col.header(), widths[i], *col, i == last);
                paint(text, Some(Tone::Heading))
            })
            .collect();
        writeln!(out, "{}", header.join(SEP))?;

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&self.columns)
                .enumerate()
                .map(|(i, (cell, col))| {
                    paint(pad(&cell.text, widths[i], *col, i == last), cell.tone)
                })
                .collect();
            writeln!(out, "{}", cells.join(SEP))?;
        }
        Ok(())
    }

    fn widths(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i).map(Cell::width))
                    .fold(col.header().len(), usize::max)
            })
            .collect()
    }
}

/// Pad to `width` by character count. A left-aligned last column is left
/// as is so lines carry no trailing spaces.
fn pad(text: &str, width: usize, col: JobColumn, last: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.chars().count()));
    if col.right_aligned() {
        format!("{fill}{text}")
    } else if last {
        text.to_string()
    } else {
        format!("{text}{fill}")
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
