use serde::Serialize;

use crate::contract::FileId;

/// Outcome counters of one run. Skipped files count toward neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub successes: usize,
    pub errors: usize,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub tally: RunTally,
    pub skipped: usize,
    pub discovered: usize,
    pub attachments: Option<FileId>,
    pub message: String,
}

pub fn pluralize(count: usize) -> &'static str {
    if count == 1 {
        "file"
    } else {
        "files"
    }
}

/// Final status line. Failed files are reported as "skipped".
pub fn summary_message(tally: &RunTally) -> String {
    format!(
        "Converted {} {}, skipped {} {}",
        tally.successes,
        pluralize(tally.successes),
        tally.errors,
        pluralize(tally.errors)
    )
}
