//! Line diff between a running and a desired configuration.
//!
//! Lines are compared verbatim: indentation and trailing blanks count,
//! since they carry sub-context nesting on most device CLIs.

use similar::{Algorithm, DiffTag, TextDiff};
use std::fmt::Write;

use crate::models::ConfigText;

/// Unchanged lines kept around each change
pub const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Context,
    Addition,
    Deletion,
}

impl DiffKind {
    pub fn marker(self) -> char {
        match self {
            DiffKind::Context => ' ',
            DiffKind::Addition => '+',
            DiffKind::Deletion => '-',
        }
    }
}

/// One line of diff output. Line numbers are 1-based; `running_line` is
/// absent for additions and `desired_line` for deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub running_line: Option<usize>,
    pub desired_line: Option<usize>,
    pub text: String,
}

/// A run of changes with its surrounding context. Starts are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub running_start: usize,
    pub running_len: usize,
    pub desired_start: usize,
    pub desired_len: usize,
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub additions: usize,
    pub deletions: usize,
}

/// Group the differences between `running` and `desired` into hunks
pub fn hunks(running: &ConfigText, desired: &ConfigText) -> Vec<DiffHunk> {
    let old: Vec<&str> = running.lines().iter().map(String::as_str).collect();
    let new: Vec<&str> = desired.lines().iter().map(String::as_str).collect();

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old, &new);

    diff.grouped_ops(CONTEXT_RADIUS)
        .into_iter()
        .filter(|group| group.iter().any(|op| op.tag() != DiffTag::Equal))
        .filter_map(|group| {
            let first = group.first()?;
            let last = group.last()?;
            let running_start = first.old_range().start;
            let desired_start = first.new_range().start;

            let entries = group
                .iter()
                .flat_map(|op| diff.iter_changes(op))
                .map(|change| DiffEntry {
                    kind: match change.tag() {
                        similar::ChangeTag::Equal => DiffKind::Context,
                        similar::ChangeTag::Insert => DiffKind::Addition,
                        similar::ChangeTag::Delete => DiffKind::Deletion,
                    },
                    running_line: change.old_index().map(|i| i + 1),
                    desired_line: change.new_index().map(|i| i + 1),
                    text: change.to_string_lossy().into_owned(),
                })
                .collect();

            Some(DiffHunk {
                running_start,
                running_len: last.old_range().end - running_start,
                desired_start,
                desired_len: last.new_range().end - desired_start,
                entries,
            })
        })
        .collect()
}

/// Ordered diff entries; empty when both texts are identical
pub fn diff(running: &ConfigText, desired: &ConfigText) -> Vec<DiffEntry> {
    hunks(running, desired)
        .into_iter()
        .flat_map(|h| h.entries)
        .collect()
}

pub fn summarize(entries: &[DiffEntry]) -> DiffSummary {
    let mut summary = DiffSummary::default();
    for entry in entries {
        match entry.kind {
            DiffKind::Addition => summary.additions += 1,
            DiffKind::Deletion => summary.deletions += 1,
            DiffKind::Context => {}
        }
    }
    summary
}

/// Unified-diff text for `hunks`; empty string when there are no hunks
pub fn render_unified(hunks: &[DiffHunk], from_name: &str, to_name: &str) -> String {
    let mut out = String::new();
    if hunks.is_empty() {
        return out;
    }

    let _ = writeln!(out, "--- {}", from_name);
    let _ = writeln!(out, "+++ {}", to_name);
    for hunk in hunks {
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            format_range(hunk.running_start, hunk.running_len),
            format_range(hunk.desired_start, hunk.desired_len)
        );
        for entry in &hunk.entries {
            let _ = writeln!(out, "{}{}", entry.kind.marker(), entry.text);
        }
    }
    out
}

/// `start,len` in 1-based unified-diff notation
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}
