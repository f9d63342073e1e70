//! CLI output formatting and the interactive confirmation prompt.
//!
//! # Output Format
//!
//! ## Update
//!
//! ```text
//! Updating album: dogs (3 photos, 1 to regenerate)
//!     dog-3.jpg
//!         large/dog-3_1600x1040.jpg
//!         small/dog-3_800x520.jpg
//!         thumb/dog-3_256x256.jpg
//!     Markdown: markdown/dogs.md
//!     Manifest: dogs/album.yml
//! dogs: 1 added, 0 removed, 1 regenerated
//! All albums updated.
//! ```
//!
//! ## Clean
//!
//! ```text
//! dogs: removed markdown/dogs.md, output/dogs
//! cats: nothing to remove
//! All albums cleaned.
//! ```
//!
//! Each `format_*` function returns `Vec<String>` and does no I/O. The
//! prompt reads from any `BufRead` so tests can script the answers.

use crate::album::{SyncEvent, UpdateReport};
use crate::workspace::CleanOutcome;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Indentation: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `base` when it lies below it.
fn display_path(path: &Path, base: Option<&Path>) -> String {
    base.and_then(|b| path.strip_prefix(b).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Update output
// ============================================================================

/// Format a single update progress event as display lines.
///
/// Paths are shown relative to `base` (usually the workspace root).
pub fn format_sync_event(event: &SyncEvent, base: Option<&Path>) -> Vec<String> {
    match event {
        SyncEvent::AlbumStarted {
            album,
            photos,
            stale,
        } => vec![format!(
            "Updating album: {album} ({photos} photos, {stale} to regenerate)"
        )],
        SyncEvent::PhotoRegenerated {
            file, derivatives, ..
        } => {
            let mut lines = vec![format!("{}{file}", indent(1))];
            lines.extend(
                derivatives
                    .iter()
                    .map(|d| format!("{}{}", indent(2), display_path(d, base))),
            );
            lines
        }
        SyncEvent::MarkdownWritten { path, .. } => {
            vec![format!("{}Markdown: {}", indent(1), display_path(path, base))]
        }
        SyncEvent::ManifestWritten { path, .. } => {
            vec![format!("{}Manifest: {}", indent(1), display_path(path, base))]
        }
    }
}

/// One summary line per album.
pub fn format_update_report(report: &UpdateReport) -> String {
    format!(
        "{}: {} added, {} removed, {} regenerated",
        report.album,
        report.added.len(),
        report.removed.len(),
        report.regenerated.len()
    )
}

// ============================================================================
// Clean output
// ============================================================================

pub fn format_clean_outcome(outcome: &CleanOutcome, base: Option<&Path>) -> String {
    match outcome {
        CleanOutcome::NothingToRemove { album } => format!("{album}: nothing to remove"),
        CleanOutcome::Declined { album } => format!("{album}: skipped"),
        CleanOutcome::Unreadable { album } => format!("{album}: manifest unreadable, skipped"),
        CleanOutcome::Removed { album, paths } => {
            let listed: Vec<String> = paths.iter().map(|p| display_path(p, base)).collect();
            format!("{album}: removed {}", listed.join(", "))
        }
    }
}

// ============================================================================
// Confirmation prompt
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// The user asked to stop the whole run.
    Quit,
}

/// Interpret one line of user input. `None` means ask again.
///
/// `q` quits, `y`/`yes` and `n`/`no` are case-insensitive, and an empty
/// line takes the default.
pub fn parse_answer(input: &str, default: bool) -> Option<Answer> {
    let input = input.trim();
    if input == "q" {
        return Some(Answer::Quit);
    }
    match input.to_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Yes),
        "n" | "no" => Some(Answer::No),
        "" if default => Some(Answer::Yes),
        "" => Some(Answer::No),
        _ => None,
    }
}

/// Ask `question` until a valid answer arrives. End of input declines.
pub fn ask_yes_no(
    question: &str,
    default: bool,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<Answer> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(out, "{question} {hint} ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Answer::No);
        }
        if let Some(answer) = parse_answer(&line, default) {
            return Ok(answer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // =========================================================================
    // Event formatting
    // =========================================================================

    #[test]
    fn album_started_line() {
        let event = SyncEvent::AlbumStarted {
            album: "dogs".into(),
            photos: 3,
            stale: 1,
        };
        assert_eq!(
            format_sync_event(&event, None),
            vec!["Updating album: dogs (3 photos, 1 to regenerate)"]
        );
    }

    #[test]
    fn photo_regenerated_lists_derivatives_relative_to_base() {
        let base = PathBuf::from("/site");
        let event = SyncEvent::PhotoRegenerated {
            album: "dogs".into(),
            file: "dog-1.jpg".into(),
            derivatives: vec![
                base.join("output/dogs/large/dog-1_1600x1040.jpg"),
                base.join("output/dogs/coverimage.jpg"),
            ],
        };
        let lines = format_sync_event(&event, Some(&base));
        assert_eq!(lines[0], "    dog-1.jpg");
        assert_eq!(lines[1], "        output/dogs/large/dog-1_1600x1040.jpg");
        assert_eq!(lines[2], "        output/dogs/coverimage.jpg");
    }

    #[test]
    fn path_outside_base_shown_in_full() {
        let event = SyncEvent::MarkdownWritten {
            album: "dogs".into(),
            path: PathBuf::from("/elsewhere/dogs.md"),
        };
        let lines = format_sync_event(&event, Some(Path::new("/site")));
        assert_eq!(lines, vec!["    Markdown: /elsewhere/dogs.md"]);
    }

    #[test]
    fn report_summary_counts() {
        let report = UpdateReport {
            album: "dogs".into(),
            added: vec!["dog-3.jpg".into()],
            removed: vec![],
            regenerated: vec!["dog-3.jpg".into(), "dog-1.jpg".into()],
        };
        assert_eq!(
            format_update_report(&report),
            "dogs: 1 added, 0 removed, 2 regenerated"
        );
    }

    #[test]
    fn clean_outcomes() {
        let base = PathBuf::from("/site");
        let removed = CleanOutcome::Removed {
            album: "dogs".into(),
            paths: vec![base.join("markdown/dogs.md"), base.join("output/dogs")],
        };
        assert_eq!(
            format_clean_outcome(&removed, Some(&base)),
            "dogs: removed markdown/dogs.md, output/dogs"
        );
        let nothing = CleanOutcome::NothingToRemove { album: "cats".into() };
        assert_eq!(format_clean_outcome(&nothing, None), "cats: nothing to remove");
        let unreadable = CleanOutcome::Unreadable { album: "birds".into() };
        assert_eq!(
            format_clean_outcome(&unreadable, None),
            "birds: manifest unreadable, skipped"
        );
    }

    // =========================================================================
    // Prompt
    // =========================================================================

    #[test]
    fn parse_answer_variants() {
        assert_eq!(parse_answer("y\n", false), Some(Answer::Yes));
        assert_eq!(parse_answer("YES", false), Some(Answer::Yes));
        assert_eq!(parse_answer("No", true), Some(Answer::No));
        assert_eq!(parse_answer("q", true), Some(Answer::Quit));
        assert_eq!(parse_answer("maybe", true), None);
    }

    #[test]
    fn empty_answer_takes_default() {
        assert_eq!(parse_answer("\n", true), Some(Answer::Yes));
        assert_eq!(parse_answer("", false), Some(Answer::No));
    }

    #[test]
    fn ask_repeats_until_valid() {
        let mut input = "what\nsure\nn\n".as_bytes();
        let mut out = Vec::new();
        let answer = ask_yes_no("Remove?", true, &mut input, &mut out).unwrap();
        assert_eq!(answer, Answer::No);
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("Remove? [Y/n] ").count(), 3);
    }

    #[test]
    fn ask_at_end_of_input_declines() {
        let mut input = "".as_bytes();
        let mut out = Vec::new();
        let answer = ask_yes_no("Remove?", true, &mut input, &mut out).unwrap();
        assert_eq!(answer, Answer::No);
        assert!(String::from_utf8(out).unwrap().contains("[Y/n]"));
    }
}
