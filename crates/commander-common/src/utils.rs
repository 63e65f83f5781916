//! Shared utility functions for formatting and log hygiene.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::Write as _;

/// Matches absolute file-system paths (unix or windows) and captures the file name.
///
/// Directory names may contain inner spaces; the file name may not.
static ABSOLUTE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?m)(^|[\s"'(])(?:[A-Za-z]:)?[/\\]"#,
        r#"(?:[^/\\\s:"'()](?:[^/\\:"'()\r\n]*[^/\\\s:"'()])?[/\\])*"#,
        r#"([^/\\\s:"'()]+)"#,
    ))
    .expect("absolute path pattern is valid")
});

/// Formats a timestamp for display.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Truncates a string to a maximum number of characters with ellipsis.
pub fn truncate_string(input: &str, max_length: usize) -> String {
    if input.chars().count() <= max_length {
        input.to_string()
    } else {
        let kept: String = input.chars().take(max_length.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Shortens every absolute path in `text` to its bare file name.
pub fn sanitize_stacktrace(text: &str) -> String {
    ABSOLUTE_PATH.replace_all(text, "${1}${2}").into_owned()
}

/// Renders an error and its source chain.
///
/// The result is passed through [`sanitize_stacktrace`] before being returned.
pub fn format_error_report(error: &(dyn Error + 'static)) -> String {
    let mut report = error.to_string();

    let mut source = error.source();
    if source.is_some() {
        report.push_str("\n\nCaused by:");
        let mut depth = 0;
        while let Some(cause) = source {
            let _ = write!(report, "\n    {depth}: {cause}");
            depth += 1;
            source = cause.source();
        }
    }

    sanitize_stacktrace(&report)
}
