use dojo_harness_core::ProcessOutput;
use std::fmt;

/// Substrings that mark a run as noisy, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMarker {
    Warn,
    Error,
}

impl FailureMarker {
    pub const ALL: [FailureMarker; 2] = [FailureMarker::Warn, FailureMarker::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMarker::Warn => "warn",
            FailureMarker::Error => "error",
        }
    }
}

impl fmt::Display for FailureMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First marker found in the lowercased text. Plain substring match, so
/// "warning", "errors.log" and "no_error_here" all count.
pub fn find_failure_marker(text: &str) -> Option<FailureMarker> {
    let lowered = text.to_lowercase();
    FailureMarker::ALL
        .into_iter()
        .find(|marker| lowered.contains(marker.as_str()))
}

/// Panics with `full_output_to_print` when `text` mentions "warn" or "error".
#[track_caller]
pub fn assert_no_warnings_or_errors(text: &str, full_output_to_print: &str) {
    assert!(
        find_failure_marker(text).is_none(),
        "{}",
        full_output_to_print
    );
}

/// Checks stderr of a finished run, printing both streams on failure.
#[track_caller]
pub fn assert_clean_stderr(output: &ProcessOutput) {
    assert_no_warnings_or_errors(&output.stderr, &output.combined());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dojo_harness_core::LaunchMode;

    fn create_test_output(stdout: &str, stderr: &str) -> ProcessOutput {
        let now = Utc::now();
        ProcessOutput {
            program: "/project/bin/dojo".to_string(),
            args: vec![],
            mode: LaunchMode::Direct,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 0,
            started_at: now,
            completed_at: now,
        }
    }

    #[test]
    fn test_clean_text_passes() {
        assert_no_warnings_or_errors("All good.", "full output");
        assert_no_warnings_or_errors("", "full output");
    }

    #[test]
    #[should_panic(expected = "full output")]
    fn test_warning_panics_with_full_output() {
        assert_no_warnings_or_errors("Warning: low disk", "full output");
    }

    #[test]
    #[should_panic(expected = "docker said no")]
    fn test_error_panics() {
        assert_no_warnings_or_errors("ERROR: container exited", "docker said no");
    }

    #[test]
    fn test_find_failure_marker_is_case_insensitive() {
        assert_eq!(find_failure_marker("WARN something"), Some(FailureMarker::Warn));
        assert_eq!(find_failure_marker("Fatal Error"), Some(FailureMarker::Error));
        assert_eq!(find_failure_marker("All good."), None);
    }

    #[test]
    fn test_find_failure_marker_matches_substrings() {
        assert_eq!(find_failure_marker("wrote errors.log"), Some(FailureMarker::Error));
        assert_eq!(find_failure_marker("forewarned"), Some(FailureMarker::Warn));
    }

    #[test]
    fn test_warn_reported_before_error() {
        assert_eq!(find_failure_marker("error then warn"), Some(FailureMarker::Warn));
    }

    #[test]
    fn test_assert_clean_stderr_ignores_stdout() {
        let output = create_test_output("error in stdout is fine", "");
        assert_clean_stderr(&output);
    }

    #[test]
    #[should_panic(expected = "stdout text")]
    fn test_assert_clean_stderr_prints_combined_output() {
        let output = create_test_output("stdout text", "warn: deprecated flag");
        assert_clean_stderr(&output);
    }
}
