//! Build finalization: timing strings and compile error rendering.

use std::fmt;
use std::time::Duration;

/// A compile-time error: the module it occurred in, the end-of-line
/// position the parser had reached, and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerError {
    pub module_name: String,
    pub end_of_error_line: u64,
    pub message: String,
}

impl CompilerError {
    pub fn new(module_name: impl Into<String>, end_of_error_line: u64, message: impl Into<String>) -> Self {
        CompilerError {
            module_name: module_name.into(),
            end_of_error_line,
            message: message.into(),
        }
    }

    /// Render "source prefix …message… source suffix" clipped to 100
    /// bytes on either side of `end_of_error_line`, as the interpreter's
    /// stderr message is specified.
    pub fn render_context(&self, source: &[u8]) -> String {
        let pos = (self.end_of_error_line as usize).min(source.len());
        let prefix_start = pos.saturating_sub(100);
        let suffix_end = (pos + 100).min(source.len());
        let prefix = String::from_utf8_lossy(&source[prefix_start..pos]);
        let suffix = String::from_utf8_lossy(&source[pos..suffix_end]);
        format!("{prefix}…{}…{suffix}", self.message)
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module_name, self.message)
    }
}

impl std::error::Error for CompilerError {}

/// The build's terminal status, each carrying the elapsed wall time.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStatus {
    Done(Duration),
    Cancelled(Duration),
    Aborted(Duration),
}

impl BuildStatus {
    /// The CLI exit code for this status (spec §6): `0` on `Done`, `130`
    /// on `Cancelled`, `2` on `Aborted`.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildStatus::Done(_) => 0,
            BuildStatus::Cancelled(_) => 130,
            BuildStatus::Aborted(_) => 2,
        }
    }
}

fn format_timing(label: &str, elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{label} ({secs}.{millis:03}s)")
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Done(d) => write!(f, "{}", format_timing("Done", *d)),
            BuildStatus::Cancelled(d) => write!(f, "{}", format_timing("Cancelled", *d)),
            BuildStatus::Aborted(d) => write!(f, "{}", format_timing("Aborted", *d)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_strings_match_the_spec_format() {
        assert_eq!(BuildStatus::Done(Duration::from_millis(1234)).to_string(), "Done (1.234s)");
        assert_eq!(BuildStatus::Cancelled(Duration::from_millis(50)).to_string(), "Cancelled (0.050s)");
        assert_eq!(BuildStatus::Aborted(Duration::from_secs(3)).to_string(), "Aborted (3.000s)");
    }

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(BuildStatus::Done(Duration::ZERO).exit_code(), 0);
        assert_eq!(BuildStatus::Cancelled(Duration::ZERO).exit_code(), 130);
        assert_eq!(BuildStatus::Aborted(Duration::ZERO).exit_code(), 2);
    }

    #[test]
    fn render_context_clips_to_100_bytes_either_side() {
        let err = CompilerError::new("/a/B", 5, "unexpected token");
        let source = b"hello world";
        assert_eq!(err.render_context(source), "hello…unexpected token… world");
    }
}
