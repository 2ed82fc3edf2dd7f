use thiserror::Error;

/// Errors raised by the conversion pipeline and the chart codec.
///
/// Mapping itself never fails on well-formed input. Only contract violations
/// (unordered events, non-positive tempos) and malformed chart text surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartError {
    /// Note events were not sorted by start time.
    #[error("Note event {index} starts at {start_ms}ms, before {previous_ms}ms")]
    UnorderedInput {
        index: usize,
        previous_ms: f64,
        start_ms: f64,
    },

    /// A sync point carried a BPM that is zero, negative or not finite.
    #[error("Invalid tempo at tick {tick}: {bpm} BPM")]
    InvalidTempo { tick: u64, bpm: f64 },

    /// Malformed chart text. `line` is 1-based.
    #[error("Parse error at line {line}{}: {reason}", section_suffix(.section))]
    Parse {
        line: usize,
        section: Option<String>,
        reason: String,
    },

    /// Internal consistency check failed while writing a chart.
    #[error("Format invariant violated: {0}")]
    FormatInvariantViolation(String),
}

fn section_suffix(section: &Option<String>) -> String {
    match section {
        Some(name) => format!(" in [{}]", name),
        None => String::new(),
    }
}

impl ChartError {
    pub fn parse(line: usize, section: Option<&str>, reason: impl Into<String>) -> Self {
        ChartError::Parse {
            line,
            section: section.map(str::to_owned),
            reason: reason.into(),
        }
    }
}

pub type ChartResult<T> = std::result::Result<T, ChartError>;
