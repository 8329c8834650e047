//! Grading: per-test verdicts and the aggregate verdict/score.

use std::time::Duration;

use crate::core::{LanguageProgram, Problem, TestResult, Verdict};
use crate::runner::RunOutcome;

/// Limits one submission is judged against
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub time_limit_ms: f64,
    pub memory_limit_bytes: u64,
    /// Languages with `limit_memory = false` never get ML
    pub enforce_memory: bool,
}

impl Limits {
    pub fn new(problem: &Problem, language: &LanguageProgram) -> Self {
        Self {
            time_limit_ms: problem.time_limit_secs as f64 * 1000.0,
            memory_limit_bytes: problem.memory_limit_mb as u64 * 1024 * 1024,
            enforce_memory: language.limit_memory,
        }
    }

    /// Wall-clock budget before the program is killed: twice the time limit
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.time_limit_ms * 2.0 / 1000.0)
    }

    fn memory_exceeded(&self, peak_bytes: u64) -> bool {
        self.enforce_memory && peak_bytes > self.memory_limit_bytes
    }
}

/// Verdict for one test run.
///
/// Limits are checked before output, so a slow program with the right answer
/// is still TL.
pub fn classify(outcome: &RunOutcome, limits: &Limits, expected: &str) -> Verdict {
    let too_slow = outcome.duration_ms > limits.time_limit_ms;
    let too_big = limits.memory_exceeded(outcome.peak_memory_bytes);

    if !outcome.is_success() {
        return if too_slow {
            Verdict::TimeLimitExceeded
        } else if too_big {
            Verdict::MemoryLimitExceeded
        } else {
            Verdict::RuntimeError
        };
    }

    if too_slow {
        Verdict::TimeLimitExceeded
    } else if too_big {
        Verdict::MemoryLimitExceeded
    } else if compare_output(&outcome.stdout, expected) {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    }
}

/// Exact line-by-line comparison, ignoring carriage returns.
///
/// A trailing newline counts as a final empty line, so `"1\n"` and `"1"`
/// differ.
pub fn compare_output(actual: &str, expected: &str) -> bool {
    let split = |s: &str| -> Vec<String> { s.split('\n').map(|l| l.replace('\r', "")).collect() };

    let actual_lines = split(actual);
    let expected_lines = split(expected);

    actual_lines.len() == expected_lines.len() && actual_lines == expected_lines
}

/// Score credited to each accepted test
pub fn partial_score(test_count: usize) -> f64 {
    if test_count == 0 {
        0.0
    } else {
        100.0 / test_count as f64
    }
}

/// `ceil(100 / total * passed)`, computed without floating point drift
pub fn final_score(total: usize, passed: usize) -> i32 {
    if total == 0 {
        return 100;
    }
    ((100 * passed).div_ceil(total)) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub verdict: Verdict,
    pub score: i32,
    pub passed: usize,
}

/// Combine test results into the submission's verdict.
///
/// The first non-accepted verdict in test order wins; an empty list is
/// accepted with full score.
pub fn aggregate(results: &[TestResult]) -> Aggregate {
    let mut ordered: Vec<&TestResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.test_no);

    let passed = ordered
        .iter()
        .filter(|r| r.verdict == Verdict::Accepted)
        .count();
    let verdict = ordered
        .iter()
        .map(|r| r.verdict)
        .find(|v| *v != Verdict::Accepted)
        .unwrap_or(Verdict::Accepted);

    Aggregate {
        verdict,
        score: final_score(ordered.len(), passed),
        passed,
    }
}
