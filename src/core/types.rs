//! Records shared by the master, the slaves and the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::verdict::Verdict;

/// A submitted program and its final grade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub problem_id: i64,
    pub user_id: i64,
    pub language_id: i64,
    pub code: String,
    pub verdict: Verdict,
    /// Status message, plus error text when grading failed
    #[serde(default)]
    pub details: String,
    /// 0..=100
    pub score: i32,
    pub submit_time: DateTime<Utc>,
    #[serde(default)]
    pub compile_time_ms: f64,
    #[serde(default)]
    pub compile_stdout: String,
    #[serde(default)]
    pub compile_stderr: String,
}

impl Submission {
    /// A freshly admitted submission waiting for a slave
    pub fn queued(problem_id: i64, user_id: i64, language_id: i64, code: String) -> Self {
        Self {
            id: 0,
            problem_id,
            user_id,
            language_id,
            code,
            verdict: Verdict::OnQueue,
            details: Verdict::OnQueue.message().to_string(),
            score: 0,
            submit_time: Utc::now(),
            compile_time_ms: 0.0,
            compile_stdout: String::new(),
            compile_stderr: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub problem_id: i64,
    /// Position in the run order
    pub test_no: i32,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub submission_id: i64,
    pub problem_id: i64,
    pub test_no: i32,
    pub verdict: Verdict,
    pub time_elapsed_ms: f64,
    pub memory_used_bytes: u64,
    pub score: f64,
}

/// How to build and run programs of one language.
///
/// Command templates are split on whitespace and may use the `{exe}`,
/// `{source}`, `{work_dir}` and `{mem_limit}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProgram {
    pub id: i64,
    pub display_name: String,
    pub extension: String,
    pub source_name: String,
    pub executable_name: String,
    /// Empty for interpreted languages
    #[serde(default)]
    pub compile_command: String,
    pub execute_command: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub enable_sandbox: bool,
    /// Enforce the problem's memory limit on this language
    #[serde(default = "default_true")]
    pub limit_memory: bool,
    #[serde(default)]
    pub limit_syscall: bool,
    /// Regex applied to the source before staging
    #[serde(default)]
    pub regex_replace_from: Option<String>,
    #[serde(default)]
    pub regex_replace_to: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    #[serde(default)]
    pub contest_id: Option<i64>,
    pub name: String,
    pub short_name: String,
    pub time_limit_secs: u32,
    pub memory_limit_mb: u32,
    /// 0 means unlimited
    #[serde(default)]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContestStyle {
    Icpc,
    Ioi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: i64,
    pub title: String,
    pub style: ContestStyle,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub allow_public: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub freeze_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unfreeze_time: Option<DateTime<Utc>>,
    /// Seconds added for each rejected attempt
    #[serde(default)]
    pub penalty_time_secs: i64,
    /// Per-contestant time budget in seconds, 0 = whole contest
    #[serde(default)]
    pub max_time_secs: i64,
}

impl Contest {
    /// Whether the public board ignores new results at `now` (unix secs).
    pub fn is_frozen_at(&self, now: i64) -> bool {
        let Some(freeze) = self.freeze_time else {
            return false;
        };
        if now < freeze.timestamp() {
            return false;
        }
        match self.unfreeze_time {
            Some(unfreeze) => now < unfreeze.timestamp(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveData {
    pub id: i64,
    pub name: String,
    /// `host:port` of the slave's RPC listener
    pub address: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Liveness observed by the last ping
    #[serde(default)]
    pub active: bool,
}

/// Which copy of the score rows a write or read targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreView {
    /// Shown to contestants, stops updating while frozen
    Public,
    /// Always live, shown to jury and admins
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProblemData {
    pub contest_id: i64,
    pub problem_id: i64,
    pub user_id: i64,
    /// 0/1 under ICPC, 0..=100 under IOI
    pub score: i32,
    /// Unix seconds, 0 = not accepted yet
    pub accepted_time: i64,
    pub penalty_time: i64,
    pub submission_count: u32,
    pub one_hit: bool,
    pub regraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub country: String,
}

/// A user's entry into a contest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestAccessData {
    pub contest_id: i64,
    pub user_id: i64,
    #[serde(default = "default_true")]
    pub allowed: bool,
    /// Unix seconds when the user entered
    pub start_time: i64,
    /// Unix seconds, 0 = no personal deadline
    #[serde(default)]
    pub end_time: i64,
}

/// A scoreboard row header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestantInfo {
    pub user_id: i64,
    pub name: String,
    pub institution: String,
    pub country: String,
    pub joined_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contest() -> Contest {
        Contest {
            id: 1,
            title: "Weekly".into(),
            style: ContestStyle::Icpc,
            active: true,
            allow_public: true,
            start_time: None,
            end_time: None,
            freeze_time: None,
            unfreeze_time: None,
            penalty_time_secs: 1200,
            max_time_secs: 0,
        }
    }

    #[test]
    fn test_contest_without_freeze_is_never_frozen() {
        assert!(!contest().is_frozen_at(i64::MAX));
    }

    #[test]
    fn test_contest_freeze_window() {
        let mut c = contest();
        c.freeze_time = Some(Utc.timestamp_opt(1_000, 0).unwrap());
        assert!(!c.is_frozen_at(999));
        assert!(c.is_frozen_at(1_000));
        assert!(c.is_frozen_at(5_000));

        c.unfreeze_time = Some(Utc.timestamp_opt(2_000, 0).unwrap());
        assert!(c.is_frozen_at(1_999));
        assert!(!c.is_frozen_at(2_000));
    }

    #[test]
    fn test_queued_submission() {
        let s = Submission::queued(3, 7, 1, "print(1)".into());
        assert_eq!(s.verdict, Verdict::OnQueue);
        assert_eq!(s.details, "On Queue");
        assert_eq!(s.score, 0);
    }

    #[test]
    fn test_contest_style_serde() {
        assert_eq!(serde_json::to_string(&ContestStyle::Ioi).unwrap(), "\"IOI\"");
    }
}
