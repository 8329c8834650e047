use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Verdict of a submission or of a single test run.
///
/// Stored and sent over the wire as its two-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "QU")]
    OnQueue,
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "PE")]
    PresentationError,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "TL")]
    TimeLimitExceeded,
    #[serde(rename = "ML")]
    MemoryLimitExceeded,
    #[serde(rename = "OL")]
    OutputLimitExceeded,
    #[serde(rename = "SE")]
    SystemError,
    #[serde(rename = "RF")]
    RestrictedFunction,
    #[serde(rename = "CJ")]
    CannotBeJudged,
}

impl Verdict {
    pub const ALL: [Verdict; 12] = [
        Verdict::OnQueue,
        Verdict::Accepted,
        Verdict::PresentationError,
        Verdict::WrongAnswer,
        Verdict::CompileError,
        Verdict::RuntimeError,
        Verdict::TimeLimitExceeded,
        Verdict::MemoryLimitExceeded,
        Verdict::OutputLimitExceeded,
        Verdict::SystemError,
        Verdict::RestrictedFunction,
        Verdict::CannotBeJudged,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Verdict::OnQueue => "QU",
            Verdict::Accepted => "AC",
            Verdict::PresentationError => "PE",
            Verdict::WrongAnswer => "WA",
            Verdict::CompileError => "CE",
            Verdict::RuntimeError => "RE",
            Verdict::TimeLimitExceeded => "TL",
            Verdict::MemoryLimitExceeded => "ML",
            Verdict::OutputLimitExceeded => "OL",
            Verdict::SystemError => "SE",
            Verdict::RestrictedFunction => "RF",
            Verdict::CannotBeJudged => "CJ",
        }
    }

    /// Human readable status message
    pub fn message(&self) -> &'static str {
        match self {
            Verdict::OnQueue => "On Queue",
            Verdict::Accepted => "Accepted",
            Verdict::PresentationError => "Presentation Error",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::CompileError => "Compiler Error",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::OutputLimitExceeded => "Output Limit Exceeded",
            Verdict::SystemError => "System Error",
            Verdict::RestrictedFunction => "Restricted Function",
            Verdict::CannotBeJudged => "Can't be Judged",
        }
    }

    /// Whether a graded submission with this verdict touches the scoreboard.
    ///
    /// Queued, compile-error and system-error submissions neither score nor
    /// add penalty time.
    pub fn affects_scoreboard(&self) -> bool {
        !matches!(
            self,
            Verdict::OnQueue | Verdict::CompileError | Verdict::SystemError
        )
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verdict::ALL
            .iter()
            .copied()
            .find(|v| v.code() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown verdict code: {}", s))
    }
}
