use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{LanguageProgram, Problem, Submission, TestCase, TestResult};

pub const PING: &str = "Judge.Ping";
pub const PROCESS_SUBMISSION: &str = "Judge.ProcessSubmission";

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn from_result(id: u64, result: Result<Value, String>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                result: Some(value),
                error: None,
            },
            Err(message) => Self {
                id,
                result: None,
                error: Some(message),
            },
        }
    }
}

/// Liveness probe, timestamps in unix nanoseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReply {
    pub start_time: i64,
    pub end_time: i64,
    pub delta: i64,
}

/// Everything a slave needs to grade one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub submission: Submission,
    pub language: LanguageProgram,
    pub problem: Problem,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJobResult {
    pub submission: Submission,
    pub test_results: Vec<TestResult>,
}
