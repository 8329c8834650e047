//! Builders for records used across unit tests.

use chrono::{DateTime, TimeZone, Utc};

use super::{Contest, ContestStyle, LanguageProgram, Problem, TestCase};

pub fn shell_language() -> LanguageProgram {
    LanguageProgram {
        id: 1,
        display_name: "POSIX shell".into(),
        extension: "sh".into(),
        source_name: "main.sh".into(),
        executable_name: "main".into(),
        compile_command: "cp {source} {exe}".into(),
        execute_command: "sh {exe}".into(),
        enabled: true,
        enable_sandbox: false,
        limit_memory: true,
        limit_syscall: false,
        regex_replace_from: None,
        regex_replace_to: String::new(),
    }
}

pub fn problem(id: i64, contest_id: Option<i64>) -> Problem {
    Problem {
        id,
        contest_id,
        name: format!("Problem {}", id),
        short_name: format!("P{}", id),
        time_limit_secs: 1,
        memory_limit_mb: 64,
        max_attempts: 0,
    }
}

pub fn test_case(problem_id: i64, test_no: i32, input: &str, output: &str) -> TestCase {
    TestCase {
        id: problem_id * 1000 + test_no as i64,
        problem_id,
        test_no,
        input: input.into(),
        output: output.into(),
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn contest(id: i64, style: ContestStyle) -> Contest {
    Contest {
        id,
        title: format!("Contest {}", id),
        style,
        active: true,
        allow_public: true,
        start_time: Some(at(1_000)),
        end_time: None,
        freeze_time: None,
        unfreeze_time: None,
        penalty_time_secs: 1200,
        max_time_secs: 0,
    }
}
