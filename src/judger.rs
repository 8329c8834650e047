//! Judger module for processing submission jobs on a slave
//!
//! Stages the source, compiles it, runs every test case and grades the
//! results. This is the handler behind the slave's RPC methods.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::utils::unix_nanos;
use crate::core::{TestCase, TestResult, Verdict};
use crate::grading::{self, Limits};
use crate::languages::{self, CommandContext};
use crate::rpc::{JudgeService, Ping, PingReply, SubmissionJob, SubmissionJobResult};
use crate::runner::{CommandSpec, Runner};
use crate::workspace::Workspace;

pub struct Judger {
    runner: Arc<dyn Runner>,
    cache_dir: PathBuf,
}

impl Judger {
    pub fn new(runner: Arc<dyn Runner>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            cache_dir: cache_dir.into(),
        }
    }

    /// Grade one submission. The scratch directory is removed on every path.
    pub async fn judge(&self, job: SubmissionJob) -> Result<SubmissionJobResult> {
        let SubmissionJob {
            mut submission,
            language,
            problem,
            test_cases,
        } = job;
        info!(
            "Judging submission {} (problem {}, language {}, {} tests)",
            submission.id,
            problem.id,
            language.display_name,
            test_cases.len()
        );

        let code = languages::rewrite_source(&language, &submission.code)?;
        let workspace = Workspace::stage(&self.cache_dir, &language.source_name, &code).await?;

        let executable = languages::executable_name(&language);
        let ctx = CommandContext {
            executable: &executable,
            source: &language.source_name,
            work_dir: workspace.path(),
            memory_limit_mb: problem.memory_limit_mb,
        };
        let compile_argv = languages::expand_command(&language.compile_command, &ctx);
        let run_argv = languages::expand_command(&language.execute_command, &ctx);
        let limits = Limits::new(&problem, &language);

        let result = async {
            if let Some(spec) = CommandSpec::from_argv(&compile_argv) {
                let outcome = self
                    .runner
                    .compile(&spec.with_work_dir(workspace.path()))
                    .await
                    .context("Compile step failed")?;
                submission.compile_time_ms = outcome.duration_ms;
                submission.compile_stdout = outcome.stdout;
                submission.compile_stderr = outcome.stderr;
                if let Some(error) = outcome.error {
                    info!("Submission {} failed to compile: {}", submission.id, error);
                    submission.verdict = Verdict::CompileError;
                    submission.score = 0;
                    return Ok(Vec::new());
                }
            }

            let spec = CommandSpec::from_argv(&run_argv)
                .with_context(|| {
                    format!("Language {} has no execute command", language.id)
                })?
                .with_work_dir(workspace.path());
            let results = self
                .run_tests(&spec, submission.id, &test_cases, &limits)
                .await?;

            let aggregate = grading::aggregate(&results);
            submission.verdict = aggregate.verdict;
            submission.score = aggregate.score;
            Ok::<_, anyhow::Error>(results)
        }
        .await;

        workspace.cleanup();
        let test_results = result?;

        info!(
            "Submission {} graded {} with score {} ({} tests)",
            submission.id,
            submission.verdict,
            submission.score,
            test_results.len()
        );
        Ok(SubmissionJobResult {
            submission,
            test_results,
        })
    }

    /// Run every test in order; a failing test does not stop the rest.
    async fn run_tests(
        &self,
        spec: &CommandSpec,
        submission_id: i64,
        test_cases: &[TestCase],
        limits: &Limits,
    ) -> Result<Vec<TestResult>> {
        let mut ordered: Vec<&TestCase> = test_cases.iter().collect();
        ordered.sort_by_key(|t| t.test_no);
        let partial = grading::partial_score(ordered.len());

        let mut results = Vec::with_capacity(ordered.len());
        for test in ordered {
            let outcome = self
                .runner
                .run(spec, &test.input, limits.run_timeout())
                .await
                .with_context(|| format!("Failed to run test {}", test.test_no))?;
            let verdict = grading::classify(&outcome, limits, &test.output);
            if verdict != Verdict::Accepted {
                warn!(
                    "Submission {} test {}: {} ({:.0}ms, {} bytes)",
                    submission_id,
                    test.test_no,
                    verdict,
                    outcome.duration_ms,
                    outcome.peak_memory_bytes
                );
            }

            results.push(TestResult {
                submission_id,
                problem_id: test.problem_id,
                test_no: test.test_no,
                verdict,
                time_elapsed_ms: outcome.duration_ms,
                memory_used_bytes: outcome.peak_memory_bytes,
                score: if verdict == Verdict::Accepted {
                    partial
                } else {
                    0.0
                },
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl JudgeService for Judger {
    async fn ping(&self, request: Ping) -> Result<PingReply> {
        let end_time = unix_nanos();
        Ok(PingReply {
            start_time: request.start_time,
            end_time,
            delta: end_time - request.start_time,
        })
    }

    async fn process_submission(&self, job: SubmissionJob) -> Result<SubmissionJobResult> {
        self.judge(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{fixtures, Submission};
    use crate::runner::{CompileOutcome, RunOutcome, RunStatus};
    use std::sync::Mutex;
    use std::time::Duration;

    type Script = Box<dyn Fn(&str) -> RunOutcome + Send + Sync>;

    /// Runner answering from a script keyed on the test input
    struct ScriptedRunner {
        compile_error: Option<String>,
        script: Script,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        fn new(script: impl Fn(&str) -> RunOutcome + Send + Sync + 'static) -> Self {
            Self {
                compile_error: None,
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn compile(&self, cmd: &CommandSpec) -> Result<CompileOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((cmd.program.clone(), cmd.args.clone()));
            Ok(CompileOutcome {
                duration_ms: 12.0,
                stdout: String::new(),
                stderr: self.compile_error.clone().unwrap_or_default(),
                error: self.compile_error.clone(),
            })
        }

        async fn run(
            &self,
            cmd: &CommandSpec,
            stdin: &str,
            timeout: Duration,
        ) -> Result<RunOutcome> {
            assert_eq!(timeout, Duration::from_secs(2));
            self.calls
                .lock()
                .unwrap()
                .push((cmd.program.clone(), cmd.args.clone()));
            Ok((self.script)(stdin))
        }
    }

    fn echo(stdin: &str) -> RunOutcome {
        RunOutcome {
            duration_ms: 5.0,
            peak_memory_bytes: 1024,
            stdout: stdin.to_string(),
            stderr: String::new(),
            status: RunStatus::Exited(0),
        }
    }

    fn job(tests: Vec<TestCase>) -> SubmissionJob {
        let mut submission = Submission::queued(1, 9, 1, "cat".into());
        submission.id = 77;
        SubmissionJob {
            submission,
            language: fixtures::shell_language(),
            problem: fixtures::problem(1, None),
            test_cases: tests,
        }
    }

    #[tokio::test]
    async fn test_all_tests_accepted() {
        let cache = tempfile::tempdir().unwrap();
        let judger = Judger::new(Arc::new(ScriptedRunner::new(echo)), cache.path());
        let tests = (1..=3)
            .map(|n| fixtures::test_case(1, n, &format!("{}\n", n), &format!("{}\n", n)))
            .collect();

        let result = judger.judge(job(tests)).await.unwrap();
        assert_eq!(result.submission.verdict, Verdict::Accepted);
        assert_eq!(result.submission.score, 100);
        assert_eq!(result.test_results.len(), 3);
        assert!(result
            .test_results
            .iter()
            .all(|r| r.submission_id == 77 && r.verdict == Verdict::Accepted));
        // scratch directory removed
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_answer_keeps_running_remaining_tests() {
        let cache = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(echo));
        let judger = Judger::new(runner.clone(), cache.path());
        let tests = vec![
            fixtures::test_case(1, 4, "4\n", "4\n"),
            fixtures::test_case(1, 1, "1\n", "1\n"),
            fixtures::test_case(1, 3, "3\n", "not three\n"),
            fixtures::test_case(1, 2, "2\n", "2\n"),
        ];

        let result = judger.judge(job(tests)).await.unwrap();
        assert_eq!(result.submission.verdict, Verdict::WrongAnswer);
        assert_eq!(result.submission.score, 75);

        let verdicts: Vec<_> = result
            .test_results
            .iter()
            .map(|r| (r.test_no, r.verdict))
            .collect();
        assert_eq!(
            verdicts,
            vec![
                (1, Verdict::Accepted),
                (2, Verdict::Accepted),
                (3, Verdict::WrongAnswer),
                (4, Verdict::Accepted),
            ]
        );
        assert_eq!(result.test_results[0].score, 25.0);
        assert_eq!(result.test_results[2].score, 0.0);
        // one compile plus four runs
        assert_eq!(runner.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_compile_error_skips_tests() {
        let cache = tempfile::tempdir().unwrap();
        let mut runner = ScriptedRunner::new(|_| panic!("must not run"));
        runner.compile_error = Some("compiler exited with code 1".into());
        let judger = Judger::new(Arc::new(runner), cache.path());

        let result = judger
            .judge(job(vec![fixtures::test_case(1, 1, "", "")]))
            .await
            .unwrap();
        assert_eq!(result.submission.verdict, Verdict::CompileError);
        assert_eq!(result.submission.score, 0);
        assert!(result.test_results.is_empty());
        assert_eq!(result.submission.compile_time_ms, 12.0);
        assert_eq!(
            result.submission.compile_stderr,
            "compiler exited with code 1"
        );
    }

    #[tokio::test]
    async fn test_commands_are_expanded() {
        let cache = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(echo));
        let judger = Judger::new(runner.clone(), cache.path());

        judger
            .judge(job(vec![fixtures::test_case(1, 1, "x", "x")]))
            .await
            .unwrap();
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], ("cp".to_string(), vec!["main.sh".into(), "main".into()]));
        assert_eq!(calls[1], ("sh".to_string(), vec!["main".into()]));
    }

    #[tokio::test]
    async fn test_no_tests_is_accepted() {
        let cache = tempfile::tempdir().unwrap();
        let judger = Judger::new(Arc::new(ScriptedRunner::new(echo)), cache.path());
        let result = judger.judge(job(vec![])).await.unwrap();
        assert_eq!(result.submission.verdict, Verdict::Accepted);
        assert_eq!(result.submission.score, 100);
    }

    #[tokio::test]
    async fn test_invalid_rewrite_pattern_fails_job() {
        let cache = tempfile::tempdir().unwrap();
        let judger = Judger::new(Arc::new(ScriptedRunner::new(echo)), cache.path());
        let mut job = job(vec![]);
        job.language.regex_replace_from = Some("[".into());
        assert!(judger.judge(job).await.is_err());
    }

    #[tokio::test]
    async fn test_ping_reports_delta() {
        let cache = tempfile::tempdir().unwrap();
        let judger = Judger::new(Arc::new(ScriptedRunner::new(echo)), cache.path());
        let start = unix_nanos();
        let reply = judger.ping(Ping { start_time: start }).await.unwrap();
        assert_eq!(reply.start_time, start);
        assert!(reply.delta >= 0);
    }
}
