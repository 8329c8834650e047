//! Submission Processor
//!
//! Admission checks run synchronously. An admitted submission is bound to a
//! live slave, persisted as queued and pushed onto a bounded grading queue.
//! A fixed set of grading workers drains the queue: each job runs the
//! `ProcessSubmission` RPC, persists the results, updates the scoreboard and
//! notifies the author.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::contest_access::{AccessDecision, ContestAccess};
use crate::core::{LanguageProgram, Problem, SlaveData, Submission, Verdict};
use crate::error::{AdmissionError, DispatchError, SubmitError};
use crate::languages::LanguageCatalog;
use crate::notify::{Notification, Notifier};
use crate::rpc::{RpcClient, SubmissionJob, SubmissionJobResult};
use crate::scoreboard::Scoreboard;
use crate::slave_manager::SlaveManager;
use crate::storage::Storage;

/// A submission that passed every admission check
#[derive(Debug, Clone)]
pub struct Admission {
    pub problem: Problem,
    pub language: LanguageProgram,
    pub user_id: i64,
    pub code: String,
}

/// Everything the processor talks to
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    pub languages: Arc<LanguageCatalog>,
    pub access: Arc<dyn ContestAccess>,
    pub slaves: Arc<SlaveManager>,
    pub scoreboard: Arc<Scoreboard>,
    pub notifier: Arc<dyn Notifier>,
}

struct GradingJob {
    submission_id: i64,
    slave: SlaveData,
    client: RpcClient,
}

pub struct SubmissionProcessor {
    storage: Arc<dyn Storage>,
    languages: Arc<LanguageCatalog>,
    access: Arc<dyn ContestAccess>,
    slaves: Arc<SlaveManager>,
    queue: mpsc::Sender<GradingJob>,
}

impl SubmissionProcessor {
    /// Create the processor and spawn `workers` grading workers sharing a
    /// queue of `capacity` jobs.
    pub fn start(collaborators: Collaborators, workers: usize, capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let grader = Arc::new(Grader {
            storage: collaborators.storage.clone(),
            languages: collaborators.languages.clone(),
            scoreboard: collaborators.scoreboard,
            notifier: collaborators.notifier,
        });
        spawn_workers(grader, rx, workers.max(1));
        info!(
            "Submission processor started: {} grading workers, queue capacity {}",
            workers.max(1),
            capacity.max(1)
        );

        Self {
            storage: collaborators.storage,
            languages: collaborators.languages,
            access: collaborators.access,
            slaves: collaborators.slaves,
            queue,
        }
    }

    /// Admit and dispatch in one step. Returns the new submission id.
    pub async fn submit(
        &self,
        problem_id: i64,
        user_id: i64,
        language_id: i64,
        code: String,
    ) -> Result<i64, SubmitError> {
        let admission = self.admit(problem_id, user_id, language_id, code).await?;
        Ok(self.dispatch(admission).await?)
    }

    /// Check that the submission may be accepted at all.
    ///
    /// The attempt count is read before the new row exists, so concurrent
    /// submissions can overshoot `max_attempts`.
    pub async fn admit(
        &self,
        problem_id: i64,
        user_id: i64,
        language_id: i64,
        code: String,
    ) -> Result<Admission, AdmissionError> {
        let problem = self
            .storage
            .problem(problem_id)
            .await?
            .ok_or(AdmissionError::UnknownProblem(problem_id))?;

        let language = self
            .languages
            .get(language_id)
            .await?
            .ok_or(AdmissionError::UnknownLanguage(language_id))?;
        if !language.enabled {
            return Err(AdmissionError::LanguageDisabled(language_id));
        }

        if let Some(contest_id) = problem.contest_id {
            if let AccessDecision::Denied(reason) =
                self.access.check_access(user_id, contest_id).await?
            {
                return Err(AdmissionError::AccessDenied(reason));
            }
        }

        if problem.max_attempts > 0 {
            let attempts = self.storage.submission_count(user_id, problem_id).await?;
            if attempts >= problem.max_attempts as u64 {
                return Err(AdmissionError::MaxAttemptsReached);
            }
        }

        Ok(Admission {
            problem,
            language,
            user_id,
            code,
        })
    }

    /// Bind the submission to a live slave, persist it and queue grading.
    ///
    /// Returns once the job is queued, long before grading finishes. Waits
    /// for room when the queue is full.
    pub async fn dispatch(&self, admission: Admission) -> Result<i64, DispatchError> {
        let slave = self.slaves.get_active_slave().await?;
        let client = RpcClient::connect(&slave.address)
            .await
            .map_err(|source| DispatchError::Connect {
                slave: slave.name.clone(),
                source,
            })?;

        let submission = Submission::queued(
            admission.problem.id,
            admission.user_id,
            admission.language.id,
            admission.code,
        );
        let submission_id = self.storage.insert_submission(&submission).await?;

        let job = GradingJob {
            submission_id,
            slave: slave.clone(),
            client,
        };
        if self.queue.send(job).await.is_err() {
            error!("Grading queue closed, submission {} cannot be graded", submission_id);
            let mut failed = submission;
            failed.id = submission_id;
            failed.verdict = Verdict::SystemError;
            failed.details = format!(
                "{}: {}",
                Verdict::SystemError.message(),
                DispatchError::QueueClosed
            );
            if let Err(e) = self.storage.update_submission(&failed).await {
                error!("Failed to mark submission {} failed: {:#}", submission_id, e);
            }
            return Err(DispatchError::QueueClosed);
        }

        info!(
            "Submission {} queued for slave {} (problem {}, user {})",
            submission_id, slave.name, admission.problem.id, admission.user_id
        );
        Ok(submission_id)
    }
}

fn spawn_workers(grader: Arc<Grader>, rx: mpsc::Receiver<GradingJob>, workers: usize) {
    let rx = Arc::new(Mutex::new(rx));
    for worker in 0..workers {
        let rx = rx.clone();
        let grader = grader.clone();
        tokio::spawn(async move {
            loop {
                let job = rx.lock().await.recv().await;
                let Some(job) = job else {
                    break;
                };
                grader.grade(job).await;
            }
            debug!("Grading worker {} stopped", worker);
        });
    }
}

/// Background half of the processor
struct Grader {
    storage: Arc<dyn Storage>,
    languages: Arc<LanguageCatalog>,
    scoreboard: Arc<Scoreboard>,
    notifier: Arc<dyn Notifier>,
}

impl Grader {
    async fn grade(&self, job: GradingJob) {
        let id = job.submission_id;
        let mut submission = match self.storage.submission(id).await {
            Ok(Some(submission)) => submission,
            Ok(None) => {
                error!("Submission {} disappeared before grading", id);
                return;
            }
            Err(e) => {
                error!("Failed to load submission {}: {:#}", id, e);
                return;
            }
        };

        match self.run_remote(&job.client, &submission).await {
            Ok(result) => {
                for test in &result.test_results {
                    if let Err(e) = self.storage.insert_test_result(test).await {
                        error!(
                            "Failed to store test {} of submission {}: {:#}",
                            test.test_no, id, e
                        );
                    }
                }
                let graded = result.submission;
                submission.verdict = graded.verdict;
                submission.score = graded.score;
                submission.compile_time_ms = graded.compile_time_ms;
                submission.compile_stdout = graded.compile_stdout;
                submission.compile_stderr = graded.compile_stderr;
                submission.details = graded.verdict.message().to_string();
            }
            Err(e) => {
                error!(
                    "Submission {} failed on slave {}: {:#}",
                    id, job.slave.name, e
                );
                submission.verdict = Verdict::SystemError;
                submission.score = 0;
                submission.details = format!("{}: {:#}", Verdict::SystemError.message(), e);
            }
        }
        if let Err(e) = job.client.close().await {
            debug!("Closing connection to slave {}: {}", job.slave.name, e);
        }

        if let Err(e) = self.storage.update_submission(&submission).await {
            error!("Failed to store result of submission {}: {:#}", id, e);
            return;
        }
        info!(
            "Submission {} graded {} with score {}",
            id, submission.verdict, submission.score
        );

        if submission.verdict.affects_scoreboard() {
            let accepted = submission.verdict == Verdict::Accepted;
            if let Err(e) = self.scoreboard.submit_score(&submission, accepted).await {
                error!("Failed to update scoreboard for submission {}: {}", id, e);
            }
        }

        let notification = Notification::system(
            submission.user_id,
            format!(
                "Your last submission graded as {} ({})",
                submission.verdict.message(),
                submission.verdict.code()
            ),
            format!("/submissions/{}", id),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!("Failed to notify user {} about submission {}: {:#}", submission.user_id, id, e);
        }
    }

    async fn run_remote(
        &self,
        client: &RpcClient,
        submission: &Submission,
    ) -> Result<SubmissionJobResult> {
        let language = self
            .languages
            .get(submission.language_id)
            .await?
            .with_context(|| format!("Language {} not found", submission.language_id))?;
        let problem = self
            .storage
            .problem(submission.problem_id)
            .await?
            .with_context(|| format!("Problem {} not found", submission.problem_id))?;
        let test_cases = self.storage.test_cases(problem.id).await?;

        let job = SubmissionJob {
            submission: submission.clone(),
            language,
            problem,
            test_cases,
        };
        client
            .process_submission(&job)
            .await
            .with_context(|| format!("ProcessSubmission on {} failed", client.address()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::contest_access::ContestGate;
    use crate::core::{fixtures, ContestStyle, ScoreView, TestResult};
    use crate::rpc::{JudgeService, Ping, PingReply, RpcServer};
    use crate::slave_manager::RpcProbe;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Slave that accepts when the code says so and fails on "crash"
    struct FakeSlave;

    #[async_trait]
    impl JudgeService for FakeSlave {
        async fn ping(&self, request: Ping) -> Result<PingReply> {
            Ok(PingReply {
                start_time: request.start_time,
                end_time: request.start_time,
                delta: 0,
            })
        }

        async fn process_submission(&self, job: SubmissionJob) -> Result<SubmissionJobResult> {
            if job.submission.code == "crash" {
                anyhow::bail!("slave lost its scratch disk");
            }
            let verdict = if job.submission.code == "ok" {
                Verdict::Accepted
            } else {
                Verdict::WrongAnswer
            };
            let test_results = job
                .test_cases
                .iter()
                .map(|t| TestResult {
                    submission_id: job.submission.id,
                    problem_id: t.problem_id,
                    test_no: t.test_no,
                    verdict,
                    time_elapsed_ms: 1.0,
                    memory_used_bytes: 1024,
                    score: 50.0,
                })
                .collect();
            let mut submission = job.submission;
            submission.verdict = verdict;
            submission.score = if verdict == Verdict::Accepted { 100 } else { 0 };
            Ok(SubmissionJobResult {
                submission,
                test_results,
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        processor: SubmissionProcessor,
    }

    async fn harness(with_slave: bool) -> Harness {
        let mut limited = fixtures::problem(2, None);
        limited.max_attempts = 1;
        let mut disabled = fixtures::shell_language();
        disabled.id = 2;
        disabled.enabled = false;
        let mut not_started = fixtures::contest(2, ContestStyle::Icpc);
        not_started.start_time = Some(fixtures::at(i64::from(i32::MAX)));

        let store = Arc::new(MemoryStore::from_catalog(Catalog {
            languages: vec![fixtures::shell_language(), disabled],
            contests: vec![fixtures::contest(1, ContestStyle::Icpc), not_started],
            problems: vec![
                fixtures::problem(1, Some(1)),
                limited,
                fixtures::problem(3, Some(2)),
            ],
            test_cases: vec![
                fixtures::test_case(1, 1, "1", "1"),
                fixtures::test_case(1, 2, "2", "2"),
            ],
            ..Default::default()
        }));

        if with_slave {
            let server = RpcServer::bind("127.0.0.1:0", Arc::new(FakeSlave))
                .await
                .unwrap();
            let address = server.local_addr().unwrap().to_string();
            tokio::spawn(server.serve());
            store
                .put_slave(SlaveData {
                    id: 1,
                    name: "loopback".into(),
                    address,
                    enabled: true,
                    active: false,
                })
                .await;
        }

        let scoreboard = Arc::new(Scoreboard::new(store.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = SubmissionProcessor::start(
            Collaborators {
                storage: store.clone(),
                languages: Arc::new(LanguageCatalog::new(store.clone())),
                access: Arc::new(ContestGate::new(store.clone(), scoreboard.clone())),
                slaves: Arc::new(SlaveManager::new(store.clone(), Arc::new(RpcProbe))),
                scoreboard,
                notifier: notifier.clone(),
            },
            2,
            8,
        );
        Harness {
            store,
            notifier,
            processor,
        }
    }

    async fn wait_graded(store: &MemoryStore, id: i64) -> Submission {
        for _ in 0..200 {
            let submission = store.submission(id).await.unwrap().unwrap();
            if submission.verdict != Verdict::OnQueue {
                return submission;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("submission {} was never graded", id);
    }

    #[tokio::test]
    async fn test_admission_errors() {
        let h = harness(false).await;
        let p = &h.processor;
        assert!(matches!(
            p.admit(99, 1, 1, "x".into()).await,
            Err(AdmissionError::UnknownProblem(99))
        ));
        assert!(matches!(
            p.admit(1, 1, 42, "x".into()).await,
            Err(AdmissionError::UnknownLanguage(42))
        ));
        assert!(matches!(
            p.admit(1, 1, 2, "x".into()).await,
            Err(AdmissionError::LanguageDisabled(2))
        ));
        assert!(matches!(
            p.admit(3, 1, 1, "x".into()).await,
            Err(AdmissionError::AccessDenied(_))
        ));
        assert!(p.admit(2, 1, 1, "x".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_max_attempts() {
        let h = harness(false).await;
        h.store
            .insert_submission(&Submission::queued(2, 5, 1, "x".into()))
            .await
            .unwrap();
        assert!(matches!(
            h.processor.admit(2, 5, 1, "x".into()).await,
            Err(AdmissionError::MaxAttemptsReached)
        ));
        // other users are unaffected
        assert!(h.processor.admit(2, 6, 1, "x".into()).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_without_slaves_queues_nothing() {
        let h = harness(false).await;
        let admission = h.processor.admit(1, 5, 1, "ok".into()).await.unwrap();
        let err = h.processor.dispatch(admission).await.unwrap_err();
        assert!(matches!(err, DispatchError::Slave(_)));
        assert_eq!(h.store.submission_count(5, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_accepted_submission_flow() {
        let h = harness(true).await;
        let id = h.processor.submit(1, 5, 1, "ok".into()).await.unwrap();

        let graded = wait_graded(&h.store, id).await;
        assert_eq!(graded.verdict, Verdict::Accepted);
        assert_eq!(graded.score, 100);
        assert_eq!(graded.details, "Accepted");
        assert_eq!(h.store.test_results(id).await.unwrap().len(), 2);

        // notification is the last step
        for _ in 0..200 {
            if !h.notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, 5);
        assert_eq!(sent[0].text, "Your last submission graded as Accepted (AC)");
        assert_eq!(sent[0].link, format!("/submissions/{}", id));

        let row = h
            .store
            .score_row(ScoreView::Private, 1, 1, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.score, 1);
        assert!(row.accepted_time > 0);
    }

    #[tokio::test]
    async fn test_wrong_answer_adds_penalty() {
        let h = harness(true).await;
        let id = h.processor.submit(1, 5, 1, "nope".into()).await.unwrap();
        let graded = wait_graded(&h.store, id).await;
        assert_eq!(graded.verdict, Verdict::WrongAnswer);

        for _ in 0..200 {
            if !h.notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let row = h
            .store
            .score_row(ScoreView::Private, 1, 1, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.penalty_time, 1200);
        assert_eq!(row.accepted_time, 0);
    }

    #[tokio::test]
    async fn test_slave_failure_marks_system_error() {
        let h = harness(true).await;
        let id = h.processor.submit(1, 5, 1, "crash".into()).await.unwrap();
        let graded = wait_graded(&h.store, id).await;
        assert_eq!(graded.verdict, Verdict::SystemError);
        assert!(graded.details.starts_with("System Error: "));
        assert!(graded.details.contains("slave lost its scratch disk"));
        assert!(h.store.test_results(id).await.unwrap().is_empty());
    }
}
