//! Storage collaborator
//!
//! The master reads problems, languages and contests and writes submissions,
//! test results and score rows through [`Storage`]. [`MemoryStore`] keeps
//! everything in process, seeded from a [`Catalog`].

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::Catalog;
use crate::core::{
    Contest, ContestAccessData, ContestantInfo, LanguageProgram, Problem, ScoreProblemData,
    ScoreView, SlaveData, Submission, TestCase, TestResult, UserProfile,
};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn problem(&self, id: i64) -> Result<Option<Problem>>;

    /// Test cases of a problem ordered by test number
    async fn test_cases(&self, problem_id: i64) -> Result<Vec<TestCase>>;

    async fn submission_count(&self, user_id: i64, problem_id: i64) -> Result<u64>;

    async fn language(&self, id: i64) -> Result<Option<LanguageProgram>>;

    async fn languages(&self) -> Result<Vec<LanguageProgram>>;

    async fn contest(&self, id: i64) -> Result<Option<Contest>>;

    async fn contests(&self) -> Result<Vec<Contest>>;

    async fn contest_problems(&self, contest_id: i64) -> Result<Vec<Problem>>;

    /// Users with an allowed access row for the contest
    async fn contestants(&self, contest_id: i64) -> Result<Vec<ContestantInfo>>;

    async fn contest_access(&self, user_id: i64, contest_id: i64)
        -> Result<Option<ContestAccessData>>;

    async fn insert_contest_access(&self, access: &ContestAccessData) -> Result<()>;

    async fn score_row(
        &self,
        view: ScoreView,
        contest_id: i64,
        problem_id: i64,
        user_id: i64,
    ) -> Result<Option<ScoreProblemData>>;

    async fn put_score_row(&self, view: ScoreView, row: &ScoreProblemData) -> Result<()>;

    async fn score_rows(&self, view: ScoreView, contest_id: i64) -> Result<Vec<ScoreProblemData>>;

    async fn slaves(&self) -> Result<Vec<SlaveData>>;

    /// Insert a queued submission and return its new id
    async fn insert_submission(&self, submission: &Submission) -> Result<i64>;

    async fn submission(&self, id: i64) -> Result<Option<Submission>>;

    async fn update_submission(&self, submission: &Submission) -> Result<()>;

    async fn insert_test_result(&self, result: &TestResult) -> Result<()>;

    async fn test_results(&self, submission_id: i64) -> Result<Vec<TestResult>>;
}

type ScoreKey = (ScoreView, i64, i64, i64);

#[derive(Default)]
struct Tables {
    problems: BTreeMap<i64, Problem>,
    test_cases: HashMap<i64, Vec<TestCase>>,
    languages: BTreeMap<i64, LanguageProgram>,
    contests: BTreeMap<i64, Contest>,
    users: HashMap<i64, UserProfile>,
    access: HashMap<(i64, i64), ContestAccessData>,
    scores: HashMap<ScoreKey, ScoreProblemData>,
    slaves: Vec<SlaveData>,
    submissions: BTreeMap<i64, Submission>,
    next_submission_id: i64,
    test_results: HashMap<i64, Vec<TestResult>>,
}

/// In-process storage
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn from_catalog(catalog: Catalog) -> Self {
        let mut tables = Tables {
            next_submission_id: 1,
            ..Default::default()
        };
        for p in catalog.problems {
            tables.problems.insert(p.id, p);
        }
        for t in catalog.test_cases {
            tables.test_cases.entry(t.problem_id).or_default().push(t);
        }
        for cases in tables.test_cases.values_mut() {
            cases.sort_by_key(|t| t.test_no);
        }
        for l in catalog.languages {
            tables.languages.insert(l.id, l);
        }
        for c in catalog.contests {
            tables.contests.insert(c.id, c);
        }
        for u in catalog.users {
            tables.users.insert(u.id, u);
        }
        for a in catalog.contest_access {
            tables.access.insert((a.user_id, a.contest_id), a);
        }
        tables.slaves = catalog.slaves;

        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn put_language(&self, language: LanguageProgram) {
        self.tables
            .write()
            .await
            .languages
            .insert(language.id, language);
    }

    pub async fn put_slave(&self, slave: SlaveData) {
        let mut tables = self.tables.write().await;
        tables.slaves.retain(|s| s.id != slave.id);
        tables.slaves.push(slave);
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn problem(&self, id: i64) -> Result<Option<Problem>> {
        Ok(self.tables.read().await.problems.get(&id).cloned())
    }

    async fn test_cases(&self, problem_id: i64) -> Result<Vec<TestCase>> {
        let tables = self.tables.read().await;
        Ok(tables
            .test_cases
            .get(&problem_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submission_count(&self, user_id: i64, problem_id: i64) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .filter(|s| s.user_id == user_id && s.problem_id == problem_id)
            .count() as u64)
    }

    async fn language(&self, id: i64) -> Result<Option<LanguageProgram>> {
        Ok(self.tables.read().await.languages.get(&id).cloned())
    }

    async fn languages(&self) -> Result<Vec<LanguageProgram>> {
        Ok(self.tables.read().await.languages.values().cloned().collect())
    }

    async fn contest(&self, id: i64) -> Result<Option<Contest>> {
        Ok(self.tables.read().await.contests.get(&id).cloned())
    }

    async fn contests(&self) -> Result<Vec<Contest>> {
        Ok(self.tables.read().await.contests.values().cloned().collect())
    }

    async fn contest_problems(&self, contest_id: i64) -> Result<Vec<Problem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .problems
            .values()
            .filter(|p| p.contest_id == Some(contest_id))
            .cloned()
            .collect())
    }

    async fn contestants(&self, contest_id: i64) -> Result<Vec<ContestantInfo>> {
        let tables = self.tables.read().await;
        let mut contestants: Vec<ContestantInfo> = tables
            .access
            .values()
            .filter(|a| a.contest_id == contest_id && a.allowed)
            .map(|a| {
                let profile = tables.users.get(&a.user_id);
                ContestantInfo {
                    user_id: a.user_id,
                    name: profile
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("user{}", a.user_id)),
                    institution: profile.map(|p| p.institution.clone()).unwrap_or_default(),
                    country: profile.map(|p| p.country.clone()).unwrap_or_default(),
                    joined_at: a.start_time,
                }
            })
            .collect();
        contestants.sort_by_key(|c| c.user_id);
        Ok(contestants)
    }

    async fn contest_access(
        &self,
        user_id: i64,
        contest_id: i64,
    ) -> Result<Option<ContestAccessData>> {
        let tables = self.tables.read().await;
        Ok(tables.access.get(&(user_id, contest_id)).cloned())
    }

    async fn insert_contest_access(&self, access: &ContestAccessData) -> Result<()> {
        self.tables
            .write()
            .await
            .access
            .insert((access.user_id, access.contest_id), access.clone());
        Ok(())
    }

    async fn score_row(
        &self,
        view: ScoreView,
        contest_id: i64,
        problem_id: i64,
        user_id: i64,
    ) -> Result<Option<ScoreProblemData>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scores
            .get(&(view, contest_id, problem_id, user_id))
            .cloned())
    }

    async fn put_score_row(&self, view: ScoreView, row: &ScoreProblemData) -> Result<()> {
        self.tables
            .write()
            .await
            .scores
            .insert((view, row.contest_id, row.problem_id, row.user_id), row.clone());
        Ok(())
    }

    async fn score_rows(&self, view: ScoreView, contest_id: i64) -> Result<Vec<ScoreProblemData>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<ScoreProblemData> = tables
            .scores
            .iter()
            .filter(|((v, c, _, _), _)| *v == view && *c == contest_id)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|r| (r.user_id, r.problem_id));
        Ok(rows)
    }

    async fn slaves(&self) -> Result<Vec<SlaveData>> {
        Ok(self.tables.read().await.slaves.clone())
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_submission_id.max(1);
        tables.next_submission_id = id + 1;

        let mut row = submission.clone();
        row.id = id;
        tables.submissions.insert(id, row);
        Ok(id)
    }

    async fn submission(&self, id: i64) -> Result<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn update_submission(&self, submission: &Submission) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.submissions.get_mut(&submission.id) {
            Some(row) => {
                *row = submission.clone();
                Ok(())
            }
            None => bail!("Submission {} does not exist", submission.id),
        }
    }

    async fn insert_test_result(&self, result: &TestResult) -> Result<()> {
        self.tables
            .write()
            .await
            .test_results
            .entry(result.submission_id)
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn test_results(&self, submission_id: i64) -> Result<Vec<TestResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .test_results
            .get(&submission_id)
            .cloned()
            .unwrap_or_default())
    }
}
