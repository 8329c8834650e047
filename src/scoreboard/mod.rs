//! Scoreboard engine
//!
//! Every graded submission updates the private (jury) score rows. The public
//! rows are only updated while the contest is not frozen. Boards are built
//! from those rows on demand and cached until the next invalidation.

pub mod cache;
pub mod ranking;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::utils::unix_now;
use crate::core::{Contest, ContestStyle, ScoreProblemData, ScoreView, Submission};
use crate::error::ScoreboardError;
use crate::storage::Storage;

pub use cache::BoardCache;
pub use ranking::{build_scoreboard, ScoreboardData, COLOR_WHEEL};

/// Who is looking at a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerRole {
    Contestant,
    Jury,
    Admin,
}

impl ViewerRole {
    pub fn view(&self) -> ScoreView {
        match self {
            ViewerRole::Contestant => ScoreView::Public,
            ViewerRole::Jury | ViewerRole::Admin => ScoreView::Private,
        }
    }
}

/// Cache state of one contest's boards
#[derive(Debug, Clone, Serialize)]
pub struct BoardStatus {
    pub contest_id: i64,
    pub public_dirty: bool,
    pub public_computed_at: Option<DateTime<Utc>>,
    pub private_dirty: bool,
    pub private_computed_at: Option<DateTime<Utc>>,
}

/// Fold one graded submission into an existing score row.
///
/// Returns `None` when the row must not change: the problem was already
/// accepted under ICPC rules.
pub fn apply_result(
    contest: &Contest,
    existing: Option<ScoreProblemData>,
    submission: &Submission,
    accepted: bool,
    now: i64,
) -> Option<ScoreProblemData> {
    let score = match contest.style {
        ContestStyle::Icpc => i32::from(accepted && submission.score >= 100),
        ContestStyle::Ioi => submission.score,
    };

    let Some(mut row) = existing else {
        return Some(ScoreProblemData {
            contest_id: contest.id,
            problem_id: submission.problem_id,
            user_id: submission.user_id,
            score,
            accepted_time: if accepted { now } else { 0 },
            penalty_time: if accepted { 0 } else { contest.penalty_time_secs },
            submission_count: 1,
            one_hit: accepted,
            regraded: false,
        });
    };

    if contest.style == ContestStyle::Icpc && row.accepted_time > 0 {
        return None;
    }

    row.submission_count += 1;
    match contest.style {
        ContestStyle::Icpc => row.score = score,
        ContestStyle::Ioi => {
            if score > row.score {
                row.score = score;
                row.regraded = true;
            }
        }
    }
    if accepted {
        if row.accepted_time == 0 {
            row.accepted_time = now;
        }
    } else {
        row.penalty_time += contest.penalty_time_secs;
    }
    Some(row)
}

/// (view, contest, problem, user)
type RowKey = (ScoreView, i64, i64, i64);

pub struct Scoreboard {
    storage: Arc<dyn Storage>,
    public: BoardCache<i64, ScoreboardData>,
    private: BoardCache<i64, ScoreboardData>,
    unfrozen: DashSet<i64>,
    /// Serializes the read-modify-write of each score row
    row_locks: DashMap<RowKey, Arc<Mutex<()>>>,
}

impl Scoreboard {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            public: BoardCache::new(),
            private: BoardCache::new(),
            unfrozen: DashSet::new(),
            row_locks: DashMap::new(),
        }
    }

    fn cache(&self, view: ScoreView) -> &BoardCache<i64, ScoreboardData> {
        match view {
            ScoreView::Public => &self.public,
            ScoreView::Private => &self.private,
        }
    }

    async fn load_contest(&self, contest_id: i64) -> Result<Contest, ScoreboardError> {
        self.storage
            .contest(contest_id)
            .await?
            .ok_or(ScoreboardError::UnknownContest(contest_id))
    }

    /// Record a graded submission. Problems outside any contest are ignored.
    pub async fn submit_score(
        &self,
        submission: &Submission,
        accepted: bool,
    ) -> Result<(), ScoreboardError> {
        self.submit_score_at(submission, accepted, unix_now()).await
    }

    pub async fn submit_score_at(
        &self,
        submission: &Submission,
        accepted: bool,
        now: i64,
    ) -> Result<(), ScoreboardError> {
        let Some(problem) = self.storage.problem(submission.problem_id).await? else {
            return Ok(());
        };
        let Some(contest_id) = problem.contest_id else {
            return Ok(());
        };
        let contest = self.load_contest(contest_id).await?;

        self.apply(ScoreView::Private, &contest, submission, accepted, now)
            .await?;
        if contest.is_frozen_at(now) && !self.unfrozen.contains(&contest.id) {
            debug!(
                "Contest {} is frozen, public board skips submission {}",
                contest.id, submission.id
            );
        } else {
            self.apply(ScoreView::Public, &contest, submission, accepted, now)
                .await?;
        }

        self.invalidate(contest.id);
        Ok(())
    }

    async fn apply(
        &self,
        view: ScoreView,
        contest: &Contest,
        submission: &Submission,
        accepted: bool,
        now: i64,
    ) -> Result<(), ScoreboardError> {
        let key = (view, contest.id, submission.problem_id, submission.user_id);
        let lock = self.row_locks.entry(key).or_default().clone();
        let _guard = lock.lock().await;

        let existing = self
            .storage
            .score_row(view, contest.id, submission.problem_id, submission.user_id)
            .await?;
        if let Some(row) = apply_result(contest, existing, submission, accepted, now) {
            self.storage.put_score_row(view, &row).await?;
        }
        Ok(())
    }

    /// The board `role` is allowed to see, from cache when it is clean.
    pub async fn scoreboard(
        &self,
        contest_id: i64,
        role: ViewerRole,
    ) -> Result<Arc<ScoreboardData>, ScoreboardError> {
        let view = role.view();
        if view == ScoreView::Public {
            let contest = self.load_contest(contest_id).await?;
            if !contest.allow_public {
                return Err(ScoreboardError::PublicNotAllowed);
            }
        }
        self.cache(view)
            .get_or_compute(contest_id, || self.compute(view, contest_id))
            .await
    }

    async fn compute(
        &self,
        view: ScoreView,
        contest_id: i64,
    ) -> Result<ScoreboardData, ScoreboardError> {
        let contest = self.load_contest(contest_id).await?;
        let problems = self.storage.contest_problems(contest_id).await?;
        let contestants = self.storage.contestants(contest_id).await?;
        let rows = self.storage.score_rows(view, contest_id).await?;
        debug!(
            "Computing {:?} scoreboard for contest {} ({} rows)",
            view,
            contest_id,
            rows.len()
        );
        Ok(build_scoreboard(&contest, problems, contestants, &rows))
    }

    /// Mark both boards of the contest dirty.
    pub fn invalidate(&self, contest_id: i64) {
        self.public.invalidate(&contest_id);
        self.private.invalidate(&contest_id);
    }

    /// Publish the live results: copy every private row over the public one.
    pub async fn unfreeze(&self, contest_id: i64) -> Result<usize, ScoreboardError> {
        self.load_contest(contest_id).await?;
        let rows = self
            .storage
            .score_rows(ScoreView::Private, contest_id)
            .await?;
        for row in &rows {
            self.storage.put_score_row(ScoreView::Public, row).await?;
        }
        self.unfrozen.insert(contest_id);
        self.invalidate(contest_id);
        info!(
            "Unfroze contest {}: {} score rows published",
            contest_id,
            rows.len()
        );
        Ok(rows.len())
    }

    /// Unfreeze every contest whose unfreeze time has passed, once each.
    pub async fn unfreeze_due(&self, now: i64) -> Result<Vec<i64>, ScoreboardError> {
        let mut unfrozen = Vec::new();
        for contest in self.storage.contests().await? {
            let due = matches!(
                (contest.freeze_time, contest.unfreeze_time),
                (Some(_), Some(at)) if at.timestamp() <= now
            );
            if due && !self.unfrozen.contains(&contest.id) {
                self.unfreeze(contest.id).await?;
                unfrozen.push(contest.id);
            }
        }
        Ok(unfrozen)
    }

    pub fn board_status(&self, contest_id: i64) -> BoardStatus {
        BoardStatus {
            contest_id,
            public_dirty: self.public.is_dirty(&contest_id),
            public_computed_at: self.public.computed_at(&contest_id),
            private_dirty: self.private.is_dirty(&contest_id),
            private_computed_at: self.private.computed_at(&contest_id),
        }
    }
}
