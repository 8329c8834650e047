//! Contest access pre-check
//!
//! A user's first submission to a contest problem registers them as a
//! contestant (if the contest is running) and starts their personal clock.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::core::utils::unix_now;
use crate::core::ContestAccessData;
use crate::scoreboard::Scoreboard;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(String),
}

#[async_trait]
pub trait ContestAccess: Send + Sync {
    async fn check_access(&self, user_id: i64, contest_id: i64) -> Result<AccessDecision>;
}

/// Storage-backed access check with a per (user, contest) cache
pub struct ContestGate {
    storage: Arc<dyn Storage>,
    scoreboard: Arc<Scoreboard>,
    cache: DashMap<(i64, i64), ContestAccessData>,
}

impl ContestGate {
    pub fn new(storage: Arc<dyn Storage>, scoreboard: Arc<Scoreboard>) -> Self {
        Self {
            storage,
            scoreboard,
            cache: DashMap::new(),
        }
    }

    pub async fn check_access_at(
        &self,
        user_id: i64,
        contest_id: i64,
        now: i64,
    ) -> Result<AccessDecision> {
        let cached = self.cache.get(&(user_id, contest_id)).map(|a| a.value().clone());
        let access = match cached {
            Some(access) => access,
            None => {
                let stored = self.storage.contest_access(user_id, contest_id).await?;
                let access = match stored {
                    Some(access) => access,
                    None => match self.enter(user_id, contest_id, now).await? {
                        Ok(access) => access,
                        Err(reason) => return Ok(AccessDecision::Denied(reason)),
                    },
                };
                self.cache.insert((user_id, contest_id), access.clone());
                access
            }
        };

        if !access.allowed {
            return Ok(AccessDecision::Denied(
                "you are not allowed to attend this contest".into(),
            ));
        }
        if access.end_time > 0 && now > access.end_time {
            return Ok(AccessDecision::Denied("your time is over".into()));
        }
        Ok(AccessDecision::Allowed)
    }

    /// Register the user for a running contest. The inner `Err` is a denial.
    async fn enter(
        &self,
        user_id: i64,
        contest_id: i64,
        now: i64,
    ) -> Result<std::result::Result<ContestAccessData, String>> {
        let Some(contest) = self.storage.contest(contest_id).await? else {
            return Ok(Err(format!("contest {} not found", contest_id)));
        };
        if !contest.active {
            return Ok(Err("contest is not active".into()));
        }
        if contest.start_time.is_some_and(|t| now < t.timestamp()) {
            return Ok(Err("contest has not started yet".into()));
        }
        let contest_end = contest.end_time.map(|t| t.timestamp());
        if contest_end.is_some_and(|end| now > end) {
            return Ok(Err("contest is over".into()));
        }

        let end_time = match (contest.max_time_secs, contest_end) {
            (0, end) => end.unwrap_or(0),
            (budget, Some(end)) => (now + budget).min(end),
            (budget, None) => now + budget,
        };
        let access = ContestAccessData {
            contest_id,
            user_id,
            allowed: true,
            start_time: now,
            end_time,
        };
        self.storage
            .insert_contest_access(&access)
            .await
            .context("Failed to record contest entry")?;
        self.scoreboard.invalidate(contest_id);
        info!("User {} entered contest {}", user_id, contest_id);
        Ok(Ok(access))
    }
}

#[async_trait]
impl ContestAccess for ContestGate {
    async fn check_access(&self, user_id: i64, contest_id: i64) -> Result<AccessDecision> {
        self.check_access_at(user_id, contest_id, unix_now()).await
    }
}
