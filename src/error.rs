//! Typed failures surfaced to callers of the master's operations.
//!
//! Plumbing below these (storage, catalog loading, process spawning) reports
//! `anyhow::Error`, which lands in the `Internal`/`Storage` variants.

use thiserror::Error;

use crate::rpc::RpcError;

/// Why a submission was refused before anything was queued
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("problem {0} not found")]
    UnknownProblem(i64),

    #[error("language {0} not found")]
    UnknownLanguage(i64),

    #[error("language {0} is disabled")]
    LanguageDisabled(i64),

    #[error("{0}")]
    AccessDenied(String),

    #[error("maximum attempt count reached")]
    MaxAttemptsReached,

    #[error("admission failed: {0:#}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SlaveError {
    #[error("no available active slave")]
    NoAvailableSlave,

    #[error("failed to load slave pool: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Why an admitted submission could not be handed to a slave
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Slave(#[from] SlaveError),

    #[error("failed to reach slave {slave}: {source}")]
    Connect {
        slave: String,
        #[source]
        source: RpcError,
    },

    #[error("grading queue is closed")]
    QueueClosed,

    #[error("failed to persist submission: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Error)]
pub enum ScoreboardError {
    #[error("contest {0} not found")]
    UnknownContest(i64),

    #[error("public scoreboard not allowed")]
    PublicNotAllowed,

    #[error("scoreboard storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
