//! Gavel - a master/slave judge for programming contests.
//!
//! The master admits submissions, hands them to a live slave over RPC and
//! folds the graded result into a freeze-aware scoreboard. Slaves compile and
//! run the submitted program in a scratch directory under a wall-clock timeout
//! while sampling its peak memory.

pub mod api;
pub mod catalog;
pub mod config;
pub mod contest_access;
pub mod core;
pub mod error;
pub mod grading;
pub mod judger;
pub mod languages;
pub mod notify;
pub mod rpc;
pub mod runner;
pub mod scoreboard;
pub mod slave_manager;
pub mod storage;
pub mod submission;
pub mod workspace;
