//! Seed data for the master's store, read from a TOML file.
//!
//! ```toml
//! [[languages]]
//! id = 1
//! display_name = "C++17"
//! extension = "cpp"
//! source_name = "main.cpp"
//! executable_name = "main"
//! compile_command = "g++ -O2 -std=c++17 -o {exe} {source}"
//! execute_command = "{work_dir}/{exe}"
//!
//! [[slaves]]
//! id = 1
//! name = "slave-1"
//! address = "127.0.0.1:28499"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{
    Contest, ContestAccessData, LanguageProgram, Problem, SlaveData, TestCase, UserProfile,
};

#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub languages: Vec<LanguageProgram>,
    #[serde(default)]
    pub contests: Vec<Contest>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub contest_access: Vec<ContestAccessData>,
    #[serde(default)]
    pub slaves: Vec<SlaveData>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse catalog {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
