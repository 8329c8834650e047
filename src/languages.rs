//! Language handling: command templates, source rewrites and the cached
//! language lookup used by the master.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::sync::RwLock;
use tracing::info;

use crate::core::LanguageProgram;
use crate::storage::Storage;

/// Values substituted into a command template
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub executable: &'a str,
    pub source: &'a str,
    pub work_dir: &'a Path,
    pub memory_limit_mb: u32,
}

/// Split a template on whitespace and fill in the placeholders of each
/// argument. An empty template yields an empty argv.
pub fn expand_command(template: &str, ctx: &CommandContext<'_>) -> Vec<String> {
    let work_dir = ctx.work_dir.to_string_lossy();
    let memory = ctx.memory_limit_mb.to_string();
    template
        .split_whitespace()
        .map(|arg| {
            arg.replace("{exe}", ctx.executable)
                .replace("{source}", ctx.source)
                .replace("{work_dir}", &work_dir)
                .replace("{mem_limit}", &memory)
        })
        .collect()
}

/// Executable name for this host. Windows needs an extension to run a file.
pub fn executable_name(language: &LanguageProgram) -> String {
    with_platform_suffix(&language.executable_name, cfg!(windows))
}

fn with_platform_suffix(name: &str, windows: bool) -> String {
    if windows && Path::new(name).extension().is_none() {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Apply the language's regex rewrite (if any) to the submitted source.
pub fn rewrite_source(language: &LanguageProgram, code: &str) -> Result<String> {
    let Some(pattern) = language.regex_replace_from.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(code.to_string());
    };
    let re = Regex::new(pattern).with_context(|| {
        format!(
            "Invalid source rewrite pattern for language {}: {}",
            language.id, pattern
        )
    })?;
    Ok(re
        .replace_all(code, language.regex_replace_to.as_str())
        .into_owned())
}

/// Lazily loaded, refreshable language table
pub struct LanguageCatalog {
    storage: Arc<dyn Storage>,
    cache: RwLock<Option<Arc<HashMap<i64, LanguageProgram>>>>,
}

impl LanguageCatalog {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cache: RwLock::new(None),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<LanguageProgram>> {
        let cached = self.cache.read().await.clone();
        let table = match cached {
            Some(table) => table,
            None => self.refresh().await?,
        };
        Ok(table.get(&id).cloned())
    }

    /// Reload every language from storage.
    pub async fn refresh(&self) -> Result<Arc<HashMap<i64, LanguageProgram>>> {
        let languages = self
            .storage
            .languages()
            .await
            .context("Failed to load languages")?;
        let table: Arc<HashMap<i64, LanguageProgram>> =
            Arc::new(languages.into_iter().map(|l| (l.id, l)).collect());
        info!("Loaded {} language configurations", table.len());
        *self.cache.write().await = Some(table.clone());
        Ok(table)
    }
}
