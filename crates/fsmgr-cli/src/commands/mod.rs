//! CLI subcommands and the context they share

pub mod audit;
pub mod config;
pub mod delete;
pub mod info;
pub mod mkdir;
pub mod rename;
pub mod restore;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use fsmgr_cache::{DatabasePool, SqliteMetadataStore};
use fsmgr_conflict::NameConflictResolver;
use fsmgr_core::config::Config;
use fsmgr_core::domain::{decode_user_path, Actor, PathResolver};
use fsmgr_sync::{LocalFileSystemMover, SyncEngine};
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command needs
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    config_path: Option<PathBuf>,
    user: Option<String>,
    encoded: bool,
}

impl Context {
    pub fn new(
        format: OutputFormat,
        config_path: Option<PathBuf>,
        user: Option<String>,
        encoded: bool,
    ) -> Self {
        Self {
            format,
            config_path,
            user,
            encoded,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Path of the configuration file in effect
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    pub fn load_config(&self) -> Config {
        Config::load_or_default(&self.config_path())
    }

    fn resolver(&self, config: &Config) -> PathResolver {
        PathResolver::new(&config.storage.root, &config.storage.recycle_root)
    }

    /// User path as typed. With `--encoded` it is decoded and resolved
    /// against the managed root, so encoded traversal fails here.
    pub fn path(&self, raw: &str) -> Result<String> {
        if !self.encoded {
            return Ok(raw.to_string());
        }
        let resolved = self.resolver(&self.load_config()).resolve_encoded(raw)?;
        Ok(resolved.canonical.as_str().to_string())
    }

    /// Single entry name as typed, decoded when `--encoded` is set
    pub fn name(&self, raw: &str) -> Result<String> {
        if self.encoded {
            Ok(decode_user_path(raw)?)
        } else {
            Ok(raw.to_string())
        }
    }

    /// Wire up the engine from configuration.
    pub async fn open_engine(&self) -> Result<(SyncEngine, Actor)> {
        let config = self.load_config();
        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", messages.join("; "));
        }

        for dir in [&config.storage.root, &config.storage.recycle_root] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteMetadataStore::new(pool.pool().clone()));

        debug!(
            root = %config.storage.root.display(),
            recycle_root = %config.storage.recycle_root.display(),
            "Opening engine"
        );

        let engine = SyncEngine::with_namer(
            self.resolver(&config),
            store,
            Arc::new(LocalFileSystemMover::new()),
            NameConflictResolver::new(config.naming.max_conflict_suffix),
        );

        let user = self
            .user
            .clone()
            .unwrap_or_else(|| config.identity.default_user.clone());
        let actor = Actor::new(user).context("Invalid user name")?;

        Ok((engine, actor))
    }
}
