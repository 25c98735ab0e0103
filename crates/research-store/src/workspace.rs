//! Workspace: a directory owning all pipeline state.
//!
//! Resolution order: explicit path, `RESEARCH_WORKSPACE`, then
//! `./research-workspace`. A workspace exists once `research-kit.yaml` does.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::ResearchConfig;
use crate::counters::CounterJournal;
use crate::io::write_atomic;

/// Environment variable overriding the workspace path.
pub const WORKSPACE_ENV_VAR: &str = "RESEARCH_WORKSPACE";

/// Configuration filename marking an initialized workspace.
pub const CONFIG_FILENAME: &str = "research-kit.yaml";

const STATE_DIR: &str = ".state";

/// Directories scaffolded by `init`.
const WORKSPACE_DIRS: &[&str] = &[
    ".state",
    "inbox",
    "strategies/pending",
    "strategies/active",
    "strategies/blocked",
    "strategies/error",
    "strategies/validated",
    "strategies/conditional",
    "strategies/invalidated",
    "strategies/archive",
    "validations",
    "learnings",
    "ideas",
    "proposals",
    "logs",
];

const ENV_TEMPLATE: &str = "\
# Research-Kit environment
# Copy to .env and fill in values

# LLM provider key (persona orchestration)
ANTHROPIC_API_KEY=

# Optional: override workspace path
# RESEARCH_WORKSPACE=
";

/// An initialized research workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config: ResearchConfig,
}

impl Workspace {
    /// Resolve the workspace root from an explicit path, the environment, or
    /// the default location.
    pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(env_path) = std::env::var(WORKSPACE_ENV_VAR) {
            if !env_path.is_empty() {
                return PathBuf::from(env_path);
            }
        }
        PathBuf::from("research-workspace")
    }

    /// Scaffold a new workspace: directories, default config, env template.
    /// Idempotent: re-running against an initialized workspace is a no-op.
    pub fn init(root: &Path) -> Result<Workspace> {
        for dir in WORKSPACE_DIRS {
            std::fs::create_dir_all(root.join(dir))
                .with_context(|| format!("Failed to create {:?}", root.join(dir)))?;
        }

        let config_path = root.join(CONFIG_FILENAME);
        if !config_path.exists() {
            let default = serde_yaml::to_string(&ResearchConfig::default())
                .context("Failed to serialize default config")?;
            write_atomic(&config_path, default.as_bytes())?;
        }

        let env_path = root.join(".env.template");
        if !env_path.exists() {
            write_atomic(&env_path, ENV_TEMPLATE.as_bytes())?;
        }

        tracing::info!(workspace = %root.display(), "workspace initialized");
        Workspace::open(root)
    }

    /// Open an initialized workspace, loading and validating its config.
    pub fn open(root: &Path) -> Result<Workspace> {
        let config_path = root.join(CONFIG_FILENAME);
        if !config_path.exists() {
            bail!(
                "workspace not initialized at {:?}; run 'research-kit init' first",
                root
            );
        }
        let config = ResearchConfig::load(&config_path)?;
        Ok(Workspace {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join("inbox")
    }

    pub fn strategies_dir(&self) -> PathBuf {
        self.root.join("strategies")
    }

    pub fn validations_dir(&self) -> PathBuf {
        self.root.join("validations")
    }

    pub fn learnings_dir(&self) -> PathBuf {
        self.root.join("learnings")
    }

    pub fn ideas_dir(&self) -> PathBuf {
        self.root.join("ideas")
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.root.join("proposals")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Counter journal rooted in this workspace's state directory.
    pub fn counters(&self) -> CounterJournal {
        CounterJournal::new(&self.state_dir())
    }

    /// Files currently waiting in the inbox, sorted for determinism.
    pub fn inbox_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let inbox = self.inbox_dir();
        if !inbox.exists() {
            return Ok(files);
        }
        for entry in std::fs::read_dir(&inbox)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
