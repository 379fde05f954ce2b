use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    /// Resolve where the database lives. An explicit path wins over the
    /// per-user data directory.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        if let Some(db_path) = db_override {
            let data_dir = db_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), std::path::Path::to_path_buf);
            Self::ensure_dir(&data_dir)?;
            return Ok(Config { db_path, data_dir });
        }

        let proj_dirs =
            ProjectDirs::from("", "", "potluck").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        Self::ensure_dir(&data_dir)?;

        let db_path = data_dir.join("potluck.db");

        Ok(Config { db_path, data_dir })
    }

    fn ensure_dir(dir: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))
    }
}
