use std::path::PathBuf;

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const ASSET_DIR_ENV: &str = "TASKTRACK_ASSET_DIR";

/// Directory holding the local sqlite database and other runtime files.
///
/// `TASKTRACK_ASSET_DIR` wins when set; debug builds fall back to
/// `dev_assets/` at the workspace root, release builds to the platform data
/// directory.
pub fn asset_dir() -> std::io::Result<PathBuf> {
    if let Ok(override_dir) = std::env::var(ASSET_DIR_ENV) {
        let override_dir = override_dir.trim();
        if !override_dir.is_empty() {
            let path = PathBuf::from(override_dir);
            std::fs::create_dir_all(&path)?;
            return Ok(path);
        }
    }

    let path = if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("dev", "tasktrack", "tasktrack")
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "OS didn't give us a home directory",
                )
            })?
            .data_dir()
            .to_path_buf()
    };

    if !path.exists() {
        tracing::debug!("Creating asset directory {}", path.display());
        std::fs::create_dir_all(&path)?;
    }

    Ok(path)
}

pub fn default_database_url() -> std::io::Result<String> {
    let db_path = asset_dir()?.join("db.sqlite");
    Ok(format!("sqlite://{}?mode=rwc", db_path.to_string_lossy()))
}
