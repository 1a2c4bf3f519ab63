//! File logging under the loader's log directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "sfpatch.log";

/// `Documents/My Games/Starfield/SFSE/Logs`, next to the loader's own log
pub fn log_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|docs| {
        docs.join("My Games")
            .join("Starfield")
            .join("SFSE")
            .join("Logs")
    })
}

/// Install the global subscriber. Later calls do nothing.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let result = match log_dir() {
            Some(dir) => init_at(&dir),
            None => init_stderr(),
        };
        if let Err(e) = result {
            // No subscriber to report through
            eprintln!("sfpatch: logging disabled: {e:#}");
        }
    });
}

fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("sfpatch=info".parse()?)
        .add_directive("sfpatch_plugin=info".parse()?))
}

fn open_log(dir: &Path) -> Result<File> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    File::create(&path).with_context(|| format!("creating {}", path.display()))
}

fn init_at(dir: &Path) -> Result<()> {
    let file = open_log(dir)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow!("{e}"))
}

fn init_stderr() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_log_creates_directories() {
        let root = tempdir().unwrap();
        let dir = root.path().join("SFSE").join("Logs");

        let file = open_log(&dir).unwrap();
        drop(file);
        assert!(dir.join(LOG_FILE).is_file());
    }

    #[test]
    fn test_open_log_truncates_previous_session() {
        let root = tempdir().unwrap();
        fs::write(root.path().join(LOG_FILE), "old session").unwrap();

        drop(open_log(root.path()).unwrap());
        assert_eq!(fs::read_to_string(root.path().join(LOG_FILE)).unwrap(), "");
    }

    #[test]
    fn test_log_dir_layout() {
        if let Some(dir) = log_dir() {
            assert!(dir.ends_with("My Games/Starfield/SFSE/Logs"));
        }
    }

    #[test]
    fn test_env_filter_parses() {
        assert!(env_filter().is_ok());
    }
}
