use crate::browser::{Browser, BrowserConfig, BrowserError};
use crate::config::BrowserEngine;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinError;
use tracing::{info, warn};

/// Browser fetched by the installer; `stable` keeps it current.
pub const INSTALL_TARGET: &str = "chrome@stable";
pub const INSTALL_DIR_ENV: &str = "SCRAPECRAWL_BROWSER_DIR";

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("the {0} engine is not supported, only chromium can be driven over DevTools")]
    UnsupportedEngine(BrowserEngine),
    #[error("missing dependency: npx is needed to install a browser ({0})")]
    InstallerMissing(#[source] std::io::Error),
    #[error("browser installation failed: {0}")]
    InstallFailed(String),
    #[error("browser can't be launched: {0}")]
    LaunchFailed(#[from] BrowserError),
    #[error("Task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, SetupError>;

/// A browser known to launch on this machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserRuntime {
    /// `None` means headless_chrome's own lookup finds it.
    pub executable: Option<PathBuf>,
}

async fn try_launch(executable: Option<PathBuf>) -> Result<()> {
    let config = BrowserConfig {
        executable,
        ..BrowserConfig::default()
    };
    // Dropping the session closes the process again.
    tokio::task::spawn_blocking(move || Browser::launch(&config).map(drop)).await??;
    Ok(())
}

pub fn install_dir() -> PathBuf {
    std::env::var_os(INSTALL_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("scrapecrawl-browsers"))
}

/// Reads the executable path from the installer's output, whose last line
/// looks like `chrome@131.0.6778.85 /path/to/chrome`.
pub fn parse_installed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split_once(' '))
        .map(|(_, path)| PathBuf::from(path.trim()))
        .filter(|path| !path.as_os_str().is_empty())
}

async fn install_browser(dir: &Path) -> Result<PathBuf> {
    info!("Installing {} into {}", INSTALL_TARGET, dir.display());

    // An interrupted run takes the installer down with it.
    let output = Command::new("npx")
        .args(["--yes", "@puppeteer/browsers", "install", INSTALL_TARGET, "--path"])
        .arg(dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(SetupError::InstallerMissing)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SetupError::InstallFailed(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_installed_path(&stdout).ok_or_else(|| {
        SetupError::InstallFailed(format!("unexpected installer output: {}", stdout.trim()))
    })
}

/// Makes sure a browser for `engine` can be launched, installing one once
/// if the first launch fails.
pub async fn ensure_browser(engine: BrowserEngine) -> Result<BrowserRuntime> {
    if engine != BrowserEngine::Chromium {
        return Err(SetupError::UnsupportedEngine(engine));
    }

    match try_launch(None).await {
        Ok(()) => {
            info!("Browser is ready");
            return Ok(BrowserRuntime { executable: None });
        }
        Err(e) => warn!("Browser not available: {}", e),
    }

    let executable = install_browser(&install_dir()).await?;
    try_launch(Some(executable.clone())).await?;
    info!("Installed browser at {}", executable.display());

    Ok(BrowserRuntime {
        executable: Some(executable),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn other_engines_are_rejected() {
        let err = ensure_browser(BrowserEngine::Firefox).await.unwrap_err();
        assert!(matches!(err, SetupError::UnsupportedEngine(BrowserEngine::Firefox)));
        assert!(err.to_string().contains("firefox"));
    }

    #[test]
    fn installer_output_gives_executable() {
        let stdout = concat!(
            "Downloading...\n",
            "chrome@131.0.6778.85 /tmp/b/chrome/linux-131/chrome-linux64/chrome\n\n",
        );
        assert_eq!(
            parse_installed_path(stdout),
            Some(PathBuf::from("/tmp/b/chrome/linux-131/chrome-linux64/chrome"))
        );
        assert_eq!(parse_installed_path(""), None);
        assert_eq!(parse_installed_path("nothing"), None);
    }
}
