//! Chromium process lifecycle and DevTools target discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::driver::{CdpPage, PageOptions};
use super::error::BrowserError;
use super::page::BrowserPage;
use crate::infrastructure::config::BrowserConfig;

/// Binaries tried in order when no executable is configured.
const CHROMIUM_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Command-line flags for a headless scraping browser.
pub fn chromium_args(config: &BrowserConfig, port: u16, user_data_dir: &std::path::Path) -> Vec<String> {
    let mut args = Vec::new();
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(
        [
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--no-zygote",
            "--no-first-run",
            "--no-default-browser-check",
        ]
        .map(String::from),
    );
    args.push(format!("--user-agent={}", config.user_agent));
    args.push(format!(
        "--window-size={},{}",
        config.window_width, config.window_height
    ));
    args.push(format!("--remote-debugging-port={port}"));
    args.push(format!("--user-data-dir={}", user_data_dir.display()));
    args.push("about:blank".to_string());
    args
}

/// Pick the first `page` target's WebSocket URL from a `/json/list` reply.
pub fn select_page_target(targets: &Value) -> Option<String> {
    targets
        .as_array()?
        .iter()
        .filter(|t| t.get("type").and_then(Value::as_str) == Some("page"))
        .find_map(|t| t.get("webSocketDebuggerUrl").and_then(Value::as_str))
        .map(str::to_string)
}

/// A running (or attached) browser with one page.
///
/// Call [`BrowserSession::close`] when done; the child process is also
/// killed when the session is dropped.
pub struct BrowserSession {
    child: Option<Child>,
    page: Arc<CdpPage>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    /// Attach to `config.ws_url` when set, otherwise spawn Chromium.
    pub async fn launch(config: &BrowserConfig, page_options: PageOptions) -> Result<Self, BrowserError> {
        let startup_timeout = Duration::from_millis(config.startup_timeout_ms);

        if let Some(endpoint) = config.ws_url.as_deref() {
            let ws_url = if endpoint.starts_with("http") {
                discover_page_target(endpoint, startup_timeout).await?
            } else {
                endpoint.to_string()
            };
            info!("🔗 Attaching to existing browser at {}", ws_url);
            let page = CdpPage::connect(&ws_url, page_options).await?;
            return Ok(Self {
                child: None,
                page: Arc::new(page),
                user_data_dir: None,
            });
        }

        let user_data_dir =
            std::env::temp_dir().join(format!("incident-sync-{}", uuid::Uuid::new_v4()));
        Self::spawn(config, page_options, user_data_dir).await
    }

    /// Spawn Chromium on `user_data_dir`. When the browser never becomes
    /// usable the process is killed and the profile removed.
    async fn spawn(
        config: &BrowserConfig,
        page_options: PageOptions,
        user_data_dir: PathBuf,
    ) -> Result<Self, BrowserError> {
        let startup_timeout = Duration::from_millis(config.startup_timeout_ms);
        let args = chromium_args(config, config.debug_port, &user_data_dir);
        let mut child = spawn_chromium(config.executable.as_ref(), &args)?;

        let endpoint = format!("http://127.0.0.1:{}", config.debug_port);
        let connected = match discover_page_target(&endpoint, startup_timeout).await {
            Ok(ws_url) => CdpPage::connect(&ws_url, page_options).await,
            Err(e) => Err(e),
        };
        let page = match connected {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "browser did not become ready, discarding it");
                if let Err(kill_err) = child.kill().await {
                    debug!(error = %kill_err, "browser process already exited");
                }
                remove_profile(&user_data_dir).await;
                return Err(e);
            }
        };
        info!("🌐 Browser ready (pid {:?})", child.id());

        Ok(Self {
            child: Some(child),
            page: Arc::new(page),
            user_data_dir: Some(user_data_dir),
        })
    }

    pub fn page(&self) -> Arc<dyn BrowserPage> {
        self.page.clone()
    }

    /// Close the browser and release the profile directory.
    pub async fn close(mut self) {
        if self.child.is_some() {
            if let Err(e) = self
                .page
                .client()
                .send_command_with_timeout("Browser.close", serde_json::json!({}), Duration::from_secs(5))
                .await
            {
                debug!(error = %e, "Browser.close failed, killing process");
            }
        }
        self.page.close().await;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "browser process already exited");
            }
        }
        if let Some(dir) = self.user_data_dir.take() {
            remove_profile(&dir).await;
        }
        info!("🛑 Browser closed");
    }
}

async fn remove_profile(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(path = %dir.display(), "browser profile removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %dir.display(), "could not remove browser profile"),
    }
}

fn spawn_chromium(executable: Option<&PathBuf>, args: &[String]) -> Result<Child, BrowserError> {
    let candidates: Vec<PathBuf> = match executable {
        Some(path) => vec![path.clone()],
        None => CHROMIUM_CANDIDATES.iter().map(PathBuf::from).collect(),
    };

    let mut last_error = String::from("no executable candidates");
    for candidate in candidates {
        match Command::new(&candidate)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                info!("🚀 Launched {}", candidate.display());
                return Ok(child);
            }
            Err(e) => {
                debug!(error = %e, "could not spawn {}", candidate.display());
                last_error = format!("{}: {e}", candidate.display());
            }
        }
    }
    Err(BrowserError::LaunchFailed { reason: last_error })
}

/// Poll `{endpoint}/json/list` until a page target shows up.
async fn discover_page_target(endpoint: &str, timeout: Duration) -> Result<String, BrowserError> {
    let url = format!("{}/json/list", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to build HTTP client: {e}"),
        })?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match client.get(&url).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(targets) => {
                    if let Some(ws_url) = select_page_target(&targets) {
                        debug!(ws_url, "found DevTools page target");
                        return Ok(ws_url);
                    }
                }
                Err(e) => warn!(error = %e, "unreadable /json/list reply"),
            },
            Err(e) => debug!(error = %e, "DevTools endpoint not ready"),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(BrowserError::LaunchFailed {
                reason: format!("no page target at {url} after {timeout:?}"),
            });
        }
        tokio::time::sleep(DISCOVERY_POLL_INTERVAL).await;
    }
}
