//! Development web server - spawning, ready detection and health checking

use std::net::TcpListener;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WebServerSettings;
use crate::error::ServerError;

/// Output lines that suggest the server is accepting connections
const READY_PATTERN: &str = r"(?i)ready|listening|started|compiled|local:";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to the run's web server
pub struct WebServer {
    /// `None` when an already running server was reused
    child: Option<Child>,
    pub base_url: String,
    pub port: u16,
}

impl WebServer {
    /// Start the configured server, or reuse a healthy one when allowed.
    ///
    /// When the configured port is taken and reuse is not allowed, a free
    /// port is picked and `base_url` rewritten to match.
    pub async fn start(
        settings: &WebServerSettings,
        project_root: &Path,
    ) -> Result<Self, ServerError> {
        let client = probe_client()?;

        if settings.reuse_existing_server && is_healthy(&client, &settings.base_url).await {
            info!("Reusing existing server at {}", settings.base_url);
            return Ok(Self {
                child: None,
                base_url: settings.base_url.clone(),
                port: settings.port,
            });
        }

        let (port, base_url) = if port_is_free(settings.port) {
            (settings.port, settings.base_url.clone())
        } else {
            let port = find_free_port()?;
            warn!("Port {} is in use; starting the server on {}", settings.port, port);
            (port, with_port(&settings.base_url, port))
        };

        info!("Starting web server: {}", settings.command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&settings.command)
            .current_dir(project_root)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| {
                ServerError::Startup(format!("failed to spawn `{}`: {}", settings.command, e))
            })?;

        let (ready_tx, ready_rx) = watch::channel(false);
        let ready = Regex::new(READY_PATTERN).map_err(|e| ServerError::Startup(e.to_string()))?;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(stdout, ready.clone(), base_url.clone(), ready_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(stderr, ready, base_url.clone(), ready_tx));
        }

        let mut server = Self {
            child: Some(child),
            base_url,
            port,
        };
        if let Err(e) = server.wait_for_healthy(&client, ready_rx, settings.timeout).await {
            let _ = server.stop().await;
            return Err(e);
        }

        info!("Server is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Poll `base_url` until it answers without a 5xx status. A ready line on
    /// the server's output triggers an immediate probe.
    async fn wait_for_healthy(
        &mut self,
        client: &reqwest::Client,
        mut ready: watch::Receiver<bool>,
        timeout_duration: Duration,
    ) -> Result<(), ServerError> {
        let deadline = Instant::now() + timeout_duration;
        let mut attempts = 0;

        while Instant::now() < deadline {
            if let Some(status) = self.exit_status()? {
                return Err(ServerError::Exited(status.to_string()));
            }

            attempts += 1;
            if is_healthy(client, &self.base_url).await {
                return Ok(());
            }
            if attempts == 1 {
                info!("Waiting for server at {}...", self.base_url);
            }

            tokio::select! {
                changed = ready.changed() => match changed {
                    Ok(()) => debug!("Server reported ready"),
                    // output closed; fall back to plain polling
                    Err(_) => sleep(POLL_INTERVAL).await,
                },
                _ = sleep(POLL_INTERVAL) => {}
            }
        }

        Err(ServerError::HealthCheck {
            url: self.base_url.clone(),
            attempts,
        })
    }

    fn exit_status(&mut self) -> Result<Option<ExitStatus>, ServerError> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    /// SIGTERM the server's process group, wait out the grace period, then
    /// kill. A reused server is left running.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping web server (pid: {:?})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!("SIGTERM to server process group failed: {}", e);
                }
            }
        }

        match timeout(STOP_GRACE, child.wait()).await {
            Ok(status) => {
                debug!("Server exited: {:?}", status);
            }
            Err(_) => {
                warn!("Server did not exit within {:?}; killing it", STOP_GRACE);
                child.kill().await?;
            }
        }
        Ok(())
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{killpg, Signal};
                use nix::unistd::Pid;

                if let Some(pid) = child.id() {
                    let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                }
            }
            let _ = child.start_kill();
        }
    }
}

async fn scan_output<R>(stream: R, ready: Regex, base_url: String, tx: watch::Sender<bool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "bdui::server", "{}", line);
        if !*tx.borrow() && (ready.is_match(&line) || line.contains(&base_url)) {
            let _ = tx.send(true);
        }
    }
}

fn probe_client() -> Result<reqwest::Client, ServerError> {
    Ok(reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?)
}

/// Any answer below 500 counts; a 404 still means something is listening
async fn is_healthy(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => !resp.status().is_server_error(),
        Err(e) => {
            if !e.is_connect() {
                debug!("Health check error: {}", e);
            }
            false
        }
    }
}

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Ask the OS for an unused port
pub fn find_free_port() -> Result<u16, ServerError> {
    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}

/// `base_url` with its port replaced
fn with_port(base_url: &str, port: u16) -> String {
    match Url::parse(base_url) {
        Ok(mut url) => match url.set_port(Some(port)) {
            Ok(()) => url.to_string(),
            Err(()) => format!("http://localhost:{}", port),
        },
        Err(_) => format!("http://localhost:{}", port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn settings(command: &str, port: u16) -> WebServerSettings {
        WebServerSettings {
            command: command.to_string(),
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            reuse_existing_server: false,
            timeout: Duration::from_millis(800),
        }
    }

    /// Minimal HTTP responder; returns its port
    async fn serve_ok() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });
        port
    }

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 0);
        assert!(port_is_free(port));
    }

    #[test]
    fn test_with_port_rewrites_url() {
        assert_eq!(with_port("http://localhost:3000/app", 4123), "http://localhost:4123/app");
        assert_eq!(with_port("not a url", 4123), "http://localhost:4123");
        // cannot carry a port
        assert_eq!(with_port("file:///srv/app", 4123), "http://localhost:4123");
    }

    #[test]
    fn test_ready_pattern() {
        let ready = Regex::new(READY_PATTERN).unwrap();
        assert!(ready.is_match("Server listening on 0.0.0.0:3000"));
        assert!(ready.is_match("  ➜  Local:   http://localhost:5173/"));
        assert!(ready.is_match("webpack compiled successfully"));
        assert!(!ready.is_match("Installing dependencies"));
    }

    #[tokio::test]
    async fn test_reuses_healthy_server() {
        let port = serve_ok().await;
        let mut settings = settings("exit 1", port);
        settings.reuse_existing_server = true;

        let mut server = WebServer::start(&settings, Path::new(".")).await.unwrap();
        assert!(server.child.is_none());
        assert_eq!(server.port, port);
        server.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_busy_port_moves_server() {
        let busy = serve_ok().await;
        // never becomes healthy; only the chosen port matters here
        let err = WebServer::start(&settings("echo listening; sleep 5", busy), Path::new("."))
            .await
            .err()
            .unwrap();
        match err {
            ServerError::HealthCheck { url, .. } => assert!(!url.contains(&format!(":{}", busy))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_server_is_reported() {
        let port = find_free_port().unwrap();
        let err = WebServer::start(&settings("exit 3", port), Path::new("."))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Exited(_) | ServerError::HealthCheck { .. }));
    }
}
