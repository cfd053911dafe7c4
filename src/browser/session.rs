//! Playwright-backed browser sessions.
//!
//! Every session spawns its own Node.js helper (and therefore its own Chromium),
//! so nothing leaks between attempts. The helper is killed when the session is
//! dropped, which covers every path that never reaches `close`.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::playwright::{
    ensure_node_available, ensure_playwright_available, map_helper_failure, map_playwright_error,
    map_spawn_error, HelperCommand, HelperRequest, HelperResponse, PLAYWRIGHT_HELPER_SCRIPT,
};
use super::{BrowserDriver, BrowserSession, ContentScope, SessionOptions, WaitUntil};
use crate::{GrabError, Result, Viewport};

/// Default bound for starting Chromium and creating the page.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(45);

/// Extra time granted on top of a step timeout before the helper is considered hung.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

const STDERR_TAIL_BYTES: usize = 4096;

/// Starts one Node.js Playwright helper per session.
#[derive(Debug, Clone)]
pub struct PlaywrightDriver {
    node_command: String,
    launch_timeout: Duration,
    checked: Arc<OnceCell<()>>,
}

impl Default for PlaywrightDriver {
    fn default() -> Self {
        Self::new("node")
    }
}

impl PlaywrightDriver {
    pub fn new(node_command: impl Into<String>) -> Self {
        Self {
            node_command: node_command.into(),
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            checked: Arc::new(OnceCell::new()),
        }
    }

    pub fn with_launch_timeout(mut self, launch_timeout: Duration) -> Self {
        self.launch_timeout = launch_timeout;
        self
    }

    pub fn node_command(&self) -> &str {
        &self.node_command
    }

    /// Checks for node and the playwright package once per driver.
    async fn ensure_ready(&self) -> Result<()> {
        let node = self.node_command.as_str();
        self.checked
            .get_or_try_init(|| async move {
                ensure_node_available(node).await?;
                ensure_playwright_available(node).await
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    fn name(&self) -> &'static str {
        "playwright"
    }

    async fn open_session(&self, options: &SessionOptions) -> Result<Box<dyn BrowserSession>> {
        self.ensure_ready().await?;

        let mut cmd = Command::new(&self.node_command);
        cmd.arg("-e")
            .arg(PLAYWRIGHT_HELPER_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &self.node_command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GrabError::session("Playwright helper stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GrabError::session("Playwright helper stdout unavailable"))?;

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "sitegrab::playwright", "{line}");
                    if let Ok(mut buf) = tail.lock() {
                        buf.push_str(&line);
                        buf.push('\n');
                        if buf.len() > STDERR_TAIL_BYTES {
                            let mut cut = buf.len() - STDERR_TAIL_BYTES;
                            while !buf.is_char_boundary(cut) {
                                cut += 1;
                            }
                            buf.drain(..cut);
                        }
                    }
                }
            });
        }

        let mut session = PlaywrightSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            stderr_tail,
            next_id: 0,
            broken: false,
            closed: false,
        };

        let headers: BTreeMap<&str, &str> = options
            .extra_headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        session
            .call(
                HelperCommand::Launch {
                    headless: options.headless,
                    args: &options.launch_args,
                    user_agent: &options.user_agent,
                    viewport: options.viewport,
                    locale: &options.locale,
                    headers,
                    ignore_https_errors: options.ignore_https_errors,
                    bypass_csp: options.bypass_csp,
                },
                self.launch_timeout,
            )
            .await?;

        debug!(
            viewport = %options.viewport,
            locale = %options.locale,
            headless = options.headless,
            "playwright session ready"
        );
        Ok(Box::new(session))
    }
}

/// One helper process driving one page.
struct PlaywrightSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr_tail: Arc<Mutex<String>>,
    next_id: u64,
    /// Set once a reply missed its deadline; the helper state is unknown after that.
    broken: bool,
    closed: bool,
}

impl PlaywrightSession {
    async fn call(
        &mut self,
        command: HelperCommand<'_>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        if self.closed {
            return Err(GrabError::session("browser session already closed"));
        }
        if self.broken {
            return Err(GrabError::session(
                "Playwright helper stopped responding after an earlier timeout",
            ));
        }

        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&HelperRequest {
            id,
            command: &command,
        })?;
        line.push('\n');

        let write_result = match self.stdin.as_mut() {
            Some(stdin) => match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(err) => Err(err),
            },
            None => return Err(GrabError::session("Playwright helper stdin closed")),
        };
        if let Err(err) = write_result {
            return Err(self.exited_error(&format!("write failed ({err})")));
        }

        let deadline = timeout + RESPONSE_GRACE;
        let reply = match tokio::time::timeout(deadline, self.read_reply(id)).await {
            Ok(reply) => reply?,
            Err(_) => {
                self.broken = true;
                return Err(match &command {
                    HelperCommand::Navigate { url, .. } => GrabError::navigation(format!(
                        "{}: no response from browser within {:?}",
                        url, deadline
                    )),
                    other => GrabError::render_timeout(other.label(), timeout),
                });
            }
        };

        if reply.ok {
            Ok(reply.result)
        } else {
            let message = reply
                .error
                .unwrap_or_else(|| "unknown helper error".to_string());
            Err(map_helper_failure(
                &command,
                reply.kind.as_deref(),
                message,
                timeout,
            ))
        }
    }

    async fn read_reply(&mut self, id: u64) -> Result<HelperResponse> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(self.exited_error("helper closed its output"));
            };
            let reply = match serde_json::from_str::<HelperResponse>(&line) {
                Ok(reply) => reply,
                Err(_) => {
                    debug!(line = %line, "ignoring non-protocol helper output");
                    continue;
                }
            };
            match reply.id {
                Some(reply_id) if reply_id == id => return Ok(reply),
                None if !reply.ok => {
                    return Err(GrabError::session(
                        reply
                            .error
                            .unwrap_or_else(|| "helper protocol error".to_string()),
                    ))
                }
                other => debug!(expected = id, got = ?other, "skipping stale helper reply"),
            }
        }
    }

    fn exited_error(&self, context: &str) -> GrabError {
        let tail = self
            .stderr_tail
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        map_playwright_error(context, &tail)
    }
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn add_init_script(&mut self, script: &str, timeout: Duration) -> Result<()> {
        self.call(HelperCommand::InitScript { script }, timeout)
            .await
            .map(|_| ())
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<()> {
        let status = self
            .call(
                HelperCommand::Navigate {
                    url,
                    wait_until: wait_until.as_playwright(),
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        match status.as_u64() {
            Some(code) if code >= 400 => warn!(url, status = code, "page responded with error status"),
            Some(code) => debug!(url, status = code, "navigation committed"),
            None => debug!(url, "navigation committed without a response"),
        }
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport, timeout: Duration) -> Result<()> {
        self.call(
            HelperCommand::Viewport {
                width: viewport.width,
                height: viewport.height,
            },
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn screenshot(&mut self, full_page: bool, timeout: Duration) -> Result<Vec<u8>> {
        let encoded = self
            .call(
                HelperCommand::Screenshot {
                    full_page,
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        let encoded = encoded
            .as_str()
            .ok_or_else(|| GrabError::session("screenshot reply was not a string"))?;
        BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| GrabError::session(format!("screenshot reply was not base64: {e}")))
    }

    async fn content(&mut self, scope: ContentScope, timeout: Duration) -> Result<String> {
        let scope = match scope {
            ContentScope::Body => "body",
            ContentScope::Document => "document",
        };
        let markup = self
            .call(
                HelperCommand::Content {
                    scope,
                    timeout_ms: timeout.as_millis() as u64,
                },
                timeout,
            )
            .await?;
        match markup {
            serde_json::Value::String(markup) => Ok(markup),
            serde_json::Value::Null => Ok(String::new()),
            other => Err(GrabError::session(format!(
                "content reply was not a string: {other}"
            ))),
        }
    }

    async fn evaluate(&mut self, expression: &str, timeout: Duration) -> Result<serde_json::Value> {
        self.call(HelperCommand::Evaluate { expression }, timeout)
            .await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = if self.broken {
            Ok(())
        } else {
            self.call(HelperCommand::Close, CLOSE_TIMEOUT)
                .await
                .map(|_| ())
        };
        self.closed = true;
        drop(self.stdin.take());

        match tokio::time::timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "playwright helper exited"),
            Ok(Err(err)) => warn!(error = %err, "failed waiting for playwright helper"),
            Err(_) => {
                warn!("playwright helper did not exit in time; killing it");
                if let Err(err) = self.child.kill().await {
                    warn!(error = %err, "failed to kill playwright helper");
                }
            }
        }
        result
    }
}
