//! Playwright integration for headless browser automation.
//!
//! This module contains the inline Node.js helper script, its line protocol,
//! error mapping, and availability checks for Node.js and Playwright.

use crate::{GrabError, Result, Viewport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Long-lived helper: one browser per process, one JSON command per stdin line,
/// one JSON reply per stdout line. Exits when stdin closes.
pub(crate) const PLAYWRIGHT_HELPER_SCRIPT: &str = r#"
const readline = require('readline');

let browser = null;
let context = null;
let page = null;

function reply(payload) {
  process.stdout.write(JSON.stringify(payload) + '\n');
}

function classify(err) {
  const message = err && err.message ? err.message : String(err);
  let kind = 'error';
  if ((err && err.name === 'TimeoutError') || /timeout/i.test(message)) {
    kind = 'timeout';
  } else if (/closed|disconnected|crash/i.test(message)) {
    kind = 'closed';
  }
  return { kind, message };
}

async function shutdown() {
  if (browser) {
    const current = browser;
    browser = null;
    await current.close().catch(() => {});
  }
}

async function handle(cmd) {
  switch (cmd.op) {
    case 'launch': {
      const { chromium } = require('playwright');
      browser = await chromium.launch({ headless: cmd.headless, args: cmd.args });
      context = await browser.newContext({
        userAgent: cmd.userAgent,
        viewport: cmd.viewport,
        locale: cmd.locale,
        extraHTTPHeaders: cmd.headers,
        ignoreHTTPSErrors: cmd.ignoreHttpsErrors,
        bypassCSP: cmd.bypassCsp
      });
      page = await context.newPage();
      return null;
    }
    case 'initScript':
      await page.addInitScript({ content: cmd.script });
      return null;
    case 'navigate': {
      const response = await page.goto(cmd.url, { waitUntil: cmd.waitUntil, timeout: cmd.timeoutMs });
      return response ? response.status() : null;
    }
    case 'viewport':
      await page.setViewportSize({ width: cmd.width, height: cmd.height });
      return null;
    case 'screenshot': {
      const buffer = await page.screenshot({ fullPage: cmd.fullPage, timeout: cmd.timeoutMs, type: 'png' });
      return buffer.toString('base64');
    }
    case 'content':
      if (cmd.scope === 'body') {
        return await page.locator('body').innerHTML({ timeout: cmd.timeoutMs });
      }
      return await page.content();
    case 'evaluate': {
      const value = await page.evaluate(cmd.expression);
      return value === undefined ? null : value;
    }
    case 'close':
      await shutdown();
      return null;
    default:
      throw new Error('unknown helper op: ' + cmd.op);
  }
}

async function dispatch(line) {
  if (!line.trim()) return;
  let cmd;
  try {
    cmd = JSON.parse(line);
  } catch (err) {
    reply({ id: null, ok: false, kind: 'protocol', error: 'invalid command: ' + line.slice(0, 200) });
    return;
  }
  try {
    const result = await handle(cmd);
    reply({ id: cmd.id, ok: true, result });
  } catch (err) {
    const { kind, message } = classify(err);
    reply({ id: cmd.id, ok: false, kind, error: message });
  }
}

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();
rl.on('line', (line) => {
  queue = queue.then(() => dispatch(line));
});
rl.on('close', () => {
  queue.then(shutdown).finally(() => process.exit(0));
});
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// One helper command. Serialized with an `op` tag next to the request id.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub(crate) enum HelperCommand<'a> {
    #[serde(rename_all = "camelCase")]
    Launch {
        headless: bool,
        args: &'a [String],
        user_agent: &'a str,
        viewport: Viewport,
        locale: &'a str,
        headers: BTreeMap<&'a str, &'a str>,
        ignore_https_errors: bool,
        bypass_csp: bool,
    },
    #[serde(rename_all = "camelCase")]
    InitScript { script: &'a str },
    #[serde(rename_all = "camelCase")]
    Navigate {
        url: &'a str,
        wait_until: &'static str,
        timeout_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Viewport { width: u32, height: u32 },
    #[serde(rename_all = "camelCase")]
    Screenshot { full_page: bool, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Content { scope: &'static str, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Evaluate { expression: &'a str },
    Close,
}

impl HelperCommand<'_> {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            HelperCommand::Launch { .. } => "launch",
            HelperCommand::InitScript { .. } => "init script",
            HelperCommand::Navigate { .. } => "navigation",
            HelperCommand::Viewport { .. } => "set viewport",
            HelperCommand::Screenshot { .. } => "screenshot",
            HelperCommand::Content { .. } => "content extraction",
            HelperCommand::Evaluate { .. } => "evaluate",
            HelperCommand::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct HelperRequest<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub command: &'a HelperCommand<'a>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelperResponse {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    pub kind: Option<String>,
    pub error: Option<String>,
}

/// Maps a spawn error to an appropriate GrabError.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> GrabError {
    if err.kind() == io::ErrorKind::NotFound {
        GrabError::session(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        GrabError::Io(err)
    }
}

fn missing_dependency_error(message: &str) -> Option<GrabError> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        return Some(GrabError::session(
            "Playwright npm package is missing; install with `npm install playwright`.",
        ));
    }
    if lower.contains("executable doesn't exist") {
        return Some(GrabError::session(
            "Chromium executable is missing; run `npx playwright install chromium`.",
        ));
    }
    None
}

/// Maps the stderr of a helper that exited early to an appropriate GrabError.
pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> GrabError {
    if let Some(err) = missing_dependency_error(stderr) {
        return err;
    }

    GrabError::session(format!(
        "Playwright helper exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Maps a failed helper reply to the capture error taxonomy.
pub(crate) fn map_helper_failure(
    command: &HelperCommand<'_>,
    kind: Option<&str>,
    message: String,
    timeout: Duration,
) -> GrabError {
    if let Some(err) = missing_dependency_error(&message) {
        return err;
    }

    let label = command.label();
    match (command, kind) {
        (HelperCommand::Navigate { url, .. }, _) => {
            GrabError::navigation(format!("{}: {}", url, message))
        }
        (_, Some("closed")) => GrabError::session(format!("{} failed: {}", label, message)),
        (_, Some("timeout")) => GrabError::render_timeout(label, timeout),
        _ => GrabError::session(format!("{} failed: {}", label, message)),
    }
}

/// Ensures Node.js is available on the system.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            GrabError::session(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(GrabError::session(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures the Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            GrabError::session(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(
            format!("{:?}", output.status),
            &stderr,
        ));
    }

    Ok(())
}
