//! Playwright page backend
//!
//! Runs a long-lived `node` process that owns one browser page and answers
//! JSON-line requests on stdin/stdout:
//!
//! ```text
//! -> {"id":1,"op":"goto","args":{"url":"http://localhost:3000","timeout":30000}}
//! <- {"id":1,"ok":true,"result":null,"url":"http://localhost:3000/"}
//! <- {"id":2,"ok":false,"kind":"timeout","error":"...","url":"..."}
//! ```
//!
//! The bridge prints `{"ready":true}` once the browser is up.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::browser::{Inspection, PageBackend};
use super::Viewport;
use crate::config::WorldConfig;
use crate::error::{DriverError, DriverResult};

const OPTIONS_ENV: &str = "BDUI_BRIDGE_OPTIONS";
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);
const CALL_TIMEOUT: Duration = Duration::from_secs(90);
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const options = JSON.parse(process.env.BDUI_BRIDGE_OPTIONS || '{}');
const send = (message) => process.stdout.write(JSON.stringify(message) + '\n');
const describe = (error) => String((error && error.message) || error);

(async () => {
  let playwright;
  try {
    playwright = require('playwright');
  } catch (error) {
    send({ ready: false, error: 'cannot load playwright: ' + describe(error) });
    process.exit(1);
  }

  const browser = await playwright[options.browser || 'chromium'].launch({
    headless: options.headless !== false,
  });
  const context = await browser.newContext({ viewport: options.viewport });
  const page = await context.newPage();

  const inspect = async (selector) => {
    const handle = await page.$(selector);
    if (!handle) return null;
    const snapshot = await handle.evaluate((el) => {
      const tag = el.tagName.toLowerCase();
      return {
        tag,
        inputType: tag === 'input' ? (el.type || 'text').toLowerCase() : null,
        text: (el.innerText === undefined ? el.textContent : el.innerText) || '',
        value: ['input', 'textarea', 'select', 'option'].includes(tag) ? String(el.value) : null,
        checked: !!el.checked,
        multiple: !!el.multiple,
        selectedValues: tag === 'select' ? Array.from(el.selectedOptions).map((o) => o.value) : [],
        options: tag === 'select' ? Array.from(el.options).map((o) => o.value) : [],
        href: tag === 'a' ? el.href : null,
      };
    });
    snapshot.visible = await handle.isVisible();
    return snapshot;
  };

  const handlers = {
    goto: async ({ url, timeout }) => { await page.goto(url, { timeout }); },
    reload: async () => { await page.reload(); },
    back: async () => { await page.goBack(); },
    forward: async () => { await page.goForward(); },
    click: async ({ selector }) => {
      await page.click(selector);
      await page.waitForLoadState().catch(() => {});
    },
    fill: async ({ selector, value }) => { await page.fill(selector, value); },
    type: async ({ selector, text }) => {
      await page.focus(selector);
      await page.$eval(selector, (el) => {
        if (typeof el.setSelectionRange === 'function' && typeof el.value === 'string') {
          try { el.setSelectionRange(el.value.length, el.value.length); } catch (_) {}
        }
      });
      await page.keyboard.type(text);
    },
    select: async ({ selector, values }) => { await page.selectOption(selector, values); },
    inspect: async ({ selector }) => inspect(selector),
    screenshot: async ({ fullPage }) => (await page.screenshot({ fullPage })).toString('base64'),
    setViewport: async ({ width, height }) => { await page.setViewportSize({ width, height }); },
    viewport: async () => page.viewportSize(),
    url: async () => page.url(),
    close: async () => { await browser.close(); },
  };

  const classify = (error) => {
    if (error && error.name === 'TimeoutError') return 'timeout';
    if (/net::|NS_ERROR|Navigation failed|Cannot navigate/i.test(describe(error))) return 'navigation';
    return 'backend';
  };

  send({ ready: true });

  const lines = readline.createInterface({ input: process.stdin });
  for await (const line of lines) {
    if (!line.trim()) continue;
    let request;
    try {
      request = JSON.parse(line);
    } catch (_) {
      continue;
    }
    const handler = handlers[request.op];
    if (!handler) {
      send({ id: request.id, ok: false, kind: 'backend', error: 'unknown op ' + request.op });
      continue;
    }
    try {
      const result = await handler(request.args || {});
      const closing = request.op === 'close';
      send({ id: request.id, ok: true, result: result === undefined ? null : result, url: closing ? null : page.url() });
      if (closing) process.exit(0);
    } catch (error) {
      send({
        id: request.id,
        ok: false,
        kind: classify(error),
        error: describe(error),
        url: page.isClosed() ? null : page.url(),
      });
    }
  }
  await browser.close();
})().catch((error) => {
  send({ ready: false, error: describe(error) });
  process.exit(1);
});
"#;

#[derive(Debug, Serialize)]
struct BridgeOptions {
    browser: &'static str,
    headless: bool,
    viewport: Viewport,
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Page backend driven through the Playwright node bridge
pub struct PlaywrightBackend {
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
}

impl PlaywrightBackend {
    /// Start the bridge in the project root, where `playwright` is installed
    pub async fn launch(config: &WorldConfig) -> DriverResult<Self> {
        let options = BridgeOptions {
            browser: config.driver.browser.as_str(),
            headless: config.driver.headless,
            viewport: Viewport::default(),
        };
        let options = serde_json::to_string(&options)
            .map_err(|e| DriverError::Backend(format!("bridge options: {}", e)))?;

        info!(
            "Launching {} via Playwright (headless: {})",
            config.driver.browser, config.driver.headless
        );

        let mut child = Command::new("node")
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .current_dir(&config.project_root)
            .env(OPTIONS_ENV, options)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DriverError::Backend(format!("failed to start node (is Node.js installed?): {}", e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::Backend("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Backend("bridge stdout unavailable".to_string()))?;
        let mut stdout = BufReader::new(stdout).lines();

        timeout(LAUNCH_TIMEOUT, wait_ready(&mut stdout))
            .await
            .map_err(|_| DriverError::Timeout {
                what: "browser launch".to_string(),
                timeout: LAUNCH_TIMEOUT,
            })??;

        debug!("Playwright bridge ready");
        Ok(Self {
            io: Mutex::new(BridgeIo {
                stdin,
                stdout,
                next_id: 0,
            }),
            child: Mutex::new(child),
        })
    }

    /// Send one request and wait for its response.
    /// `target` is the selector or URL named in errors.
    async fn call(&self, op: &str, target: &str, args: Value) -> DriverResult<BridgeResponse> {
        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let mut line = serde_json::to_string(&BridgeRequest { id, op, args })
            .map_err(|e| DriverError::Backend(format!("encode {} request: {}", op, e)))?;
        line.push('\n');
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let response = timeout(CALL_TIMEOUT, read_response(&mut io.stdout, id, op))
            .await
            .map_err(|_| DriverError::Timeout {
                what: format!("{} {}", op, target),
                timeout: CALL_TIMEOUT,
            })??;

        if response.ok {
            return Ok(response);
        }

        let reason = response
            .error
            .unwrap_or_else(|| format!("{} failed", op));
        Err(match response.kind.as_deref() {
            Some("timeout") => DriverError::Timeout {
                what: format!("{} {}", op, target),
                timeout: CALL_TIMEOUT,
            },
            Some("navigation") => DriverError::Navigation {
                url: target.to_string(),
                reason,
            },
            _ => DriverError::Backend(reason),
        })
    }

    /// Call an op and return the URL the page is on afterwards
    async fn navigate(&self, op: &str, target: &str, args: Value) -> DriverResult<String> {
        let response = self.call(op, target, args).await?;
        response
            .url
            .ok_or_else(|| DriverError::Backend(format!("{} response carried no url", op)))
    }
}

async fn wait_ready(stdout: &mut Lines<BufReader<ChildStdout>>) -> DriverResult<()> {
    while let Some(line) = stdout.next_line().await? {
        match serde_json::from_str::<BridgeResponse>(&line) {
            Ok(BridgeResponse {
                ready: Some(true), ..
            }) => return Ok(()),
            Ok(BridgeResponse {
                ready: Some(false),
                error,
                ..
            }) => {
                return Err(DriverError::Backend(
                    error.unwrap_or_else(|| "browser failed to launch".to_string()),
                ))
            }
            _ => debug!("bridge: {}", line),
        }
    }
    Err(DriverError::Backend(
        "bridge exited before the browser was ready".to_string(),
    ))
}

/// Skip bridge output until the response for `id` arrives
async fn read_response(
    stdout: &mut Lines<BufReader<ChildStdout>>,
    id: u64,
    op: &str,
) -> DriverResult<BridgeResponse> {
    while let Some(line) = stdout.next_line().await? {
        match serde_json::from_str::<BridgeResponse>(&line) {
            Ok(response) if response.id == Some(id) => return Ok(response),
            Ok(_) => {}
            Err(_) => debug!("bridge: {}", line),
        }
    }
    Err(DriverError::Backend(format!("bridge exited while handling {}", op)))
}

#[async_trait]
impl PageBackend for PlaywrightBackend {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<String> {
        self.navigate(
            "goto",
            url,
            json!({ "url": url, "timeout": timeout.as_millis() as u64 }),
        )
        .await
    }

    async fn reload(&self) -> DriverResult<String> {
        self.navigate("reload", "", Value::Null).await
    }

    async fn back(&self) -> DriverResult<String> {
        self.navigate("back", "", Value::Null).await
    }

    async fn forward(&self) -> DriverResult<String> {
        self.navigate("forward", "", Value::Null).await
    }

    async fn click(&self, selector: &str) -> DriverResult<String> {
        self.navigate("click", selector, json!({ "selector": selector })).await
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<String> {
        self.navigate("fill", selector, json!({ "selector": selector, "value": value }))
            .await
    }

    async fn type_text(&self, selector: &str, text: &str) -> DriverResult<String> {
        self.navigate("type", selector, json!({ "selector": selector, "text": text }))
            .await
    }

    async fn select(&self, selector: &str, values: &[String]) -> DriverResult<String> {
        self.navigate("select", selector, json!({ "selector": selector, "values": values }))
            .await
    }

    async fn inspect(&self, selector: &str) -> DriverResult<Inspection> {
        let response = self
            .call("inspect", selector, json!({ "selector": selector }))
            .await?;
        let element = serde_json::from_value(response.result)
            .map_err(|e| DriverError::Backend(format!("decode element {}: {}", selector, e)))?;
        let url = response
            .url
            .ok_or_else(|| DriverError::Backend("inspect response carried no url".to_string()))?;
        Ok(Inspection { element, url })
    }

    async fn screenshot(&self, full_page: bool) -> DriverResult<Vec<u8>> {
        let response = self
            .call("screenshot", "", json!({ "fullPage": full_page }))
            .await?;
        let encoded = response
            .result
            .as_str()
            .ok_or_else(|| DriverError::Backend("screenshot returned no data".to_string()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Backend(format!("decode screenshot: {}", e)))
    }

    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        self.call(
            "setViewport",
            "",
            json!({ "width": viewport.width, "height": viewport.height }),
        )
        .await
        .map(|_| ())
    }

    async fn viewport(&self) -> DriverResult<Viewport> {
        let response = self.call("viewport", "", Value::Null).await?;
        serde_json::from_value(response.result)
            .map_err(|e| DriverError::Backend(format!("decode viewport: {}", e)))
    }

    async fn url(&self) -> DriverResult<String> {
        let response = self.call("url", "", Value::Null).await?;
        Ok(response.result.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> DriverResult<()> {
        if let Err(e) = self.call("close", "", Value::Null).await {
            debug!("Bridge close request failed: {}", e);
        }

        let mut child = self.child.lock().await;
        match timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright bridge exited with {}", status),
            Ok(Err(e)) => warn!("Waiting for Playwright bridge failed: {}", e),
            Err(_) => {
                warn!("Playwright bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_encoding() {
        let request = BridgeRequest {
            id: 7,
            op: "fill",
            args: json!({ "selector": "#email", "value": "a@b.c" }),
        };
        let line = serde_json::to_string(&request).unwrap();
        assert_eq!(
            line,
            r##"{"id":7,"op":"fill","args":{"selector":"#email","value":"a@b.c"}}"##
        );
    }

    #[test]
    fn test_response_decoding() {
        let response: BridgeResponse = serde_json::from_str(
            r#"{"id":3,"ok":false,"kind":"navigation","error":"net::ERR_NAME_NOT_RESOLVED","url":"about:blank"}"#,
        )
        .unwrap();
        assert_eq!(response.id, Some(3));
        assert!(!response.ok);
        assert_eq!(response.kind.as_deref(), Some("navigation"));
        assert_eq!(response.url.as_deref(), Some("about:blank"));
    }

    #[test]
    fn test_ready_line_decoding() {
        let response: BridgeResponse = serde_json::from_str(r#"{"ready":true}"#).unwrap();
        assert_eq!(response.ready, Some(true));
        assert!(response.id.is_none());
    }

    #[test]
    fn test_bridge_script_handles_every_op() {
        for op in [
            "goto", "reload", "back", "forward", "click", "fill", "type", "select", "inspect",
            "screenshot", "setViewport", "viewport", "url", "close",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("    {}: async", op)), "missing {op}");
        }
    }
}
