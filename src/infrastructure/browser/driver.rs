//! [`BrowserPage`] implementation over a CDP page target.
//!
//! Navigation waits on `Page.domContentEventFired`, DOM access goes through
//! `Runtime.evaluate` and `DOM.*`, and a background network tap turns
//! `Network.*` events into [`NetworkResponse`]s once a response body has
//! finished loading.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::cdp::{CdpClient, CdpEvent};
use super::error::BrowserError;
use super::page::{BrowserPage, NetworkResponse};

const RESPONSE_BUFFER: usize = 512;

#[derive(Debug, Clone)]
pub struct PageOptions {
    pub navigation_timeout: Duration,
    /// Pause between typed characters; the sign-in form drops keys when typed too fast.
    pub typing_delay: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            typing_delay: Duration::from_millis(100),
        }
    }
}

/// Tracks in-flight requests until their body is available.
#[derive(Debug, Default)]
pub struct NetworkTracker {
    methods: HashMap<String, String>,
    received: HashMap<String, NetworkResponse>,
}

impl NetworkTracker {
    /// Feed one CDP event; returns a response once it has finished loading.
    pub fn observe(&mut self, event: &CdpEvent) -> Option<NetworkResponse> {
        let request_id = event.params.get("requestId")?.as_str()?.to_string();
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                let method = event
                    .params
                    .pointer("/request/method")
                    .and_then(Value::as_str)
                    .unwrap_or("GET");
                self.methods.insert(request_id, method.to_string());
                None
            }
            "Network.responseReceived" => {
                let url = event.params.pointer("/response/url")?.as_str()?.to_string();
                let status = event
                    .params
                    .pointer("/response/status")
                    .and_then(Value::as_f64)
                    .map_or(0, |s| s as u16);
                let method = self
                    .methods
                    .get(&request_id)
                    .cloned()
                    .unwrap_or_else(|| "GET".to_string());
                self.received.insert(
                    request_id.clone(),
                    NetworkResponse {
                        request_id,
                        url,
                        method,
                        status,
                    },
                );
                None
            }
            "Network.loadingFinished" => {
                self.methods.remove(&request_id);
                self.received.remove(&request_id)
            }
            "Network.loadingFailed" => {
                self.methods.remove(&request_id);
                self.received.remove(&request_id);
                None
            }
            _ => None,
        }
    }
}

/// JS expression evaluating to whether `selector` matches anything.
pub fn exists_expression(selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_string(selector))
}

pub fn text_content_expression(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); return el ? el.textContent.trim() : null; }})()",
        js_string(selector)
    )
}

pub fn click_button_with_badge_expression(text: &str, badge_selector: &str) -> String {
    format!(
        "(() => {{ \
            const btn = Array.from(document.querySelectorAll('button')) \
                .find(b => b.textContent.includes({}) && b.querySelector({})); \
            if (!btn) return false; \
            btn.click(); \
            return true; \
        }})()",
        js_string(text),
        js_string(badge_selector)
    )
}

// A JSON string literal is a valid JS string literal.
fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

pub struct CdpPage {
    client: Arc<CdpClient>,
    responses: broadcast::Sender<NetworkResponse>,
    options: PageOptions,
    tap_handle: tokio::task::JoinHandle<()>,
}

impl CdpPage {
    /// Attach to a page target and start the network tap.
    pub async fn connect(ws_url: &str, options: PageOptions) -> Result<Self, BrowserError> {
        let client = Arc::new(CdpClient::connect(ws_url).await?);
        let (responses, _) = broadcast::channel(RESPONSE_BUFFER);

        // Subscribe before Network.enable so the first requests are seen.
        let tap_handle = tokio::spawn(Self::network_tap(client.subscribe(), responses.clone()));

        for domain in ["Page", "DOM", "Runtime", "Network"] {
            client.enable_domain(domain).await?;
        }

        Ok(Self {
            client,
            responses,
            options,
            tap_handle,
        })
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    pub async fn close(&self) {
        self.tap_handle.abort();
        self.client.shutdown().await;
    }

    async fn network_tap(
        mut events: broadcast::Receiver<CdpEvent>,
        responses: broadcast::Sender<NetworkResponse>,
    ) {
        let mut tracker = NetworkTracker::default();
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(response) = tracker.observe(&event) {
                        debug!(url = %response.url, status = response.status, "network response finished");
                        let _ = responses.send(response);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "network tap lagged behind CDP events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn wait_for_event(
        &self,
        mut events: broadcast::Receiver<CdpEvent>,
        method: &str,
    ) -> Result<(), BrowserError> {
        let timeout = self.options.navigation_timeout;
        let waited = tokio::time::timeout(timeout, async {
            loop {
                match events.recv().await {
                    Ok(event) if event.method == method => return Ok(()),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(BrowserError::protocol(
                            "WebSocket closed while waiting for page load",
                        ));
                    }
                }
            }
        })
        .await;
        waited.map_err(|_| BrowserError::LoadTimeout { duration: timeout })?
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| exception.get("text").and_then(Value::as_str))
                .unwrap_or("unknown exception")
                .to_string();
            return Err(BrowserError::ScriptException { message });
        }

        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn query_selector(&self, selector: &str) -> Result<i64, BrowserError> {
        let root = self
            .client
            .send_command("DOM.getDocument", json!({}))
            .await?
            .pointer("/root/nodeId")
            .and_then(Value::as_i64)
            .ok_or_else(|| BrowserError::protocol("DOM.getDocument did not return a root nodeId"))?;

        let node_id = self
            .client
            .send_command(
                "DOM.querySelector",
                json!({ "nodeId": root, "selector": selector }),
            )
            .await?
            .get("nodeId")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        if node_id == 0 {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(node_id)
    }

    async fn element_center(&self, node_id: i64) -> Result<(f64, f64), BrowserError> {
        let result = self
            .client
            .send_command("DOM.getBoxModel", json!({ "nodeId": node_id }))
            .await?;
        let quad: Vec<f64> = result
            .pointer("/model/content")
            .and_then(Value::as_array)
            .ok_or_else(|| BrowserError::protocol("DOM.getBoxModel did not return a content quad"))?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        center_of_quad(&quad).ok_or_else(|| BrowserError::NotClickable {
            reason: format!("unusable content quad {quad:?}"),
        })
    }
}

/// Center of an 8-value content quad, `None` for degenerate boxes.
pub fn center_of_quad(quad: &[f64]) -> Option<(f64, f64)> {
    if quad.len() < 8 {
        return None;
    }
    let xs = quad.iter().step_by(2).copied();
    let ys = quad.iter().skip(1).step_by(2).copied();
    let (min_x, max_x) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (min_y, max_y) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if max_x - min_x <= 0.0 || max_y - min_y <= 0.0 {
        return None;
    }
    Some(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0))
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let events = self.client.subscribe();
        let result = self
            .client
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::NavigationFailed {
                reason: format!("{url}: {error_text}"),
            });
        }
        // Same-document navigations carry no loaderId and fire no load events.
        if result.get("loaderId").is_none() {
            return Ok(());
        }
        self.wait_for_event(events, "Page.domContentEventFired").await
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        Ok(self
            .evaluate(&exists_expression(selector))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self
            .evaluate(&text_content_expression(selector))
            .await?
            .as_str()
            .map(str::to_string))
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let node_id = self.query_selector(selector).await?;
        self.client
            .send_command("DOM.focus", json!({ "nodeId": node_id }))
            .await?;

        for ch in text.chars() {
            let key = ch.to_string();
            for kind in ["keyDown", "keyUp"] {
                self.client
                    .send_command(
                        "Input.dispatchKeyEvent",
                        json!({
                            "type": kind,
                            "text": key,
                            "unmodifiedText": key,
                            "key": key,
                        }),
                    )
                    .await?;
            }
            if !self.options.typing_delay.is_zero() {
                tokio::time::sleep(self.options.typing_delay).await;
            }
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let node_id = self.query_selector(selector).await?;
        let (x, y) = self.element_center(node_id).await?;
        for kind in ["mousePressed", "mouseReleased"] {
            self.client
                .send_command(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn click_button_with_badge(
        &self,
        text: &str,
        badge_selector: &str,
    ) -> Result<bool, BrowserError> {
        Ok(self
            .evaluate(&click_button_with_badge_expression(text, badge_selector))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<NetworkResponse> {
        self.responses.subscribe()
    }

    async fn response_body(&self, response: &NetworkResponse) -> Result<Value, BrowserError> {
        let result = self
            .client
            .send_command(
                "Network.getResponseBody",
                json!({ "requestId": response.request_id }),
            )
            .await?;
        decode_response_body(&result)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.evaluate("document.documentElement.outerHTML")
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::protocol("outerHTML did not evaluate to a string"))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .send_command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::protocol("Page.captureScreenshot returned no data"))?;
        B64.decode(data)
            .map_err(|e| BrowserError::protocol(format!("failed to decode screenshot: {e}")))
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.tap_handle.abort();
    }
}

/// Decode a `Network.getResponseBody` result into JSON.
pub fn decode_response_body(result: &Value) -> Result<Value, BrowserError> {
    let body = result
        .get("body")
        .and_then(Value::as_str)
        .ok_or_else(|| BrowserError::protocol("Network.getResponseBody returned no body"))?;
    let encoded = result
        .get("base64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let text = if encoded {
        let bytes = B64
            .decode(body)
            .map_err(|e| BrowserError::protocol(format!("invalid base64 body: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| BrowserError::protocol(format!("response body is not UTF-8: {e}")))?
    } else {
        body.to_string()
    };

    serde_json::from_str(&text)
        .map_err(|e| BrowserError::protocol(format!("response body is not JSON: {e}")))
}
