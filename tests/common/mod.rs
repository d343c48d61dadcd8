//! Scripted browser page and recording writer shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use incident_sync::domain::NormalizedRow;
use incident_sync::infrastructure::browser::{BrowserError, BrowserPage, NetworkResponse};
use incident_sync::infrastructure::config::AppConfig;
use incident_sync::infrastructure::errors::{ScrapeError, ScrapeResult};
use incident_sync::infrastructure::storage::{SyncWriter, UpsertReport};

pub const ORIGIN: &str = "https://client.firenotification.com";

/// A response the fake page publishes when an action fires.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub url: String,
    pub method: &'static str,
    pub status: u16,
    pub body: Value,
}

impl Scripted {
    pub fn get(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            method: "GET",
            status: 200,
            body,
        }
    }
}

/// DOM changes applied when a selector is clicked.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub show: Vec<String>,
    pub hide: Vec<String>,
    pub texts: Vec<(String, String)>,
    pub responses: Vec<Scripted>,
}

#[derive(Default)]
struct PageState {
    current_url: String,
    present: HashSet<String>,
    texts: HashMap<String, String>,
    on_navigate: HashMap<String, Vec<Scripted>>,
    on_click: HashMap<String, ClickEffect>,
    /// Contact panel responses keyed by the detail URL the button lives on.
    contact_buttons: HashMap<String, Vec<Scripted>>,
    bodies: HashMap<String, Value>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
}

pub struct FakePage {
    state: Mutex<PageState>,
    responses: broadcast::Sender<NetworkResponse>,
    next_request: AtomicUsize,
}

impl FakePage {
    pub fn new() -> Self {
        let (responses, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(PageState::default()),
            responses,
            next_request: AtomicUsize::new(1),
        }
    }

    pub fn show(&self, selector: &str) {
        self.state.lock().unwrap().present.insert(selector.to_string());
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(selector.to_string(), text.to_string());
    }

    pub fn on_navigate(&self, url: &str, responses: Vec<Scripted>) {
        self.state
            .lock()
            .unwrap()
            .on_navigate
            .insert(url.to_string(), responses);
    }

    pub fn on_click(&self, selector: &str, effect: ClickEffect) {
        self.state
            .lock()
            .unwrap()
            .on_click
            .insert(selector.to_string(), effect);
    }

    pub fn contact_button(&self, detail_url: &str, responses: Vec<Scripted>) {
        self.state
            .lock()
            .unwrap()
            .contact_buttons
            .insert(detail_url.to_string(), responses);
    }

    pub fn remove_contact_button(&self, detail_url: &str) {
        self.state.lock().unwrap().contact_buttons.remove(detail_url);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    fn publish(&self, scripted: Vec<Scripted>) {
        for s in scripted {
            let request_id = format!("req-{}", self.next_request.fetch_add(1, Ordering::SeqCst));
            self.state
                .lock()
                .unwrap()
                .bodies
                .insert(request_id.clone(), s.body);
            let _ = self.responses.send(NetworkResponse {
                request_id,
                url: s.url,
                method: s.method.to_string(),
                status: s.status,
            });
        }
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.current_url = url.to_string();
            state.navigations.push(url.to_string());
            state.on_navigate.get(url).cloned().unwrap_or_default()
        };
        self.publish(scripted);
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        Ok(self.state.lock().unwrap().present.contains(selector))
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.state.lock().unwrap().texts.get(selector).cloned())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.state
            .lock()
            .unwrap()
            .typed
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let responses = {
            let mut state = self.state.lock().unwrap();
            state.clicks.push(selector.to_string());
            let Some(effect) = state.on_click.get(selector).cloned() else {
                return Ok(());
            };
            for s in &effect.show {
                state.present.insert(s.clone());
            }
            for s in &effect.hide {
                state.present.remove(s);
            }
            for (selector, text) in &effect.texts {
                state.texts.insert(selector.clone(), text.clone());
            }
            effect.responses
        };
        self.publish(responses);
        Ok(())
    }

    async fn click_button_with_badge(&self, text: &str, _badge: &str) -> Result<bool, BrowserError> {
        let responses = {
            let mut state = self.state.lock().unwrap();
            let url = state.current_url.clone();
            state.clicks.push(format!("{text}@{url}"));
            match state.contact_buttons.get(&url) {
                Some(responses) => responses.clone(),
                None => return Ok(false),
            }
        };
        self.publish(responses);
        Ok(true)
    }

    fn subscribe_responses(&self) -> broadcast::Receiver<NetworkResponse> {
        self.responses.subscribe()
    }

    async fn response_body(&self, response: &NetworkResponse) -> Result<Value, BrowserError> {
        self.state
            .lock()
            .unwrap()
            .bodies
            .get(&response.request_id)
            .cloned()
            .ok_or_else(|| BrowserError::Protocol {
                detail: format!("no body for {}", response.request_id),
            })
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok("<html><body>fake</body></html>".to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Default configuration shrunk to test-sized timeouts and delays.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.credentials.email = "agent@example.com".into();
    config.credentials.password = "hunter2".into();
    config.timeouts.selector_ms = 300;
    config.timeouts.login_ms = 300;
    config.timeouts.response_ms = 200;
    config.timeouts.contact_ms = 100;
    config.timeouts.poll_interval_ms = 5;
    for retry in [
        &mut config.retry.login,
        &mut config.retry.listing,
        &mut config.retry.detail,
        &mut config.retry.contact,
    ] {
        retry.delay_ms = 1;
    }
    config.browser.screenshot_path = None;
    config
}

pub fn listing_url(page: u32) -> String {
    format!("{ORIGIN}/api/incident?page={page}")
}

pub fn detail_url(config: &AppConfig, id: &str) -> String {
    config.target.detail_url(id)
}

pub fn incident_json(id: &str) -> Value {
    json!({
        "IncidentId": id,
        "presetLabel": "Structure Fire",
        "incidentTypeName": "Fire",
        "structureTypeName": "Residential",
        "addressRaw": "12 Elm St, Phoenix, AZ 85004",
        "streetAddress": "12 Elm St",
        "cityName": "Phoenix",
        "countyShortName": "Maricopa",
        "latitude": 33.45,
        "longitude": -112.07,
        "createdAt": "2024-05-01T10:00:00Z",
        "commentCount": 2,
        "paged": true,
        "searchableContent": "Owner: Jane Roe call (602) 555-0100"
    })
}

/// Sign-in form that succeeds on submit: the avatar appears, the form goes.
pub fn script_successful_login(page: &FakePage, config: &AppConfig) {
    page.show(&config.selectors.email_input);
    page.show(&config.selectors.password_input);
    page.on_click(
        &config.selectors.submit_button,
        ClickEffect {
            show: vec![config.selectors.avatar.clone()],
            hide: vec![config.selectors.email_input.clone()],
            ..ClickEffect::default()
        },
    );
}

/// Detail page for `id` with assessment, comments and a working contact panel.
pub fn script_detail(page: &FakePage, config: &AppConfig, id: &str) {
    let url = detail_url(config, id);
    page.on_navigate(
        &url,
        vec![
            Scripted::get(format!("{ORIGIN}/api/telemetry"), json!({})),
            Scripted::get(
                format!("{ORIGIN}/api/assessment/incident/{id}"),
                json!({"assessments": [{"ownerInfo": {"name": format!("Owner {id}")}}]}),
            ),
            Scripted::get(
                format!("{ORIGIN}/api/incident/{id}/comments"),
                json!({"comments": [{"description": format!("Comment on {id}")}]}),
            ),
        ],
    );
    page.contact_button(
        &url,
        vec![Scripted::get(
            format!("{ORIGIN}/api/incident/{id}/contact"),
            json!({"contactNotes": [{"contact": "(480) 555-0199"}]}),
        )],
    );
}

/// A site with one listing page holding `ids`, each with a complete detail page.
pub fn scripted_site(config: &AppConfig, ids: &[&str]) -> FakePage {
    let page = FakePage::new();
    script_successful_login(&page, config);
    page.on_navigate(
        &config.target.list_url,
        vec![Scripted::get(
            listing_url(1),
            json!({"incidents": ids.iter().map(|id| incident_json(id)).collect::<Vec<_>>()}),
        )],
    );
    for id in ids {
        script_detail(&page, config, id);
    }
    page
}

/// Records every batch it receives; optionally fails each call.
#[derive(Default)]
pub struct RecordingWriter {
    batches: Mutex<Vec<Vec<NormalizedRow>>>,
    fail_with: Option<String>,
}

impl RecordingWriter {
    pub fn failing(message: &str) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn rows(&self) -> Vec<NormalizedRow> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl SyncWriter for RecordingWriter {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn batch_upsert(&self, rows: &[NormalizedRow], _conflict_key: &str) -> ScrapeResult<UpsertReport> {
        self.batches.lock().unwrap().push(rows.to_vec());
        match &self.fail_with {
            Some(message) => Err(ScrapeError::storage(message.clone(), Some(500))),
            None => Ok(UpsertReport { rows: rows.len() }),
        }
    }
}
