//! Web Server Module
//!
//! axum router for the single-page app. Every state-changing request is
//! answered with a redirect to `/`, so a refresh never replays a trigger.

pub mod render;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::dispatcher::{AlertDispatcher, DispatchTiming};
use crate::error::{SosError, SosResult};
use crate::location::LocationProvider;
use crate::provider::{CommsProvider, TwilioProvider};
use crate::session::{is_valid_session_id, new_session_id, FlashKind, SessionRegistry};
use crate::settings::{Settings, SettingsStore};
use crate::siren::Siren;
use crate::state::{AlertEvent, AlertPhase, Effect, TriggerSource};
use crate::voice::{listener_script, VoiceTriggerEvent};
use anyhow::Result;
use axum::extract::{Form, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use render::{PageView, SirenView, Tab};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const SESSION_COOKIE: &str = "sos_session";

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: SettingsStore,
    sessions: Arc<SessionRegistry>,
    dispatcher: AlertDispatcher,
    locations: LocationProvider,
    siren: Siren,
    audit: AuditLog,
    listener_js: Arc<String>,
}

impl AppState {
    /// Wire up the real Twilio provider and Nominatim geocoder
    pub fn from_config(config: Config) -> Result<Self> {
        let provider: Arc<dyn CommsProvider> = Arc::new(TwilioProvider::new(&config)?);
        let locations = LocationProvider::from_config(&config)?;
        Ok(Self::with_parts(config, provider, locations))
    }

    /// Build the state from explicit collaborators
    pub fn with_parts(
        config: Config,
        provider: Arc<dyn CommsProvider>,
        locations: LocationProvider,
    ) -> Self {
        let dispatcher = AlertDispatcher::new(provider, DispatchTiming::from_config(&config));
        Self {
            store: SettingsStore::new(&config.settings_path),
            sessions: Arc::new(SessionRegistry::new()),
            dispatcher,
            locations,
            siren: Siren::new(&config.siren_path),
            audit: AuditLog::from_config(&config),
            listener_js: Arc::new(listener_script(config.voice_poll_interval_ms)),
            config: Arc::new(config),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    fn load_settings(&self) -> Settings {
        self.store.load()
    }
}

/// An inbound trigger, in the order it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Button,
    Voice(VoiceTriggerEvent),
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(voice_post))
        .route("/sos", post(sos_button))
        .route("/reset", post(reset))
        .route("/settings", post(save_settings))
        .route("/static/voice-listener.js", get(listener_js))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve until the process is stopped
pub async fn serve(state: AppState) -> Result<()> {
    let bind = state.config.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("🌐 SOS Alert listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    voice_triggered: Option<String>,
    voice_keyword: Option<String>,
    voice_ts: Option<String>,
    tab: Option<String>,
}

impl PageQuery {
    fn has_voice_params(&self) -> bool {
        self.voice_triggered.is_some() || self.voice_keyword.is_some()
    }

    fn voice_event(&self) -> Option<VoiceTriggerEvent> {
        VoiceTriggerEvent::from_parts(
            self.voice_triggered.as_deref(),
            self.voice_keyword.as_deref(),
            self.voice_ts.as_deref(),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceForm {
    emergency_trigger: Option<String>,
    voice_keyword: Option<String>,
    voice_ts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsForm {
    user_name: String,
    emergency_contact: String,
    provider_account_id: String,
    provider_auth_secret: String,
    provider_phone_number: String,
}

impl From<SettingsForm> for Settings {
    fn from(form: SettingsForm) -> Self {
        Settings {
            user_name: form.user_name.trim().to_string(),
            emergency_contact: form.emergency_contact.trim().to_string(),
            provider_account_id: form.provider_account_id.trim().to_string(),
            provider_auth_secret: form.provider_auth_secret.trim().to_string(),
            provider_phone_number: form.provider_phone_number.trim().to_string(),
        }
    }
}

/// Session id from the cookie, plus a `Set-Cookie` value when a new one
/// had to be issued
fn session_from(headers: &HeaderMap) -> (String, Option<String>) {
    let existing = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|id| is_valid_session_id(id))
        .map(str::to_string);

    match existing {
        Some(id) => (id, None),
        None => {
            let id = new_session_id();
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
            (id, Some(cookie))
        }
    }
}

fn with_cookie(mut response: Response, cookie: Option<String>) -> Response {
    if let Some(cookie) = cookie {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

fn redirect(to: &str, cookie: Option<String>) -> Response {
    with_cookie(Redirect::to(to).into_response(), cookie)
}

fn internal_error(err: SosError) -> Response {
    error!("❌ Request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong. Please reload the page.",
    )
        .into_response()
}

async fn index(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    let (session_id, cookie) = session_from(&headers);

    // Voice parameters are read once, then dropped from the URL
    if query.has_voice_params() {
        let signals: Vec<Signal> = query.voice_event().map(Signal::Voice).into_iter().collect();
        if let Err(e) = process_signals(&app, &session_id, signals).await {
            return with_cookie(internal_error(e), cookie);
        }
        return redirect("/", cookie);
    }

    let tab = Tab::from_query(query.tab.as_deref());
    match render_page(&app, &session_id, tab).await {
        Ok(html) => {
            let mut response = Html(html).into_response();
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            with_cookie(response, cookie)
        }
        Err(e) => with_cookie(internal_error(e), cookie),
    }
}

async fn voice_post(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
    Form(form): Form<VoiceForm>,
) -> Response {
    let (session_id, cookie) = session_from(&headers);

    // Evaluation order: posted form field first, then query parameters
    let mut signals = Vec::new();
    if let Some(event) = VoiceTriggerEvent::from_parts(
        form.emergency_trigger.as_deref(),
        form.voice_keyword.as_deref(),
        form.voice_ts.as_deref(),
    ) {
        signals.push(Signal::Voice(event));
    }
    if let Some(event) = query.voice_event() {
        signals.push(Signal::Voice(event));
    }

    if let Err(e) = process_signals(&app, &session_id, signals).await {
        return with_cookie(internal_error(e), cookie);
    }
    redirect("/", cookie)
}

async fn sos_button(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Response {
    let (session_id, cookie) = session_from(&headers);

    let mut signals: Vec<Signal> = query.voice_event().map(Signal::Voice).into_iter().collect();
    signals.push(Signal::Button);

    if let Err(e) = process_signals(&app, &session_id, signals).await {
        return with_cookie(internal_error(e), cookie);
    }
    redirect("/", cookie)
}

async fn reset(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, cookie) = session_from(&headers);

    let result = app
        .sessions
        .with_session(&session_id, || app.load_settings(), |session| {
            let changed = !session.alert.apply(AlertEvent::Reset).is_empty();
            if changed {
                session.last_report = None;
                session.last_location = None;
            }
            changed
        });

    match result {
        Ok(true) => {
            info!("🔄 SOS reset by user");
            app.audit.record_reset();
            redirect("/", cookie)
        }
        Ok(false) => redirect("/", cookie),
        Err(e) => with_cookie(internal_error(e), cookie),
    }
}

async fn save_settings(
    State(app): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> Response {
    let (session_id, cookie) = session_from(&headers);
    let settings: Settings = form.into();

    // In-memory settings apply to this session even if the write fails
    let updated = app
        .sessions
        .with_session(&session_id, || app.load_settings(), |session| {
            session.settings = settings.clone();
        });
    if let Err(e) = updated {
        return with_cookie(internal_error(e), cookie);
    }

    let saved = app.store.save(&settings);
    let result = app
        .sessions
        .with_session(&session_id, || app.load_settings(), |session| {
            match &saved {
                Ok(()) => session.flash(
                    FlashKind::Success,
                    "Settings saved successfully and will be remembered when you restart the app!",
                ),
                Err(e) => {
                    warn!("⚠️ Failed to save settings: {}", e);
                    session.flash(
                        FlashKind::Error,
                        "Failed to save settings permanently. They will work for this session only.",
                    );
                }
            }
        });

    match result {
        Ok(()) => redirect("/?tab=settings", cookie),
        Err(e) => with_cookie(internal_error(e), cookie),
    }
}

async fn listener_js(State(app): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/javascript; charset=utf-8")],
        app.listener_js.as_str().to_string(),
    )
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Apply inbound signals in order and run the alert sequence if one of
/// them activated the alert.
pub async fn process_signals(
    app: &AppState,
    session_id: &str,
    signals: Vec<Signal>,
) -> SosResult<()> {
    if signals.is_empty() {
        return Ok(());
    }

    let to_run = app
        .sessions
        .with_session(session_id, || app.load_settings(), |session| {
            let mut activated = false;
            for signal in signals {
                let event = match signal {
                    Signal::Button => AlertEvent::ButtonPressed,
                    Signal::Voice(voice) => {
                        if !session.ledger.accept(&voice) {
                            continue;
                        }
                        match voice.language() {
                            Some(language) => debug!(
                                "Voice keyword '{}' ({})",
                                voice.keyword,
                                language.display_name()
                            ),
                            None => warn!(
                                "⚠️ Voice signal with unrecognised keyword '{}'",
                                voice.keyword
                            ),
                        }
                        AlertEvent::VoiceSignal {
                            keyword: voice.keyword,
                        }
                    }
                };
                debug!("Session event: {:?}", event);
                if session.alert.apply(event).contains(&Effect::RunSequence) {
                    activated = true;
                }
            }

            if !activated {
                return None;
            }
            // Move to Running before releasing the lock so no other
            // request can start a second sequence for this activation
            session.alert.apply(AlertEvent::SequenceStarted);
            session.last_report = None;
            session.last_location = None;
            let run = SequenceRun {
                activation: session.alert.activation(),
                source: session.alert.trigger_source().cloned(),
                settings: session.settings.clone(),
            };
            info!(
                "🚨 SOS activated by {} (activation {})",
                run.source.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                run.activation
            );
            Some(run)
        })?;

    let Some(run) = to_run else {
        return Ok(());
    };

    // Spawned so a dropped connection cannot cancel the sequence midway
    let task_app = app.clone();
    let task_session = session_id.to_string();
    let handle = tokio::spawn(async move { run_sequence(task_app, task_session, run).await });
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(SosError::Other(anyhow::anyhow!(
            "alert sequence task failed: {}",
            e
        ))),
    }
}

/// One activation's sequence, captured under the session lock
struct SequenceRun {
    activation: u64,
    source: Option<TriggerSource>,
    settings: Settings,
}

async fn run_sequence(app: AppState, session_id: String, run: SequenceRun) -> SosResult<()> {
    let SequenceRun {
        activation,
        source,
        settings,
    } = run;
    let location = app.locations.current_location().await;
    let creds = settings.credentials();
    let report = app
        .dispatcher
        .dispatch(
            creds.as_ref(),
            &settings.emergency_contact,
            &settings.user_name,
            &location,
        )
        .await;

    // Audit outside the registry lock
    app.audit.record_alert(source.as_ref(), &report);

    let finished = app
        .sessions
        .with_session(&session_id, || app.load_settings(), |session| {
            let finished = !session
                .alert
                .apply(AlertEvent::SequenceFinished { activation })
                .is_empty();
            // A reset while the sequence ran leaves nothing to show
            if finished {
                session.last_report = Some(report);
                session.last_location = Some(location);
            }
            finished
        })?;

    if !finished {
        debug!(
            "Activation {} was reset before its sequence finished",
            activation
        );
    }
    Ok(())
}

async fn render_page(app: &AppState, session_id: &str, tab: Tab) -> SosResult<String> {
    let location = app.locations.current_location().await;
    let siren_file_present = app.siren.is_available();

    let mut view = app
        .sessions
        .with_session(session_id, || app.load_settings(), |session| {
            PageView {
                tab,
                phase: session.alert.phase(),
                trigger_source: session.alert.trigger_source().cloned(),
                warnings: session.settings.warnings(),
                settings: session.settings.clone(),
                flashes: session.take_flashes(),
                location,
                alert_location: session.last_location.clone(),
                report: session.last_report.clone(),
                siren: None,
                siren_file_present,
                siren_path: app.siren.path().display().to_string(),
            }
        })?;

    // File access happens outside the registry lock
    if view.phase == AlertPhase::ActiveDone {
        view.siren = Some(match app.siren.data_uri() {
            Ok(data_uri) => SirenView::Audio { data_uri },
            Err(reason) => SirenView::VisualOnly { reason },
        });
    }

    Ok(render::page(&view))
}
