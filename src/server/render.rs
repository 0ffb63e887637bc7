//! HTML rendering of the single page.
//!
//! Rendering is a pure function of [`PageView`]; every state change is a
//! full re-render after a redirect.

use crate::dispatcher::DispatchReport;
use crate::error::ProviderError;
use crate::location::Location;
use crate::session::{Flash, FlashKind};
use crate::settings::Settings;
use crate::state::{AlertPhase, TriggerSource};
use crate::voice::Language;
use std::fmt::Write;

const STYLE: &str = r#"
body { font-family: sans-serif; background-color: #f8f9fa; margin: 0; }
main { max-width: 720px; margin: 0 auto; padding: 20px; }
.header-section { padding: 20px; background-color: #dc3545; color: white; border-radius: 10px; margin-bottom: 20px; }
.title { text-align: center; margin: 0; }
.tabs { display: flex; gap: 8px; margin-bottom: 20px; }
.tabs a { padding: 8px 16px; border-radius: 6px; text-decoration: none; color: #343a40; background: #e9ecef; }
.tabs a.current { background: #dc3545; color: white; }
.msg { padding: 10px; border-radius: 5px; margin: 8px 0; }
.msg-success { background: #d4edda; color: #155724; }
.msg-info { background: #d1ecf1; color: #0c5460; }
.msg-warning { background: #fff3cd; color: #856404; }
.msg-error { background: #f8d7da; color: #721c24; }
.sos-button { background-color: #dc3545; color: white; border: none; border-radius: 50%; width: 200px; height: 200px; font-size: 32px; font-weight: bold; cursor: pointer; box-shadow: 0 8px 16px rgba(0,0,0,0.2); margin: 20px auto; display: block; }
.listening-indicator { display: flex; align-items: center; justify-content: center; gap: 10px; margin: 20px 0; }
.mic-icon { color: #dc3545; font-size: 24px; animation: pulse 1.5s infinite; }
@keyframes pulse { 0% { opacity: 1; } 50% { opacity: 0.3; } 100% { opacity: 1; } }
.siren-active { border: 3px solid #dc3545; animation: siren-border 1s infinite; padding: 10px; border-radius: 5px; margin-bottom: 15px; }
@keyframes siren-border { 0% { border-color: #dc3545; } 50% { border-color: #ffc107; } 100% { border-color: #dc3545; } }
.settings-container { padding: 20px; border-radius: 10px; background-color: #ffffff; box-shadow: 0 4px 6px rgba(0,0,0,0.1); }
.settings-container label { display: block; margin-top: 12px; }
.settings-container input { width: 100%; padding: 6px; box-sizing: border-box; }
.wide { width: 100%; padding: 10px; margin-top: 16px; }
"#;

/// Installs the direct delivery path used by the voice listener
const DIRECT_TRIGGER_SCRIPT: &str = r#"
<script>
(function () {
    let lastMessage = '';
    window.triggerEmergencyDirectly = function (keyword, timestamp) {
        const message = keyword + '_' + timestamp;
        if (message === lastMessage) return;
        lastMessage = message;

        const form = document.createElement('form');
        form.method = 'POST';
        form.action = '/';
        const fields = { voice_keyword: keyword, emergency_trigger: 'true', voice_ts: String(timestamp) };
        for (const name in fields) {
            const input = document.createElement('input');
            input.type = 'hidden';
            input.name = name;
            input.value = fields[name];
            form.appendChild(input);
        }
        document.body.appendChild(form);
        form.submit();
    };
})();
</script>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Alert,
    Settings,
}

impl Tab {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("settings") => Tab::Settings,
            _ => Tab::Alert,
        }
    }
}

/// Siren block shown while an alert is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SirenView {
    Audio { data_uri: String },
    VisualOnly { reason: String },
}

/// Everything the page needs, snapshotted from the session
#[derive(Debug, Clone)]
pub struct PageView {
    pub tab: Tab,
    pub phase: AlertPhase,
    pub trigger_source: Option<TriggerSource>,
    pub settings: Settings,
    pub warnings: Vec<String>,
    pub flashes: Vec<Flash>,
    pub location: Location,
    pub alert_location: Option<Location>,
    pub report: Option<DispatchReport>,
    pub siren: Option<SirenView>,
    pub siren_file_present: bool,
    pub siren_path: String,
}

/// Escape text for HTML element and attribute content
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn message(out: &mut String, kind: FlashKind, text: &str) {
    let class = match kind {
        FlashKind::Success => "msg-success",
        FlashKind::Info => "msg-info",
        FlashKind::Warning => "msg-warning",
        FlashKind::Error => "msg-error",
    };
    let _ = write!(
        out,
        r#"<div class="msg {}">{}</div>"#,
        class,
        escape_html(text)
    );
}

pub fn page(view: &PageView) -> String {
    let mut out = String::with_capacity(8 * 1024);
    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>SOS Emergency App</title>
<style>{}</style>
</head>
<body>
<main>
<div class="header-section"><h1 class="title">🆘 Emergency SOS Alert System</h1></div>
<nav class="tabs">
<a href="/" class="{}">SOS Alert</a>
<a href="/?tab=settings" class="{}">Settings</a>
</nav>
"#,
        STYLE,
        if view.tab == Tab::Alert { "current" } else { "" },
        if view.tab == Tab::Settings { "current" } else { "" },
    );

    for flash in &view.flashes {
        message(&mut out, flash.kind, &flash.message);
    }

    match view.tab {
        Tab::Alert => alert_tab(&mut out, view),
        Tab::Settings => settings_tab(&mut out, view),
    }

    out.push_str(DIRECT_TRIGGER_SCRIPT);
    out.push_str(r#"<script src="/static/voice-listener.js"></script>"#);
    out.push_str("\n</main>\n</body>\n</html>\n");
    out
}

fn location_block(out: &mut String, location: &Location) {
    message(
        out,
        FlashKind::Success,
        &format!("Location: {}", location.address),
    );
    message(
        out,
        FlashKind::Info,
        &format!(
            "Coordinates: {}, {}",
            location.latitude, location.longitude
        ),
    );
    let _ = write!(
        out,
        r#"<div class="msg msg-info">Google Maps: <a href="{0}" target="_blank" rel="noopener">{0}</a></div>"#,
        escape_html(&location.map_link)
    );
}

fn alert_tab(out: &mut String, view: &PageView) {
    out.push_str("<section>\n<h2>Location Status</h2>\n");
    location_block(out, &view.location);

    let languages: Vec<&str> = Language::ALL.iter().map(|l| l.display_name()).collect();
    let _ = write!(
        out,
        r#"<h2>Voice Monitoring Status</h2>
<div id="voice-status" class="msg msg-warning">Initializing voice recognition...</div>
<div class="listening-indicator"><span class="mic-icon">🎤</span><span>Always listening for emergency keywords in {}</span></div>
"#,
        escape_html(&join_names(&languages))
    );

    match view.phase {
        AlertPhase::Idle => {
            message(
                out,
                FlashKind::Warning,
                "Press the SOS button below in case of emergency or say 'help' (also works with Hindi and Tamil keywords)",
            );
            out.push_str(
                r#"<form method="post" action="/sos"><button type="submit" class="sos-button" id="sos_button">SOS</button></form>"#,
            );
        }
        AlertPhase::ActivePending | AlertPhase::ActiveRunning => {
            message(out, FlashKind::Error, "🚨 EMERGENCY SOS ACTIVATED 🚨");
            message(
                out,
                FlashKind::Info,
                "Emergency sequence in progress. Refresh in a moment.",
            );
        }
        AlertPhase::ActiveDone => active_view(out, view),
    }
    out.push_str("</section>\n");
}

fn active_view(out: &mut String, view: &PageView) {
    message(
        out,
        FlashKind::Success,
        "SOS alert has been triggered. Help is on the way!",
    );
    if let Some(source) = &view.trigger_source {
        message(out, FlashKind::Info, &format!("Triggered by: {}", source));
    }

    if let Some(report) = &view.report {
        for step in &report.steps {
            message(out, FlashKind::Info, step);
        }
        channel_status(out, "Emergency call", report.call_ok, &report.call_error);
        channel_status(out, "Emergency SMS", report.sms_ok, &report.sms_error);
    }

    match &view.siren {
        Some(SirenView::Audio { data_uri }) => {
            let _ = write!(
                out,
                r#"<div class="siren-active"><strong>🚨 EMERGENCY SIREN ACTIVE 🚨</strong>
<audio id="siren" src="{}" autoplay loop></audio></div>
<script>
(function () {{
    const siren = document.getElementById('siren');
    if (!siren) return;
    siren.volume = 0.8;
    document.addEventListener('click', function () {{
        siren.play().catch(function (e) {{ console.error('Siren retry failed:', e); }});
    }});
}})();
</script>
"#,
                escape_html(data_uri)
            );
        }
        Some(SirenView::VisualOnly { reason }) => {
            out.push_str(
                r#"<div class="siren-active" style="padding: 20px; font-size: 18px;"><strong>🚨 EMERGENCY ALERT ACTIVE 🚨</strong></div>"#,
            );
            message(
                out,
                FlashKind::Warning,
                &format!("Using visual alert only. {}", reason),
            );
        }
        None => {}
    }

    if let Some(location) = &view.alert_location {
        message(out, FlashKind::Info, &format!("Location: {}", location.address));
        let _ = write!(
            out,
            r#"<div class="msg msg-info">Google Maps: <a href="{0}" target="_blank" rel="noopener">{0}</a></div>"#,
            escape_html(&location.map_link)
        );
    }

    out.push_str(
        r#"<form method="post" action="/reset"><button type="submit" id="reset_sos">Reset SOS</button></form>"#,
    );
}

fn channel_status(out: &mut String, label: &str, ok: bool, error: &Option<ProviderError>) {
    if ok {
        message(out, FlashKind::Success, &format!("{}: sent", label));
        return;
    }
    let detail = error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    message(
        out,
        FlashKind::Error,
        &format!("{} failed: {}", label, detail),
    );
}

fn settings_tab(out: &mut String, view: &PageView) {
    let s = &view.settings;
    out.push_str(r#"<section class="settings-container">"#);

    for warning in &view.warnings {
        message(out, FlashKind::Warning, warning);
    }

    let _ = write!(
        out,
        r#"<form method="post" action="/settings">
<h2>User Information</h2>
<label>Your Name <input type="text" name="user_name" value="{}"></label>
<label>Emergency Contact Number (with country code) <input type="tel" name="emergency_contact" value="{}" placeholder="+1234567890"></label>
<details>
<summary>Twilio API Settings</summary>
<label>Twilio Account SID <input type="password" name="provider_account_id" value="{}" autocomplete="off"></label>
<label>Twilio Auth Token <input type="password" name="provider_auth_secret" value="{}" autocomplete="off"></label>
<label>Twilio Phone Number <input type="tel" name="provider_phone_number" value="{}" placeholder="+1234567890"></label>
</details>
"#,
        escape_html(&s.user_name),
        escape_html(&s.emergency_contact),
        escape_html(&s.provider_account_id),
        escape_html(&s.provider_auth_secret),
        escape_html(&s.provider_phone_number),
    );

    out.push_str("<details>\n<summary>Emergency Siren Settings</summary>\n");
    message(
        out,
        FlashKind::Info,
        &format!(
            "Place an MP3 file at '{}' to enable the emergency siren.",
            view.siren_path
        ),
    );
    if view.siren_file_present {
        message(
            out,
            FlashKind::Success,
            "Siren audio file found and ready to use!",
        );
    } else {
        message(
            out,
            FlashKind::Warning,
            "No siren file found. Add one to enable the siren feature.",
        );
    }
    out.push_str("</details>\n");

    out.push_str(
        r#"<button type="submit" class="wide">Save Settings</button>
</form>
</section>
"#,
    );
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}
