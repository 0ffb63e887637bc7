//! Voice Trigger Module
//!
//! Language and keyword tables for the browser-side listener, the keyword
//! matching rule, and the server side of the emergency signal.
//!
//! The listener script is served from here with the tables injected, so the
//! browser matches against exactly the data tested in this module.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

const LISTENER_TEMPLATE: &str = include_str!("listener.js");
const CONFIG_PLACEHOLDER: &str = "__VOICE_CONFIG__";

/// Keyword used when a signal arrives without one
pub const UNKNOWN_KEYWORD: &str = "unknown";

/// Longest keyword accepted from the browser
const MAX_KEYWORD_LEN: usize = 64;

/// Remembered voice events per session
const LEDGER_CAPACITY: usize = 64;

/// Recognition languages, in listening order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Hindi,
    Tamil,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hindi, Language::Tamil];

    /// BCP-47 tag passed to the speech recognizer
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Hindi => "hi-IN",
            Language::Tamil => "ta-IN",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Tamil => "Tamil",
        }
    }

    /// Trigger keywords, checked in order
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Language::English => &[
                "help",
                "emergency",
                "sos",
                "danger",
                "accident",
                "save me",
                "help me",
            ],
            Language::Hindi => &["मदद", "आपातकाल", "खतरा", "बचाओ", "सहायता", "मुझे बचाओ"],
            Language::Tamil => &[
                "உதவி",
                "அவசரம்",
                "ஆபத்து",
                "காப்பாற்று",
                "என்னை காப்பாற்று",
            ],
        }
    }
}

/// First keyword of `language` contained in `transcript`, case-insensitively
pub fn match_keyword(language: Language, transcript: &str) -> Option<&'static str> {
    let transcript = transcript.to_lowercase();
    language
        .keywords()
        .iter()
        .copied()
        .find(|keyword| transcript.contains(&keyword.to_lowercase()))
}

/// Language whose keyword table matches `transcript`, in listening order
pub fn detect_language(transcript: &str) -> Option<Language> {
    Language::ALL
        .into_iter()
        .find(|language| match_keyword(*language, transcript).is_some())
}

/// An emergency signal from the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTriggerEvent {
    pub keyword: String,
    /// Milliseconds since the epoch, as stamped by the browser
    pub timestamp_ms: Option<i64>,
}

impl VoiceTriggerEvent {
    /// Build an event from raw form or query values.
    ///
    /// `flag` must be `true` (any case); anything else means no signal.
    pub fn from_parts(flag: Option<&str>, keyword: Option<&str>, ts: Option<&str>) -> Option<Self> {
        if !flag.is_some_and(|f| f.trim().eq_ignore_ascii_case("true")) {
            return None;
        }

        let keyword: String = keyword
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(UNKNOWN_KEYWORD)
            .chars()
            .filter(|c| !c.is_control())
            .take(MAX_KEYWORD_LEN)
            .collect();

        Some(Self {
            keyword,
            timestamp_ms: ts.and_then(|t| t.trim().parse::<i64>().ok()),
        })
    }

    /// Language whose table contains the keyword. The browser only sends
    /// table keywords, so `None` points at a stale or foreign client.
    pub fn language(&self) -> Option<Language> {
        detect_language(&self.keyword)
    }
}

/// At-most-once delivery of voice events within a session.
///
/// Events are keyed by (keyword, timestamp); events without a timestamp
/// cannot be told apart and are always accepted.
#[derive(Debug, Default)]
pub struct EventLedger {
    seen: HashSet<(String, i64)>,
    order: VecDeque<(String, i64)>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this event was already delivered
    pub fn accept(&mut self, event: &VoiceTriggerEvent) -> bool {
        let Some(ts) = event.timestamp_ms else {
            return true;
        };
        let key = (event.keyword.clone(), ts);
        if self.seen.contains(&key) {
            debug!("Dropping replayed voice event {:?}", key);
            return false;
        }

        if self.order.len() >= LEDGER_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListenerLanguage {
    code: &'static str,
    name: &'static str,
    keywords: &'static [&'static str],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListenerConfig {
    languages: Vec<ListenerLanguage>,
    start_delay_ms: u64,
    restart_delay_ms: u64,
    retry_delay_ms: u64,
    poll_interval_ms: u64,
}

/// The browser listener script with the language tables filled in
pub fn listener_script(poll_interval_ms: u64) -> String {
    let config = ListenerConfig {
        languages: Language::ALL
            .into_iter()
            .map(|l| ListenerLanguage {
                code: l.code(),
                name: l.display_name(),
                keywords: l.keywords(),
            })
            .collect(),
        start_delay_ms: 1000,
        restart_delay_ms: 2000,
        retry_delay_ms: 3000,
        poll_interval_ms,
    };
    // Serializing static tables cannot fail
    let json = serde_json::to_string(&config).unwrap_or_else(|_| "{}".to_string());
    LISTENER_TEMPLATE.replace(CONFIG_PLACEHOLDER, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_keyword_match() {
        assert_eq!(
            match_keyword(Language::English, "please help me now"),
            Some("help")
        );
        assert_eq!(match_keyword(Language::English, "hello there"), None);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        assert_eq!(
            match_keyword(Language::English, "This is an EMERGENCY"),
            Some("emergency")
        );
        assert_eq!(match_keyword(Language::English, "SOS!"), Some("sos"));
    }

    #[test]
    fn test_first_listed_keyword_wins() {
        // "save me" appears before "help me" in the list, "help" before both
        assert_eq!(
            match_keyword(Language::English, "save me, help me"),
            Some("help")
        );
        assert_eq!(match_keyword(Language::English, "save me"), Some("save me"));
    }

    #[test]
    fn test_keywords_are_per_language() {
        assert_eq!(match_keyword(Language::Hindi, "कृपया मदद करो"), Some("मदद"));
        assert_eq!(match_keyword(Language::Hindi, "please help"), None);
        assert_eq!(
            match_keyword(Language::Tamil, "எனக்கு உதவி வேண்டும்"),
            Some("உதவி")
        );
    }

    #[test]
    fn test_event_language_comes_from_keyword_tables() {
        let event = |keyword: &str| VoiceTriggerEvent {
            keyword: keyword.to_string(),
            timestamp_ms: None,
        };
        assert_eq!(event("help me").language(), Some(Language::English));
        assert_eq!(event("बचाओ").language(), Some(Language::Hindi));
        assert_eq!(event("அவசரம்").language(), Some(Language::Tamil));
        assert_eq!(event(UNKNOWN_KEYWORD).language(), None);
    }

    #[test]
    fn test_event_requires_true_flag() {
        assert!(VoiceTriggerEvent::from_parts(None, Some("help"), None).is_none());
        assert!(VoiceTriggerEvent::from_parts(Some("false"), Some("help"), None).is_none());

        let event = VoiceTriggerEvent::from_parts(Some("TRUE"), None, Some("17")).unwrap();
        assert_eq!(event.keyword, UNKNOWN_KEYWORD);
        assert_eq!(event.timestamp_ms, Some(17));
    }

    #[test]
    fn test_event_keyword_is_sanitized() {
        let long = "x".repeat(500);
        let event = VoiceTriggerEvent::from_parts(Some("true"), Some(&long), Some("abc")).unwrap();
        assert_eq!(event.keyword.len(), MAX_KEYWORD_LEN);
        assert_eq!(event.timestamp_ms, None);

        let event =
            VoiceTriggerEvent::from_parts(Some("true"), Some(" help\u{7}\n "), None).unwrap();
        assert_eq!(event.keyword, "help");
    }

    #[test]
    fn test_ledger_drops_replays() {
        let mut ledger = EventLedger::new();
        let event = VoiceTriggerEvent {
            keyword: "help".to_string(),
            timestamp_ms: Some(1_700_000_000_000),
        };
        assert!(ledger.accept(&event));
        assert!(!ledger.accept(&event));

        let later = VoiceTriggerEvent {
            timestamp_ms: Some(1_700_000_000_001),
            ..event.clone()
        };
        assert!(ledger.accept(&later));

        let untimed = VoiceTriggerEvent {
            keyword: "help".to_string(),
            timestamp_ms: None,
        };
        assert!(ledger.accept(&untimed));
        assert!(ledger.accept(&untimed));
    }

    #[test]
    fn test_ledger_is_bounded() {
        let mut ledger = EventLedger::new();
        for ts in 0..(LEDGER_CAPACITY as i64 + 10) {
            let event = VoiceTriggerEvent {
                keyword: "sos".to_string(),
                timestamp_ms: Some(ts),
            };
            assert!(ledger.accept(&event));
        }
        assert_eq!(ledger.order.len(), LEDGER_CAPACITY);
        assert_eq!(ledger.seen.len(), LEDGER_CAPACITY);
    }

    #[test]
    fn test_listener_script_has_tables() {
        let script = listener_script(1000);
        assert!(!script.contains(CONFIG_PLACEHOLDER));
        assert!(script.contains(r#""code":"ta-IN""#));
        assert!(script.contains("save me"));
        assert!(script.contains(r#""pollIntervalMs":1000"#));

        // Listening order matches Language::ALL
        let en = script.find(r#""code":"en-US""#).unwrap();
        let hi = script.find(r#""code":"hi-IN""#).unwrap();
        let ta = script.find(r#""code":"ta-IN""#).unwrap();
        assert!(en < hi && hi < ta);
    }
}
