#![allow(dead_code)]

pub mod mock_provider;

use mock_provider::MockProvider;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use sos_alert::config::Config;
use sos_alert::location::LocationProvider;
use sos_alert::server::{router, AppState};
use sos_alert::settings::{Settings, SettingsStore};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Settings with everything needed to send an alert
pub fn complete_settings() -> Settings {
    Settings {
        user_name: "Asha".to_string(),
        emergency_contact: "+919876543210".to_string(),
        provider_account_id: "AC0000".to_string(),
        provider_auth_secret: "secret".to_string(),
        provider_phone_number: "+15005550006".to_string(),
    }
}

/// A running server on an ephemeral port with a mock provider and no
/// geocoding. Acts as a single browser: the session cookie is kept.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub addr: SocketAddr,
    pub app: AppState,
    pub provider: Arc<MockProvider>,
    pub config: Config,
    client: Client,
    cookie: Mutex<Option<String>>,
}

impl TestServer {
    pub async fn start(settings: Option<Settings>) -> Self {
        Self::start_with_provider(settings, MockProvider::new()).await
    }

    pub async fn start_with_provider(settings: Option<Settings>, provider: MockProvider) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = Config::for_testing(temp_dir.path());

        if let Some(settings) = settings {
            SettingsStore::new(&config.settings_path)
                .save(&settings)
                .expect("Failed to seed settings");
        }

        let provider = Arc::new(provider);
        let locations = LocationProvider::new(&config, None);
        let app = AppState::with_parts(config.clone(), provider.clone(), locations);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local addr");
        let service = router(app.clone());
        tokio::spawn(async move {
            axum::serve(listener, service).await.ok();
        });

        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .expect("Failed to build client");

        Self {
            temp_dir,
            addr,
            app,
            provider,
            config,
            client,
            cookie: Mutex::new(None),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Forget the session cookie, like a fresh browser
    pub fn clear_cookie(&self) {
        *self.cookie.lock().unwrap() = None;
    }

    fn remember_cookie(&self, response: &Response) {
        if let Some(value) = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            let pair = value.split(';').next().unwrap_or_default().to_string();
            *self.cookie.lock().unwrap() = Some(pair);
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Response {
        let request = match self.cookie.lock().unwrap().clone() {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        };
        let response = request.send().await.expect("Request failed");
        self.remember_cookie(&response);
        response
    }

    pub async fn get(&self, path: &str) -> Response {
        self.send(self.client.get(self.url(path))).await
    }

    pub async fn get_page(&self, path: &str) -> String {
        let response = self.get(path).await;
        assert_eq!(response.status(), 200, "GET {} should render", path);
        response.text().await.expect("No body")
    }

    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Response {
        self.send(self.client.post(self.url(path)).form(form)).await
    }

    pub fn location_of(response: &Response) -> Option<String> {
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}
