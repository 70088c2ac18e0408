use std::env;

/// Default upstream API base when `DP_BASE_URL` is unset.
const DEFAULT_BASE_URL: &str = "https://www.datenportal-muensterland.de/api/v1";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream Datenportal API
    pub dp_base_url: String,
    pub dp_api_user: String,
    pub dp_api_pass: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Upstream credentials may legitimately be absent at startup; requests
    /// fail with a 500 until they are provided (checked per request, see
    /// `rest::get_pois`).
    pub fn from_env() -> Self {
        Self {
            dp_base_url: env::var("DP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            dp_api_user: env::var("DP_API_USER").unwrap_or_default(),
            dp_api_pass: env::var("DP_API_PASS").unwrap_or_default(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.dp_api_user.is_empty() && !self.dp_api_pass.is_empty()
    }
}
