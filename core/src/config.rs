use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::gate::EnabledOperations;

/// Transport timeout used when neither the request nor the process settings
/// carry a usable value.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Request header names carrying per-request configuration.
pub mod headers {
    pub const ODOO_URL: &str = "odoo-url";
    pub const ODOO_DB: &str = "odoo-db";
    pub const ODOO_USER: &str = "odoo-user";
    pub const ODOO_PASS: &str = "odoo-pass";
    pub const ODOO_TIMEOUT: &str = "odoo-timeout";
    pub const ALGOLIA_API_KEY: &str = "algolia-api-key";
    pub const ALGOLIA_APP_ID: &str = "algolia-app-id";
    pub const ALGOLIA_INDEX_NAME: &str = "algolia-index-name";
    pub const LABUREN_API_KEY: &str = "laburen-api-key";
    pub const TO_USE: &str = "to-use";

    /// Every header the resolver reads, for CORS and logging.
    pub const ALL: [&str; 10] = [
        ODOO_URL,
        ODOO_DB,
        ODOO_USER,
        ODOO_PASS,
        ODOO_TIMEOUT,
        ALGOLIA_API_KEY,
        ALGOLIA_APP_ID,
        ALGOLIA_INDEX_NAME,
        LABUREN_API_KEY,
        TO_USE,
    ];
}

/// Process-wide setting names (environment variables).
pub mod env {
    pub const ODOO_URL: &str = "ODOO_URL";
    pub const ODOO_DB: &str = "ODOO_DB";
    pub const ODOO_USER: &str = "ODOO_USER";
    pub const ODOO_PASS: &str = "ODOO_PASS";
    pub const ODOO_TIMEOUT: &str = "ODOO_TIMEOUT";
    pub const ALGOLIA_API_KEY: &str = "ALGOLIA_API_KEY";
    pub const ALGOLIA_APP_ID: &str = "ALGOLIA_APP_ID";
    pub const ALGOLIA_INDEX_NAME: &str = "ALGOLIA_INDEX_NAME";
    pub const LABUREN_API_KEY: &str = "LABUREN_API_KEY";
    pub const TO_USE: &str = "TO_USE";
}

/// Location and credentials of the Odoo backend.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl BackendConfig {
    /// All four fields are required before a login can be attempted.
    pub fn is_complete(&self) -> bool {
        !self.url.is_empty()
            && !self.database.is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
    }

    /// `<url>/jsonrpc`, tolerating a trailing slash on the configured URL.
    pub fn jsonrpc_endpoint(&self) -> String {
        format!("{}/jsonrpc", self.url.trim_end_matches('/'))
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a resolved bundle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    RequestHeaders,
    ProcessDefaults,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::RequestHeaders => "request_headers",
            ConfigSource::ProcessDefaults => "process_defaults",
        }
    }
}

/// Search index credentials, available only when all three are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchCredentials<'a> {
    pub api_key: &'a str,
    pub app_id: &'a str,
    pub index_name: &'a str,
}

/// Complete, immutable configuration for one request.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    pub backend: BackendConfig,
    pub timeout_ms: u64,
    pub search_api_key: Option<String>,
    pub search_app_id: Option<String>,
    pub search_index_name: Option<String>,
    pub enabled_operations: EnabledOperations,
    pub external_api_key: Option<String>,
    pub source: ConfigSource,
}

impl ConfigBundle {
    pub fn admits(&self, operation: &str) -> bool {
        self.enabled_operations.admits(operation)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn search_credentials(&self) -> Option<SearchCredentials<'_>> {
        Some(SearchCredentials {
            api_key: self.search_api_key.as_deref()?,
            app_id: self.search_app_id.as_deref()?,
            index_name: self.search_index_name.as_deref()?,
        })
    }
}

impl fmt::Debug for ConfigBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBundle")
            .field("backend", &self.backend)
            .field("timeout_ms", &self.timeout_ms)
            .field("search_app_id", &self.search_app_id)
            .field("search_index_name", &self.search_index_name)
            .field("search_api_key_set", &self.search_api_key.is_some())
            .field("enabled_operations", &self.enabled_operations)
            .field("external_api_key_set", &self.external_api_key.is_some())
            .field("source", &self.source)
            .finish()
    }
}

/// Request headers as an explicit resolver input. Names are matched
/// case-insensitively; blank values count as absent.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    values: BTreeMap<String, String>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.values
            .insert(name.to_ascii_lowercase(), value.trim().to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn owned(&self, name: &str) -> Option<String> {
        self.get(name).map(ToOwned::to_owned)
    }
}

impl<K, V> FromIterator<(K, V)> for RequestHeaders
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value.as_ref());
        }
        headers
    }
}

/// Process-wide fallback settings: the single fixed tenant used when a
/// request does not carry its own backend headers. Read once at start-up.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DefaultSettings {
    pub backend: BackendConfig,
    pub timeout_ms: Option<u64>,
    pub search_api_key: Option<String>,
    pub search_app_id: Option<String>,
    pub search_index_name: Option<String>,
    pub external_api_key: Option<String>,
    pub enabled_operations: EnabledOperations,
}

impl DefaultSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            backend: BackendConfig {
                url: read(env::ODOO_URL).unwrap_or_default(),
                database: read(env::ODOO_DB).unwrap_or_default(),
                username: read(env::ODOO_USER).unwrap_or_default(),
                password: read(env::ODOO_PASS).unwrap_or_default(),
            },
            timeout_ms: parse_timeout(read(env::ODOO_TIMEOUT).as_deref(), env::ODOO_TIMEOUT),
            search_api_key: read(env::ALGOLIA_API_KEY),
            search_app_id: read(env::ALGOLIA_APP_ID),
            search_index_name: read(env::ALGOLIA_INDEX_NAME),
            external_api_key: read(env::LABUREN_API_KEY),
            enabled_operations: EnabledOperations::parse_or_open(
                read(env::TO_USE).as_deref(),
                env::TO_USE,
            ),
        }
    }

    /// The bundle a request without backend headers resolves to.
    pub fn to_bundle(&self) -> ConfigBundle {
        ConfigBundle {
            backend: self.backend.clone(),
            timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            search_api_key: self.search_api_key.clone(),
            search_app_id: self.search_app_id.clone(),
            search_index_name: self.search_index_name.clone(),
            enabled_operations: self.enabled_operations.clone(),
            external_api_key: self.external_api_key.clone(),
            source: ConfigSource::ProcessDefaults,
        }
    }
}

impl fmt::Debug for DefaultSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSettings")
            .field("backend", &self.backend)
            .field("timeout_ms", &self.timeout_ms)
            .field("search_app_id", &self.search_app_id)
            .field("search_index_name", &self.search_index_name)
            .field("enabled_operations", &self.enabled_operations)
            .finish_non_exhaustive()
    }
}

/// Build the configuration bundle for one request.
///
/// Backend fields are all-headers or all-defaults: if any of url, db, user or
/// pass is missing from the headers, the process defaults are used as a
/// whole. In header mode, timeout and the optional search/API-key fields fall
/// back individually to the defaults, then to literal defaults. The
/// allow-list comes from the `to-use` header only.
pub fn resolve_request_config(request: &RequestHeaders, defaults: &DefaultSettings) -> ConfigBundle {
    let backend = match (
        request.owned(headers::ODOO_URL),
        request.owned(headers::ODOO_DB),
        request.owned(headers::ODOO_USER),
        request.owned(headers::ODOO_PASS),
    ) {
        (Some(url), Some(database), Some(username), Some(password)) => BackendConfig {
            url,
            database,
            username,
            password,
        },
        _ => {
            let bundle = defaults.to_bundle();
            tracing::debug!(
                event = "request_config_resolved",
                source = bundle.source.as_str(),
                database = %bundle.backend.database,
                open_allow_list = bundle.enabled_operations.is_open(),
                "Resolved request configuration"
            );
            return bundle;
        }
    };

    let timeout_ms = parse_timeout(request.get(headers::ODOO_TIMEOUT), headers::ODOO_TIMEOUT)
        .or(defaults.timeout_ms)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let bundle = ConfigBundle {
        backend,
        timeout_ms,
        search_api_key: request
            .owned(headers::ALGOLIA_API_KEY)
            .or_else(|| defaults.search_api_key.clone()),
        search_app_id: request
            .owned(headers::ALGOLIA_APP_ID)
            .or_else(|| defaults.search_app_id.clone()),
        search_index_name: request
            .owned(headers::ALGOLIA_INDEX_NAME)
            .or_else(|| defaults.search_index_name.clone()),
        enabled_operations: EnabledOperations::parse_or_open(
            request.get(headers::TO_USE),
            headers::TO_USE,
        ),
        external_api_key: request
            .owned(headers::LABUREN_API_KEY)
            .or_else(|| defaults.external_api_key.clone()),
        source: ConfigSource::RequestHeaders,
    };
    tracing::debug!(
        event = "request_config_resolved",
        source = bundle.source.as_str(),
        database = %bundle.backend.database,
        open_allow_list = bundle.enabled_operations.is_open(),
        "Resolved request configuration"
    );
    bundle
}

fn parse_timeout(raw: Option<&str>, source: &'static str) -> Option<u64> {
    let raw = raw?;
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(ms),
        _ => {
            tracing::warn!(
                event = "timeout_rejected",
                source = source,
                value = %raw,
                "Ignoring invalid timeout; expected a positive number of milliseconds"
            );
            None
        }
    }
}
