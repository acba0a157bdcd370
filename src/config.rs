use crate::parse::NAMESPACES_CONTEXT;
use crate::server::{DEFAULT_MAX_BODY_BYTES, DEFAULT_VERSION_PATH, ServerBuilder};
use crate::types::request::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::types::{ApiVersion, PageLimits};
use crate::writer::{DEFAULT_UI_VERSION, UiSettings};
use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub default_namespace: String,
    pub api_version: String,
    pub max_body_bytes: usize,
    pub default_limit: i64,
    pub max_limit: i64,
    pub ui_version: String,
    pub ui_js_url: Option<String>,
    pub ui_css_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            default_namespace: "default".to_string(),
            api_version: DEFAULT_VERSION_PATH.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            ui_version: DEFAULT_UI_VERSION.to_string(),
            ui_js_url: None,
            ui_css_url: None,
            cors_origins: Vec::new(),
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} must be a valid number")),
        None => Ok(default),
    }
}

impl ServerConfig {
    /// Reads `SCHEMAPI_*` variables, loading a `.env` file first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            bind_addr: var("SCHEMAPI_BIND_ADDR").unwrap_or(defaults.bind_addr),
            default_namespace: env::var("SCHEMAPI_DEFAULT_NAMESPACE")
                .unwrap_or(defaults.default_namespace),
            api_version: var("SCHEMAPI_API_VERSION").unwrap_or(defaults.api_version),
            max_body_bytes: parsed("SCHEMAPI_MAX_BODY_BYTES", defaults.max_body_bytes)?,
            default_limit: parsed("SCHEMAPI_DEFAULT_LIMIT", defaults.default_limit)?,
            max_limit: parsed("SCHEMAPI_MAX_LIMIT", defaults.max_limit)?,
            ui_version: var("SCHEMAPI_UI_VERSION").unwrap_or(defaults.ui_version),
            ui_js_url: var("SCHEMAPI_UI_JS_URL"),
            ui_css_url: var("SCHEMAPI_UI_CSS_URL"),
            cors_origins: var("SCHEMAPI_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit <= 0 || self.max_limit <= 0 {
            return Err(anyhow!("page limits must be positive"));
        }
        if self.default_limit > self.max_limit {
            return Err(anyhow!(
                "SCHEMAPI_DEFAULT_LIMIT ({}) exceeds SCHEMAPI_MAX_LIMIT ({})",
                self.default_limit,
                self.max_limit
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("SCHEMAPI_MAX_BODY_BYTES must be positive"));
        }
        Ok(())
    }

    /// The version path with a leading slash and no trailing one.
    pub fn version_path(&self) -> String {
        format!("/{}", self.api_version.trim_matches('/'))
    }

    /// Applies every setting to a server builder.
    pub fn apply(&self, builder: ServerBuilder) -> ServerBuilder {
        builder
            .versions(vec![
                ApiVersion::new(self.version_path()).with_sub_context(NAMESPACES_CONTEXT),
            ])
            .default_namespace(self.default_namespace.clone())
            .limits(PageLimits {
                default_limit: self.default_limit,
                max_limit: self.max_limit,
            })
            .max_body_bytes(self.max_body_bytes)
            .ui(UiSettings {
                version: self.ui_version.clone(),
                js_url: self.ui_js_url.clone(),
                css_url: self.ui_css_url.clone(),
            })
            .cors_origins(self.cors_origins.clone())
    }
}
