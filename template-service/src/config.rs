//! Service configuration
//!
//! Settings are read once at process start and passed down explicitly.
//! Variables use `__` as the section delimiter:
//!
//! - `COMMON__ENVIRONMENT` (required): local, dev, stage, prod, test
//! - `COMMON__LOG_LEVEL`, `COMMON__STRUCT_LOG`, `COMMON__PROMETHEUS_ENABLED`, ...
//! - `SWAGGER__DOC_LOGIN`, `SWAGGER__DOC_PASSWORD`
//! - `AUTH__CSRF_COOKIE_NAME`, `AUTH__CSRF_HEADER_NAME`, `AUTH__CSRF_EXPIRE_TIME`, ...
//! - `POSTGRES__HOST`, `POSTGRES__PORT`, `POSTGRES__USER`, `POSTGRES__PASSWORD`,
//!   `POSTGRES__DB`, `POSTGRES__POOL_SIZE`, `POSTGRES__OVERFLOW_POOL_SIZE`
//! - `DATABASE_URL` overrides the individual `POSTGRES__*` connection fields
//!
//! A `.env` file in the working directory is loaded first when present;
//! variables already set in the environment win.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use tracing::debug;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Stage,
    Prod,
    Test,
}

impl Environment {
    /// Local and dev deployments expose more detail in logs.
    pub fn is_debug(self) -> bool {
        matches!(self, Self::Local | Self::Dev)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "dev" => Ok(Self::Dev),
            "stage" => Ok(Self::Stage),
            "prod" => Ok(Self::Prod),
            "test" | "pytest" => Ok(Self::Test),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Log level accepted in `COMMON__LOG_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" | "critical" => Ok(Self::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// General service settings
#[derive(Debug, Clone)]
pub struct CommonSettings {
    pub project_name: String,
    pub environment: Environment,
    pub log_level: LogLevel,
    /// Compact human-readable output instead of the default formatter
    pub human_readable_logs: bool,
    /// Paths (substring match) excluded from the access log
    pub disabled_log_endpoints: Vec<String>,
    /// Largest response body (bytes) copied into the access log
    pub logger_body_content_max_size: usize,
    pub backend_cors_origins: Vec<String>,
    pub prometheus_enabled: bool,
    /// JSON log lines
    pub struct_log: bool,
    pub bind_addr: SocketAddr,
}

/// Credentials guarding `/docs`
#[derive(Debug, Clone)]
pub struct SwaggerSettings {
    pub doc_login: String,
    pub doc_password: String,
}

/// CSRF parameters
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub csrf_enabled: bool,
    /// Cookie max-age in seconds
    pub csrf_expire_time: u64,
    pub csrf_cookie_name: String,
    pub csrf_header_name: String,
    /// Hostnames accepted in `Origin`/`Referer` over HTTPS
    pub csrf_allowed_hosts: Vec<String>,
    pub csrf_allow_header_param: bool,
    pub csrf_allow_form_param: bool,
}

/// PostgreSQL connection and pool settings
#[derive(Debug, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,
    /// Connections kept in the pool
    pub pool_size: u32,
    /// Extra connections allowed on top of `pool_size`
    pub overflow_pool_size: u32,
    pub acquire_timeout: Duration,
    /// `DATABASE_URL`, if set
    pub url_override: Option<String>,
}

impl PostgresSettings {
    /// Upper bound on physical connections (pool + overflow).
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.overflow_pool_size
    }

    /// Connection options built from the individual fields, or parsed from
    /// `DATABASE_URL` when it is set.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.url_override {
            Some(url) => url.parse(),
            None => Ok(PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.db)),
        }
    }
}

/// All service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub common: CommonSettings,
    pub swagger: SwaggerSettings,
    pub auth: AuthSettings,
    pub postgres: PostgresSettings,
}

const DEFAULT_DISABLED_LOG_ENDPOINTS: &[&str] =
    &["/health", "/liveness", "/metrics", "/openapi.json", "/docs"];

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded .env from {}", path.display()),
            Err(e) => debug!("No .env loaded: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    ///
    /// Tests use this to avoid touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let environment = vars
            .get("COMMON__ENVIRONMENT")
            .ok_or(ConfigError::Missing("COMMON__ENVIRONMENT"))
            .and_then(|raw| {
                raw.parse().map_err(|reason| ConfigError::Invalid {
                    var: "COMMON__ENVIRONMENT",
                    value: raw.clone(),
                    reason,
                })
            })?;

        let common = CommonSettings {
            project_name: vars.string("COMMON__PROJECT_NAME", "template_service"),
            environment,
            log_level: vars.parse("COMMON__LOG_LEVEL", LogLevel::Info)?,
            human_readable_logs: vars.flag("COMMON__HUMAN_READABLE_LOGS", false)?,
            disabled_log_endpoints: vars
                .list("COMMON__DISABLED_LOG_ENDPOINT", DEFAULT_DISABLED_LOG_ENDPOINTS)?,
            logger_body_content_max_size: vars.parse("COMMON__LOGGER_BODY_CONTENT_MAX_SIZE", 2500)?,
            backend_cors_origins: vars.list("COMMON__BACKEND_CORS_ORIGINS", &[])?,
            prometheus_enabled: vars.flag("COMMON__PROMETHEUS_ENABLED", true)?,
            struct_log: vars.flag("COMMON__STRUCT_LOG", true)?,
            bind_addr: vars.parse("COMMON__BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
        };

        let swagger = SwaggerSettings {
            doc_login: vars.string("SWAGGER__DOC_LOGIN", "admin"),
            doc_password: vars.string("SWAGGER__DOC_PASSWORD", "admin"),
        };

        let auth = AuthSettings {
            csrf_enabled: vars.flag("AUTH__CSRF_ENABLED", true)?,
            csrf_expire_time: vars.parse("AUTH__CSRF_EXPIRE_TIME", 31_536_000)?,
            csrf_cookie_name: vars.string("AUTH__CSRF_COOKIE_NAME", "csrftoken"),
            csrf_header_name: vars.string("AUTH__CSRF_HEADER_NAME", "X-CSRFToken"),
            csrf_allowed_hosts: vars.list("AUTH__CSRF_ALLOWED_HOSTS", &["localhost", "127.0.0.1"])?,
            csrf_allow_header_param: vars.flag("AUTH__CSRF_ALLOW_HEADER_PARAM", true)?,
            csrf_allow_form_param: vars.flag("AUTH__CSRF_ALLOW_FORM_PARAM", false)?,
        };

        let postgres = PostgresSettings {
            host: vars.string("POSTGRES__HOST", "localhost"),
            port: vars.parse("POSTGRES__PORT", 5432)?,
            user: vars.string("POSTGRES__USER", "postgres"),
            password: vars.string("POSTGRES__PASSWORD", "example"),
            db: vars.string("POSTGRES__DB", "template_schema"),
            pool_size: vars.parse("POSTGRES__POOL_SIZE", 10)?,
            overflow_pool_size: vars.parse("POSTGRES__OVERFLOW_POOL_SIZE", 20)?,
            acquire_timeout: Duration::from_secs(vars.parse("POSTGRES__ACQUIRE_TIMEOUT_SECS", 30)?),
            url_override: vars.get("DATABASE_URL"),
        };

        Ok(Self {
            common,
            swagger,
            auth,
            postgres,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    var: key,
                    value: raw,
                    reason: "expected a boolean".into(),
                }),
            },
            None => Ok(default),
        }
    }

    /// Either a JSON array of strings or a comma-separated list.
    fn list(&self, key: &'static str, default: &[&str]) -> Result<Vec<String>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default.iter().map(|s| s.to_string()).collect());
        };

        let trimmed = raw.trim();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed).map_err(|e| ConfigError::Invalid {
                var: key,
                value: raw.clone(),
                reason: e.to_string(),
            });
        }

        Ok(trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}
