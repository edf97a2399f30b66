use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub dispatch: DispatchConfig,

    #[command(flatten)]
    pub transports: TransportConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "COURIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// How long to wait for in-flight dispatches during shutdown
    #[arg(long, env = "COURIER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, shutdown_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without it, channels, templates and messages live in memory.
    #[arg(long = "database-url", env = "COURIER_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "COURIER_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long = "db-min-connections", env = "COURIER_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// Seconds to wait for a connection from the pool
    #[arg(long = "db-acquire-timeout-secs", env = "COURIER_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DispatchConfig {
    /// Upper bound on a whole send request, across all of its channels
    #[arg(long, env = "COURIER_REQUEST_DEADLINE_MS", default_value_t = 60_000)]
    pub request_deadline_ms: u64,

    /// Body sent when a channel has no template and the request does not override the body
    #[arg(long, env = "COURIER_DEFAULT_BODY", default_value = DEFAULT_BODY)]
    pub default_body: String,
}

pub const DEFAULT_BODY: &str = "Default message body";

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { request_deadline_ms: 60_000, default_body: DEFAULT_BODY.to_string() }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct TransportConfig {
    #[command(flatten)]
    pub smtp: SmtpConfig,

    #[command(flatten)]
    pub sms: SmsConfig,

    #[command(flatten)]
    pub http: HttpTransportConfig,
}

#[derive(Clone, Debug, Args)]
pub struct SmtpConfig {
    /// SMTP relay host for the email channel type
    #[arg(id = "smtp_host", long = "smtp-host", env = "COURIER_SMTP_HOST", default_value = "localhost")]
    pub host: String,

    /// SMTP relay port
    #[arg(id = "smtp_port", long = "smtp-port", env = "COURIER_SMTP_PORT", default_value_t = 587)]
    pub port: u16,

    /// SMTP username
    #[arg(long = "smtp-username", env = "COURIER_SMTP_USERNAME")]
    pub username: Option<String>,

    /// SMTP password
    #[arg(long = "smtp-password", env = "COURIER_SMTP_PASSWORD")]
    pub password: Option<String>,

    /// Use STARTTLS when talking to the relay
    #[arg(long = "smtp-starttls", env = "COURIER_SMTP_STARTTLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 587, username: None, password: None, starttls: true }
    }
}

#[derive(Clone, Debug, Args)]
pub struct SmsConfig {
    /// HTTP endpoint of the SMS gateway
    #[arg(long = "sms-gateway-url", env = "COURIER_SMS_GATEWAY_URL", default_value = "http://localhost:8080/sms")]
    pub gateway_url: String,

    /// Bearer token for the SMS gateway
    #[arg(long = "sms-api-key", env = "COURIER_SMS_API_KEY")]
    pub api_key: Option<String>,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self { gateway_url: "http://localhost:8080/sms".to_string(), api_key: None }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HttpTransportConfig {
    /// Connect timeout for outbound webhook and gateway calls
    #[arg(long = "http-connect-timeout-ms", env = "COURIER_HTTP_CONNECT_TIMEOUT_MS", default_value_t = 5_000)]
    pub connect_timeout_ms: u64,

    /// User-Agent sent on outbound calls
    #[arg(long = "http-user-agent", env = "COURIER_HTTP_USER_AGENT", default_value = concat!("courier-server/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self { connect_timeout_ms: 5_000, user_agent: concat!("courier-server/", env!("CARGO_PKG_VERSION")).to_string() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces, metrics and logs are exported only when set
    #[arg(long, env = "COURIER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_without_arguments() {
        let config = Config::try_parse_from(["courier-server"]).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.database.url.is_none());
        assert_eq!(config.dispatch.default_body, DEFAULT_BODY);
        assert!(config.transports.smtp.starttls);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "courier-server",
            "--port",
            "8081",
            "--request-deadline-ms",
            "250",
            "--smtp-starttls",
            "false",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.dispatch.request_deadline_ms, 250);
        assert!(!config.transports.smtp.starttls);
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }
}
