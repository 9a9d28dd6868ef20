//! Process Configuration
//!
//! Everything the binary reads from the environment, gathered once at
//! startup. Only `DATABASE_URL` is mandatory; the rest fall back to local
//! development values.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use auth::AuthConfig;
use jobs::{RelayConfig, WorkerConfig};
use platform::mail::MailIdentity;

const DEFAULT_HTTP_PORT: u16 = 31113;
const DEFAULT_FRONTEND_ORIGINS: &str = "http://localhost:40922,http://127.0.0.1:40922";

/// Outbound mail API; `None` means mails are only logged
#[derive(Debug, Clone)]
pub struct MailApiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub from: MailIdentity,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub http_addr: SocketAddr,
    pub frontend_origins: Vec<String>,
    pub auth: AuthConfig,
    pub worker: WorkerConfig,
    pub relay: RelayConfig,
    pub mail: Option<MailApiConfig>,
    /// Completed jobs older than this are purged by maintenance
    pub completed_job_retention: Duration,
    pub maintenance_interval: Duration,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let mut auth = AuthConfig::default();
        let (mut worker, relay) = if cfg!(debug_assertions) {
            (WorkerConfig::development(), RelayConfig::development())
        } else {
            (WorkerConfig::default(), RelayConfig::default())
        };

        auth.password_pepper = env::var("PASSWORD_PEPPER")
            .ok()
            .filter(|p| !p.is_empty())
            .map(String::into_bytes);

        if let Some(n) = parse_var("WORKER_CRITICAL_CONCURRENCY")? {
            worker.critical_concurrency = n;
        }
        if let Some(n) = parse_var("WORKER_DEFAULT_CONCURRENCY")? {
            worker.default_concurrency = n;
        }

        let port = parse_var("HTTP_PORT")?.unwrap_or(DEFAULT_HTTP_PORT);
        auth = auth.with_public_base_url(&public_base_url(
            env::var("PUBLIC_BASE_URL").ok(),
            port,
        ));

        let frontend_origins = env::var("FRONTEND_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_FRONTEND_ORIGINS.to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let mail = match (env::var("MAIL_API_URL"), env::var("MAIL_API_KEY")) {
            (Ok(endpoint), Ok(api_key)) => {
                let mut from = MailIdentity::default();
                if let Ok(name) = env::var("MAIL_SENDER_NAME") {
                    from.name = name;
                }
                if let Ok(address) = env::var("MAIL_SENDER_ADDRESS") {
                    from.address = address;
                }
                Some(MailApiConfig {
                    endpoint,
                    api_key,
                    from,
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS")?.unwrap_or(10),
            http_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            frontend_origins,
            auth,
            worker,
            relay,
            mail,
            completed_job_retention: Duration::from_secs(7 * 24 * 3600),
            maintenance_interval: Duration::from_secs(3600),
        })
    }
}

/// Verification links point at the bound port unless a public URL is given
fn public_base_url(explicit: Option<String>, port: u16) -> String {
    explicit
        .filter(|base| !base.trim().is_empty())
        .unwrap_or_else(|| format!("http://localhost:{port}"))
}

/// Unset is `None`; set but unparsable is an error
fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_links_match_default_port() {
        let base = public_base_url(None, DEFAULT_HTTP_PORT);
        assert_eq!(base, auth::DEFAULT_PUBLIC_BASE_URL);

        let auth = AuthConfig::default();
        assert!(
            auth.verify_url_base
                .starts_with(&format!("http://localhost:{DEFAULT_HTTP_PORT}/")),
            "{}",
            auth.verify_url_base
        );
    }

    #[test]
    fn test_links_follow_bound_port() {
        let auth = AuthConfig::default().with_public_base_url(&public_base_url(None, 4000));
        assert_eq!(
            auth.verify_url_base,
            "http://localhost:4000/api/auth/verify_email"
        );
    }

    #[test]
    fn test_explicit_public_url_wins() {
        let base = public_base_url(Some("https://auth.example.com".to_string()), 4000);
        assert_eq!(base, "https://auth.example.com");
        assert_eq!(public_base_url(Some("  ".to_string()), 4000), "http://localhost:4000");
    }
}
