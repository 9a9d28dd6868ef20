//! Application Configuration
//!
//! Configuration for the Auth application layer.

use platform::password::HashCost;
use std::time::Duration;

/// Where a local server answers when no public URL is configured
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:31113";

const VERIFY_EMAIL_PATH: &str = "/api/auth/verify_email";

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Bearer token lifetime (48 hours)
    pub token_ttl: Duration,
    /// Verification code lifetime (15 minutes)
    pub verify_email_ttl: Duration,
    /// Snapshot cache lifetime (24 hours)
    pub cache_ttl: Duration,
    /// Deadline for single store calls outside a transaction
    pub store_timeout: Duration,
    /// Link target in verification mails; `email_id` and `secret_code` are appended
    pub verify_url_base: String,
    pub verify_email_subject: String,
    pub hash_cost: HashCost,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(48 * 3600),
            verify_email_ttl: Duration::from_secs(15 * 60),
            cache_ttl: Duration::from_secs(24 * 3600),
            store_timeout: Duration::from_secs(3),
            verify_url_base: format!("{DEFAULT_PUBLIC_BASE_URL}{VERIFY_EMAIL_PATH}"),
            verify_email_subject: "Verify your email address".to_string(),
            hash_cost: HashCost::default(),
            password_pepper: None,
        }
    }
}

impl AuthConfig {
    /// Verification links built from a public base URL
    pub fn with_public_base_url(mut self, base: &str) -> Self {
        self.verify_url_base = format!("{}{VERIFY_EMAIL_PATH}", base.trim_end_matches('/'));
        self
    }

    /// Cheap hashing and short deadlines (tests, local development)
    pub fn development() -> Self {
        Self {
            hash_cost: HashCost::insecure_fast(),
            store_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }
}
