use std::env;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Fixed offset of the clinic's wall clock from UTC. All booking input
    /// times are interpreted against this, never against the host timezone.
    pub clinic_utc_offset: FixedOffset,
    pub environment: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset: env::var("CLINIC_UTC_OFFSET")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_UTC_OFFSET not set, using UTC");
                    "+00:00".to_string()
                })
                .parse::<FixedOffset>()
                .unwrap_or_else(|_| {
                    warn!("CLINIC_UTC_OFFSET is not a valid ±HH:MM offset, using UTC");
                    Utc.fix()
                }),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
