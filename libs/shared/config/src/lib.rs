use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub qr_signing_secret: String,
    pub reservation_ttl_hours: i64,
    pub expiry_warning_days: i64,
    pub reservation_sweep_interval_secs: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, reservation sweeper disabled");
                    String::new()
                }),
            qr_signing_secret: env::var("QR_SIGNING_SECRET")
                .unwrap_or_else(|_| {
                    warn!("QR_SIGNING_SECRET not set, signing QR payloads with the JWT secret");
                    supabase_jwt_secret.clone()
                }),
            supabase_jwt_secret,
            reservation_ttl_hours: parse_or("RESERVATION_TTL_HOURS", 24),
            expiry_warning_days: parse_or("EXPIRY_WARNING_DAYS", 30),
            reservation_sweep_interval_secs: parse_or("RESERVATION_SWEEP_INTERVAL_SECS", 900),
            server_port: parse_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Minimal configuration pointing at a Supabase project; everything else takes its default.
    pub fn for_supabase(url: &str, anon_key: &str, jwt_secret: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            supabase_anon_key: anon_key.to_string(),
            supabase_jwt_secret: jwt_secret.to_string(),
            supabase_service_role_key: String::new(),
            qr_signing_secret: jwt_secret.to_string(),
            reservation_ttl_hours: 24,
            expiry_warning_days: 30,
            reservation_sweep_interval_secs: 900,
            server_port: 3000,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_sweeper_configured(&self) -> bool {
        self.is_configured()
            && !self.supabase_service_role_key.is_empty()
            && self.reservation_sweep_interval_secs > 0
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_supabase_uses_defaults() {
        let config = AppConfig::for_supabase("http://localhost:54321", "anon", "secret");
        assert!(config.is_configured());
        assert!(!config.is_sweeper_configured());
        assert_eq!(config.reservation_ttl_hours, 24);
        assert_eq!(config.qr_signing_secret, "secret");
    }

    #[test]
    fn sweeper_needs_service_key_and_interval() {
        let mut config = AppConfig::for_supabase("http://localhost:54321", "anon", "secret");
        config.supabase_service_role_key = "service".to_string();
        assert!(config.is_sweeper_configured());

        config.reservation_sweep_interval_secs = 0;
        assert!(!config.is_sweeper_configured());
    }
}
