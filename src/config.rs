use serde::Deserialize;

/// Where prospects, custom tables and enrichments are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub storage_backend: StorageBackend,
    pub run_migrations: bool,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_anon_key: Option<String>,
    pub admin_role: String,
    pub auth_cache_ttl_secs: u64,
    pub n8n_generate_prospects_url: Option<String>,
    pub n8n_seo_audit_url: Option<String>,
    pub n8n_prospection_email_url: Option<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .trim()
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => anyhow::bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        };

        let database_url = match std::env::var("DATABASE_URL").or_else(|_| std::env::var("DB_URL")) {
            Ok(url) => Some(validate_database_url(url)?),
            Err(_) if storage_backend == StorageBackend::Memory => None,
            Err(_) => anyhow::bail!("DATABASE_URL or DB_URL environment variable required"),
        };

        let config = Self {
            database_url,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            storage_backend,
            run_migrations: parse_bool("RUN_MIGRATIONS", false)?,
            supabase_url: std::env::var("SUPABASE_URL")
                .map_err(|_| anyhow::anyhow!("SUPABASE_URL environment variable required"))
                .and_then(|url| validate_http_url("SUPABASE_URL", url))?,
            supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY")
                .map_err(|_| {
                    anyhow::anyhow!("SUPABASE_SERVICE_ROLE_KEY environment variable required")
                })
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("SUPABASE_SERVICE_ROLE_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            supabase_anon_key: optional_var("SUPABASE_ANON_KEY"),
            admin_role: optional_var("ADMIN_ROLE").unwrap_or_else(|| "admin".to_string()),
            auth_cache_ttl_secs: std::env::var("AUTH_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("AUTH_CACHE_TTL_SECS must be a non-negative integer"))?,
            n8n_generate_prospects_url: optional_url("N8N_GENERATE_PROSPECTS_URL")?,
            n8n_seo_audit_url: optional_url("N8N_SEO_AUDIT_URL")?,
            n8n_prospection_email_url: optional_url("N8N_PROSPECTION_EMAIL_URL")?,
            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a positive integer"))?,
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a positive integer"))?,
        };

        if config.rate_limit_per_second == 0 || config.rate_limit_burst == 0 {
            anyhow::bail!("RATE_LIMIT_PER_SECOND and RATE_LIMIT_BURST must be greater than zero");
        }

        // Never log keys, only where they point
        tracing::info!("Configuration loaded successfully");
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", &url[..20.min(url.len())]);
        }
        tracing::debug!("Storage backend: {:?}", config.storage_backend);
        tracing::debug!("Supabase URL: {}", config.supabase_url);
        if config.n8n_generate_prospects_url.is_none()
            || config.n8n_seo_audit_url.is_none()
            || config.n8n_prospection_email_url.is_none()
        {
            tracing::warn!("One or more N8N webhook URLs are not configured; those workflows will return 503");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Key sent as `apikey` when resolving a caller token.
    pub fn auth_api_key(&self) -> &str {
        self.supabase_anon_key
            .as_deref()
            .unwrap_or(&self.supabase_service_role_key)
    }
}

fn validate_database_url(url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("DATABASE_URL cannot be empty");
    }
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
    }
    Ok(url)
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn optional_url(name: &str) -> anyhow::Result<Option<String>> {
    optional_var(name)
        .map(|url| validate_http_url(name, url))
        .transpose()
}

fn parse_bool(name: &str, default: bool) -> anyhow::Result<bool> {
    match optional_var(name) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be a boolean (true/false)", name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_url_is_trimmed_of_trailing_slash() {
        let url = validate_http_url("X", "https://abc.supabase.co/".to_string()).unwrap();
        assert_eq!(url, "https://abc.supabase.co");
    }

    #[test]
    fn http_url_requires_scheme() {
        assert!(validate_http_url("X", "abc.supabase.co".to_string()).is_err());
        assert!(validate_http_url("X", "  ".to_string()).is_err());
    }

    #[test]
    fn database_url_requires_postgres_scheme() {
        assert!(validate_database_url("mysql://localhost/db".to_string()).is_err());
        assert!(validate_database_url("postgres://localhost/db".to_string()).is_ok());
        assert!(validate_database_url("postgresql://localhost/db".to_string()).is_ok());
    }
}
