use std::env;

use reelworks_model::LimitOverride;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,

    // System-wide concurrency overrides, applied between plan overrides
    // and the hard defaults.
    pub per_tenant_job_limit: Option<u32>,
    pub global_job_limit: Option<u32>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            database_url: env::var("DATABASE_URL").ok(),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| {
                    "http://localhost:3000,http://localhost:5173".to_string()
                })
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),

            per_tenant_job_limit: env::var("RW_PER_TENANT_JOB_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
            global_job_limit: env::var("RW_GLOBAL_JOB_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
        })
    }

    /// Operator-level concurrency override fed to the policy resolver.
    pub fn system_limits(&self) -> LimitOverride {
        LimitOverride {
            per_tenant: self.per_tenant_job_limit,
            global: self.global_job_limit,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
