//! Orchestrator configuration
//!
//! HTTP bind address, optional database connection, dispatch queue sizing and
//! the embedded worker pool settings.

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Capacity of the job dispatch queue between stages and the worker pool
    pub dispatch_queue_capacity: usize,

    /// Worker pool settings
    pub runner: cascade_runner::Config,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            dispatch_queue_capacity: 256,
            runner: cascade_runner::Config::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ORCHESTRATOR_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional, default: in-memory store)
    /// - DISPATCH_QUEUE_CAPACITY (optional, default: 256)
    /// - plus every worker pool variable
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let bind_addr = std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let dispatch_queue_capacity = std::env::var("DISPATCH_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.dispatch_queue_capacity);

        let runner = cascade_runner::Config::from_env()?;

        Ok(Self {
            bind_addr,
            database_url,
            dispatch_queue_capacity,
            runner,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        let postgres_url = |url: &String| {
            url.starts_with("postgres://") || url.starts_with("postgresql://")
        };
        if self.database_url.as_ref().is_some_and(|url| !postgres_url(url)) {
            anyhow::bail!("database_url must start with postgres:// or postgresql://");
        }

        if self.dispatch_queue_capacity == 0 {
            anyhow::bail!("dispatch_queue_capacity must be greater than 0");
        }

        self.runner.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
