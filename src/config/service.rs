use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    /// Upper bound for any single call to an admin endpoint.
    pub driver_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysql: Option<AdminEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<AdminEndpoint>,
    pub capacity: CapacityConfig,
    pub notifications: NotificationConfig,
    pub audit: AuditConfig,
}

/// Admin credentials for one engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database the admin pool connects to, if the engine needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Local wall-clock time of the daily sweep, `HH:MM`.
    pub run_at: String,
    /// Offset of the schedule's timezone from UTC, `+HH:MM` or `-HH:MM`.
    pub utc_offset: String,
    pub warning_ratio: f64,
    pub max_concurrency: usize,
    /// Age after which a pending intent record is reconciled.
    pub reconcile_grace_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Operators copied on every storage notice.
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_max_connections() -> u32 {
    4
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            driver_timeout_secs: 30,
            mysql: None,
            postgres: None,
            capacity: CapacityConfig::default(),
            notifications: NotificationConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            run_at: "00:00".to_string(),
            utc_offset: "+00:00".to_string(),
            warning_ratio: 0.7,
            max_concurrency: 8,
            reconcile_grace_secs: 600,
        }
    }
}

impl ServiceConfig {
    /// Reads the TOML file at `path` if it exists, then applies the
    /// `ADMIN_MYSQL_*` / `ADMIN_PSQL_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_endpoint_env(&mut self.mysql, "ADMIN_MYSQL", 3306, &lookup)?;
        apply_endpoint_env(&mut self.postgres, "ADMIN_PSQL", 5432, &lookup)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = self.capacity.warning_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::Config(format!(
                "capacity.warning_ratio must be between 0 and 1, got {ratio}"
            )));
        }
        if self.capacity.max_concurrency == 0 {
            return Err(Error::Config(
                "capacity.max_concurrency must be at least 1".into(),
            ));
        }
        if self.driver_timeout_secs == 0 {
            return Err(Error::Config("driver_timeout_secs must be at least 1".into()));
        }
        self.capacity.run_at()?;
        self.capacity.utc_offset()?;
        Ok(())
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tenantdb.db")
    }

    #[must_use]
    pub fn driver_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_timeout_secs)
    }
}

impl CapacityConfig {
    pub fn run_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .map_err(|e| Error::Config(format!("capacity.run_at {:?}: {e}", self.run_at)))
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| {
            Error::Config(format!(
                "capacity.utc_offset {:?} is not of the form +HH:MM",
                self.utc_offset
            ))
        })
    }

    #[must_use]
    pub fn reconcile_grace(&self) -> Duration {
        Duration::from_secs(self.reconcile_grace_secs)
    }
}

/// Offsets beyond UTC+-14:00 do not exist anywhere.
fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let offset: FixedOffset = s.parse().ok()?;
    (offset.local_minus_utc().abs() <= 14 * 3600).then_some(offset)
}

fn apply_endpoint_env<F>(
    endpoint: &mut Option<AdminEndpoint>,
    prefix: &str,
    default_port: u16,
    lookup: &F,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{prefix}_{name}"));

    if endpoint.is_none() {
        let Some(host) = var("HOST") else {
            return Ok(());
        };
        *endpoint = Some(AdminEndpoint {
            host,
            port: default_port,
            user: String::new(),
            password: String::new(),
            database: None,
            max_connections: default_max_connections(),
        });
    }

    let Some(endpoint) = endpoint.as_mut() else {
        return Ok(());
    };

    if let Some(host) = var("HOST") {
        endpoint.host = host;
    }
    if let Some(port) = var("PORT") {
        endpoint.port = port
            .parse()
            .map_err(|_| Error::Config(format!("{prefix}_PORT is not a valid port: {port:?}")))?;
    }
    if let Some(user) = var("USER") {
        endpoint.user = user;
    }
    if let Some(password) = var("PASSWORD") {
        endpoint.password = password;
    }
    Ok(())
}
