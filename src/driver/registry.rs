use std::fmt;
use std::sync::Arc;

use tracing::info;

use super::{DatabaseAdminDriver, MySqlDriver, PostgresDriver};
use crate::config::ServiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    MySql,
    Postgres,
}

impl Flavor {
    /// Only the exact names `mysql` and `postgres` are recognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mysql" => Some(Self::MySql),
            "postgres" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An engine tenants can be provisioned on: where tenants connect, and the
/// driver that administers it.
#[derive(Clone)]
pub struct FlavorDescriptor {
    pub flavor: Flavor,
    pub host: String,
    pub port: u16,
    pub driver: Arc<dyn DatabaseAdminDriver>,
}

impl fmt::Debug for FlavorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlavorDescriptor")
            .field("flavor", &self.flavor)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Immutable flavor table, built once at startup.
#[derive(Debug, Default)]
pub struct FlavorRegistry {
    descriptors: Vec<FlavorDescriptor>,
}

impl FlavorRegistry {
    /// Later descriptors for an already registered flavor are ignored.
    #[must_use]
    pub fn new(descriptors: Vec<FlavorDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if registry.resolve(descriptor.flavor.as_str()).is_none() {
                registry.descriptors.push(descriptor);
            }
        }
        registry
    }

    /// Registers a driver for every admin endpoint present in the config.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        let acquire_timeout = config.driver_timeout();
        let mut descriptors = Vec::new();

        if let Some(endpoint) = &config.mysql {
            info!("registering mysql flavor at {}:{}", endpoint.host, endpoint.port);
            descriptors.push(FlavorDescriptor {
                flavor: Flavor::MySql,
                host: endpoint.host.clone(),
                port: endpoint.port,
                driver: Arc::new(MySqlDriver::new(endpoint, acquire_timeout)),
            });
        }

        if let Some(endpoint) = &config.postgres {
            info!("registering postgres flavor at {}:{}", endpoint.host, endpoint.port);
            descriptors.push(FlavorDescriptor {
                flavor: Flavor::Postgres,
                host: endpoint.host.clone(),
                port: endpoint.port,
                driver: Arc::new(PostgresDriver::new(endpoint, acquire_timeout)),
            });
        }

        Self::new(descriptors)
    }

    /// Looks up a flavor by name. Unknown or unconfigured flavors yield `None`.
    pub fn resolve(&self, name: &str) -> Option<&FlavorDescriptor> {
        let flavor = Flavor::parse(name)?;
        self.descriptors.iter().find(|d| d.flavor == flavor)
    }
}
