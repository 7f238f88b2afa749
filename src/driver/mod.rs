//! Driver registry: resolves a `Request.driver` name to a [`Driver`]
//! implementation. Unlike the scheduler registry, an unknown driver name
//! is a per-request error (`spec.md` §9, "unknown driver name"), not a
//! boot-time failure — a bad request shouldn't take the process down.

mod null;
#[cfg(feature = "russh")]
mod netmiko;

pub use null::{NullConnection, NullDriver};
#[cfg(feature = "russh")]
pub use netmiko::NetmikoSsh;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::job::QueueStrategy;
use crate::traits::Driver;

/// Name under which [`NetmikoSsh`] is registered when the `russh` feature
/// is compiled in.
pub const NETMIKO_SSH: &str = "netmiko_ssh";
/// Name under which [`NullDriver`] is always registered.
pub const NULL: &str = "null";

/// Holds the set of drivers a process can dispatch requests to, built
/// once at startup from configuration.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Registers the built-in drivers: `null` always, and `netmiko_ssh`
    /// when the `russh` feature is enabled.
    pub fn with_builtins() -> Self {
        let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        drivers.insert(NULL.to_string(), Arc::new(NullDriver::pinned()));
        #[cfg(feature = "russh")]
        drivers.insert(NETMIKO_SSH.to_string(), Arc::new(NetmikoSsh));
        Self { drivers }
    }

    /// Registers or replaces a driver under the given name. Used by
    /// tests to inject a `NullDriver::fifo()` under a custom name.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        self.drivers.insert(name.into(), driver);
    }

    /// Looks up a driver by name. Fails with `Error::UnknownDriver` if
    /// absent.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDriver { name: name.to_string() })
    }

    /// The queue strategy a request resolves to absent an explicit
    /// `RequestOptions.queue_strategy` override: `pinned` if the named
    /// driver supports persistent sessions, `fifo` otherwise
    /// (`spec.md` §4.2).
    pub fn default_strategy(&self, name: &str) -> Result<QueueStrategy> {
        let driver = self.get(name)?;
        Ok(if driver.supports_persistent_session() {
            QueueStrategy::Pinned
        } else {
            QueueStrategy::Fifo
        })
    }

    /// Names of every registered driver, for diagnostics and health
    /// reporting.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_null_driver_and_its_default_strategy() {
        let registry = DriverRegistry::with_builtins();
        assert_eq!(registry.get(NULL).unwrap().name(), NULL);
        assert_eq!(registry.default_strategy(NULL).unwrap(), QueueStrategy::Pinned);
    }

    #[test]
    fn unknown_driver_is_an_error() {
        let registry = DriverRegistry::with_builtins();
        let err = registry.get("does_not_exist").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnknownDriver);
    }

    #[test]
    fn fifo_driver_resolves_to_fifo_strategy() {
        let mut registry = DriverRegistry::with_builtins();
        registry.register("null_fifo", Arc::new(NullDriver::fifo()));
        assert_eq!(registry.default_strategy("null_fifo").unwrap(), QueueStrategy::Fifo);
    }

    #[cfg(feature = "russh")]
    #[test]
    fn netmiko_ssh_is_registered_when_feature_enabled() {
        let registry = DriverRegistry::with_builtins();
        assert_eq!(registry.get(NETMIKO_SSH).unwrap().name(), NETMIKO_SSH);
    }
}
