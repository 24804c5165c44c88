use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::validation::validate_probe;
use crate::config::EndpointConfig;
use crate::error::RegistryError;

/// Kind of dependency being monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    AI,
    Protocol,
    Service,
    Messaging,
    Payment,
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" => Ok(Category::AI),
            "protocol" => Ok(Category::Protocol),
            "service" => Ok(Category::Service),
            "messaging" => Ok(Category::Messaging),
            "payment" => Ok(Category::Payment),
            _ => Err(()),
        }
    }
}

/// How to check an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeDescriptor {
    /// GET the url. Empty `expected_statuses` means any 2xx.
    Http { url: Url, expected_statuses: Vec<u16>, degraded_statuses: Vec<u16> },
    /// Open a TCP connection to `host:port`
    Tcp { address: String },
}

impl ProbeDescriptor {
    pub fn target(&self) -> &str {
        match self {
            ProbeDescriptor::Http { url, .. } => url.as_str(),
            ProbeDescriptor::Tcp { address } => address,
        }
    }
}

/// A monitored target. Immutable once the registry is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub id: String,
    pub display_name: String,
    pub category: Category,
    pub critical: bool,
    pub description: String,
    pub probe: ProbeDescriptor,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        category: Category,
        critical: bool,
        probe: ProbeDescriptor,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            category,
            critical,
            description: String::new(),
            probe,
        }
    }
}

/// Catalogue of monitored endpoints.
///
/// Built once from configuration and shared read-only. Reconfiguring means
/// building a new registry, never mutating this one.
#[derive(Debug, Clone)]
pub struct Registry {
    endpoints: Vec<Endpoint>,
}

impl Registry {
    /// Build a registry from configuration entries.
    /// Any malformed entry fails the whole load.
    pub fn load(entries: &[EndpointConfig]) -> Result<Self, RegistryError> {
        let mut endpoints = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(RegistryError::MissingId { index });
            }

            let category = entry.category.parse::<Category>().map_err(|()| {
                RegistryError::UnknownCategory { id: id.to_string(), category: entry.category.clone() }
            })?;

            let probe = validate_probe(&entry.probe)
                .map_err(|reason| RegistryError::InvalidProbe { id: id.to_string(), reason })?;

            let display_name = if entry.name.trim().is_empty() { id } else { entry.name.trim() };

            endpoints.push(Endpoint {
                id: id.to_string(),
                display_name: display_name.to_string(),
                category,
                critical: entry.critical,
                description: entry.description.clone(),
                probe,
            });
        }

        Self::new(endpoints)
    }

    /// Build a registry from already-constructed endpoints
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, RegistryError> {
        if endpoints.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                return Err(RegistryError::DuplicateId(endpoint.id.clone()));
            }
        }

        Ok(Self { endpoints })
    }

    /// All endpoints, in configuration order
    pub fn list(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|endpoint| endpoint.id == id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|endpoint| endpoint.id.as_str())
    }
}
