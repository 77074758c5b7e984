//! Application manifest
//!
//! The manifest is the top-level description of an application: its name and
//! an ordered list of services, each pointing at a contract file and naming
//! the services it depends on.
//!
//! ```yaml
//! version: "1"
//! app:
//!   name: todo-app
//! services:
//!   - name: user
//!     contract: user.contract.yaml
//!     runtime:
//!       port: 8081
//!   - name: todo
//!     contract: todo.contract.yaml
//!     dependencies: [user]
//! ```

use crate::error::ContractError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Parsed application manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManifest {
    /// Manifest format version
    #[serde(default)]
    pub version: Option<String>,
    /// Application metadata
    pub app: AppInfo,
    /// Services in declaration order
    #[serde(default)]
    pub services: Vec<ServiceDecl>,
}

/// Application metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Application name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
}

/// One service entry of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDecl {
    /// Service name, unique within the application
    pub name: String,
    /// Contract reference, relative to the manifest directory
    pub contract: String,
    /// Names of services this one calls
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Runtime settings
    #[serde(default)]
    pub runtime: Runtime,
}

/// How a service runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    /// Runtime kind label (e.g. `container`)
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Declared network port
    #[serde(default)]
    pub port: Option<u16>,
    /// Health check path
    #[serde(default)]
    pub health_check: Option<String>,
}

impl AppManifest {
    /// Create a manifest with no services
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: Some("1".to_string()),
            app: AppInfo {
                name: name.into(),
                description: None,
            },
            services: Vec::new(),
        }
    }

    /// Add a service declaration
    #[must_use]
    pub fn with_service(mut self, service: ServiceDecl) -> Self {
        self.services.push(service);
        self
    }

    /// Parse and validate a manifest from YAML text
    ///
    /// # Errors
    /// - `ContractError::Yaml` if the text is not a manifest
    /// - `ContractError::InvalidManifest` if a structural rule is violated
    pub fn from_yaml_str(text: &str) -> Result<Self, ContractError> {
        let manifest: Self = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check names and contract references
    ///
    /// # Errors
    /// Returns `ContractError::InvalidManifest` naming the first offending entry
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.app.name.trim().is_empty() {
            return Err(ContractError::invalid_manifest("application name is empty"));
        }

        let mut seen = HashSet::new();
        for (idx, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(ContractError::invalid_manifest(format!(
                    "service #{} has an empty name",
                    idx + 1
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ContractError::invalid_manifest(format!(
                    "service '{}' is declared more than once",
                    service.name
                )));
            }
            if service.contract.trim().is_empty() {
                return Err(ContractError::invalid_manifest(format!(
                    "service '{}' has no contract reference",
                    service.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a service declaration by name
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceDecl> {
        self.services.iter().find(|s| s.name == name)
    }
}

impl ServiceDecl {
    /// Create a declaration with no dependencies and no port
    #[must_use]
    pub fn new(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: contract.into(),
            dependencies: Vec::new(),
            runtime: Runtime::default(),
        }
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.dependencies.push(service.into());
        self
    }

    /// Set the declared port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.runtime.port = Some(port);
        self
    }

    /// Declared port, if any
    #[inline]
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.runtime.port
    }
}
