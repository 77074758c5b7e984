//! Service contracts and their API surface
//!
//! A service contract is a YAML document describing one service: metadata,
//! HTTP operations, named types and the services it calls. Planning only
//! needs a reduced view of it, the [`ContractSurface`]: which operations
//! exist, which request fields each of them requires, and which named types
//! are declared. Everything else in the document is metadata.

use crate::error::ContractError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Request keys that group fields rather than name one
const GROUPING_KEYS: [&str; 3] = ["required", "body", "params"];

/// Parsed service contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContract {
    /// Contract format version
    #[serde(default)]
    pub version: Option<String>,
    /// Service metadata
    pub service: ServiceInfo,
    /// HTTP API
    #[serde(default)]
    pub api: ApiSection,
    /// Named type catalog
    #[serde(default)]
    pub types: BTreeMap<String, Value>,
    /// Declared dependencies
    #[serde(default)]
    pub dependencies: DependencySection,
}

/// Service metadata block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

/// API block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSection {
    /// Base path prefix
    #[serde(default)]
    pub base_path: Option<String>,
    /// Operations
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// One HTTP operation as written in the contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable operation id
    #[serde(default)]
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Path template
    pub path: String,
    /// Request schema: field name to field spec
    #[serde(default)]
    pub request: BTreeMap<String, Value>,
    /// Response schema
    #[serde(default)]
    pub response: Option<Value>,
}

/// Dependencies block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySection {
    /// Other services called by this one
    #[serde(default)]
    pub services: Vec<ServiceDependency>,
}

/// One declared service dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDependency {
    /// Name of the called service
    pub name: String,
    /// Why it is called
    #[serde(default)]
    pub reason: Option<String>,
}

impl ServiceContract {
    /// Parse a contract document
    ///
    /// # Errors
    /// Returns `ContractError::Yaml` if the text is not a contract document
    pub fn from_yaml_str(text: &str) -> Result<Self, ContractError> {
        let contract: Self = serde_yaml::from_str(text)?;
        if contract.service.name.trim().is_empty() {
            return Err(ContractError::InvalidContract(
                "service name is empty".to_string(),
            ));
        }
        Ok(contract)
    }

    /// Names of the services this contract declares it calls
    pub fn declared_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.services.iter().map(|d| d.name.as_str())
    }

    /// Reduce to the surface used for change classification
    #[must_use]
    pub fn surface(&self) -> ContractSurface {
        let operations = self
            .api
            .endpoints
            .iter()
            .map(|ep| {
                let op = Operation::from_endpoint(ep);
                (op.id.clone(), op)
            })
            .collect();

        ContractSurface {
            operations,
            types: self.types.keys().cloned().collect(),
        }
    }
}

/// Reduced contract view: operations and named types
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSurface {
    /// Operations keyed by operation id
    pub operations: BTreeMap<String, Operation>,
    /// Named type identifiers
    pub types: BTreeSet<String>,
}

impl ContractSurface {
    /// Parse contract text straight into its surface
    ///
    /// # Errors
    /// Propagates [`ServiceContract::from_yaml_str`] failures
    pub fn from_yaml_str(text: &str) -> Result<Self, ContractError> {
        ServiceContract::from_yaml_str(text).map(|c| c.surface())
    }

    /// Look up an operation by id
    #[inline]
    #[must_use]
    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.get(id)
    }
}

/// One operation of the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id (falls back to `METHOD path` when the contract omits it)
    pub id: String,
    /// Upper-cased HTTP method
    pub method: String,
    /// Path template
    pub path: String,
    /// Request field name to "is required"
    pub request_fields: BTreeMap<String, bool>,
}

impl Operation {
    fn from_endpoint(ep: &Endpoint) -> Self {
        let method = ep.method.to_uppercase();
        let id = if ep.id.trim().is_empty() {
            format!("{method} {}", ep.path)
        } else {
            ep.id.clone()
        };

        let request_fields = ep
            .request
            .iter()
            .filter(|(key, _)| !GROUPING_KEYS.contains(&key.as_str()))
            .filter_map(|(key, spec)| {
                let Value::Mapping(fields) = spec else {
                    return None;
                };
                let required = matches!(
                    fields.get(Value::String("required".to_string())),
                    Some(Value::Bool(true))
                );
                Some((key.clone(), required))
            })
            .collect();

        Self {
            id,
            method,
            path: ep.path.clone(),
            request_fields,
        }
    }

    /// Human label, e.g. `GET /users/{id}`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Whether the request requires the named field
    #[inline]
    #[must_use]
    pub fn requires(&self, field: &str) -> bool {
        self.request_fields.get(field).copied().unwrap_or(false)
    }

    /// Names of required request fields
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.request_fields
            .iter()
            .filter(|(_, required)| **required)
            .map(|(name, _)| name.as_str())
    }
}
