//! Kiln contract model
//!
//! Data types shared by every planning stage:
//!
//! - [`AppManifest`]: the application and its ordered service declarations
//! - [`ServiceContract`]: one service's contract document
//! - [`ContractSurface`]: the reduced API surface used to classify changes
//! - [`ContractHash`]: SHA-256 digest identifying one contract revision
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_contract::{AppManifest, ContractHash, ContractSurface};
//!
//! let manifest = AppManifest::from_yaml_str(&manifest_text)?;
//! let surface = ContractSurface::from_yaml_str(&contract_text)?;
//! let digest = ContractHash::compute(contract_text.as_bytes());
//! ```

#![warn(unreachable_pub)]

mod contract;
mod error;
mod hash;
mod manifest;

pub use contract::{
    ApiSection, ContractSurface, DependencySection, Endpoint, Operation, ServiceContract,
    ServiceDependency, ServiceInfo,
};
pub use error::ContractError;
pub use hash::{ContractHash, HashError};
pub use manifest::{AppInfo, AppManifest, Runtime, ServiceDecl};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
