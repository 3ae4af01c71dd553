//! Depot Core - artifact descriptors and ecosystem adapters
//!
//! This crate provides the foundational types used throughout Depot:
//! - `ArtifactDescriptor`: the structured record behind every stored object
//! - `Ecosystem`: the closed set of package-manager protocols Depot speaks
//! - `ArtifactAdapter`: the stateless translator between wire paths, descriptors
//!   and protocol index documents, with one implementation per ecosystem
//!
//! ## Example
//!
//! ```rust
//! use depot_core::{create_adapter, Ecosystem};
//!
//! let npm = create_adapter("npm").unwrap();
//! let descriptor = npm.parse_path("@angular/core/-/core-14.2.0.tgz").unwrap();
//! assert_eq!(descriptor.name, "@angular/core");
//! assert_eq!(descriptor.version, "14.2.0");
//! assert_eq!(descriptor.ecosystem, Ecosystem::Npm);
//! ```

pub mod adapter;
pub mod archive;
pub mod descriptor;
pub mod ecosystem;
pub mod error;

pub use adapter::{ArtifactAdapter, adapter_for, create_adapter, supported_tags};
pub use adapter::cargo::index_path as cargo_index_path;
pub use adapter::pypi::normalize as pypi_normalize;
pub use descriptor::{ArtifactDependency, ArtifactDescriptor};
pub use ecosystem::Ecosystem;
pub use error::{CoreError, Result};
