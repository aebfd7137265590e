//! Exchange Schema Registry
//!
//! A versioned registry and compatibility engine for the query contract
//! spoken by the data-exchange orchestration layer. Providers evolve their
//! schemas independently; the registry keeps exactly one schema Active and
//! only lets a new version through when its real impact matches what the
//! submitter declared.
//!
//! ## Features
//!
//! - **SDL Parsing**: Schema text becomes a structural type model with line/column errors
//! - **Compatibility Checking**: Type-by-type, field-by-field diff classified as major/minor/patch
//! - **Lifecycle State Machine**: Draft → Inactive/Rejected → Active → Deprecated
//! - **Single Active Version**: Activation demotes the previous version in one store transaction
//! - **Multi-Version Cache**: Read-optimized routing of schema versions to the query engine
//! - **Contract Tests**: Recorded query fixtures replayed before activation
//! - **Checksum Idempotency**: Resubmitting identical SDL is a no-op
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use exchange_schemas::{ActivateOptions, ChangeType, Context, MemoryVersionStore, SchemaRegistry, Submission};
//!
//! # fn main() -> exchange_schemas::Result<()> {
//! let registry = SchemaRegistry::new(Arc::new(MemoryVersionStore::new()))?;
//! let ctx = Context::background().with_actor("ops");
//!
//! registry.submit(&Submission::new("v1", "type Query { name: String }", ChangeType::Major), &ctx)?;
//! registry.evaluate("v1", &ctx)?;
//! registry.activate("v1", ActivateOptions::default(), &ctx)?;
//!
//! let schema = registry.resolve("", &ctx)?;
//! assert!(schema.field("Query", "name").is_some());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod registry;
pub mod schema;
pub mod sdl;
pub mod store;
pub mod version;

pub use audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
pub use checksum::Checksum;
pub use compatibility::{ChangeKind, CompatibilityChecker, CompatibilityReport, SchemaChange};
pub use config::RegistryConfig;
pub use context::{CancelHandle, Context};
pub use contract::{ContractTest, ContractTestResults, ContractTester, Priority, QueryExecutor, TestResult};
pub use error::{ErrorKind, ParseError, RegistryError, Result, StoreError};
pub use registry::{ActivateOptions, Activation, SchemaRegistry, Submission, VersionPage};
pub use schema::{FieldDefinition, ParsedSchema, TypeDefinition, TypeKind, TypeRef};
pub use store::{ChangeRecord, ChangeRecordKind, FileVersionStore, MemoryVersionStore, VersionStore, VersionUpdate};
pub use version::{ChangeType, SchemaVersion, VersionStatus};
