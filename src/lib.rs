//! Journey Migrator
//!
//! Moves authentication journeys between environments of an identity
//! platform together with everything they depend on.
//!
//! ## Features
//!
//! - **Dependency Collection**: Nodes, inner nodes, scripts, email templates,
//!   SAML2 entities, circles of trust, social identity providers and themes
//! - **Portable Bundles**: Self-describing JSON files stamped with the source
//!   environment's fingerprint
//! - **Re-identification**: Fresh node ids on import with every reference
//!   rewritten
//! - **Ordered Import**: Sub-flows are imported before the journeys that call
//!   them
//! - **Orphan Pruning**: Finds and removes nodes no journey references
//! - **Custom Node Detection**: Flags journeys using non-stock node types
//!
//! ## Architecture
//!
//! ```text
//! ArtifactStore (http | memory)
//!   ├── Collector ──> JourneyBundle ──> Bundle file (export)
//!   ├── Importer  <── Remapper <── Sequencer <── Bundle file
//!   ├── OrphanAuditor
//!   └── CustomNodeClassifier
//! ```

pub mod bundle;
pub mod catalog;
pub mod collect;
pub mod config;
pub mod describe;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod http;
pub mod import;
pub mod model;
pub mod naming;
pub mod node_types;
pub mod prune;
pub mod remap;
pub mod sequence;
pub mod store;
pub mod version;

pub use bundle::{Bundle, BundleContent, BundleMeta};
pub use catalog::{CustomNodeClassifier, NodeCatalog};
pub use collect::{CollectOptions, Collector};
pub use config::{ConnectionConfig, Deployment, MigratorConfig, OutputFormat};
pub use describe::{describe, JourneyDescription};
pub use error::{ArtifactKind, MigrateError, Result};
pub use export::Exporter;
pub use fingerprint::OriginFingerprint;
pub use http::HttpArtifactStore;
pub use import::{ImportOptions, ImportSummary, Importer};
pub use model::{Journey, JourneyBundle, NodeInstance};
pub use prune::{OrphanAuditor, OrphanReport, PruneResult};
pub use remap::{RemapTable, Remapper};
pub use sequence::{sequence, SequencePlan};
pub use store::{ArtifactStore, MemoryStore};
pub use version::PlatformVersion;
