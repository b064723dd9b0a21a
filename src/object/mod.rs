// ============================================================================
// Object Model
// ============================================================================
//
// Identity, versioning and the adapter arena that the lifecycle tracker and
// the persistence commands operate on. A unit of work owns one
// AdapterManager; specifications are shared across units of work.
//
// ============================================================================

pub mod adapter;
pub mod manager;
pub mod oid;
pub mod pojo;
pub mod spec;
pub mod version;

pub use adapter::{ObjectAdapter, ResolveState};
pub use manager::AdapterManager;
pub use oid::{AGGREGATE_SEPARATOR, Bookmark, Oid, REFERENCE_DELIMITER, TYPE_SEPARATOR};
pub use pojo::{FieldValue, Pojo};
pub use spec::{
    Association, AssociationKind, LifecycleCallback, LifecycleEvent, ObjectSpecification,
    SpecificationBuilder, SpecificationRegistry,
};
pub use version::{Version, VersionScheme};
