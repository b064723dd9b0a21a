// ============================================================================
// Object Lifecycle & Change Publishing
// ============================================================================
//
// Tracks what happened to entities during a unit of work (created, updated,
// deleted), captures before/after values per property and hands the
// publishable subset to audit and change-log subscribers after commit.
//
// ============================================================================

pub mod change_record;
pub mod pre_post;
pub mod publisher;
pub mod publishing;
pub mod tracker;

pub use change_record::PropertyChangeRecord;
pub use pre_post::{DELETED_MARKER, NEW_MARKER, PrePostValue, PropertyValue};
pub use publisher::ObjectLifecyclePublisher;
pub use publishing::{
    EnlistedPropertyChanges, EntityChanges, EntityChangesSubscriber, EntityPropertyChange,
    EntityPropertyChangeSubscriber, HasEnlistedEntityPropertyChanges, InMemoryAuditTrail,
};
pub use tracker::{EntityChangeKind, EntityChangeTracker};
