//! Entity registry and snapshot codec.
//!
//! The registry is the process-wide allow-list of synchronizable entity
//! types. Each entry pairs a [`TypeDescriptor`] (primary-key kind, field
//! kinds, uniqueness) with an [`EntityStore`] capability that knows how to
//! snapshot, materialize, and relate instances of that type. All
//! polymorphism over entity kinds is explicit dispatch through this map;
//! there is no attribute walking at runtime.

pub mod descriptor;
pub mod registry;
pub mod store;
pub mod value;

pub use descriptor::{FieldDescriptor, FieldKind, PkKind, TypeDescriptor};
pub use registry::{EntityRegistry, RegistryEntry};
pub use store::{AppliedWrite, EntityStore, FileRendering, Payload};
pub use value::{FieldValue, FilePayload};
