//! # Lantern ECS
//!
//! Type-erased component runtime with hot-reloadable component modules.
//!
//! ## Core Types
//!
//! - [`Scene`] — one loaded world: entity table plus per-type storage
//! - [`ComponentRegistry`] — uid/name-keyed type registry with in-place
//!   merge on re-registration
//! - [`Component`] / [`ComponentDesc`] — the typed trait and the erased
//!   descriptor it lowers to
//! - [`Context`] — registry + scene + reload manager, passed explicitly
//!   everywhere (no global state)
//!
//! ## Persistence
//!
//! - [`serialize`] — text `.scene` codec and the shipped binary codec
//! - [`bundle`] — the `data.bin` asset/scene bundle, memory-mapped on load
//!
//! ## Hot Reload
//!
//! - [`StaticModule`] / [`DynamicModule`] — descriptor sources; dynamic
//!   modules are discovered through a versioned export convention
//! - [`ReloadManager`] — snapshot / swap / migrate / restore cycle that
//!   keeps live instances' field values across a recompile
//!
//! See `DESIGN.md` at the workspace root for architecture decisions.

pub mod bundle;
pub mod component;
mod context;
pub mod entity;
pub mod inspect;
pub mod module;
pub mod registry;
mod reload;
pub mod scene;
pub mod serialize;
mod slots;

pub use component::{Component, ComponentDesc, ComponentIndex, ComponentInfo, ComponentVtable, Uid};
pub use context::Context;
pub use entity::{Entity, EntityTable, MAX_COMPONENTS};
pub use module::{
    ComponentModule, DynamicModule, StaticModule, COMPONENT_EXPORT_PREFIX, MODULE_ABI_VERSION,
    MODULE_MANIFEST_EXPORT, MODULE_VERSION_EXPORT,
};
pub use registry::{ComponentRegistry, RegisterOutcome};
pub use reload::{ReloadChannel, ReloadError, ReloadManager, ReloadStats};
pub use scene::Scene;
pub use slots::{RawStorage, SLOTS_PER_BLOCK};

pub use lantern_core::math;
