//! Hot reload: swap component type definitions while their instances
//! stay alive.
//!
//! A reload cycle, run on the main thread between frames:
//!
//! 1. **Snapshot** — every live component serializes to one text buffer,
//!    tagged with its type name, slot, and owning entity, each entry closed
//!    with the same delimiter the scene tokenizer understands.
//! 2. **Purge** — types the outgoing module provided but the incoming one
//!    does not are removed outright: their `free` hooks still point into
//!    the old module, so this is the last moment they may run.
//! 3. **Register** — the incoming descriptors merge into the registry by
//!    name; uids are preserved.
//! 4. **Migrate** — every module-owned storage gets fresh value memory at
//!    the (possibly changed) layout. Slot indices survive; raw pointers do
//!    not.
//! 5. **Restore** — the snapshot re-parses; each surviving instance is
//!    placement-constructed and refilled through the new `deserialize`.
//!
//! A module that fails to load or validate leaves registry and scene
//! exactly as they were.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::component::Uid;
use crate::module::{ComponentModule, DynamicModule};
use crate::registry::ComponentRegistry;
use crate::scene::Scene;
use crate::serialize::{SceneError, TextReader, TextWriter, Token};

/// Errors from a reload attempt.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to load component module: {0}")]
    ModuleLoad(#[from] libloading::Error),

    #[error("module ABI version {found} does not match host version {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("module is missing expected export '{0}'")]
    MissingExport(String),

    #[error("export '{export}' returned a descriptor named '{name}'")]
    DescriptorMismatch { export: String, name: String },

    #[error("failed to restore component state after reload: {0}")]
    Restore(#[from] SceneError),
}

/// Counters reported after a successful reload cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReloadStats {
    /// Types the incoming module registered.
    pub types_registered: usize,
    /// Types whose size or alignment changed.
    pub types_migrated: usize,
    /// Instances refilled from the snapshot.
    pub instances_restored: usize,
    /// Instances of dropped types that were purged.
    pub instances_purged: usize,
}

/// Hand-off slot between the background build thread and the main thread.
///
/// The build glue compiles the module off-thread and [`submit`]s the
/// finished path; the main loop picks it up with
/// [`ReloadManager::poll`]. Submitting again before the poll replaces the
/// previous path; only the newest build matters.
///
/// [`submit`]: ReloadChannel::submit
#[derive(Clone, Default)]
pub struct ReloadChannel {
    slot: Arc<Mutex<Option<PathBuf>>>,
}

impl ReloadChannel {
    pub fn submit(&self, path: impl Into<PathBuf>) {
        *self.slot.lock() = Some(path.into());
    }

    fn take(&self) -> Option<PathBuf> {
        self.slot.lock().take()
    }
}

/// Owns the current dynamic module and runs reload cycles.
///
/// The manager keeps the outgoing module alive until every one of its
/// registered vtables has been replaced or purged; function pointers into
/// an unloaded library must never remain reachable.
pub struct ReloadManager {
    module: Option<Box<dyn ComponentModule>>,
    /// Uids registered by the current module.
    module_uids: Vec<Uid>,
    channel: ReloadChannel,
}

impl ReloadManager {
    pub fn new() -> Self {
        Self {
            module: None,
            module_uids: Vec::new(),
            channel: ReloadChannel::default(),
        }
    }

    /// Handle for the build thread to deposit finished module paths into.
    pub fn channel(&self) -> ReloadChannel {
        self.channel.clone()
    }

    /// Applies a pending module submission, if one arrived. Call once per
    /// frame from the main thread, outside update/render.
    pub fn poll(
        &mut self,
        registry: &mut ComponentRegistry,
        scene: &mut Scene,
    ) -> Option<Result<ReloadStats, ReloadError>> {
        let path = self.channel.take()?;
        Some(self.reload_from_path(registry, scene, &path))
    }

    /// Loads a compiled module and runs the full reload cycle.
    ///
    /// # Safety-relevant contract
    ///
    /// The caller guarantees quiescence: no update or render may be in
    /// flight, and any raw pointer into component storage obtained before
    /// this call is invalid afterwards.
    pub fn reload_from_path(
        &mut self,
        registry: &mut ComponentRegistry,
        scene: &mut Scene,
        path: &Path,
    ) -> Result<ReloadStats, ReloadError> {
        // Load and validate before touching any state, so failures leave
        // everything as it was.
        let module = unsafe { DynamicModule::load(path) }?;
        info!("reloading component module {:?}", path);
        self.apply_module(registry, scene, Box::new(module))
    }

    /// Runs the reload cycle with an already-constructed module. Public so
    /// in-process modules (and tests) can drive the same protocol.
    pub fn apply_module(
        &mut self,
        registry: &mut ComponentRegistry,
        scene: &mut Scene,
        module: Box<dyn ComponentModule>,
    ) -> Result<ReloadStats, ReloadError> {
        let mut stats = ReloadStats::default();

        // 1. Snapshot every live instance through the old vtables.
        let snapshot = snapshot_scene(scene, registry);

        // 2. Purge types the new module no longer provides, while the old
        //    module (and its free hooks) is still loaded.
        let new_names: HashSet<&str> =
            module.descriptors().iter().map(|d| d.name.as_str()).collect();
        for uid in std::mem::take(&mut self.module_uids) {
            let dropped = registry
                .get(uid)
                .is_some_and(|info| !new_names.contains(info.name()));
            if dropped {
                let info = registry.detach(uid).unwrap();
                let purged = scene.purge_component_type(&info);
                stats.instances_purged += purged;
                warn!(
                    "component '{}' no longer provided by module; purged {} instances",
                    info.name(),
                    purged
                );
            }
        }

        // 3 + 4. Register the incoming descriptors and give every
        //    module-owned storage fresh value memory at the new layout.
        let mut rebuilt = HashSet::new();
        let mut module_uids = Vec::with_capacity(module.descriptors().len());
        for desc in module.descriptors() {
            let outcome = registry.register(desc.clone());
            module_uids.push(outcome.uid);
            stats.types_registered += 1;
            if outcome.layout_changed {
                stats.types_migrated += 1;
            }
            if scene.storage(outcome.uid).is_some() {
                let info = registry.get(outcome.uid).unwrap();
                let (size, align) = (info.size(), info.align());
                scene.storage_mut(outcome.uid).unwrap().migrate(size, align);
                rebuilt.insert(outcome.uid);
            }
        }

        // Adopt the new module before running any of its code paths; this
        // is also the point the outgoing module may finally unload, now
        // that none of its vtables remain in the registry.
        self.module = Some(module);
        self.module_uids = module_uids;

        // 5. Refill every surviving instance from the snapshot.
        stats.instances_restored = restore_scene(scene, registry, &snapshot, &rebuilt)?;

        info!(
            "reload complete: {} types, {} migrated, {} instances restored, {} purged",
            stats.types_registered,
            stats.types_migrated,
            stats.instances_restored,
            stats.instances_purged
        );
        Ok(stats)
    }
}

impl Default for ReloadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes every live component into the tagged snapshot text:
/// `Name slot entity { fields }` per instance.
fn snapshot_scene(scene: &Scene, registry: &ComponentRegistry) -> String {
    let mut w = TextWriter::new();
    for (entity_index, entity) in scene.entities() {
        for comp in entity.components() {
            let info = registry
                .get(comp.uid)
                .expect("live component with unregistered uid");
            w.open(&format!("{} {} {}", info.name(), comp.slot, entity_index));
            let ptr = scene.component_ptr(*comp);
            // SAFETY: live slot of the vtable's type.
            unsafe { (info.vtable().serialize_text)(ptr.as_ptr(), &mut w) };
            w.close();
        }
    }
    w.into_string()
}

/// Re-parses the snapshot, reconstructing every instance whose storage was
/// rebuilt. Entries for detached or untouched types are skipped.
fn restore_scene(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    snapshot: &str,
    rebuilt: &HashSet<Uid>,
) -> Result<usize, SceneError> {
    let mut r = TextReader::new(snapshot);
    let mut restored = 0;
    while let Some(tok) = r.next_token()? {
        let name = match tok {
            Token::Ident(name) => name,
            other => {
                return Err(SceneError::parse(
                    r.line(),
                    format!("expected a component tag, found {}", other.describe()),
                ))
            }
        };
        let slot = r.u32()?;
        let _entity = r.u32()?;
        r.expect_lbrace()?;

        match registry.uid_of(name) {
            Some(uid) if rebuilt.contains(&uid) => {
                let info = registry.get(uid).unwrap();
                let ptr = scene
                    .storage(uid)
                    .expect("rebuilt storage vanished during restore")
                    .get(slot);
                // SAFETY: migrate preserved this slot's occupancy; the
                // memory is fresh and sized for the new layout.
                unsafe {
                    (info.vtable().construct)(ptr.as_ptr());
                    (info.vtable().deserialize_text)(ptr.as_ptr(), &mut r)?;
                }
                restored += 1;
            }
            _ => r.skip_body()?,
        }
    }
    Ok(restored)
}
