//! The runtime context: one registry, one scene, one reload manager.
//!
//! There is no process-wide state anywhere in this crate; everything an
//! operation needs travels through a [`Context`] (or the individual pieces
//! it bundles), so hosts and tests can run several worlds side by side.

use std::ops::ControlFlow;
use std::path::Path;

use log::warn;

use crate::component::Uid;
use crate::module::ComponentModule;
use crate::registry::ComponentRegistry;
use crate::reload::{ReloadError, ReloadManager, ReloadStats};
use crate::scene::Scene;
use crate::serialize::{read_scene_text, write_scene_text, SceneError};

/// Bundles the three long-lived pieces of the component runtime.
pub struct Context {
    pub registry: ComponentRegistry,
    pub scene: Scene,
    pub reload: ReloadManager,
}

impl Context {
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            scene: Scene::new(),
            reload: ReloadManager::new(),
        }
    }

    /// Registers every descriptor of an in-process module. The startup
    /// path; hot reloads go through [`ReloadManager`] instead.
    ///
    /// If a re-registration changes a layout while instances exist, those
    /// instances are reset to default values; only the reload protocol
    /// carries field values across a layout change.
    pub fn register_module(&mut self, module: &dyn ComponentModule) -> Vec<Uid> {
        let mut uids = Vec::with_capacity(module.descriptors().len());
        for desc in module.descriptors() {
            let outcome = self.registry.register(desc.clone());
            uids.push(outcome.uid);
            if outcome.layout_changed {
                if let Some(storage) = self.scene.storage_mut(outcome.uid) {
                    let info = self.registry.get(outcome.uid).unwrap();
                    warn!(
                        "static re-registration of '{}' changed its layout; resetting {} instances",
                        info.name(),
                        storage.len()
                    );
                    let (size, align) = (info.size(), info.align());
                    let construct = info.vtable().construct;
                    storage.migrate(size, align);
                    storage.for_each(|ptr, _| {
                        // SAFETY: fresh slot memory sized for the new layout.
                        unsafe { construct(ptr.as_ptr()) };
                        ControlFlow::Continue(())
                    });
                }
            }
        }
        uids
    }

    /// Runs one frame of component lifecycle hooks.
    pub fn tick(&mut self, dt: f32) {
        self.scene.tick(&self.registry, dt);
    }

    /// Applies a module submitted through the reload channel, if any.
    pub fn poll_reload(&mut self) -> Option<Result<ReloadStats, ReloadError>> {
        self.reload.poll(&mut self.registry, &mut self.scene)
    }

    /// Writes the scene as text to a `.scene` file.
    pub fn save_scene_file(&self, path: &Path) -> Result<(), SceneError> {
        std::fs::write(path, write_scene_text(&self.scene, &self.registry))?;
        Ok(())
    }

    /// Loads a `.scene` file, appending its entities to the scene.
    /// All-or-nothing; on error the scene is left as it was.
    pub fn load_scene_file(&mut self, path: &Path) -> Result<(), SceneError> {
        let src = std::fs::read_to_string(path)?;
        read_scene_text(&mut self.scene, &self.registry, &src)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
