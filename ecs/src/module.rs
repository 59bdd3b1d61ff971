//! Component module loading.
//!
//! A component module is anything that can hand the registry a list of
//! [`ComponentDesc`]s. Two sources exist:
//!
//! - [`StaticModule`] — descriptors built in-process from typed components.
//!   This is the startup registration path.
//! - [`DynamicModule`] — a compiled dynamic library discovered through a
//!   versioned export convention. This is the hot-reload path.
//!
//! Both feed the exact same registration machinery, so a type behaves
//! identically whether it was compiled into the host or loaded afterwards.
//!
//! # Export convention
//!
//! A dynamic module exports, with `#[no_mangle]`:
//!
//! ```ignore
//! pub fn lantern_module_version() -> u32            // MODULE_ABI_VERSION
//! pub fn lantern_module_manifest() -> &'static [&'static str]
//! pub fn lantern_component_Spin() -> ComponentDesc  // one per manifest name
//! ```
//!
//! The version export is checked before anything else is resolved; the
//! manifest then names each component so the host can resolve
//! `lantern_component_<name>` without a linked symbol table. Modules must
//! be built with the same toolchain as the host; descriptors cross the
//! boundary as plain Rust values.

use std::path::{Path, PathBuf};

use log::debug;

use crate::component::{Component, ComponentDesc};
use crate::reload::ReloadError;

/// Logical ABI version of the module boundary. Bump when [`ComponentDesc`]
/// or any vtable signature changes shape.
pub const MODULE_ABI_VERSION: u32 = 1;

/// Name of the version export.
pub const MODULE_VERSION_EXPORT: &str = "lantern_module_version";
/// Name of the manifest export.
pub const MODULE_MANIFEST_EXPORT: &str = "lantern_module_manifest";
/// Prefix of per-component descriptor exports.
pub const COMPONENT_EXPORT_PREFIX: &str = "lantern_component_";

/// A source of component descriptors.
pub trait ComponentModule {
    fn descriptors(&self) -> &[ComponentDesc];
}

/// In-process descriptor list. The startup registration path, and what
/// tests use to drive the reload protocol without compiling libraries.
#[derive(Default)]
pub struct StaticModule {
    descriptors: Vec<ComponentDesc>,
}

impl StaticModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a typed component, builder style.
    pub fn with<T: Component>(mut self) -> Self {
        self.descriptors.push(ComponentDesc::of::<T>());
        self
    }

    /// Adds a pre-built descriptor.
    pub fn push(&mut self, desc: ComponentDesc) {
        self.descriptors.push(desc);
    }
}

impl ComponentModule for StaticModule {
    fn descriptors(&self) -> &[ComponentDesc] {
        &self.descriptors
    }
}

/// A loaded dynamic component module.
///
/// Owns the underlying [`libloading::Library`]; the descriptors' function
/// pointers point into it, so the module must stay alive for as long as
/// any registry still holds one of its vtables. The reload manager
/// enforces this by keeping the current module until the next one has
/// fully replaced its registrations.
pub struct DynamicModule {
    descriptors: Vec<ComponentDesc>,
    path: PathBuf,
    // Field order: dropped after the descriptors above.
    _lib: libloading::Library,
}

impl DynamicModule {
    /// Loads a module and collects its component descriptors.
    ///
    /// Fails without side effects if the library cannot be loaded, the ABI
    /// version does not match, or any expected export is missing.
    ///
    /// # Safety
    ///
    /// Loading a library runs its initializers, and the module must have
    /// been produced by the expected build pipeline with the same
    /// toolchain as the host; the version export cannot check that.
    pub unsafe fn load(path: &Path) -> Result<Self, ReloadError> {
        let lib = unsafe { libloading::Library::new(path) }?;

        let version: libloading::Symbol<'_, unsafe fn() -> u32> =
            unsafe { lib.get(MODULE_VERSION_EXPORT.as_bytes()) }
                .map_err(|_| ReloadError::MissingExport(MODULE_VERSION_EXPORT.to_string()))?;
        let found = unsafe { version() };
        if found != MODULE_ABI_VERSION {
            return Err(ReloadError::VersionMismatch {
                expected: MODULE_ABI_VERSION,
                found,
            });
        }

        let manifest: libloading::Symbol<'_, unsafe fn() -> &'static [&'static str]> =
            unsafe { lib.get(MODULE_MANIFEST_EXPORT.as_bytes()) }
                .map_err(|_| ReloadError::MissingExport(MODULE_MANIFEST_EXPORT.to_string()))?;
        let names = unsafe { manifest() };

        let mut descriptors = Vec::with_capacity(names.len());
        for name in names {
            let export = format!("{COMPONENT_EXPORT_PREFIX}{name}");
            let ctor: libloading::Symbol<'_, unsafe fn() -> ComponentDesc> =
                unsafe { lib.get(export.as_bytes()) }
                    .map_err(|_| ReloadError::MissingExport(export.clone()))?;
            let desc = unsafe { ctor() };
            if desc.name != *name {
                return Err(ReloadError::DescriptorMismatch {
                    export,
                    name: desc.name,
                });
            }
            descriptors.push(desc);
        }

        debug!(
            "loaded component module {:?}: {} types",
            path,
            descriptors.len()
        );
        Ok(Self {
            descriptors,
            path: path.to_path_buf(),
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ComponentModule for DynamicModule {
    fn descriptors(&self) -> &[ComponentDesc] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{BinaryReader, BinaryWriter, SceneError, TextReader, TextWriter};

    #[derive(Default)]
    struct Marker;

    impl Component for Marker {
        const NAME: &'static str = "Marker";

        fn serialize_text(&self, _w: &mut TextWriter) {}
        fn deserialize_text(&mut self, r: &mut TextReader<'_>) -> Result<(), SceneError> {
            while r.next_field()?.is_some() {
                r.skip_value()?;
            }
            Ok(())
        }
        fn serialize_binary(&self, _w: &mut BinaryWriter) {}
        fn deserialize_binary(&mut self, _r: &mut BinaryReader<'_>) -> Result<(), SceneError> {
            Ok(())
        }
    }

    #[test]
    fn static_module_collects_descriptors() {
        let module = StaticModule::new().with::<Marker>();
        assert_eq!(module.descriptors().len(), 1);
        assert_eq!(module.descriptors()[0].name, "Marker");
    }

    #[test]
    fn loading_missing_library_fails_cleanly() {
        let err = unsafe { DynamicModule::load(Path::new("/nonexistent/module.so")) };
        assert!(matches!(err, Err(ReloadError::ModuleLoad(_))));
    }
}
