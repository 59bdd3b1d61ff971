//! Component type identity, descriptors, and the type-erased vtable.
//!
//! Components have no common base behavior; dispatch goes through a struct
//! of bare function pointers so a type's code can live in an independently
//! compiled, hot-swappable module. The typed [`Component`] trait plus
//! [`ComponentDesc::of`] is the in-process way to produce such a
//! descriptor: the same registration path the dynamic module loader
//! feeds, so built-in and hot-reloaded types are indistinguishable to the
//! rest of the runtime.

use std::fmt;

use crate::serialize::{BinaryReader, BinaryWriter, SceneError, TextReader, TextWriter};

/// Stable 64-bit identifier for a component type.
///
/// Bound to a type name at first registration and never reassigned; a
/// recompiled type with the same name keeps its uid, which is what keeps
/// entity component lists valid across a hot reload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub(crate) u64);

impl Uid {
    /// Raw numeric value, for logs and diagnostics.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.0)
    }
}

/// Identifies one live component instance.
///
/// `entity` is a back-reference to the owning entity's index, not an
/// ownership link; neither side holds a pointer into the other.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ComponentIndex {
    pub uid: Uid,
    /// Global slot index within the type's storage.
    pub slot: u32,
    /// Index of the owning entity.
    pub entity: u32,
}

// Type-erased hook signatures. All pointers refer to a live, properly
// aligned slot of the type the vtable was built for.
pub type ConstructFn = unsafe fn(*mut u8);
pub type LifecycleFn = unsafe fn(*mut u8);
pub type UpdateFn = unsafe fn(*mut u8, f32);
pub type SerializeTextFn = unsafe fn(*const u8, &mut TextWriter);
pub type DeserializeTextFn = unsafe fn(*mut u8, &mut TextReader<'_>) -> Result<(), SceneError>;
pub type SerializeBinaryFn = unsafe fn(*const u8, &mut BinaryWriter);
pub type DeserializeBinaryFn = unsafe fn(*mut u8, &mut BinaryReader<'_>) -> Result<(), SceneError>;
pub type DrawPropertiesFn = unsafe fn(*mut u8, &mut egui::Ui);

/// Per-type operation table.
///
/// `construct` must leave the slot holding a valid default value.
/// `free` is absent for types with nothing to release.
#[derive(Clone, Copy)]
pub struct ComponentVtable {
    pub construct: ConstructFn,
    pub init: Option<LifecycleFn>,
    pub start: Option<LifecycleFn>,
    pub update: Option<UpdateFn>,
    pub free: Option<LifecycleFn>,
    pub serialize_text: SerializeTextFn,
    pub deserialize_text: DeserializeTextFn,
    pub serialize_binary: SerializeBinaryFn,
    pub deserialize_binary: DeserializeBinaryFn,
    pub draw_properties: DrawPropertiesFn,
}

/// The descriptor a module hands the registry for one component type.
#[derive(Clone)]
pub struct ComponentDesc {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub vtable: ComponentVtable,
}

impl ComponentDesc {
    /// Builds a descriptor for a typed component, erasing it through
    /// monomorphized shims.
    pub fn of<T: Component>() -> Self {
        Self {
            name: T::NAME.to_string(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            vtable: ComponentVtable {
                construct: construct_shim::<T>,
                init: T::HAS_INIT.then_some(init_shim::<T> as LifecycleFn),
                start: T::HAS_START.then_some(start_shim::<T> as LifecycleFn),
                update: T::HAS_UPDATE.then_some(update_shim::<T> as UpdateFn),
                free: std::mem::needs_drop::<T>().then_some(free_shim::<T> as LifecycleFn),
                serialize_text: serialize_text_shim::<T>,
                deserialize_text: deserialize_text_shim::<T>,
                serialize_binary: serialize_binary_shim::<T>,
                deserialize_binary: deserialize_binary_shim::<T>,
                draw_properties: draw_properties_shim::<T>,
            },
        }
    }
}

/// Registry-owned record for one component type.
///
/// The uid and name are fixed for the registry's lifetime; size, alignment
/// and the vtable are swapped in place when the type is re-registered by a
/// reloaded module.
pub struct ComponentInfo {
    pub(crate) uid: Uid,
    pub(crate) name: String,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) vtable: ComponentVtable,
}

impl ComponentInfo {
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn vtable(&self) -> &ComponentVtable {
        &self.vtable
    }
}

/// Trait for components defined in Rust.
///
/// `Default` supplies the placement-construct value. The lifecycle hooks
/// default to no-ops; opt in by overriding the hook *and* flipping its
/// `HAS_*` flag so the descriptor exposes the function pointer.
///
/// ```ignore
/// #[derive(Default)]
/// struct Spin { speed: f32, angle: f32 }
///
/// impl Component for Spin {
///     const NAME: &'static str = "Spin";
///     const HAS_UPDATE: bool = true;
///
///     fn serialize_text(&self, w: &mut TextWriter) {
///         w.field_f32("speed", self.speed);
///         w.field_f32("angle", self.angle);
///     }
///
///     fn deserialize_text(&mut self, r: &mut TextReader<'_>) -> Result<(), SceneError> {
///         while let Some(field) = r.next_field()? {
///             match field {
///                 "speed" => self.speed = r.f32()?,
///                 "angle" => self.angle = r.f32()?,
///                 _ => r.skip_value()?,
///             }
///         }
///         Ok(())
///     }
///     // ... binary hooks, update ...
/// }
/// ```
pub trait Component: Default + 'static {
    /// The type name as registered, the identity that survives reloads.
    const NAME: &'static str;

    const HAS_INIT: bool = false;
    const HAS_START: bool = false;
    const HAS_UPDATE: bool = false;

    fn serialize_text(&self, w: &mut TextWriter);
    fn deserialize_text(&mut self, r: &mut TextReader<'_>) -> Result<(), SceneError>;
    fn serialize_binary(&self, w: &mut BinaryWriter);
    fn deserialize_binary(&mut self, r: &mut BinaryReader<'_>) -> Result<(), SceneError>;

    /// Called once right after the component is added to an entity.
    fn init(&mut self) {}

    /// Called on the first tick after the component is added.
    fn start(&mut self) {}

    /// Called every tick when `HAS_UPDATE` is set.
    fn update(&mut self, _dt: f32) {}

    /// Renders editor widgets for this component's fields.
    fn draw_properties(&mut self, _ui: &mut egui::Ui) {}
}

unsafe fn construct_shim<T: Component>(ptr: *mut u8) {
    // SAFETY: caller passes a properly aligned, writable slot for T.
    unsafe { ptr.cast::<T>().write(T::default()) };
}

unsafe fn init_shim<T: Component>(ptr: *mut u8) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).init() };
}

unsafe fn start_shim<T: Component>(ptr: *mut u8) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).start() };
}

unsafe fn update_shim<T: Component>(ptr: *mut u8, dt: f32) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).update(dt) };
}

unsafe fn free_shim<T: Component>(ptr: *mut u8) {
    // SAFETY: caller passes a live slot of type T that will not be read again.
    unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) };
}

unsafe fn serialize_text_shim<T: Component>(ptr: *const u8, w: &mut TextWriter) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).serialize_text(w) };
}

unsafe fn deserialize_text_shim<T: Component>(
    ptr: *mut u8,
    r: &mut TextReader<'_>,
) -> Result<(), SceneError> {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).deserialize_text(r) }
}

unsafe fn serialize_binary_shim<T: Component>(ptr: *const u8, w: &mut BinaryWriter) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).serialize_binary(w) };
}

unsafe fn deserialize_binary_shim<T: Component>(
    ptr: *mut u8,
    r: &mut BinaryReader<'_>,
) -> Result<(), SceneError> {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).deserialize_binary(r) }
}

unsafe fn draw_properties_shim<T: Component>(ptr: *mut u8, ui: &mut egui::Ui) {
    // SAFETY: caller passes a live slot of type T.
    unsafe { (*ptr.cast::<T>()).draw_properties(ui) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain {
        value: f32,
    }

    impl Component for Plain {
        const NAME: &'static str = "Plain";

        fn serialize_text(&self, w: &mut TextWriter) {
            w.field_f32("value", self.value);
        }

        fn deserialize_text(&mut self, r: &mut TextReader<'_>) -> Result<(), SceneError> {
            while let Some(field) = r.next_field()? {
                match field {
                    "value" => self.value = r.f32()?,
                    _ => r.skip_value()?,
                }
            }
            Ok(())
        }

        fn serialize_binary(&self, w: &mut BinaryWriter) {
            w.write_f32(self.value);
        }

        fn deserialize_binary(&mut self, r: &mut BinaryReader<'_>) -> Result<(), SceneError> {
            self.value = r.read_f32()?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Rich {
        label: String,
    }

    impl Component for Rich {
        const NAME: &'static str = "Rich";
        const HAS_UPDATE: bool = true;

        fn serialize_text(&self, w: &mut TextWriter) {
            w.field_str("label", &self.label);
        }

        fn deserialize_text(&mut self, r: &mut TextReader<'_>) -> Result<(), SceneError> {
            while let Some(field) = r.next_field()? {
                match field {
                    "label" => self.label = r.string()?,
                    _ => r.skip_value()?,
                }
            }
            Ok(())
        }

        fn serialize_binary(&self, w: &mut BinaryWriter) {
            w.write_str(&self.label);
        }

        fn deserialize_binary(&mut self, r: &mut BinaryReader<'_>) -> Result<(), SceneError> {
            self.label = r.read_str()?;
            Ok(())
        }
    }

    #[test]
    fn desc_layout_matches_type() {
        let desc = ComponentDesc::of::<Plain>();
        assert_eq!(desc.name, "Plain");
        assert_eq!(desc.size, std::mem::size_of::<Plain>());
        assert_eq!(desc.align, std::mem::align_of::<Plain>());
    }

    #[test]
    fn hooks_present_only_when_flagged() {
        let plain = ComponentDesc::of::<Plain>();
        assert!(plain.vtable.init.is_none());
        assert!(plain.vtable.update.is_none());
        // f32 has no drop glue
        assert!(plain.vtable.free.is_none());

        let rich = ComponentDesc::of::<Rich>();
        assert!(rich.vtable.update.is_some());
        // String needs drop
        assert!(rich.vtable.free.is_some());
    }

    #[test]
    fn construct_and_free_through_vtable() {
        let desc = ComponentDesc::of::<Rich>();
        let mut slot = std::mem::MaybeUninit::<Rich>::uninit();
        let ptr = slot.as_mut_ptr().cast::<u8>();
        unsafe {
            (desc.vtable.construct)(ptr);
            assert_eq!((*ptr.cast::<Rich>()).label, "");
            (*ptr.cast::<Rich>()).label = "hello".to_string();
            (desc.vtable.free.unwrap())(ptr);
        }
    }
}
