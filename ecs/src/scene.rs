//! One loaded world: an entity table plus per-type component storage.
//!
//! The scene owns instance *data*; type metadata lives in the
//! [`ComponentRegistry`] and is passed into every operation that needs to
//! dispatch through a vtable. Keeping the two apart means several scenes
//! can share one registry, which tests lean on heavily.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::ptr::NonNull;

use log::debug;

use crate::component::{Component, ComponentIndex, ComponentInfo, Uid};
use crate::entity::{Entity, EntityTable};
use crate::registry::ComponentRegistry;
use crate::slots::RawStorage;

/// A world of entities and their component instances.
pub struct Scene {
    entities: EntityTable,
    storages: HashMap<Uid, RawStorage>,
    /// Components whose `start` hook is queued for the next tick.
    pending_start: Vec<ComponentIndex>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            entities: EntityTable::new(),
            storages: HashMap::new(),
            pending_start: Vec::new(),
        }
    }

    // -- entities -----------------------------------------------------------

    /// Creates an entity, auto-naming it when `name` is `None`.
    pub fn create_entity(&mut self, name: Option<&str>) -> u32 {
        self.entities.allocate(name)
    }

    pub fn entity(&self, index: u32) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn entity_mut(&mut self, index: u32) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    /// Live entities as `(index, &entity)` in index order.
    pub fn entities(&self) -> impl Iterator<Item = (u32, &Entity)> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> u32 {
        self.entities.count()
    }

    /// Destroys an entity: every component's `free` hook runs (when the
    /// type has one), its slots are released, then the entity itself.
    /// Returns false if no entity lives at `index`.
    pub fn destroy_entity(&mut self, registry: &ComponentRegistry, index: u32) -> bool {
        let Some(entity) = self.entities.deallocate(index) else {
            return false;
        };
        for comp in entity.components() {
            self.release_slot(registry, *comp);
        }
        self.pending_start.retain(|c| c.entity != index);
        true
    }

    fn release_slot(&mut self, registry: &ComponentRegistry, comp: ComponentIndex) {
        if let Some(storage) = self.storages.get_mut(&comp.uid) {
            if let Some(free) = registry.get(comp.uid).and_then(|i| i.vtable().free) {
                let ptr = storage.get(comp.slot);
                // SAFETY: live slot of the vtable's type; removed right after.
                unsafe { free(ptr.as_ptr()) };
            }
            storage.remove_at(comp.slot);
        }
    }

    // -- components ---------------------------------------------------------

    /// Adds a component of the given registered type to an entity:
    /// allocates a slot, placement-constructs the default value, appends
    /// the index to the entity's list, and runs the `init` hook.
    ///
    /// # Panics
    ///
    /// Panics on an unregistered uid, a dead entity index, or an entity
    /// already at the component cap; all are programmer-error faults.
    pub fn add_component(
        &mut self,
        registry: &ComponentRegistry,
        entity: u32,
        uid: Uid,
    ) -> ComponentIndex {
        let info = registry
            .get(uid)
            .unwrap_or_else(|| panic!("add_component: unregistered component type {uid:?}"));
        let storage = self
            .storages
            .entry(uid)
            .or_insert_with(|| RawStorage::new(info.size(), info.align()));
        let (ptr, slot) = storage.add();
        // SAFETY: freshly allocated slot sized for this type.
        unsafe { (info.vtable().construct)(ptr.as_ptr()) };

        let index = ComponentIndex { uid, slot, entity };
        self.entities
            .get_mut(entity)
            .unwrap_or_else(|| panic!("add_component: no entity at index {entity}"))
            .push_component(index);

        if let Some(init) = info.vtable().init {
            // SAFETY: slot was just constructed.
            unsafe { init(ptr.as_ptr()) };
        }
        if info.vtable().start.is_some() {
            self.pending_start.push(index);
        }
        index
    }

    /// Typed [`add_component`](Self::add_component).
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    pub fn add_component_of<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        entity: u32,
    ) -> ComponentIndex {
        let uid = registry
            .uid_of(T::NAME)
            .unwrap_or_else(|| panic!("add_component_of: '{}' is not registered", T::NAME));
        self.add_component(registry, entity, uid)
    }

    /// Removes one component instance from its entity, running the `free`
    /// hook when the type has one. Returns false if the entity is dead or
    /// the index is not on it.
    pub fn remove_component(
        &mut self,
        registry: &ComponentRegistry,
        index: ComponentIndex,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(index.entity) else {
            return false;
        };
        if !entity.remove_component_entry(index) {
            return false;
        }
        self.release_slot(registry, index);
        self.pending_start.retain(|c| *c != index);
        true
    }

    /// The `nth` component of type `T` on an entity, if any.
    pub fn get_component<'a, T: Component>(
        &'a self,
        registry: &ComponentRegistry,
        entity: u32,
        nth: usize,
    ) -> Option<&'a T> {
        let index = self.find_component::<T>(registry, entity, nth)?;
        let ptr = self.component_ptr(index);
        // SAFETY: the index came from the entity's list, so the slot is a
        // live T; &self prevents concurrent mutation.
        Some(unsafe { &*ptr.as_ptr().cast::<T>() })
    }

    /// Mutable variant of [`get_component`](Self::get_component).
    pub fn get_component_mut<'a, T: Component>(
        &'a mut self,
        registry: &ComponentRegistry,
        entity: u32,
        nth: usize,
    ) -> Option<&'a mut T> {
        let index = self.find_component::<T>(registry, entity, nth)?;
        let ptr = self.component_ptr(index);
        // SAFETY: live T slot; &mut self gives exclusive access.
        Some(unsafe { &mut *ptr.as_ptr().cast::<T>() })
    }

    fn find_component<T: Component>(
        &self,
        registry: &ComponentRegistry,
        entity: u32,
        nth: usize,
    ) -> Option<ComponentIndex> {
        let uid = registry.uid_of(T::NAME)?;
        let entity = self.entities.get(entity)?;
        entity
            .components()
            .iter()
            .filter(|c| c.uid == uid)
            .nth(nth)
            .copied()
    }

    /// Visits every live instance of `T` mutably. Return
    /// [`ControlFlow::Break`] to stop early.
    pub fn for_each_component<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        mut f: impl FnMut(&mut T) -> ControlFlow<()>,
    ) {
        let Some(uid) = registry.uid_of(T::NAME) else {
            return;
        };
        if let Some(storage) = self.storages.get(&uid) {
            storage.for_each(|ptr, _| {
                // SAFETY: live T slot; &mut self gives exclusive access and
                // the closure gets one slot at a time.
                f(unsafe { &mut *ptr.as_ptr().cast::<T>() })
            });
        }
    }

    /// Type-erased iteration over one type's live slots, as
    /// `(slot address, slot index)`.
    pub fn for_each_component_raw(
        &self,
        uid: Uid,
        f: impl FnMut(NonNull<u8>, u32) -> ControlFlow<()>,
    ) {
        if let Some(storage) = self.storages.get(&uid) {
            storage.for_each(f);
        }
    }

    /// Number of live instances of one type.
    pub fn component_count(&self, uid: Uid) -> u32 {
        self.storages.get(&uid).map_or(0, |s| s.len())
    }

    /// Address of a live component instance.
    ///
    /// # Panics
    ///
    /// Panics if the type has no storage or the slot is not live.
    pub(crate) fn component_ptr(&self, index: ComponentIndex) -> NonNull<u8> {
        self.storages
            .get(&index.uid)
            .unwrap_or_else(|| panic!("no storage for component type {:?}", index.uid))
            .get(index.slot)
    }

    pub(crate) fn storage(&self, uid: Uid) -> Option<&RawStorage> {
        self.storages.get(&uid)
    }

    pub(crate) fn storage_mut(&mut self, uid: Uid) -> Option<&mut RawStorage> {
        self.storages.get_mut(&uid)
    }

    /// Removes every instance of one type: `free` hooks (using the caller's
    /// still-valid info), storage teardown, entity list cleanup, queued
    /// starts. Returns how many instances went. Reload's purge pass.
    pub(crate) fn purge_component_type(&mut self, info: &ComponentInfo) -> usize {
        let uid = info.uid();
        let mut purged = 0;
        if let Some(storage) = self.storages.remove(&uid) {
            purged = storage.len() as usize;
            if let Some(free) = info.vtable().free {
                storage.for_each(|ptr, _| {
                    // SAFETY: every visited slot is a live instance of the
                    // purged type; the storage is dropped right after.
                    unsafe { free(ptr.as_ptr()) };
                    ControlFlow::Continue(())
                });
            }
        }
        for (_, entity) in self.entities.iter_mut() {
            entity.purge_components_of(uid);
        }
        self.pending_start.retain(|c| c.uid != uid);
        purged
    }

    // -- frame --------------------------------------------------------------

    /// Runs one frame: queued `start` hooks first, then every type's
    /// `update` hook over all of its live instances, in registration order.
    pub fn tick(&mut self, registry: &ComponentRegistry, dt: f32) {
        let pending = std::mem::take(&mut self.pending_start);
        for index in pending {
            // Removal paths strip queued entries, so the slot is live.
            if let Some(start) = registry.get(index.uid).and_then(|i| i.vtable().start) {
                let ptr = self.component_ptr(index);
                // SAFETY: live slot of the vtable's type.
                unsafe { start(ptr.as_ptr()) };
            }
        }

        for info in registry.iter() {
            let Some(update) = info.vtable().update else {
                continue;
            };
            if let Some(storage) = self.storages.get(&info.uid()) {
                storage.for_each(|ptr, _| {
                    // SAFETY: live slot of the vtable's type.
                    unsafe { update(ptr.as_ptr(), dt) };
                    ControlFlow::Continue(())
                });
            }
        }
    }

    /// Destroys every entity and drops all storages.
    pub fn clear(&mut self, registry: &ComponentRegistry) {
        let indices: Vec<u32> = self.entities.iter().map(|(i, _)| i).collect();
        debug!("clearing scene: {} entities", indices.len());
        for index in indices {
            self.destroy_entity(registry, index);
        }
        self.storages.clear();
        self.pending_start.clear();
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
