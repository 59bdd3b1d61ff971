//! Entities and the table that owns them.
//!
//! An entity is a transform, flags, a name, and an inline bounded list of
//! component indices. Entities are owned exclusively by their scene's
//! [`EntityTable`] and referenced everywhere else by index, never by
//! pointer, since the table's backing storage may reallocate as it grows.

use lantern_core::math::{quat_identity, Quat, Vec3};

use crate::component::{ComponentIndex, Uid};

/// Hard cap on components per entity. Entities are expected to carry few
/// components; the inline array avoids a heap allocation per entity and
/// exceeding it is a fatal capacity error.
pub const MAX_COMPONENTS: usize = 16;

const VACANT: ComponentIndex = ComponentIndex {
    uid: Uid(0),
    slot: 0,
    entity: 0,
};

/// One scene object: transform, flags, name, and its component list.
pub struct Entity {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub flags: u32,
    name: String,
    components: [ComponentIndex; MAX_COMPONENTS],
    component_count: u32,
}

impl Entity {
    /// Entity is skipped by host-side passes (rendering, gizmos).
    pub const DISABLED: u32 = 1 << 0;
    /// Entity is editor-only and excluded from shipped builds.
    pub const EDITOR: u32 = 1 << 1;

    fn new(name: String) -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: quat_identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            flags: 0,
            name,
            components: [VACANT; MAX_COMPONENTS],
            component_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_disabled(&self) -> bool {
        self.flags & Self::DISABLED != 0
    }

    /// The live component indices attached to this entity, in attach order.
    pub fn components(&self) -> &[ComponentIndex] {
        &self.components[..self.component_count as usize]
    }

    /// Appends a component index.
    ///
    /// # Panics
    ///
    /// Panics when the entity already carries [`MAX_COMPONENTS`] components.
    pub(crate) fn push_component(&mut self, index: ComponentIndex) {
        assert!(
            (self.component_count as usize) < MAX_COMPONENTS,
            "entity '{}' exceeds the {MAX_COMPONENTS} component limit",
            self.name
        );
        self.components[self.component_count as usize] = index;
        self.component_count += 1;
    }

    /// Removes a component index, preserving the order of the rest.
    /// Returns false if the index was not on this entity.
    pub(crate) fn remove_component_entry(&mut self, index: ComponentIndex) -> bool {
        let count = self.component_count as usize;
        let Some(pos) = self.components[..count].iter().position(|&c| c == index) else {
            return false;
        };
        self.components.copy_within(pos + 1..count, pos);
        self.component_count -= 1;
        self.components[self.component_count as usize] = VACANT;
        true
    }

    /// Drops every component entry matching `uid`; returns how many went.
    pub(crate) fn purge_components_of(&mut self, uid: Uid) -> usize {
        let count = self.component_count as usize;
        let mut kept = 0;
        for i in 0..count {
            if self.components[i].uid != uid {
                self.components[kept] = self.components[i];
                kept += 1;
            }
        }
        for slot in &mut self.components[kept..count] {
            *slot = VACANT;
        }
        self.component_count = kept as u32;
        count - kept
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entity(\"{}\", {} components)",
            self.name, self.component_count
        )
    }
}

/// Allocates and recycles entity slots.
///
/// Freed indices go on a LIFO free list and are reused by later spawns.
/// Indices are stable for the lifetime of the entity and invalidated only
/// by explicit destruction.
pub struct EntityTable {
    entries: Vec<Option<Entity>>,
    free_list: Vec<u32>,
    count: u32,
    next_auto_name: u32,
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            count: 0,
            next_auto_name: 0,
        }
    }

    /// Allocates an entity, auto-naming it `entity_N` when `name` is `None`.
    pub fn allocate(&mut self, name: Option<&str>) -> u32 {
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                let n = format!("entity_{}", self.next_auto_name);
                self.next_auto_name += 1;
                n
            }
        };
        self.count += 1;

        if let Some(index) = self.free_list.pop() {
            self.entries[index as usize] = Some(Entity::new(name));
            index
        } else {
            self.entries.push(Some(Entity::new(name)));
            (self.entries.len() - 1) as u32
        }
    }

    /// Removes and returns the entity at `index`, recycling the slot.
    /// Returns `None` if the slot is already empty.
    pub fn deallocate(&mut self, index: u32) -> Option<Entity> {
        let entry = self.entries.get_mut(index as usize)?.take()?;
        self.free_list.push(index);
        self.count -= 1;
        Some(entry)
    }

    pub fn get(&self, index: u32) -> Option<&Entity> {
        self.entries.get(index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Entity> {
        self.entries.get_mut(index as usize)?.as_mut()
    }

    /// Number of live entities.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Iterates live entities as `(index, &entity)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Entity)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| Some((i as u32, e.as_ref()?)))
    }

    /// Iterates live entities mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Entity)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, e)| Some((i as u32, e.as_mut()?)))
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(uid: u64, slot: u32, entity: u32) -> ComponentIndex {
        ComponentIndex {
            uid: Uid(uid),
            slot,
            entity,
        }
    }

    #[test]
    fn allocate_sequential() {
        let mut table = EntityTable::new();
        assert_eq!(table.allocate(Some("a")), 0);
        assert_eq!(table.allocate(Some("b")), 1);
        assert_eq!(table.count(), 2);
        assert_eq!(table.get(0).unwrap().name(), "a");
    }

    #[test]
    fn auto_naming() {
        let mut table = EntityTable::new();
        let a = table.allocate(None);
        let b = table.allocate(None);
        assert_eq!(table.get(a).unwrap().name(), "entity_0");
        assert_eq!(table.get(b).unwrap().name(), "entity_1");
    }

    #[test]
    fn deallocate_recycles_slot() {
        let mut table = EntityTable::new();
        let a = table.allocate(Some("a"));
        let _b = table.allocate(Some("b"));
        assert!(table.deallocate(a).is_some());
        assert!(table.get(a).is_none());
        // LIFO reuse
        let c = table.allocate(Some("c"));
        assert_eq!(c, a);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn deallocate_empty_slot_is_none() {
        let mut table = EntityTable::new();
        let a = table.allocate(Some("a"));
        assert!(table.deallocate(a).is_some());
        assert!(table.deallocate(a).is_none());
        assert!(table.deallocate(99).is_none());
    }

    #[test]
    fn default_transform() {
        let mut table = EntityTable::new();
        let e = table.allocate(Some("a"));
        let entity = table.get(e).unwrap();
        assert_eq!(entity.position, Vec3::zeros());
        assert_eq!(entity.scale, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(entity.rotation, quat_identity());
        assert_eq!(entity.flags, 0);
    }

    #[test]
    fn component_list_push_and_remove() {
        let mut table = EntityTable::new();
        let e = table.allocate(Some("a"));
        let entity = table.get_mut(e).unwrap();
        entity.push_component(index(1, 0, e));
        entity.push_component(index(2, 0, e));
        entity.push_component(index(1, 1, e));
        assert_eq!(entity.components().len(), 3);

        assert!(entity.remove_component_entry(index(2, 0, e)));
        // Order of the rest is preserved
        assert_eq!(entity.components(), &[index(1, 0, e), index(1, 1, e)]);
        assert!(!entity.remove_component_entry(index(2, 0, e)));
    }

    #[test]
    fn purge_components_of_uid() {
        let mut table = EntityTable::new();
        let e = table.allocate(Some("a"));
        let entity = table.get_mut(e).unwrap();
        entity.push_component(index(1, 0, e));
        entity.push_component(index(2, 0, e));
        entity.push_component(index(1, 1, e));
        assert_eq!(entity.purge_components_of(Uid(1)), 2);
        assert_eq!(entity.components(), &[index(2, 0, e)]);
    }

    #[test]
    #[should_panic(expected = "component limit")]
    fn component_cap_is_fatal() {
        let mut table = EntityTable::new();
        let e = table.allocate(Some("crowded"));
        let entity = table.get_mut(e).unwrap();
        for i in 0..=MAX_COMPONENTS as u32 {
            entity.push_component(index(1, i, e));
        }
    }

    #[test]
    fn iter_skips_dead() {
        let mut table = EntityTable::new();
        let a = table.allocate(Some("a"));
        let b = table.allocate(Some("b"));
        let c = table.allocate(Some("c"));
        table.deallocate(b);
        let indices: Vec<u32> = table.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![a, c]);
    }
}
