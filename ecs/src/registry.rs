//! Name-keyed component type registry.
//!
//! Types are matched across module reloads by name: re-registering a known
//! name keeps its uid and swaps the layout and vtable in place, which is
//! what lets live instances survive a recompile of their type. Renaming a
//! type is not a migration: the old name's uid stays reserved and its
//! instances are handled by the reload manager's purge pass.

use std::collections::HashMap;

use log::debug;

use crate::component::{ComponentDesc, ComponentInfo, Uid};

/// Result of a [`ComponentRegistry::register`] call.
#[derive(Debug, Clone, Copy)]
pub struct RegisterOutcome {
    pub uid: Uid,
    /// True when this name had never been registered before.
    pub created: bool,
    /// True when an existing type's size or alignment changed; the caller
    /// must migrate that type's storage before touching any instance.
    pub layout_changed: bool,
}

/// Maps uids to [`ComponentInfo`] and names to uids.
///
/// The name→uid binding is permanent: a uid is never reassigned to a
/// different name, even after its type is detached by a reload.
pub struct ComponentRegistry {
    infos: HashMap<Uid, ComponentInfo>,
    /// Permanent name→uid bindings, including detached types.
    by_name: HashMap<String, Uid>,
    /// Live uids in first-registration order.
    order: Vec<Uid>,
    next_uid: u64,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            infos: HashMap::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            // 0 is reserved so a zeroed ComponentIndex never aliases a type.
            next_uid: 1,
        }
    }

    /// Registers or re-registers a component type.
    ///
    /// A known name reuses its uid: the vtable and layout are swapped in
    /// place and `layout_changed` reports whether storages need migration.
    /// A new name gets the next uid.
    pub fn register(&mut self, desc: ComponentDesc) -> RegisterOutcome {
        if let Some(&uid) = self.by_name.get(&desc.name) {
            if let Some(info) = self.infos.get_mut(&uid) {
                assert_eq!(
                    info.name, desc.name,
                    "uid {uid:?} bound to a different name"
                );
                let layout_changed = info.size != desc.size || info.align != desc.align;
                if layout_changed {
                    debug!(
                        "component '{}' layout changed: {}b align {} -> {}b align {}",
                        desc.name, info.size, info.align, desc.size, desc.align
                    );
                }
                info.size = desc.size;
                info.align = desc.align;
                info.vtable = desc.vtable;
                return RegisterOutcome {
                    uid,
                    created: false,
                    layout_changed,
                };
            }

            // Re-registration of a detached name: revive under the same uid.
            debug!("component '{}' re-attached as {uid:?}", desc.name);
            self.infos.insert(
                uid,
                ComponentInfo {
                    uid,
                    name: desc.name,
                    size: desc.size,
                    align: desc.align,
                    vtable: desc.vtable,
                },
            );
            self.order.push(uid);
            return RegisterOutcome {
                uid,
                created: false,
                layout_changed: true,
            };
        }

        let uid = Uid(self.next_uid);
        self.next_uid += 1;
        debug!("component '{}' registered as {uid:?}", desc.name);
        self.by_name.insert(desc.name.clone(), uid);
        self.infos.insert(
            uid,
            ComponentInfo {
                uid,
                name: desc.name,
                size: desc.size,
                align: desc.align,
                vtable: desc.vtable,
            },
        );
        self.order.push(uid);
        RegisterOutcome {
            uid,
            created: true,
            layout_changed: false,
        }
    }

    /// Convenience registration for a typed component.
    pub fn register_type<T: crate::component::Component>(&mut self) -> Uid {
        self.register(ComponentDesc::of::<T>()).uid
    }

    /// Removes a type from the live set while keeping its name→uid binding
    /// reserved. Used by the reload manager when a module stops providing a
    /// type; its vtable must not be called once the module is gone.
    pub(crate) fn detach(&mut self, uid: Uid) -> Option<ComponentInfo> {
        self.order.retain(|&u| u != uid);
        self.infos.remove(&uid)
    }

    /// Looks up a live type by uid.
    pub fn get(&self, uid: Uid) -> Option<&ComponentInfo> {
        self.infos.get(&uid)
    }

    /// Looks up a live type's uid by name. Detached names resolve to `None`.
    pub fn uid_of(&self, name: &str) -> Option<Uid> {
        let uid = *self.by_name.get(name)?;
        self.infos.contains_key(&uid).then_some(uid)
    }

    /// Live types in first-registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.order.iter().map(|uid| &self.infos[uid])
    }

    /// Number of live types.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentVtable;

    fn dummy_vtable() -> ComponentVtable {
        unsafe fn construct(_: *mut u8) {}
        unsafe fn ser_text(_: *const u8, _: &mut crate::serialize::TextWriter) {}
        unsafe fn de_text(
            _: *mut u8,
            r: &mut crate::serialize::TextReader<'_>,
        ) -> Result<(), crate::serialize::SceneError> {
            while r.next_field()?.is_some() {
                r.skip_value()?;
            }
            Ok(())
        }
        unsafe fn ser_bin(_: *const u8, _: &mut crate::serialize::BinaryWriter) {}
        unsafe fn de_bin(
            _: *mut u8,
            _: &mut crate::serialize::BinaryReader<'_>,
        ) -> Result<(), crate::serialize::SceneError> {
            Ok(())
        }
        unsafe fn draw(_: *mut u8, _: &mut egui::Ui) {}
        ComponentVtable {
            construct,
            init: None,
            start: None,
            update: None,
            free: None,
            serialize_text: ser_text,
            deserialize_text: de_text,
            serialize_binary: ser_bin,
            deserialize_binary: de_bin,
            draw_properties: draw,
        }
    }

    fn desc(name: &str, size: usize, align: usize) -> ComponentDesc {
        ComponentDesc {
            name: name.to_string(),
            size,
            align,
            vtable: dummy_vtable(),
        }
    }

    #[test]
    fn new_names_get_distinct_uids() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register(desc("A", 4, 4));
        let b = reg.register(desc("B", 8, 8));
        assert!(a.created);
        assert!(b.created);
        assert_ne!(a.uid, b.uid);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn same_name_keeps_uid() {
        let mut reg = ComponentRegistry::new();
        let first = reg.register(desc("A", 4, 4));
        let second = reg.register(desc("A", 4, 4));
        assert!(!second.created);
        assert!(!second.layout_changed);
        assert_eq!(first.uid, second.uid);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn layout_change_is_reported() {
        let mut reg = ComponentRegistry::new();
        let first = reg.register(desc("A", 4, 4));
        let second = reg.register(desc("A", 16, 8));
        assert_eq!(first.uid, second.uid);
        assert!(second.layout_changed);
        let info = reg.get(first.uid).unwrap();
        assert_eq!(info.size(), 16);
        assert_eq!(info.align(), 8);
    }

    #[test]
    fn detach_reserves_name() {
        let mut reg = ComponentRegistry::new();
        let uid = reg.register(desc("A", 4, 4)).uid;
        reg.detach(uid);
        assert!(reg.get(uid).is_none());
        assert!(reg.uid_of("A").is_none());
        assert!(reg.is_empty());

        // Another type never steals the reserved uid.
        let other = reg.register(desc("B", 4, 4)).uid;
        assert_ne!(other, uid);

        // Re-registering the name revives the original uid.
        let revived = reg.register(desc("A", 8, 8));
        assert_eq!(revived.uid, uid);
        assert!(!revived.created);
        assert!(revived.layout_changed);
    }

    #[test]
    fn iter_is_registration_order() {
        let mut reg = ComponentRegistry::new();
        reg.register(desc("C", 4, 4));
        reg.register(desc("A", 4, 4));
        reg.register(desc("B", 4, 4));
        let names: Vec<_> = reg.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }
}
