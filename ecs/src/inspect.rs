//! Entity property panel dispatch.
//!
//! The widgets themselves belong to the host editor; this module only
//! bridges egui to the transform fields and each component's
//! `draw_properties` vtable entry.

use egui::DragValue;
use lantern_core::math::{quat_from_euler_deg, quat_to_euler_deg, Vec3};

use crate::component::ComponentIndex;
use crate::registry::ComponentRegistry;
use crate::scene::Scene;

fn vec3_row(ui: &mut egui::Ui, label: &str, v: &mut Vec3) -> bool {
    let mut changed = false;
    ui.horizontal(|ui| {
        ui.label(label);
        changed |= ui.add(DragValue::new(&mut v.x).speed(0.05)).changed();
        changed |= ui.add(DragValue::new(&mut v.y).speed(0.05)).changed();
        changed |= ui.add(DragValue::new(&mut v.z).speed(0.05)).changed();
    });
    changed
}

/// Draws the property panel for one entity: name, flags, transform, and
/// every attached component's own widgets.
pub fn draw_entity_properties(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    entity: u32,
    ui: &mut egui::Ui,
) {
    let Some(e) = scene.entity_mut(entity) else {
        ui.label("entity no longer exists");
        return;
    };

    let mut name = e.name().to_string();
    if ui.text_edit_singleline(&mut name).changed() {
        e.set_name(name);
    }

    let mut disabled = e.is_disabled();
    if ui.checkbox(&mut disabled, "Disabled").changed() {
        if disabled {
            e.flags |= crate::entity::Entity::DISABLED;
        } else {
            e.flags &= !crate::entity::Entity::DISABLED;
        }
    }

    vec3_row(ui, "position", &mut e.position);
    let mut euler = quat_to_euler_deg(&e.rotation);
    if vec3_row(ui, "rotation", &mut euler) {
        e.rotation = quat_from_euler_deg(euler);
    }
    vec3_row(ui, "scale", &mut e.scale);

    // Collect removals and apply after the widget pass; removing while
    // iterating the component list would invalidate it.
    let components: Vec<ComponentIndex> = e.components().to_vec();
    let mut to_remove: Option<ComponentIndex> = None;

    for (i, comp) in components.iter().enumerate() {
        let Some(info) = registry.get(comp.uid) else {
            continue;
        };
        egui::CollapsingHeader::new(info.name())
            .id_source((entity, i))
            .default_open(true)
            .show(ui, |ui| {
                let ptr = scene.component_ptr(*comp);
                // SAFETY: live slot of the vtable's type; the &mut Scene
                // above is no longer borrowed.
                unsafe { (info.vtable().draw_properties)(ptr.as_ptr(), ui) };
                if ui.small_button("remove").clicked() {
                    to_remove = Some(*comp);
                }
            });
    }

    if let Some(index) = to_remove {
        scene.remove_component(registry, index);
    }
}
