//! Binary scene codec and the little-endian cursor pair component vtables
//! serialize through.
//!
//! Scene blob layout:
//!
//! ```text
//! u32 entity_count
//! per entity:
//!     u32 name_len, name bytes
//!     position  (3 x f32)
//!     rotation  (4 x f32, quaternion xyzw)
//!     scale     (3 x f32)
//!     u32 component_count
//!     per component: u32 type_id, type-specific payload
//! ```
//!
//! Component type ids are not runtime uids: they are remapped to a dense
//! `0..N-1` range ordered by component name, so shipped data does not
//! depend on registration order. Encoder and decoder derive the same table
//! from their registries.

use lantern_core::math::{quat_from_xyzw, Vec3};

use super::error::SceneError;
use crate::component::Uid;
use crate::registry::ComponentRegistry;
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// Cursors
// ---------------------------------------------------------------------------

/// Append-only little-endian byte writer.
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    /// Raw bytes, no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Optional reference: `0` length-prefix flag for none, `1` + string.
    pub fn write_ref(&mut self, r: Option<&str>) {
        match r {
            Some(s) => {
                self.write_u8(1);
                self.write_str(s);
            }
            None => self.write_u8(0),
        }
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked little-endian cursor over a byte buffer.
///
/// Every read fails with [`SceneError::Truncated`] instead of running past
/// the end, so a clipped file surfaces as an error rather than garbage.
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SceneError> {
        if self.remaining() < n {
            return Err(SceneError::Truncated { offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, SceneError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, SceneError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, SceneError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_bool(&mut self) -> Result<bool, SceneError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SceneError> {
        self.take(n)
    }

    pub fn read_str(&mut self) -> Result<String, SceneError> {
        let len = self.read_u32()? as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SceneError::Truncated { offset })
    }

    pub fn read_ref(&mut self) -> Result<Option<String>, SceneError> {
        if self.read_u8()? != 0 {
            Ok(Some(self.read_str()?))
        } else {
            Ok(None)
        }
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, SceneError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }
}

// ---------------------------------------------------------------------------
// Dense type ids
// ---------------------------------------------------------------------------

/// Registered uids ordered by component name: index = dense type id.
fn dense_type_table(registry: &ComponentRegistry) -> Vec<Uid> {
    let mut uids: Vec<Uid> = registry.iter().map(|info| info.uid()).collect();
    uids.sort_by(|a, b| {
        registry
            .get(*a)
            .unwrap()
            .name()
            .cmp(registry.get(*b).unwrap().name())
    });
    uids
}

// ---------------------------------------------------------------------------
// Scene codec
// ---------------------------------------------------------------------------

/// Serializes a whole scene to the binary format.
pub fn write_scene_binary(scene: &Scene, registry: &ComponentRegistry) -> Vec<u8> {
    let table = dense_type_table(registry);
    let dense_of = |uid: Uid| table.iter().position(|&u| u == uid).unwrap() as u32;

    let mut w = BinaryWriter::new();
    w.write_u32(scene.entity_count());
    for (_, entity) in scene.entities() {
        w.write_str(entity.name());
        w.write_vec3(entity.position);
        w.write_f32(entity.rotation.i);
        w.write_f32(entity.rotation.j);
        w.write_f32(entity.rotation.k);
        w.write_f32(entity.rotation.w);
        w.write_vec3(entity.scale);
        w.write_u32(entity.components().len() as u32);
        for comp in entity.components() {
            let info = registry
                .get(comp.uid)
                .expect("live component with unregistered uid");
            w.write_u32(dense_of(comp.uid));
            let ptr = scene.component_ptr(*comp);
            // SAFETY: live slot, matching vtable.
            unsafe { (info.vtable().serialize_binary)(ptr.as_ptr(), &mut w) };
        }
    }
    w.into_bytes()
}

/// Decodes a binary scene blob, appending its entities to `scene`.
///
/// All-or-nothing: on error, every entity this call created is destroyed
/// before the error is returned.
pub fn read_scene_binary(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    bytes: &[u8],
) -> Result<(), SceneError> {
    let mut created = Vec::new();
    let result = read_scene_inner(scene, registry, bytes, &mut created);
    if result.is_err() {
        for &index in created.iter().rev() {
            scene.destroy_entity(registry, index);
        }
    }
    result
}

fn read_scene_inner(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    bytes: &[u8],
    created: &mut Vec<u32>,
) -> Result<(), SceneError> {
    let table = dense_type_table(registry);
    let mut r = BinaryReader::new(bytes);

    let entity_count = r.read_u32()?;
    for _ in 0..entity_count {
        let name = r.read_str()?;
        let index = scene.create_entity(Some(&name));
        created.push(index);

        let position = r.read_vec3()?;
        let (x, y, z, w) = (r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
        let scale = r.read_vec3()?;
        {
            let entity = scene.entity_mut(index).unwrap();
            entity.position = position;
            entity.rotation = quat_from_xyzw(x, y, z, w);
            entity.scale = scale;
        }

        let component_count = r.read_u32()?;
        for _ in 0..component_count {
            let id = r.read_u32()?;
            let uid = *table
                .get(id as usize)
                .ok_or(SceneError::UnknownTypeId { id })?;
            let comp = scene.add_component(registry, index, uid);
            let info = registry.get(uid).unwrap();
            let ptr = scene.component_ptr(comp);
            // SAFETY: freshly constructed slot, matching vtable.
            unsafe { (info.vtable().deserialize_binary)(ptr.as_ptr(), &mut r)? };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let mut w = BinaryWriter::new();
        w.write_u32(0xDEAD_BEEF);
        w.write_f32(1.5);
        w.write_str("suzanne");
        w.write_bool(true);
        w.write_ref(None);
        w.write_ref(Some("meshes/ape.obj"));
        w.write_vec3(Vec3::new(1.0, 2.0, 3.0));
        let bytes = w.into_bytes();

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_str().unwrap(), "suzanne");
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_ref().unwrap(), None);
        assert_eq!(r.read_ref().unwrap(), Some("meshes/ape.obj".to_string()));
        assert_eq!(r.read_vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_read_errors() {
        let mut w = BinaryWriter::new();
        w.write_u32(7);
        let bytes = w.into_bytes();

        let mut r = BinaryReader::new(&bytes[..2]);
        assert!(matches!(
            r.read_u32(),
            Err(SceneError::Truncated { offset: 0 })
        ));
    }

    #[test]
    fn truncated_string_reports_offset() {
        let mut w = BinaryWriter::new();
        w.write_str("a long string that gets clipped");
        let bytes = w.into_bytes();

        let mut r = BinaryReader::new(&bytes[..8]);
        assert!(matches!(r.read_str(), Err(SceneError::Truncated { .. })));
    }
}
