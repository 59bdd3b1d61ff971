//! Shipped binary data bundle (`data.bin`).
//!
//! Layout: a fixed [`DataHeader`] followed by an asset blob (each asset a
//! length-prefixed path and length-prefixed bytes) and the binary scene
//! blob. Produced by the build step with [`BundleBuilder`]; consumed by
//! the shipped runtime through [`Bundle::open`], which memory-maps the
//! file and validates the asset table once up front.

use std::fs::File;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use log::debug;
use thiserror::Error;

use crate::serialize::{BinaryReader, BinaryWriter};

/// Fixed prolog of a data bundle: byte offsets and sizes of the asset and
/// scene blobs, little-endian.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DataHeader {
    pub asset_offset: u32,
    pub asset_size: u32,
    pub scene_offset: u32,
    pub scene_size: u32,
}

pub const DATA_HEADER_SIZE: usize = std::mem::size_of::<DataHeader>();

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle is too small to contain a data header")]
    TooSmall,

    #[error("bundle {what} range is out of bounds")]
    BadRange { what: &'static str },

    #[error("malformed bundle asset table at offset {offset}")]
    AssetTable { offset: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Accumulates assets and a scene blob, then emits the bundle bytes.
#[derive(Default)]
pub struct BundleBuilder {
    assets: Vec<(String, Vec<u8>)>,
    scene: Vec<u8>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one asset under its lookup path (raw file bytes; decoding is
    /// the consumer's business).
    pub fn add_asset(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.assets.push((path.into(), data));
    }

    /// Sets the binary scene blob (see
    /// [`write_scene_binary`](crate::serialize::write_scene_binary)).
    pub fn set_scene(&mut self, scene: Vec<u8>) {
        self.scene = scene;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut assets = BinaryWriter::new();
        for (path, data) in &self.assets {
            assets.write_str(path);
            assets.write_u32(data.len() as u32);
            assets.write_bytes(data);
        }
        let asset_blob = assets.into_bytes();

        let header = DataHeader {
            asset_offset: DATA_HEADER_SIZE as u32,
            asset_size: asset_blob.len() as u32,
            scene_offset: (DATA_HEADER_SIZE + asset_blob.len()) as u32,
            scene_size: self.scene.len() as u32,
        };

        let mut out = Vec::with_capacity(DATA_HEADER_SIZE + asset_blob.len() + self.scene.len());
        out.extend_from_slice(bytemuck::bytes_of(&header));
        out.extend_from_slice(&asset_blob);
        out.extend_from_slice(&self.scene);
        out
    }

    pub fn write_file(&self, path: &Path) -> Result<(), BundleError> {
        std::fs::write(path, self.to_bytes())?;
        debug!("wrote bundle {:?}: {} assets", path, self.assets.len());
        Ok(())
    }
}

/// A memory-mapped, validated data bundle.
pub struct Bundle {
    map: memmap2::Mmap,
    header: DataHeader,
    /// Asset lookup: path and the absolute byte range of its data.
    assets: Vec<(String, std::ops::Range<usize>)>,
}

impl Bundle {
    /// Opens and memory-maps a bundle file, validating the header ranges
    /// and walking the asset table once.
    pub fn open(path: &Path) -> Result<Self, BundleError> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the bundle file is owned by
        // the build pipeline; concurrent truncation is not supported.
        let map = unsafe { memmap2::Mmap::map(&file)? };

        if map.len() < DATA_HEADER_SIZE {
            return Err(BundleError::TooSmall);
        }
        let header: DataHeader = bytemuck::pod_read_unaligned(&map[..DATA_HEADER_SIZE]);

        let blob_range = |offset: u32, size: u32, what: &'static str| {
            let (start, len) = (offset as usize, size as usize);
            match start.checked_add(len) {
                Some(end) if end <= map.len() => Ok(start..end),
                _ => Err(BundleError::BadRange { what }),
            }
        };
        let asset_range = blob_range(header.asset_offset, header.asset_size, "asset blob")?;
        blob_range(header.scene_offset, header.scene_size, "scene blob")?;

        let mut assets = Vec::new();
        let mut r = BinaryReader::new(&map[asset_range.clone()]);
        while r.remaining() > 0 {
            let table_err = |r: &BinaryReader<'_>| BundleError::AssetTable {
                offset: asset_range.start + r.pos(),
            };
            let path = r.read_str().map_err(|_| table_err(&r))?;
            let len = r.read_u32().map_err(|_| table_err(&r))? as usize;
            let start = asset_range.start + r.pos();
            r.read_bytes(len).map_err(|_| table_err(&r))?;
            assets.push((path, start..start + len));
        }

        debug!("opened bundle {:?}: {} assets", path, assets.len());
        Ok(Self {
            map,
            header,
            assets,
        })
    }

    pub fn header(&self) -> &DataHeader {
        &self.header
    }

    /// Raw bytes of one asset, by its bundled path.
    pub fn asset(&self, path: &str) -> Option<&[u8]> {
        self.assets
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, range)| &self.map[range.clone()])
    }

    /// Iterates `(path, bytes)` pairs in bundle order.
    pub fn assets(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.assets
            .iter()
            .map(|(p, range)| (p.as_str(), &self.map[range.clone()]))
    }

    /// The binary scene blob, ready for
    /// [`read_scene_binary`](crate::serialize::read_scene_binary).
    pub fn scene_bytes(&self) -> &[u8] {
        let start = self.header.scene_offset as usize;
        &self.map[start..start + self.header.scene_size as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_sixteen_bytes() {
        assert_eq!(DATA_HEADER_SIZE, 16);
    }

    #[test]
    fn builder_layout() {
        let mut b = BundleBuilder::new();
        b.add_asset("tex/a.png", vec![1, 2, 3]);
        b.set_scene(vec![9, 9]);
        let bytes = b.to_bytes();

        let header: DataHeader = bytemuck::pod_read_unaligned(&bytes[..DATA_HEADER_SIZE]);
        assert_eq!(header.asset_offset, 16);
        // path len(4) + path(9) + data len(4) + data(3)
        assert_eq!(header.asset_size, 20);
        assert_eq!(header.scene_offset, 36);
        assert_eq!(header.scene_size, 2);
        assert_eq!(&bytes[36..], &[9, 9]);
    }
}
