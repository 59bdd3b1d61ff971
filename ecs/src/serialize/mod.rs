//! Scene persistence: a text codec for user-authored `.scene` files and
//! hot-reload snapshots, and a binary codec for shipped builds.
//!
//! Both codecs drive the same per-type serialize/deserialize entries of the
//! component vtable; the formats themselves live in [`text`] and [`binary`].

mod binary;
mod error;
mod lexer;
mod text;

pub use binary::{read_scene_binary, write_scene_binary, BinaryReader, BinaryWriter};
pub use error::SceneError;
pub use text::{read_scene_text, write_scene_text, TextReader, TextWriter};

pub(crate) use lexer::Token;
