//! # Lantern Core
//!
//! Shared math types for the Lantern Engine crates.
//!
//! Scene transforms use f32 throughout: [`math::Vec3`] for positions and
//! scales, [`math::Quat`] for rotations. Scene text files store rotations as
//! Euler degrees; the conversion helpers live here so the runtime and the
//! codecs agree on the angle conventions.

pub mod math;
