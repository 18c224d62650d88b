//! Data models shared across photodrop crates.

mod media;

pub use media::*;
