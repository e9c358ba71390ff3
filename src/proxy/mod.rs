//! Reverse-proxy configuration
//!
//! Compiles registry snapshots into Caddyfile documents: one front-door
//! document for the public listener and one per runtime instance.

pub mod generator;
pub mod writer;

pub use generator::{ConfigGenerator, FrontDoorPorts, GeneratorSettings, RenderedConfig};
pub use writer::ArtifactWriter;
