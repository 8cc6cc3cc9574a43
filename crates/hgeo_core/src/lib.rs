//! Houdini GEO (JSON) import/export and mesh conversion.
//!
//! This crate provides:
//!
//! - **Geometry model**: `HoudiniGeo`, its attributes, primitives and groups
//! - **Wire format**: `decode` / `encode` for the JSON GEO interchange format
//! - **Mesh conversion**: `build_mesh` turning polygons into an indexed
//!   triangle mesh in engine space
//! - **Authoring**: `PointSchema` for writing point clouds back out
//!
//! # Example
//!
//! ```ignore
//! use hgeo_core::{build_mesh, decode, MeshOptions};
//!
//! // Load a GEO file and convert it
//! let geo = decode(&std::fs::read_to_string("torus.geo")?)?;
//! let mesh = build_mesh(&geo, &MeshOptions::default())?;
//! println!("Loaded {} vertices in {} submeshes",
//!     mesh.positions.len(),
//!     mesh.submeshes.len());
//! ```

pub mod format;
pub mod geo;
pub mod mesh;
pub mod points;
pub mod units;

// Re-export commonly used types
pub use format::{decode, encode, DecodeError, DecodeResult};
pub use geo::{Attribute, AttributeOwner, AttributeType, FileInfo, HoudiniGeo};
pub use mesh::{build_mesh, IndexedMesh, MeshError, MeshOptions, Submesh};
pub use points::{AttrValue, PointSchema};
