//! Conversion from GEO geometry to an indexed triangle mesh.
//!
//! The mesh is flattened: one buffer row per polygon face-corner, assigned
//! in primitive order with the first occurrence of a vertex index claiming
//! the row. Point-owned attributes are resolved through the vertex-to-point
//! topology, and primitive-owned normals/colors are written onto the rows
//! of their faces in a second pass. Output is in engine space: the Z axis
//! is mirrored and, by default, the triangle winding is reversed to match.

use std::collections::HashMap;

use glam::{Vec2, Vec3, Vec4};
use thiserror::Error;

use crate::geo::{
    Attribute, AttributeOwner, AttributeType, HoudiniGeo, ALPHA_ATTR_NAME, COLOR_ATTR_NAME,
    DEFAULT_MATERIAL_NAME, MATERIAL_ATTR_NAME, NORMAL_ATTR_NAME, POS_ATTR_NAME, TANGENT_ATTR_NAME,
    UV2_ATTR_NAME, UV_ATTR_NAME,
};

/// Largest flattened vertex count a renderable mesh may use. The target
/// index-buffer format is 16-bit.
pub const VERTEX_LIMIT: usize = 65000;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("geometry contains no polygon primitives")]
    NoPolygons,

    #[error("mesh needs {0} vertices but the limit is {VERTEX_LIMIT}")]
    VertexLimitExceeded(usize),
}

/// Options controlling mesh conversion.
#[derive(Clone, Debug)]
pub struct MeshOptions {
    /// Reverse each submesh's index list end-to-end so faces stay
    /// front-facing after the handedness flip. On by default.
    pub reverse_winding: bool,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            reverse_winding: true,
        }
    }
}

/// One triangle range sharing a material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Submesh {
    pub material: String,
    pub indices: Vec<u32>,
}

/// An indexed triangle mesh with per-vertex attribute channels. All
/// channels share the flattened row count. `positions` and `normals` are
/// always filled (normals recomputed from faces when the geometry carries
/// none), `uvs` is zero-filled when absent since renderers may reject a
/// mesh without a UV channel, and the remaining channels are empty when
/// the geometry has no matching attribute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexedMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub uvs2: Vec<Vec2>,
    pub tangents: Vec<Vec4>,
    pub submeshes: Vec<Submesh>,
}

/// Mapping between the file's global vertex indices and the mesh's
/// flattened buffer rows, built in primitive order with first occurrence
/// winning.
struct SlotMap {
    /// Buffer row to global vertex index.
    globals: Vec<i32>,
    /// Global vertex index to buffer row.
    slot_of: HashMap<i32, u32>,
}

impl SlotMap {
    fn build(geo: &HoudiniGeo) -> Self {
        let mut globals = Vec::new();
        let mut slot_of = HashMap::new();
        for prim in &geo.poly_primitives {
            for &v in &prim.indices {
                slot_of.entry(v).or_insert_with(|| {
                    globals.push(v);
                    (globals.len() - 1) as u32
                });
            }
        }
        Self { globals, slot_of }
    }

    fn len(&self) -> usize {
        self.globals.len()
    }
}

/// Convert polygon geometry to an indexed triangle mesh.
pub fn build_mesh(geo: &HoudiniGeo, options: &MeshOptions) -> Result<IndexedMesh, MeshError> {
    if geo.poly_primitives.is_empty() {
        return Err(MeshError::NoPolygons);
    }
    let slots = SlotMap::build(geo);
    if slots.len() > VERTEX_LIMIT {
        return Err(MeshError::VertexLimitExceeded(slots.len()));
    }

    let mut positions = gather_vec3(geo, POS_ATTR_NAME, &slots).unwrap_or_else(|| {
        log::warn!("no '{POS_ATTR_NAME}' attribute, placing every vertex at the origin");
        vec![Vec3::ZERO; slots.len()]
    });
    for p in &mut positions {
        p.z = -p.z;
    }

    let mut submeshes = partition_by_material(geo, &slots);
    if options.reverse_winding {
        for submesh in &mut submeshes {
            submesh.indices.reverse();
        }
    }

    let normals = match gather_normals(geo, &slots) {
        Some(mut normals) => {
            for n in &mut normals {
                n.z = -n.z;
            }
            normals
        }
        None => smooth_normals(geo, &positions, &submeshes, &slots),
    };

    let colors = gather_colors(geo, &slots).unwrap_or_default();

    let uvs = gather_vec2(geo, UV_ATTR_NAME, &slots)
        .unwrap_or_else(|| vec![Vec2::ZERO; slots.len()]);
    let uvs2 = gather_vec2(geo, UV2_ATTR_NAME, &slots).unwrap_or_default();

    let mut tangents = gather_vec4(geo, TANGENT_ATTR_NAME, &slots).unwrap_or_default();
    for t in &mut tangents {
        t.z = -t.z;
    }

    Ok(IndexedMesh {
        positions,
        normals,
        colors,
        uvs,
        uvs2,
        tangents,
        submeshes,
    })
}

/// Group triangles into one submesh per material path, in order of first
/// appearance. The path is taken verbatim, so an empty path keys its own
/// submesh; only primitives without a value at all land in the default
/// submesh. Submeshes that end up with no triangles are dropped.
fn partition_by_material(geo: &HoudiniGeo, slots: &SlotMap) -> Vec<Submesh> {
    let materials = geo
        .find_attribute(
            MATERIAL_ATTR_NAME,
            AttributeType::String,
            Some(AttributeOwner::Primitive),
        )
        .and_then(Attribute::str_values);

    let mut submeshes: Vec<Submesh> = Vec::new();
    for prim in &geo.poly_primitives {
        let material = materials
            .and_then(|m| m.get(prim.id))
            .map(String::as_str)
            .unwrap_or(DEFAULT_MATERIAL_NAME);

        let slot = match submeshes.iter().position(|s| s.material == material) {
            Some(i) => i,
            None => {
                submeshes.push(Submesh {
                    material: material.to_string(),
                    indices: Vec::new(),
                });
                submeshes.len() - 1
            }
        };
        submeshes[slot].indices.extend(
            prim.triangles
                .iter()
                .filter_map(|v| slots.slot_of.get(v).copied()),
        );
    }

    submeshes.retain(|s| !s.indices.is_empty());
    submeshes
}

/// Resolve a float attribute that applies per face-corner, preferring a
/// true vertex attribute over a point attribute.
fn per_vertex_attr<'a>(geo: &'a HoudiniGeo, name: &str) -> Option<&'a Attribute> {
    geo.find_attribute(name, AttributeType::Float, Some(AttributeOwner::Vertex))
        .or_else(|| geo.find_attribute(name, AttributeType::Float, Some(AttributeOwner::Point)))
}

/// Copy values into the flattened buffer: by vertex index for Vertex
/// attributes, through the topology for Point attributes.
fn fill_slots<T: Copy + Default>(
    geo: &HoudiniGeo,
    owner: AttributeOwner,
    values: &[T],
    slots: &SlotMap,
) -> Vec<T> {
    slots
        .globals
        .iter()
        .map(|&v| {
            let element = match owner {
                AttributeOwner::Vertex => usize::try_from(v).ok(),
                AttributeOwner::Point => usize::try_from(v)
                    .ok()
                    .and_then(|v| geo.point_refs.get(v))
                    .and_then(|&p| usize::try_from(p).ok()),
                _ => None,
            };
            element
                .and_then(|i| values.get(i).copied())
                .unwrap_or_default()
        })
        .collect()
}

/// Write per-primitive values onto the buffer rows of each face, keyed by
/// primitive id, in primitive order.
fn spread_primitive<T: Copy + Default>(
    geo: &HoudiniGeo,
    values: &[T],
    slots: &SlotMap,
) -> Vec<T> {
    let mut out = vec![T::default(); slots.len()];
    for prim in &geo.poly_primitives {
        let Some(&value) = values.get(prim.id) else {
            continue;
        };
        for v in &prim.indices {
            if let Some(&slot) = slots.slot_of.get(v) {
                out[slot as usize] = value;
            }
        }
    }
    out
}

fn gather_vec3(geo: &HoudiniGeo, name: &str, slots: &SlotMap) -> Option<Vec<Vec3>> {
    let attr = per_vertex_attr(geo, name)?;
    Some(fill_slots(geo, attr.owner, &attr.vec3_values()?, slots))
}

fn gather_vec2(geo: &HoudiniGeo, name: &str, slots: &SlotMap) -> Option<Vec<Vec2>> {
    let attr = per_vertex_attr(geo, name)?;
    Some(fill_slots(geo, attr.owner, &attr.vec2_values()?, slots))
}

fn gather_vec4(geo: &HoudiniGeo, name: &str, slots: &SlotMap) -> Option<Vec<Vec4>> {
    let attr = per_vertex_attr(geo, name)?;
    Some(fill_slots(geo, attr.owner, &attr.vec4_values()?, slots))
}

fn gather_normals(geo: &HoudiniGeo, slots: &SlotMap) -> Option<Vec<Vec3>> {
    gather_vec3(geo, NORMAL_ATTR_NAME, slots).or_else(|| {
        let attr = geo.find_attribute(
            NORMAL_ATTR_NAME,
            AttributeType::Float,
            Some(AttributeOwner::Primitive),
        )?;
        Some(spread_primitive(geo, &attr.vec3_values()?, slots))
    })
}

/// Color channel: a vertex or point color attribute, falling back to a
/// per-primitive one, with a separate scalar alpha attribute merged into
/// the fourth component. A malformed alpha attribute whose length does not
/// cover its owner's elements is skipped.
fn gather_colors(geo: &HoudiniGeo, slots: &SlotMap) -> Option<Vec<Vec4>> {
    let mut colors = match per_vertex_attr(geo, COLOR_ATTR_NAME) {
        Some(attr) => fill_slots(geo, attr.owner, &attr.color_values()?, slots),
        None => {
            let attr = geo.find_attribute(
                COLOR_ATTR_NAME,
                AttributeType::Float,
                Some(AttributeOwner::Primitive),
            )?;
            spread_primitive(geo, &attr.color_values()?, slots)
        }
    };

    if let Some(attr) = per_vertex_attr(geo, ALPHA_ATTR_NAME) {
        if attr.element_count() != geo.element_count(attr.owner) {
            log::warn!(
                "'{ALPHA_ATTR_NAME}' covers {} of {} elements, skipping alpha",
                attr.element_count(),
                geo.element_count(attr.owner)
            );
        } else if let Some(alpha) = attr.f32_values() {
            let alpha = fill_slots(geo, attr.owner, alpha, slots);
            for (color, a) in colors.iter_mut().zip(alpha) {
                color.w = a;
            }
        }
    }

    Some(colors)
}

/// Recompute smooth normals by accumulating face normals per point, so
/// face-corners sharing a point share a normal.
fn smooth_normals(
    geo: &HoudiniGeo,
    positions: &[Vec3],
    submeshes: &[Submesh],
    slots: &SlotMap,
) -> Vec<Vec3> {
    let point_of_slot = |slot: usize| -> Option<usize> {
        slots
            .globals
            .get(slot)
            .and_then(|&v| usize::try_from(v).ok())
            .and_then(|v| geo.point_refs.get(v))
            .and_then(|&p| usize::try_from(p).ok())
    };

    let mut per_point = vec![Vec3::ZERO; geo.point_count];
    for submesh in submeshes {
        for tri in submesh.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= positions.len() || b >= positions.len() || c >= positions.len() {
                continue;
            }
            let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
            for &v in tri {
                if let Some(slot) = point_of_slot(v as usize).and_then(|p| per_point.get_mut(p)) {
                    *slot += face;
                }
            }
        }
    }

    (0..positions.len())
        .map(|slot| {
            point_of_slot(slot)
                .and_then(|p| per_point.get(p))
                .map(|n| n.normalize_or_zero())
                .unwrap_or(Vec3::ZERO)
        })
        .collect()
}
