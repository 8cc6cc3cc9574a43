//! In-memory model of a Houdini GEO file.
//!
//! This module defines the attribute/primitive/group entities and the
//! [`HoudiniGeo`] container that owns them. The container is pure data:
//! it is produced by [`crate::format::decode`], consumed by
//! [`crate::mesh::build_mesh`] and [`crate::format::encode`], and can be
//! built programmatically through the helpers in [`crate::points`].

use chrono::NaiveDateTime;
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Well-known attribute name for point/vertex positions.
pub const POS_ATTR_NAME: &str = "P";
/// Well-known attribute name for normals.
pub const NORMAL_ATTR_NAME: &str = "N";
/// Well-known attribute name for colors.
pub const COLOR_ATTR_NAME: &str = "Cd";
/// Well-known attribute name for color alpha.
pub const ALPHA_ATTR_NAME: &str = "Alpha";
/// Well-known attribute name for the first UV channel.
pub const UV_ATTR_NAME: &str = "uv";
/// Well-known attribute name for the second UV channel.
pub const UV2_ATTR_NAME: &str = "uv2";
/// Well-known attribute name for tangents.
pub const TANGENT_ATTR_NAME: &str = "tangent";
/// Well-known attribute name for the per-primitive material path.
pub const MATERIAL_ATTR_NAME: &str = "shop_materialpath";
/// Well-known attribute name for up vectors.
pub const UP_ATTR_NAME: &str = "up";
/// Well-known attribute name for rotations.
pub const ROTATION_ATTR_NAME: &str = "orient";
/// Submesh material name used when no material attribute is present.
pub const DEFAULT_MATERIAL_NAME: &str = "Default";

/// Scalar type of an attribute's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Float,
    Integer,
    String,
}

/// Which topological entity an attribute's values are indexed by.
///
/// A point is a unique position in space; a vertex is a face-corner
/// reference to a point. Detail attributes hold a single value for the
/// whole file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeOwner {
    Vertex,
    Point,
    Primitive,
    Detail,
}

/// A named, typed, tuple-valued array owned by one topology class.
///
/// Exactly one of the three value vectors is populated, matching `kind`,
/// and its length is always an exact multiple of `tuple_size`.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeType,
    pub owner: AttributeOwner,
    pub tuple_size: usize,

    pub float_values: Vec<f32>,
    pub int_values: Vec<i32>,
    pub string_values: Vec<String>,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        kind: AttributeType,
        owner: AttributeOwner,
        tuple_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            owner,
            tuple_size,
            float_values: Vec::new(),
            int_values: Vec::new(),
            string_values: Vec::new(),
        }
    }

    /// Number of logical elements (tuples) stored in this attribute.
    pub fn element_count(&self) -> usize {
        let raw = match self.kind {
            AttributeType::Float => self.float_values.len(),
            AttributeType::Integer => self.int_values.len(),
            AttributeType::String => self.string_values.len(),
        };
        raw / self.tuple_size.max(1)
    }

    fn validate(&self, expected: AttributeType, min_tuple_size: usize) -> bool {
        if self.kind != expected {
            log::error!(
                "cannot read {:?} attribute '{}' as {:?} values",
                self.kind,
                self.name,
                expected
            );
            return false;
        }
        if self.tuple_size < min_tuple_size {
            log::error!(
                "tuple size {} of attribute '{}' is too small (need at least {})",
                self.tuple_size,
                self.name,
                min_tuple_size
            );
            return false;
        }
        true
    }

    /// Raw float values, one per element (tuple size 1).
    pub fn f32_values(&self) -> Option<&[f32]> {
        if !self.validate(AttributeType::Float, 1) {
            return None;
        }
        Some(&self.float_values)
    }

    pub fn i32_values(&self) -> Option<&[i32]> {
        if !self.validate(AttributeType::Integer, 1) {
            return None;
        }
        Some(&self.int_values)
    }

    pub fn str_values(&self) -> Option<&[String]> {
        if !self.validate(AttributeType::String, 1) {
            return None;
        }
        Some(&self.string_values)
    }

    /// First two components of every tuple.
    pub fn vec2_values(&self) -> Option<Vec<Vec2>> {
        if !self.validate(AttributeType::Float, 2) {
            return None;
        }
        Some(
            self.float_values
                .chunks_exact(self.tuple_size)
                .map(|t| Vec2::new(t[0], t[1]))
                .collect(),
        )
    }

    /// First three components of every tuple.
    pub fn vec3_values(&self) -> Option<Vec<Vec3>> {
        if !self.validate(AttributeType::Float, 3) {
            return None;
        }
        Some(
            self.float_values
                .chunks_exact(self.tuple_size)
                .map(|t| Vec3::new(t[0], t[1], t[2]))
                .collect(),
        )
    }

    pub fn vec4_values(&self) -> Option<Vec<Vec4>> {
        if !self.validate(AttributeType::Float, 4) {
            return None;
        }
        Some(
            self.float_values
                .chunks_exact(self.tuple_size)
                .map(|t| Vec4::new(t[0], t[1], t[2], t[3]))
                .collect(),
        )
    }

    /// RGBA colors. Alpha defaults to 1 and is only read from the tuple
    /// when the tuple has a fourth component.
    pub fn color_values(&self) -> Option<Vec<Vec4>> {
        if !self.validate(AttributeType::Float, 3) {
            return None;
        }
        Some(
            self.float_values
                .chunks_exact(self.tuple_size)
                .map(|t| {
                    let a = if self.tuple_size >= 4 { t[3] } else { 1.0 };
                    Vec4::new(t[0], t[1], t[2], a)
                })
                .collect(),
        )
    }
}

/// A polygon face: an ordered vertex-index sequence plus its eagerly
/// computed triangle fan. `id` is the dense, file-order primitive index
/// used to look up Primitive-owner attribute values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyPrimitive {
    pub id: usize,
    pub indices: Vec<i32>,
    pub triangles: Vec<i32>,
}

impl PolyPrimitive {
    pub fn new(id: usize, indices: Vec<i32>) -> Self {
        let triangles = triangulate_ngon(&indices);
        Self {
            id,
            indices,
            triangles,
        }
    }
}

/// A Bezier curve primitive. Recognized for round-trip fidelity only;
/// never converted to renderable geometry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BezierCurvePrimitive {
    pub id: usize,
    pub indices: Vec<i32>,
    pub order: i32,
    pub knots: Vec<i32>,
}

/// A NURBS curve primitive. Recognized for round-trip fidelity only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NurbCurvePrimitive {
    pub id: usize,
    pub indices: Vec<i32>,
    pub order: i32,
    pub end_interpolation: bool,
    pub knots: Vec<i32>,
}

/// A named subset of points, by explicit point id list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointGroup {
    pub name: String,
    pub ids: Vec<i32>,
}

/// A named subset of primitives, by explicit primitive id list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimitiveGroup {
    pub name: String,
    pub ids: Vec<i32>,
}

/// A named set of edges, stored as point-index pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeGroup {
    pub name: String,
    pub point_pairs: Vec<[i32; 2]>,
}

mod geo_date {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(de)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// The `info` block of a GEO file. On the wire this is a plain JSON
/// object, unlike the rest of the format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(with = "geo_date")]
    pub date: NaiveDateTime,
    pub timetocook: f32,
    pub software: String,
    pub artist: String,
    pub hostname: String,
    #[serde(default)]
    pub time: f32,
    /// Bounding box as min.x, min.y, min.z, max.x, max.y, max.z. The
    /// component order is part of the wire contract.
    pub bounds: [f32; 6],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primcount_summary: Option<String>,
    pub attribute_summary: String,
}

impl Default for FileInfo {
    fn default() -> Self {
        Self {
            date: chrono::Local::now().naive_local(),
            timetocook: 0.0,
            software: format!("hgeo_core {}", env!("CARGO_PKG_VERSION")),
            artist: String::new(),
            hostname: String::new(),
            time: 0.0,
            bounds: [0.0; 6],
            primcount_summary: None,
            attribute_summary: String::new(),
        }
    }
}

/// The aggregate root: everything a GEO file describes.
///
/// Constructed empty via [`HoudiniGeo::new`] or by a decode pass, mutated
/// in place by the authoring helpers in [`crate::points`], and treated as
/// immutable by the mesh builder. `point_refs[v]` maps every vertex index
/// to its owning point and is always in `[0, point_count)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HoudiniGeo {
    pub file_version: String,
    pub has_index: bool,
    pub point_count: usize,
    pub vertex_count: usize,
    pub primitive_count: usize,
    pub info: FileInfo,

    pub point_refs: Vec<i32>,

    pub attributes: Vec<Attribute>,

    pub poly_primitives: Vec<PolyPrimitive>,
    pub bezier_curve_primitives: Vec<BezierCurvePrimitive>,
    pub nurb_curve_primitives: Vec<NurbCurvePrimitive>,

    pub point_groups: Vec<PointGroup>,
    pub primitive_groups: Vec<PrimitiveGroup>,
    pub edge_groups: Vec<EdgeGroup>,
}

impl HoudiniGeo {
    /// Create an empty container with default file info.
    pub fn new() -> Self {
        Self {
            file_version: "18.5.408".to_string(),
            ..Default::default()
        }
    }

    /// Number of elements an attribute of the given owner indexes over.
    pub fn element_count(&self, owner: AttributeOwner) -> usize {
        match owner {
            AttributeOwner::Vertex => self.vertex_count,
            AttributeOwner::Point => self.point_count,
            AttributeOwner::Primitive => self.primitive_count,
            AttributeOwner::Detail => 1,
        }
    }

    /// Find an attribute by name alone.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Find an attribute by name and type, optionally restricted to one
    /// owner class (`None` matches any owner).
    pub fn find_attribute(
        &self,
        name: &str,
        kind: AttributeType,
        owner: Option<AttributeOwner>,
    ) -> Option<&Attribute> {
        self.attributes.iter().find(|a| {
            a.name == name && a.kind == kind && owner.map_or(true, |o| a.owner == o)
        })
    }

    pub fn has_attribute(&self, name: &str, owner: Option<AttributeOwner>) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name == name && owner.map_or(true, |o| a.owner == o))
    }
}

/// Triangulate a polygon's vertex-index list with a naive fan from the
/// first vertex. Faces with three or fewer indices are returned verbatim,
/// degenerate 1- and 2-vertex faces included; validating faces is the
/// caller's job.
///
/// The fan is wrong for non-convex and bowtie polygons. That matches the
/// behavior existing GEO consumers expect, so it is kept as-is.
pub fn triangulate_ngon(indices: &[i32]) -> Vec<i32> {
    if indices.len() <= 3 {
        return indices.to_vec();
    }

    let mut triangles = Vec::with_capacity((indices.len() - 2) * 3);
    for offset in 1..indices.len() - 1 {
        triangles.push(indices[0]);
        triangles.push(indices[offset]);
        triangles.push(indices[offset + 1]);
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangulate_triangle_passthrough() {
        assert_eq!(triangulate_ngon(&[0, 1, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn test_triangulate_degenerate_passthrough() {
        assert_eq!(triangulate_ngon(&[0, 1]), vec![0, 1]);
        assert_eq!(triangulate_ngon(&[7]), vec![7]);
        assert_eq!(triangulate_ngon(&[]), Vec::<i32>::new());
    }

    #[test]
    fn test_triangulate_quad() {
        assert_eq!(triangulate_ngon(&[0, 1, 2, 3]), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_triangulate_pentagon_fan() {
        assert_eq!(
            triangulate_ngon(&[0, 1, 2, 3, 4]),
            vec![0, 1, 2, 0, 2, 3, 0, 3, 4]
        );
    }

    #[test]
    fn test_attribute_tuple_accessors() {
        let mut attr = Attribute::new("P", AttributeType::Float, AttributeOwner::Point, 3);
        attr.float_values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        assert_eq!(attr.element_count(), 2);
        let v = attr.vec3_values().unwrap();
        assert_eq!(v, vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)]);

        let v2 = attr.vec2_values().unwrap();
        assert_eq!(v2[1], Vec2::new(4.0, 5.0));

        // Requesting a wider tuple than stored degrades to None.
        assert!(attr.vec4_values().is_none());
    }

    #[test]
    fn test_attribute_type_mismatch_degrades() {
        let mut attr = Attribute::new("id", AttributeType::Integer, AttributeOwner::Point, 1);
        attr.int_values = vec![3, 1, 4];

        assert!(attr.f32_values().is_none());
        assert_eq!(attr.i32_values().unwrap(), &[3, 1, 4]);
    }

    #[test]
    fn test_color_alpha_default() {
        let mut rgb = Attribute::new("Cd", AttributeType::Float, AttributeOwner::Point, 3);
        rgb.float_values = vec![0.1, 0.2, 0.3];
        assert_eq!(rgb.color_values().unwrap()[0], Vec4::new(0.1, 0.2, 0.3, 1.0));

        let mut rgba = Attribute::new("Cd", AttributeType::Float, AttributeOwner::Point, 4);
        rgba.float_values = vec![0.1, 0.2, 0.3, 0.5];
        assert_eq!(
            rgba.color_values().unwrap()[0],
            Vec4::new(0.1, 0.2, 0.3, 0.5)
        );
    }

    #[test]
    fn test_find_attribute_by_owner() {
        let mut geo = HoudiniGeo::new();
        geo.attributes.push(Attribute::new(
            "N",
            AttributeType::Float,
            AttributeOwner::Point,
            3,
        ));
        geo.attributes.push(Attribute::new(
            "N",
            AttributeType::Float,
            AttributeOwner::Primitive,
            3,
        ));

        let any = geo.find_attribute("N", AttributeType::Float, None).unwrap();
        assert_eq!(any.owner, AttributeOwner::Point);

        let prim = geo
            .find_attribute("N", AttributeType::Float, Some(AttributeOwner::Primitive))
            .unwrap();
        assert_eq!(prim.owner, AttributeOwner::Primitive);

        assert!(geo
            .find_attribute("N", AttributeType::Integer, None)
            .is_none());
    }
}
