//! GEO file encoder.
//!
//! Serializes a [`HoudiniGeo`] container back into the positional
//! array-as-map JSON layout the decoder accepts. The output round-trips:
//! decoding it yields a container equal to the input, except for edge
//! groups, which have no wire form here and are skipped with a warning.

use serde_json::{json, Value};

use super::{ATTRIBUTE_GROUPS, GROUP_RLE_THRESHOLD};
use crate::geo::{
    Attribute, AttributeType, HoudiniGeo, COLOR_ATTR_NAME, NORMAL_ATTR_NAME, POS_ATTR_NAME,
};

/// Builder for the alternating key/value arrays the format uses in place
/// of JSON objects.
#[derive(Default)]
struct KvArray(Vec<Value>);

impl KvArray {
    fn new() -> Self {
        Self::default()
    }

    fn entry(mut self, key: &str, value: Value) -> Self {
        self.0.push(Value::from(key));
        self.0.push(value);
        self
    }

    fn build(self) -> Value {
        Value::Array(self.0)
    }
}

/// Encode a container as pretty-printed GEO JSON.
pub fn encode(geo: &HoudiniGeo) -> serde_json::Result<String> {
    let mut root = KvArray::new()
        .entry("fileversion", json!(geo.file_version))
        .entry("hasindex", json!(geo.has_index))
        .entry("pointcount", json!(geo.point_count))
        .entry("vertexcount", json!(geo.vertex_count))
        .entry("primitivecount", json!(geo.primitive_count))
        .entry("info", serde_json::to_value(&geo.info)?)
        .entry("topology", encode_topology(geo))
        .entry("attributes", encode_attributes(geo))
        .entry("primitives", encode_primitives(geo));

    if !geo.point_groups.is_empty() {
        let groups = geo
            .point_groups
            .iter()
            .map(|g| encode_selection_group(&g.name, "point", &g.ids, geo.point_count))
            .collect();
        root = root.entry("pointgroups", Value::Array(groups));
    }

    if !geo.primitive_groups.is_empty() {
        let groups = geo
            .primitive_groups
            .iter()
            .map(|g| encode_selection_group(&g.name, "primitive", &g.ids, geo.primitive_count))
            .collect();
        root = root.entry("primitivegroups", Value::Array(groups));
    }

    for group in &geo.edge_groups {
        log::warn!("edge group '{}' has no wire encoding and was not written", group.name);
    }

    serde_json::to_string_pretty(&root.build())
}

fn encode_topology(geo: &HoudiniGeo) -> Value {
    KvArray::new()
        .entry(
            "pointref",
            KvArray::new().entry("indices", json!(geo.point_refs)).build(),
        )
        .build()
}

fn encode_attributes(geo: &HoudiniGeo) -> Value {
    let mut groups = KvArray::new();
    for (group_key, owner) in ATTRIBUTE_GROUPS {
        let members: Vec<Value> = geo
            .attributes
            .iter()
            .filter(|a| a.owner == owner)
            .map(encode_attribute)
            .collect();
        if !members.is_empty() {
            groups = groups.entry(group_key, Value::Array(members));
        }
    }
    groups.build()
}

fn encode_attribute(attr: &Attribute) -> Value {
    let type_key = match attr.kind {
        AttributeType::Float | AttributeType::Integer => "numeric",
        AttributeType::String => "string",
    };
    let header = KvArray::new()
        .entry("scope", json!("public"))
        .entry("type", json!(type_key))
        .entry("name", json!(attr.name))
        .entry("options", attribute_options(&attr.name))
        .build();

    let body = match attr.kind {
        AttributeType::Float => encode_float_body(attr),
        AttributeType::Integer => encode_int_body(attr),
        AttributeType::String => encode_string_body(attr),
    };

    json!([header, body])
}

/// Header options for the attribute names Houdini expects to carry a type
/// hint; everything else gets an empty options object.
fn attribute_options(name: &str) -> Value {
    let hint = match name {
        POS_ATTR_NAME => Some("point"),
        NORMAL_ATTR_NAME => Some("normal"),
        COLOR_ATTR_NAME => Some("color"),
        _ => None,
    };
    match hint {
        Some(hint) => json!({"type": {"type": "string", "value": hint}}),
        None => json!({}),
    }
}

fn encode_float_body(attr: &Attribute) -> Value {
    // Size-1 attributes store their raw values under "arrays", wider
    // tuples under "tuples".
    let values = if attr.tuple_size == 1 {
        KvArray::new()
            .entry("size", json!(1))
            .entry("storage", json!("fpreal64"))
            .entry("arrays", json!([attr.float_values]))
    } else {
        let tuples: Vec<&[f32]> = attr.float_values.chunks_exact(attr.tuple_size).collect();
        KvArray::new()
            .entry("size", json!(attr.tuple_size))
            .entry("storage", json!("fpreal64"))
            .entry("tuples", json!(tuples))
    };

    KvArray::new()
        .entry("size", json!(attr.tuple_size))
        .entry("storage", json!("fpreal64"))
        .entry("defaults", default_values_block())
        .entry("values", values.build())
        .build()
}

fn encode_int_body(attr: &Attribute) -> Value {
    KvArray::new()
        .entry("size", json!(attr.tuple_size))
        .entry("storage", json!("int32"))
        .entry("defaults", default_values_block())
        .entry(
            "values",
            KvArray::new()
                .entry("size", json!(attr.tuple_size))
                .entry("storage", json!("int32"))
                .entry("arrays", json!([attr.int_values]))
                .build(),
        )
        .build()
}

fn default_values_block() -> Value {
    KvArray::new()
        .entry("size", json!(1))
        .entry("storage", json!("fpreal64"))
        .entry("values", json!([0.0]))
        .build()
}

/// String values are deduplicated into a table ordered by first
/// occurrence, with per-element indices into that table.
fn encode_string_body(attr: &Attribute) -> Value {
    let mut strings: Vec<&str> = Vec::new();
    let mut indices = Vec::with_capacity(attr.string_values.len());
    for value in &attr.string_values {
        let index = match strings.iter().position(|s| s == value) {
            Some(i) => i,
            None => {
                strings.push(value);
                strings.len() - 1
            }
        };
        indices.push(index);
    }

    KvArray::new()
        .entry("size", json!(attr.tuple_size))
        .entry("storage", json!("int32"))
        .entry("strings", json!(strings))
        .entry(
            "indices",
            KvArray::new()
                .entry("size", json!(1))
                .entry("storage", json!("int32"))
                .entry("arrays", json!([indices]))
                .build(),
        )
        .build()
}

fn encode_primitives(geo: &HoudiniGeo) -> Value {
    let mut blocks = Vec::new();

    if !geo.poly_primitives.is_empty() {
        let header = KvArray::new()
            .entry("type", json!("run"))
            .entry("runtype", json!("Poly"))
            .entry("varyingfields", json!(["vertex"]))
            .entry("uniformfields", json!({"closed": true}))
            .build();
        let body: Vec<Value> = geo
            .poly_primitives
            .iter()
            .map(|p| json!([p.indices]))
            .collect();
        blocks.push(json!([header, Value::Array(body)]));
    }

    if !geo.bezier_curve_primitives.is_empty() {
        let header = curve_run_header("BezierCurve");
        let body: Vec<Value> = geo
            .bezier_curve_primitives
            .iter()
            .map(|c| {
                let basis = KvArray::new()
                    .entry("type", json!("Bezier"))
                    .entry("order", json!(c.order))
                    .entry("knots", json!(c.knots))
                    .build();
                json!([c.indices, basis])
            })
            .collect();
        blocks.push(json!([header, Value::Array(body)]));
    }

    if !geo.nurb_curve_primitives.is_empty() {
        let header = curve_run_header("NURBCurve");
        let body: Vec<Value> = geo
            .nurb_curve_primitives
            .iter()
            .map(|c| {
                let basis = KvArray::new()
                    .entry("type", json!("NURBS"))
                    .entry("order", json!(c.order))
                    .entry("endinterpolation", json!(c.end_interpolation))
                    .entry("knots", json!(c.knots))
                    .build();
                json!([c.indices, basis])
            })
            .collect();
        blocks.push(json!([header, Value::Array(body)]));
    }

    Value::Array(blocks)
}

fn curve_run_header(runtype: &str) -> Value {
    KvArray::new()
        .entry("type", json!("run"))
        .entry("runtype", json!(runtype))
        .entry("varyingfields", json!(["vertex", "basis"]))
        .entry("uniformfields", json!({"closed": false}))
        .build()
}

/// Encode a group membership over `element_count` elements. Short ranges
/// are written as a flat 0/1 array (`i8`), longer ones as alternating
/// (length, value) runs (`boolRLE`).
fn encode_selection_group(name: &str, class: &str, ids: &[i32], element_count: usize) -> Value {
    let mut member = vec![false; element_count];
    for &id in ids {
        match usize::try_from(id) {
            Ok(i) if i < element_count => member[i] = true,
            _ => log::warn!("group '{name}' id {id} is out of range and was dropped"),
        }
    }

    let encoded = if element_count < GROUP_RLE_THRESHOLD {
        let flags: Vec<u8> = member.iter().map(|&m| m as u8).collect();
        KvArray::new().entry("i8", json!(flags))
    } else {
        let mut runs = Vec::new();
        let mut run_value = false;
        let mut run_length = 0usize;
        for &m in &member {
            if m == run_value {
                run_length += 1;
            } else {
                if run_length > 0 {
                    runs.push(json!(run_length));
                    runs.push(json!(run_value));
                }
                run_value = m;
                run_length = 1;
            }
        }
        if run_length > 0 {
            runs.push(json!(run_length));
            runs.push(json!(run_value));
        }
        KvArray::new().entry("boolRLE", Value::Array(runs))
    };

    let header = KvArray::new()
        .entry("name", json!(name))
        .entry("type", json!(class))
        .build();
    let body = KvArray::new()
        .entry(
            "selection",
            KvArray::new().entry("unordered", encoded.build()).build(),
        )
        .build();
    json!([header, body])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::decode;
    use crate::geo::{
        AttributeOwner, BezierCurvePrimitive, NurbCurvePrimitive, PointGroup, PolyPrimitive,
        PrimitiveGroup, MATERIAL_ATTR_NAME,
    };
    use chrono::NaiveDateTime;

    fn sample_geo() -> HoudiniGeo {
        let mut geo = HoudiniGeo::new();
        geo.point_count = 8;
        geo.vertex_count = 8;
        geo.primitive_count = 2;
        geo.point_refs = (0..8).collect();

        geo.info.date =
            NaiveDateTime::parse_from_str("2021-03-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        geo.info.software = "Houdini 18.5.408".to_string();
        geo.info.bounds = [-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

        let mut pos = Attribute::new(POS_ATTR_NAME, AttributeType::Float, AttributeOwner::Point, 3);
        pos.float_values = (0..24).map(|i| i as f32 * 0.5).collect();
        geo.attributes.push(pos);

        let mut id = Attribute::new("id", AttributeType::Integer, AttributeOwner::Point, 1);
        id.int_values = (0..8).rev().collect();
        geo.attributes.push(id);

        let mut mat = Attribute::new(
            MATERIAL_ATTR_NAME,
            AttributeType::String,
            AttributeOwner::Primitive,
            1,
        );
        mat.string_values = vec!["/mat/red".to_string(), "/mat/blue".to_string()];
        geo.attributes.push(mat);

        geo.poly_primitives.push(PolyPrimitive::new(0, vec![0, 1, 2, 3]));
        geo.poly_primitives.push(PolyPrimitive::new(1, vec![4, 5, 6, 7]));
        geo
    }

    #[test]
    fn test_roundtrip_preserves_container() {
        let geo = sample_geo();
        let text = encode(&geo).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, geo);
    }

    #[test]
    fn test_roundtrip_curves() {
        let mut geo = sample_geo();
        geo.primitive_count = 4;
        geo.bezier_curve_primitives.push(BezierCurvePrimitive {
            id: 2,
            indices: vec![0, 1, 2, 3],
            order: 4,
            knots: vec![0, 1],
        });
        geo.nurb_curve_primitives.push(NurbCurvePrimitive {
            id: 3,
            indices: vec![4, 5, 6],
            order: 3,
            end_interpolation: true,
            knots: vec![0, 0, 0, 1, 1, 1],
        });

        let decoded = decode(&encode(&geo).unwrap()).unwrap();
        assert_eq!(decoded.bezier_curve_primitives, geo.bezier_curve_primitives);
        assert_eq!(decoded.nurb_curve_primitives, geo.nurb_curve_primitives);
    }

    #[test]
    fn test_string_table_deduplicates_by_first_occurrence() {
        let mut geo = sample_geo();
        geo.primitive_count = 5;
        geo.attributes[2].string_values = vec![
            "/mat/red".to_string(),
            "/mat/blue".to_string(),
            "/mat/red".to_string(),
            "/mat/green".to_string(),
            "/mat/blue".to_string(),
        ];
        for id in 2..5 {
            geo.poly_primitives
                .push(PolyPrimitive::new(id, vec![0, 1, 2]));
        }

        let text = encode(&geo).unwrap();
        // Each distinct string appears once in the table, nowhere else.
        assert_eq!(text.matches("/mat/red").count(), 1);
        assert_eq!(text.matches("/mat/blue").count(), 1);
        assert_eq!(text.matches("/mat/green").count(), 1);

        let decoded = decode(&text).unwrap();
        assert_eq!(
            decoded.attribute(MATERIAL_ATTR_NAME).unwrap().string_values,
            geo.attributes[2].string_values
        );
    }

    #[test]
    fn test_small_group_uses_flat_flags() {
        let mut geo = sample_geo();
        geo.point_groups.push(PointGroup {
            name: "corners".to_string(),
            ids: vec![0, 7],
        });

        let text = encode(&geo).unwrap();
        assert!(text.contains("\"i8\""));
        assert!(!text.contains("boolRLE"));

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.point_groups, geo.point_groups);
    }

    #[test]
    fn test_large_group_uses_bool_rle() {
        let mut geo = sample_geo();
        geo.point_count = 20;
        geo.vertex_count = 20;
        geo.point_refs = (0..20).collect();
        geo.attributes[0].float_values = (0..60).map(|i| i as f32).collect();
        geo.attributes[1].int_values = (0..20).collect();
        geo.point_groups.push(PointGroup {
            name: "band".to_string(),
            ids: vec![0, 1, 2, 10, 11, 19],
        });

        let text = encode(&geo).unwrap();
        assert!(text.contains("boolRLE"));

        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.point_groups[0].ids, vec![0, 1, 2, 10, 11, 19]);
    }

    #[test]
    fn test_primitive_group_roundtrip() {
        let mut geo = sample_geo();
        geo.primitive_groups.push(PrimitiveGroup {
            name: "walls".to_string(),
            ids: vec![1],
        });

        let decoded = decode(&encode(&geo).unwrap()).unwrap();
        assert_eq!(decoded.primitive_groups, geo.primitive_groups);
    }

    #[test]
    fn test_known_attribute_names_carry_type_hints() {
        let text = encode(&sample_geo()).unwrap();
        assert!(text.contains("\"value\": \"point\""));
    }
}
