//! GEO file decoder.
//!
//! Parses the JSON text into a generic [`serde_json::Value`] tree, then
//! walks it with a typed recursive-descent pass. Every positional
//! array-as-map is rebuilt into a real map before lookup; duplicate keys
//! keep the last occurrence.
//!
//! Decoding is a pure function: malformed input fails the whole call with
//! a [`DecodeError`] and no partial container, while recognized-but-
//! unsupported constructs (odd storage types, sphere primitives) are
//! skipped with a warning so the rest of the file still loads.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use super::{DecodeResult, ATTRIBUTE_GROUPS};
use crate::geo::{
    Attribute, AttributeOwner, AttributeType, BezierCurvePrimitive, EdgeGroup, FileInfo,
    HoudiniGeo, NurbCurvePrimitive, PointGroup, PolyPrimitive, PrimitiveGroup,
};

/// Errors that can occur while decoding a GEO file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GEO root element must be an array")]
    UnexpectedRoot,

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("expected {expected} at '{key}'")]
    TypeMismatch {
        expected: &'static str,
        key: String,
    },

    #[error("invalid info block: {0}")]
    Info(serde_json::Error),
}

fn mismatch(expected: &'static str, key: &str) -> DecodeError {
    DecodeError::TypeMismatch {
        expected,
        key: key.to_string(),
    }
}

/// Rebuild a positional key/value array into a map. Even indices are
/// keys, odd indices are values; a later duplicate key overwrites an
/// earlier one.
fn kv_map(values: &[Value]) -> DecodeResult<HashMap<&str, &Value>> {
    let mut map = HashMap::with_capacity(values.len() / 2);
    for pair in values.chunks_exact(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| mismatch("string key", "<key>"))?;
        map.insert(key, &pair[1]);
    }
    Ok(map)
}

fn require<'a>(map: &HashMap<&str, &'a Value>, key: &str) -> DecodeResult<&'a Value> {
    map.get(key)
        .copied()
        .ok_or_else(|| DecodeError::MissingField(key.to_string()))
}

fn as_array<'a>(value: &'a Value, key: &str) -> DecodeResult<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| mismatch("array", key))
}

fn require_array<'a>(map: &HashMap<&str, &'a Value>, key: &str) -> DecodeResult<&'a [Value]> {
    as_array(require(map, key)?, key)
}

fn require_kv<'a>(
    map: &HashMap<&str, &'a Value>,
    key: &str,
) -> DecodeResult<HashMap<&'a str, &'a Value>> {
    kv_map(require_array(map, key)?)
}

fn require_str<'a>(map: &HashMap<&str, &'a Value>, key: &str) -> DecodeResult<&'a str> {
    require(map, key)?
        .as_str()
        .ok_or_else(|| mismatch("string", key))
}

fn require_bool(map: &HashMap<&str, &Value>, key: &str) -> DecodeResult<bool> {
    require(map, key)?
        .as_bool()
        .ok_or_else(|| mismatch("boolean", key))
}

fn require_usize(map: &HashMap<&str, &Value>, key: &str) -> DecodeResult<usize> {
    require(map, key)?
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| mismatch("non-negative integer", key))
}

fn require_i32(map: &HashMap<&str, &Value>, key: &str) -> DecodeResult<i32> {
    require(map, key)?
        .as_i64()
        .map(|n| n as i32)
        .ok_or_else(|| mismatch("integer", key))
}

/// Collect every number in a possibly nested array, depth-first. The
/// format stores tuple values as arrays-of-arrays and scalar runs as flat
/// arrays; both flatten to the same sequence.
fn flatten_f32(value: &Value, key: &str, out: &mut Vec<f32>) -> DecodeResult<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_f32(item, key, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            out.push(n.as_f64().unwrap_or(0.0) as f32);
            Ok(())
        }
        _ => Err(mismatch("number array", key)),
    }
}

fn flatten_i32(value: &Value, key: &str, out: &mut Vec<i32>) -> DecodeResult<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_i32(item, key, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            let i = n.as_i64().ok_or_else(|| mismatch("integer array", key))?;
            out.push(i as i32);
            Ok(())
        }
        _ => Err(mismatch("integer array", key)),
    }
}

/// Decode a GEO document into a [`HoudiniGeo`] container.
pub fn decode(text: &str) -> DecodeResult<HoudiniGeo> {
    let root: Value = serde_json::from_str(text)?;
    let root = root.as_array().ok_or(DecodeError::UnexpectedRoot)?;
    let top = kv_map(root)?;

    let mut geo = HoudiniGeo {
        file_version: require_str(&top, "fileversion")?.to_string(),
        has_index: require_bool(&top, "hasindex")?,
        point_count: require_usize(&top, "pointcount")?,
        vertex_count: require_usize(&top, "vertexcount")?,
        primitive_count: require_usize(&top, "primitivecount")?,
        ..HoudiniGeo::new()
    };

    geo.info = parse_info(require(&top, "info")?)?;
    geo.point_refs = parse_topology(&top)?;
    if geo.point_refs.len() != geo.vertex_count {
        log::warn!(
            "topology lists {} point refs but vertexcount is {}",
            geo.point_refs.len(),
            geo.vertex_count
        );
    }

    parse_attributes(&mut geo, require(&top, "attributes")?)?;
    parse_primitives(&mut geo, require(&top, "primitives")?)?;
    parse_groups(&mut geo, &top)?;

    Ok(geo)
}

fn parse_info(value: &Value) -> DecodeResult<FileInfo> {
    if !value.is_object() {
        return Err(mismatch("object", "info"));
    }
    serde_json::from_value(value.clone()).map_err(DecodeError::Info)
}

fn parse_topology(top: &HashMap<&str, &Value>) -> DecodeResult<Vec<i32>> {
    let topology = require_kv(top, "topology")?;
    let pointref = require_kv(&topology, "pointref")?;
    let mut indices = Vec::new();
    flatten_i32(require(&pointref, "indices")?, "indices", &mut indices)?;
    Ok(indices)
}

fn parse_attributes(geo: &mut HoudiniGeo, value: &Value) -> DecodeResult<()> {
    let groups = kv_map(as_array(value, "attributes")?)?;

    for (group_key, owner) in ATTRIBUTE_GROUPS {
        let Some(entries) = groups.get(group_key) else {
            continue;
        };
        for entry in as_array(entries, group_key)? {
            if let Some(attribute) = parse_single_attribute(entry, owner)? {
                geo.attributes.push(attribute);
            }
        }
    }

    Ok(())
}

/// Parse one `[header, body]` attribute entry. Returns `Ok(None)` when
/// the attribute uses a storage or value type we do not support; decode
/// continues without it.
fn parse_single_attribute(
    entry: &Value,
    owner: AttributeOwner,
) -> DecodeResult<Option<Attribute>> {
    let blocks = as_array(entry, "attribute")?;
    if blocks.len() < 2 {
        return Err(mismatch("[header, body] pair", "attribute"));
    }
    let header = kv_map(as_array(&blocks[0], "attribute header")?)?;
    let body = kv_map(as_array(&blocks[1], "attribute body")?)?;

    let name = require_str(&header, "name")?;
    let value_type = require_str(&header, "type")?;
    let tuple_size = require_usize(&body, "size")?;

    match value_type {
        "numeric" => {
            let storage = require_str(&body, "storage")?;
            let kind = match storage {
                "int32" => AttributeType::Integer,
                "fpreal32" | "fpreal64" => AttributeType::Float,
                other => {
                    log::warn!(
                        "skipping attribute '{}': unsupported numeric storage '{}'",
                        name,
                        other
                    );
                    return Ok(None);
                }
            };

            let mut attribute = Attribute::new(name, kind, owner, tuple_size);
            let values = require_kv(&body, "values")?;
            match kind {
                AttributeType::Float => {
                    // Size-1 attributes store raw values under "arrays",
                    // wider tuples under "tuples".
                    let values_size = require_usize(&values, "size")?;
                    let values_key = if values_size == 1 { "arrays" } else { "tuples" };
                    flatten_f32(
                        require(&values, values_key)?,
                        values_key,
                        &mut attribute.float_values,
                    )?;
                }
                AttributeType::Integer => {
                    flatten_i32(
                        require(&values, "arrays")?,
                        "arrays",
                        &mut attribute.int_values,
                    )?;
                }
                AttributeType::String => unreachable!(),
            }
            Ok(Some(attribute))
        }
        "string" => {
            let mut attribute = Attribute::new(name, AttributeType::String, owner, tuple_size);

            let strings = as_array(require(&body, "strings")?, "strings")?
                .iter()
                .map(|s| s.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| mismatch("string array", "strings"))?;

            let indices_block = require_kv(&body, "indices")?;
            let mut indices = Vec::new();
            flatten_i32(require(&indices_block, "arrays")?, "arrays", &mut indices)?;

            // Dereference at decode time; out-of-range indices become
            // empty strings rather than failing the whole file.
            attribute.string_values = indices
                .iter()
                .map(|&i| {
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| strings.get(i))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            Ok(Some(attribute))
        }
        other => {
            log::warn!(
                "skipping attribute '{}': unsupported value type '{}'",
                name,
                other
            );
            Ok(None)
        }
    }
}

fn parse_primitives(geo: &mut HoudiniGeo, value: &Value) -> DecodeResult<()> {
    // Primitive ids are dense and file-ordered across every block.
    let mut next_prim_id = 0usize;

    for entry in as_array(value, "primitives")? {
        let blocks = as_array(entry, "primitive")?;
        if blocks.len() < 2 {
            return Err(mismatch("[header, body] pair", "primitive"));
        }
        let header = kv_map(as_array(&blocks[0], "primitive header")?)?;
        let body = &blocks[1];

        match require_str(&header, "type")? {
            // Houdini 16+ run-length encodings.
            "Polygon_run" | "PolygonCurve_run" => {
                parse_polygon_run(geo, body, &mut next_prim_id)?;
            }
            // Houdini 13 style: dispatch on runtype.
            "run" => match require_str(&header, "runtype")? {
                "Poly" => parse_poly_list(geo, body, &mut next_prim_id)?,
                "BezierCurve" => parse_bezier_curves(geo, body, &mut next_prim_id)?,
                "NURBCurve" => parse_nurb_curves(geo, body, &mut next_prim_id)?,
                "Sphere" => {
                    log::warn!("skipping recognized but unsupported primitive run 'Sphere'");
                }
                other => {
                    log::warn!("skipping unknown primitive runtype '{other}'");
                }
            },
            other => {
                log::warn!("skipping unknown primitive type '{other}'");
            }
        }
    }

    Ok(())
}

/// Explicit per-primitive vertex lists: the body is a list of 1-element
/// wrappers, each wrapping the primitive's verbatim vertex-index array.
fn parse_poly_list(geo: &mut HoudiniGeo, body: &Value, next_prim_id: &mut usize) -> DecodeResult<()> {
    for prim in as_array(body, "poly primitives")? {
        let wrapper = as_array(prim, "poly primitive")?;
        let first = wrapper
            .first()
            .ok_or_else(|| mismatch("vertex index array", "poly primitive"))?;
        let mut indices = Vec::new();
        flatten_i32(first, "poly primitive", &mut indices)?;

        geo.poly_primitives.push(PolyPrimitive::new(*next_prim_id, indices));
        *next_prim_id += 1;
    }
    Ok(())
}

fn non_negative(n: i32, key: &str) -> DecodeResult<usize> {
    usize::try_from(n).map_err(|_| mismatch("non-negative count", key))
}

/// Run-length-compressed polygon counts: vertex indices are synthesized
/// sequentially from `startvertex`, with per-primitive counts given either
/// one-per-primitive (`nvertices`) or as (count, repeat) pairs
/// (`nvertices_rle`).
fn parse_polygon_run(
    geo: &mut HoudiniGeo,
    body: &Value,
    next_prim_id: &mut usize,
) -> DecodeResult<()> {
    let body = kv_map(as_array(body, "polygon run body")?)?;

    let declared = require_usize(&body, "nprimitives")?;
    let mut next_vertex = require_i32(&body, "startvertex")?;
    let before = geo.poly_primitives.len();
    geo.poly_primitives.reserve(declared);

    let mut emit = |count: usize, next_prim_id: &mut usize| {
        let indices: Vec<i32> = (0..count)
            .map(|_| {
                let v = next_vertex;
                next_vertex += 1;
                v
            })
            .collect();
        geo.poly_primitives.push(PolyPrimitive::new(*next_prim_id, indices));
        *next_prim_id += 1;
    };

    if let Some(rle) = body.get("nvertices_rle") {
        let mut pairs = Vec::new();
        flatten_i32(rle, "nvertices_rle", &mut pairs)?;
        for pair in pairs.chunks_exact(2) {
            let count = non_negative(pair[0], "nvertices_rle")?;
            let repeat = non_negative(pair[1], "nvertices_rle")?;
            for _ in 0..repeat {
                emit(count, next_prim_id);
            }
        }
    } else if let Some(counts) = body.get("nvertices") {
        let mut per_prim = Vec::new();
        flatten_i32(counts, "nvertices", &mut per_prim)?;
        for count in per_prim {
            emit(non_negative(count, "nvertices")?, next_prim_id);
        }
    } else {
        log::warn!("skipping polygon run without nvertices or nvertices_rle");
        return Ok(());
    }

    let emitted = geo.poly_primitives.len() - before;
    if emitted != declared {
        log::warn!("polygon run declared {declared} primitives but encoded {emitted}");
    }

    Ok(())
}

/// Split one curve entry into its vertex-index list and its basis map.
fn curve_entry<'a>(
    prim: &'a Value,
    key: &'static str,
) -> DecodeResult<(Vec<i32>, HashMap<&'a str, &'a Value>)> {
    let fields = as_array(prim, key)?;
    if fields.len() < 2 {
        return Err(mismatch("[vertices, basis] pair", key));
    }
    let mut indices = Vec::new();
    flatten_i32(&fields[0], key, &mut indices)?;
    let basis = kv_map(as_array(&fields[1], key)?)?;
    Ok((indices, basis))
}

fn parse_bezier_curves(
    geo: &mut HoudiniGeo,
    body: &Value,
    next_prim_id: &mut usize,
) -> DecodeResult<()> {
    for prim in as_array(body, "bezier curves")? {
        let (indices, basis) = curve_entry(prim, "bezier curve")?;
        let order = require_i32(&basis, "order")?;
        let mut knots = Vec::new();
        flatten_i32(require(&basis, "knots")?, "knots", &mut knots)?;

        geo.bezier_curve_primitives.push(BezierCurvePrimitive {
            id: *next_prim_id,
            indices,
            order,
            knots,
        });
        *next_prim_id += 1;
    }
    Ok(())
}

fn parse_nurb_curves(
    geo: &mut HoudiniGeo,
    body: &Value,
    next_prim_id: &mut usize,
) -> DecodeResult<()> {
    for prim in as_array(body, "nurbs curves")? {
        let (indices, basis) = curve_entry(prim, "nurbs curve")?;
        let order = require_i32(&basis, "order")?;
        let end_interpolation = require_bool(&basis, "endinterpolation")?;
        let mut knots = Vec::new();
        flatten_i32(require(&basis, "knots")?, "knots", &mut knots)?;

        geo.nurb_curve_primitives.push(NurbCurvePrimitive {
            id: *next_prim_id,
            indices,
            order,
            end_interpolation,
            knots,
        });
        *next_prim_id += 1;
    }
    Ok(())
}

fn parse_groups(geo: &mut HoudiniGeo, top: &HashMap<&str, &Value>) -> DecodeResult<()> {
    if let Some(entries) = top.get("pointgroups") {
        for entry in as_array(entries, "pointgroups")? {
            let (name, ids) = parse_selection_group(entry, "point group")?;
            geo.point_groups.push(PointGroup { name, ids });
        }
    }

    if let Some(entries) = top.get("primitivegroups") {
        for entry in as_array(entries, "primitivegroups")? {
            let (name, ids) = parse_selection_group(entry, "primitive group")?;
            geo.primitive_groups.push(PrimitiveGroup { name, ids });
        }
    }

    if let Some(entries) = top.get("edgegroups") {
        for entry in as_array(entries, "edgegroups")? {
            let blocks = as_array(entry, "edge group")?;
            if blocks.len() < 2 {
                return Err(mismatch("[header, body] pair", "edge group"));
            }
            let header = kv_map(as_array(&blocks[0], "edge group header")?)?;
            let name = require_str(&header, "name")?.to_string();
            let body = kv_map(as_array(&blocks[1], "edge group body")?)?;

            let mut flat = Vec::new();
            flatten_i32(require(&body, "points")?, "points", &mut flat)?;
            let point_pairs = flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect();

            geo.edge_groups.push(EdgeGroup { name, point_pairs });
        }
    }

    Ok(())
}

/// Parse one point or primitive group. Membership is a boolean selection
/// over the owner's element range, stored either as a flat 0/1 array
/// (`i8`) or as alternating (length, value) runs (`boolRLE`); both expand
/// to the explicit id list the container keeps.
fn parse_selection_group(entry: &Value, key: &'static str) -> DecodeResult<(String, Vec<i32>)> {
    let blocks = as_array(entry, key)?;
    if blocks.len() < 2 {
        return Err(mismatch("[header, body] pair", key));
    }
    let header = kv_map(as_array(&blocks[0], "group header")?)?;
    let name = require_str(&header, "name")?.to_string();

    let body = kv_map(as_array(&blocks[1], "group body")?)?;
    let selection = require_kv(&body, "selection")?;
    let unordered = require_kv(&selection, "unordered")?;

    let mut ids = Vec::new();
    if let Some(rle) = unordered.get("boolRLE") {
        let runs = as_array(rle, "boolRLE")?;
        let mut next = 0i32;
        for run in runs.chunks_exact(2) {
            let length = run[0]
                .as_u64()
                .ok_or_else(|| mismatch("run length", "boolRLE"))? as i32;
            let member = run[1]
                .as_bool()
                .ok_or_else(|| mismatch("boolean run value", "boolRLE"))?;
            if member {
                ids.extend(next..next + length);
            }
            next += length;
        }
    } else if let Some(flags) = unordered.get("i8") {
        let mut flat = Vec::new();
        flatten_i32(flags, "i8", &mut flat)?;
        ids.extend(
            flat.iter()
                .enumerate()
                .filter(|(_, &flag)| flag != 0)
                .map(|(i, _)| i as i32),
        );
    } else {
        log::warn!("group '{name}' has no boolRLE or i8 selection, treating as empty");
    }

    Ok((name, ids))
}
