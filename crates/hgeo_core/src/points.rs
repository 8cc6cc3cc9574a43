//! Programmatic authoring of point clouds.
//!
//! A [`PointSchema`] describes how to pull attribute values out of a
//! caller's point type; [`HoudiniGeo::add_points`] then appends a batch
//! of such points, creating the point attributes and groups on first use
//! and keeping every point attribute aligned with the point count.
//! Spatial fields (`P`, `N`, `up`, `orient`) are authored in engine space
//! and stored in GEO space.

use glam::{Quat, Vec2, Vec3, Vec4};

use crate::geo::{
    Attribute, AttributeOwner, AttributeType, HoudiniGeo, PointGroup, NORMAL_ATTR_NAME,
    POS_ATTR_NAME, ROTATION_ATTR_NAME, UP_ATTR_NAME,
};
use crate::units;

/// A single attribute value for one element.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Float(f32),
    Int(i32),
    /// Stored as an integer 0/1.
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Quat(Quat),
    Str(String),
}

impl AttrValue {
    /// The attribute type and tuple size this value occupies.
    fn type_and_size(&self) -> (AttributeType, usize) {
        match self {
            AttrValue::Float(_) => (AttributeType::Float, 1),
            AttrValue::Int(_) | AttrValue::Bool(_) => (AttributeType::Integer, 1),
            AttrValue::Vec2(_) => (AttributeType::Float, 2),
            AttrValue::Vec3(_) => (AttributeType::Float, 3),
            AttrValue::Vec4(_) | AttrValue::Quat(_) => (AttributeType::Float, 4),
            AttrValue::Str(_) => (AttributeType::String, 1),
        }
    }
}

struct Field<P> {
    name: String,
    get: Box<dyn Fn(&P) -> AttrValue>,
}

struct GroupField<P> {
    name: String,
    member: Box<dyn Fn(&P) -> bool>,
}

/// Maps a caller's point type onto point attributes, detail attributes
/// and point groups. Built once, reused for every batch.
pub struct PointSchema<P> {
    fields: Vec<Field<P>>,
    details: Vec<(String, AttrValue)>,
    groups: Vec<GroupField<P>>,
}

impl<P> Default for PointSchema<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PointSchema<P> {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            details: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// A per-point attribute. Every point in a batch must yield the same
    /// [`AttrValue`] variant for the field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&P) -> AttrValue + 'static,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            get: Box::new(get),
        });
        self
    }

    /// A detail attribute with one value for the whole file, rewritten on
    /// every batch.
    pub fn detail(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.details.push((name.into(), value));
        self
    }

    /// A point group; members are chosen per point.
    pub fn group(mut self, name: impl Into<String>, member: impl Fn(&P) -> bool + 'static) -> Self {
        self.groups.push(GroupField {
            name: name.into(),
            member: Box::new(member),
        });
        self
    }
}

impl HoudiniGeo {
    /// Append a batch of points described by `schema`.
    ///
    /// Attributes new to this batch are back-filled with default values
    /// for the points that already exist, and point attributes the schema
    /// does not mention are padded forward, so every point attribute ends
    /// up with exactly one tuple per point. Group membership ids are
    /// global point ids, valid across batches.
    pub fn add_points<P>(&mut self, points: &[P], schema: &PointSchema<P>) {
        if points.is_empty() {
            return;
        }
        let start = self.point_count;

        for field in &schema.fields {
            let (kind, tuple_size) = (field.get)(&points[0]).type_and_size();
            let index = match self
                .attributes
                .iter()
                .position(|a| a.name == field.name && a.owner == AttributeOwner::Point)
            {
                Some(i) => i,
                None => {
                    let mut attr =
                        Attribute::new(&field.name, kind, AttributeOwner::Point, tuple_size);
                    pad_defaults(&mut attr, start);
                    self.attributes.push(attr);
                    self.attributes.len() - 1
                }
            };

            let attr = &mut self.attributes[index];
            if attr.kind != kind || attr.tuple_size != tuple_size {
                log::error!(
                    "point attribute '{}' already exists with a different shape, skipping field",
                    field.name
                );
                continue;
            }
            for point in points {
                push_value(attr, (field.get)(point));
            }
        }

        // Attributes the schema did not mention still need one tuple per
        // new point.
        let total = start + points.len();
        for attr in self
            .attributes
            .iter_mut()
            .filter(|a| a.owner == AttributeOwner::Point)
        {
            let have = attr.element_count();
            if have < total {
                pad_defaults(attr, total - have);
            }
        }

        for (name, value) in &schema.details {
            self.set_detail(name, value.clone());
        }

        for group_field in &schema.groups {
            let ids: Vec<i32> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| (group_field.member)(p))
                .map(|(i, _)| (start + i) as i32)
                .collect();
            if ids.is_empty() {
                continue;
            }
            match self
                .point_groups
                .iter_mut()
                .find(|g| g.name == group_field.name)
            {
                Some(group) => group.ids.extend(ids),
                None => self.point_groups.push(PointGroup {
                    name: group_field.name.clone(),
                    ids,
                }),
            }
        }

        self.point_count = total;
    }

    /// Set a detail attribute to a single value, creating it on first use.
    pub fn set_detail(&mut self, name: &str, value: AttrValue) {
        let (kind, tuple_size) = value.type_and_size();
        let index = match self
            .attributes
            .iter()
            .position(|a| a.name == name && a.owner == AttributeOwner::Detail)
        {
            Some(i) => i,
            None => {
                self.attributes
                    .push(Attribute::new(name, kind, AttributeOwner::Detail, tuple_size));
                self.attributes.len() - 1
            }
        };

        let attr = &mut self.attributes[index];
        if attr.kind != kind || attr.tuple_size != tuple_size {
            log::error!("detail attribute '{name}' already exists with a different shape");
            return;
        }
        attr.float_values.clear();
        attr.int_values.clear();
        attr.string_values.clear();
        push_value(attr, value);
    }
}

/// Fields with spatial meaning are authored in engine space and stored in
/// GEO space.
fn translate_spatial(name: &str, value: AttrValue) -> AttrValue {
    match (name, value) {
        (POS_ATTR_NAME, AttrValue::Vec3(v)) => AttrValue::Vec3(units::to_houdini_position(v)),
        (NORMAL_ATTR_NAME | UP_ATTR_NAME, AttrValue::Vec3(v)) => {
            AttrValue::Vec3(units::to_houdini_direction(v))
        }
        (ROTATION_ATTR_NAME, AttrValue::Quat(q)) => {
            AttrValue::Quat(units::to_houdini_rotation(q))
        }
        (_, value) => value,
    }
}

fn push_value(attr: &mut Attribute, value: AttrValue) {
    match translate_spatial(&attr.name, value) {
        AttrValue::Float(v) if shape_is(attr, AttributeType::Float, 1) => {
            attr.float_values.push(v)
        }
        AttrValue::Int(v) if shape_is(attr, AttributeType::Integer, 1) => attr.int_values.push(v),
        AttrValue::Bool(v) if shape_is(attr, AttributeType::Integer, 1) => {
            attr.int_values.push(v as i32)
        }
        AttrValue::Vec2(v) if shape_is(attr, AttributeType::Float, 2) => {
            attr.float_values.extend([v.x, v.y])
        }
        AttrValue::Vec3(v) if shape_is(attr, AttributeType::Float, 3) => {
            attr.float_values.extend([v.x, v.y, v.z])
        }
        AttrValue::Vec4(v) if shape_is(attr, AttributeType::Float, 4) => {
            attr.float_values.extend([v.x, v.y, v.z, v.w])
        }
        AttrValue::Quat(q) if shape_is(attr, AttributeType::Float, 4) => {
            attr.float_values.extend([q.x, q.y, q.z, q.w])
        }
        AttrValue::Str(s) if shape_is(attr, AttributeType::String, 1) => {
            attr.string_values.push(s)
        }
        other => {
            log::error!(
                "value {other:?} does not fit attribute '{}', writing a default",
                attr.name
            );
            pad_defaults(attr, 1);
        }
    }
}

fn shape_is(attr: &Attribute, kind: AttributeType, tuple_size: usize) -> bool {
    attr.kind == kind && attr.tuple_size == tuple_size
}

fn pad_defaults(attr: &mut Attribute, elements: usize) {
    match attr.kind {
        AttributeType::Float => attr
            .float_values
            .extend(std::iter::repeat(0.0).take(elements * attr.tuple_size)),
        AttributeType::Integer => attr
            .int_values
            .extend(std::iter::repeat(0).take(elements * attr.tuple_size)),
        AttributeType::String => attr
            .string_values
            .extend(std::iter::repeat_with(String::new).take(elements)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        position: Vec3,
        heat: f32,
        label: &'static str,
    }

    fn schema() -> PointSchema<Sample> {
        PointSchema::new()
            .field(POS_ATTR_NAME, |p: &Sample| AttrValue::Vec3(p.position))
            .field("heat", |p: &Sample| AttrValue::Float(p.heat))
            .field("label", |p: &Sample| AttrValue::Str(p.label.to_string()))
            .group("hot", |p: &Sample| p.heat > 0.5)
    }

    fn batch() -> Vec<Sample> {
        vec![
            Sample {
                position: Vec3::new(100.0, 0.0, 0.0),
                heat: 0.9,
                label: "a",
            },
            Sample {
                position: Vec3::new(0.0, 200.0, 0.0),
                heat: 0.1,
                label: "b",
            },
        ]
    }

    #[test]
    fn test_add_points_creates_attributes() {
        let mut geo = HoudiniGeo::new();
        geo.add_points(&batch(), &schema());

        assert_eq!(geo.point_count, 2);
        let p = geo.attribute(POS_ATTR_NAME).unwrap();
        assert_eq!(p.owner, AttributeOwner::Point);
        assert_eq!(p.element_count(), 2);
        // Engine (100, 0, 0) lands at GEO (-10000, 0, 0).
        assert_eq!(&p.float_values[..3], &[-10000.0, 0.0, 0.0]);
        assert_eq!(&p.float_values[3..], &[0.0, 20000.0, 0.0]);

        assert_eq!(
            geo.attribute("label").unwrap().string_values,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_group_ids_are_global() {
        let mut geo = HoudiniGeo::new();
        geo.add_points(&batch(), &schema());
        geo.add_points(&batch(), &schema());

        assert_eq!(geo.point_count, 4);
        assert_eq!(geo.point_groups.len(), 1);
        // Only the hot point of each batch is a member.
        assert_eq!(geo.point_groups[0].ids, vec![0, 2]);
    }

    #[test]
    fn test_new_attribute_backfills_existing_points() {
        let mut geo = HoudiniGeo::new();
        let bare: PointSchema<Sample> =
            PointSchema::new().field(POS_ATTR_NAME, |p: &Sample| AttrValue::Vec3(p.position));
        geo.add_points(&batch(), &bare);
        geo.add_points(&batch(), &schema());

        let heat = geo.attribute("heat").unwrap();
        assert_eq!(heat.element_count(), 4);
        // The first batch had no heat field; its points read as zero.
        assert_eq!(heat.float_values, vec![0.0, 0.0, 0.9, 0.1]);
    }

    #[test]
    fn test_unmentioned_attribute_pads_forward() {
        let mut geo = HoudiniGeo::new();
        geo.add_points(&batch(), &schema());

        let bare: PointSchema<Sample> =
            PointSchema::new().field(POS_ATTR_NAME, |p: &Sample| AttrValue::Vec3(p.position));
        geo.add_points(&batch(), &bare);

        let label = geo.attribute("label").unwrap();
        assert_eq!(
            label.string_values,
            vec!["a".to_string(), "b".to_string(), String::new(), String::new()]
        );
    }

    #[test]
    fn test_shape_conflict_skips_field() {
        let mut geo = HoudiniGeo::new();
        geo.add_points(&batch(), &schema());

        let conflicting: PointSchema<Sample> =
            PointSchema::new().field("heat", |p: &Sample| AttrValue::Int(p.heat as i32));
        geo.add_points(&batch(), &conflicting);

        let heat = geo.attribute("heat").unwrap();
        assert_eq!(heat.kind, AttributeType::Float);
        // The conflicting batch contributes padded defaults instead.
        assert_eq!(heat.float_values, vec![0.9, 0.1, 0.0, 0.0]);
    }

    #[test]
    fn test_detail_attribute_is_single_valued() {
        let mut geo = HoudiniGeo::new();
        let schema = schema().detail("source", AttrValue::Str("simulation".to_string()));
        geo.add_points(&batch(), &schema);
        geo.add_points(&batch(), &schema);

        let source = geo.attribute("source").unwrap();
        assert_eq!(source.owner, AttributeOwner::Detail);
        assert_eq!(source.string_values, vec!["simulation".to_string()]);
    }

    #[test]
    fn test_rotation_field_is_mirrored() {
        struct Oriented {
            orient: Quat,
        }
        let schema: PointSchema<Oriented> =
            PointSchema::new().field(ROTATION_ATTR_NAME, |p: &Oriented| AttrValue::Quat(p.orient));

        let mut geo = HoudiniGeo::new();
        geo.add_points(
            &[Oriented {
                orient: Quat::from_xyzw(0.1, 0.2, 0.3, 0.927),
            }],
            &schema,
        );

        let orient = geo.attribute(ROTATION_ATTR_NAME).unwrap();
        assert_eq!(orient.tuple_size, 4);
        assert_eq!(orient.float_values, vec![0.1, -0.2, -0.3, 0.927]);
    }
}
