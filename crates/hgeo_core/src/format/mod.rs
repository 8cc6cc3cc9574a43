//! The Houdini GEO wire format.
//!
//! A GEO file is a UTF-8 JSON document whose root is an array interpreted
//! positionally as alternating key/value pairs. That array-as-ordered-map
//! convention recurs at every nesting level; [`decode`] rebuilds each such
//! array into a lookup map (later duplicate keys overwrite earlier ones)
//! and [`encode`] writes the same structure back out.

mod decode;
mod encode;

pub use decode::{decode, DecodeError};
pub use encode::encode;

use crate::geo::AttributeOwner;

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Attribute group keys as they appear in the file, paired with the owner
/// class they describe. Order matters for the encoder: groups are emitted
/// in this order.
pub(crate) const ATTRIBUTE_GROUPS: [(&str, AttributeOwner); 4] = [
    ("vertexattributes", AttributeOwner::Vertex),
    ("pointattributes", AttributeOwner::Point),
    ("primitiveattributes", AttributeOwner::Primitive),
    ("globalattributes", AttributeOwner::Detail),
];

/// Group selections over fewer elements than this are stored as a flat
/// boolean array instead of a boolean RLE.
pub(crate) const GROUP_RLE_THRESHOLD: usize = 17;
