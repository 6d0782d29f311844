//! Relations (properties and edges) as key-column-value entries.
//!
//! A vertex row holds one entry per relation:
//! - property: column `[type prefix][relation id]`, value = property payload
//! - edge: column `[type prefix][other vertex id][relation id]`, value = edge payload
//!
//! The type prefix comes from [`IdHandler`], so the category slices it
//! reports select exactly the matching relations.

use crate::graph::idhandler::{DirectionId, IdHandler, RelationCategory, TypeVisibility};
use crate::primitives::bytes::{varlong, varstring, StaticBuffer, WriteBuffer};
use crate::storage::kcv::{Entry, SliceQuery};
use crate::types::{Result, StorageError, VertexId};

/// A property or edge attached to a vertex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Relation type id.
    pub type_id: i64,
    /// Property, or the edge direction seen from the row's vertex.
    pub direction: DirectionId,
    /// Visibility class of the type.
    pub visibility: TypeVisibility,
    /// Id distinguishing relations of the same type.
    pub relation_id: i64,
    /// Vertex on the other end; `Some` exactly for edges.
    pub other_vertex: Option<VertexId>,
    /// Opaque payload.
    pub value: StaticBuffer,
}

impl Relation {
    /// A visible property.
    pub fn property(type_id: i64, relation_id: i64, value: impl Into<StaticBuffer>) -> Self {
        Self {
            type_id,
            direction: DirectionId::Property,
            visibility: TypeVisibility::Visible,
            relation_id,
            other_vertex: None,
            value: value.into(),
        }
    }

    /// A visible edge seen from one endpoint.
    pub fn edge(
        type_id: i64,
        direction: DirectionId,
        other_vertex: impl Into<VertexId>,
        relation_id: i64,
        value: impl Into<StaticBuffer>,
    ) -> Self {
        Self {
            type_id,
            direction,
            visibility: TypeVisibility::Visible,
            relation_id,
            other_vertex: Some(other_vertex.into()),
            value: value.into(),
        }
    }

    /// Replaces the visibility class.
    pub fn with_visibility(mut self, visibility: TypeVisibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Converts between [`Relation`]s and store entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelationCodec;

impl RelationCodec {
    /// Row key of `vertex`.
    pub fn vertex_key(vertex: &VertexId) -> Result<StaticBuffer> {
        let mut out = WriteBuffer::with_capacity(varstring::vertex_id_length(vertex));
        varstring::write_vertex_id(&mut out, vertex)?;
        Ok(out.into_static())
    }

    /// Encodes `relation` as an entry of its vertex row.
    pub fn write_relation(relation: &Relation) -> Result<Entry> {
        if relation.type_id <= 0 {
            return Err(StorageError::Invalid("relation type id must be positive"));
        }
        if relation.relation_id < 0 {
            return Err(StorageError::Invalid("relation id must not be negative"));
        }
        let mut column = WriteBuffer::new();
        IdHandler::write_relation_type(
            &mut column,
            relation.type_id,
            relation.direction,
            relation.visibility,
        );
        match (relation.direction.is_edge(), &relation.other_vertex) {
            (false, None) => {}
            (true, Some(other)) => varstring::write_vertex_id(&mut column, other)?,
            (false, Some(_)) => {
                return Err(StorageError::Invalid("property cannot reference another vertex"))
            }
            (true, None) => return Err(StorageError::Invalid("edge requires the other vertex")),
        }
        varlong::write_positive(&mut column, relation.relation_id);
        Ok(Entry::new(column.into_static(), relation.value.clone()))
    }

    /// Decodes an entry written by [`RelationCodec::write_relation`].
    ///
    /// # Panics
    ///
    /// On a column that this codec did not produce.
    pub fn parse(entry: &Entry) -> Relation {
        let mut input = entry.column().as_read_buffer();
        let parsed = IdHandler::read_relation_type(&mut input);
        let other_vertex = parsed
            .direction
            .is_edge()
            .then(|| varstring::read_vertex_id(&mut input));
        let relation_id = varlong::read_positive(&mut input);
        assert!(
            !input.has_remaining(),
            "relation column has {} trailing bytes",
            input.remaining()
        );
        Relation {
            type_id: parsed.type_id,
            direction: parsed.direction,
            visibility: parsed.visibility,
            relation_id,
            other_vertex,
            value: entry.value().clone(),
        }
    }

    /// Column slice selecting every relation of `category`.
    pub fn category_slice(category: RelationCategory, system_types: bool) -> SliceQuery {
        let (start, end) = IdHandler::get_bounds(category, system_types);
        SliceQuery::new(start, end)
    }

    /// Column slice selecting every relation of one type and direction.
    pub fn type_slice(
        type_id: i64,
        direction: DirectionId,
        visibility: TypeVisibility,
    ) -> SliceQuery {
        let start = IdHandler::relation_type_buffer(type_id, direction, visibility);
        let end = next_prefix(&start);
        SliceQuery::new(start, end)
    }
}

/// Smallest buffer greater than every buffer starting with `prefix`.
fn next_prefix(prefix: &StaticBuffer) -> StaticBuffer {
    let mut bytes = prefix.as_slice().to_vec();
    while let Some(last) = bytes.pop() {
        if last != u8::MAX {
            bytes.push(last + 1);
            return StaticBuffer::from(bytes);
        }
    }
    // relation prefixes never start with 0xFF
    unreachable!("prefix {prefix:?} has no successor")
}
