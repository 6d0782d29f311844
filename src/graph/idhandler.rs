//! Column-key prefixes for relations stored under a vertex row.
//!
//! The first byte of every relation column carries a 3-bit tag: two bits of
//! visibility class followed by the relation-category bit. The direction bit
//! is folded into the low bit of the type id, which is then written with the
//! prefixed varlong codec. Columns therefore sort by visibility, then
//! category, then type id and direction, so "all properties", "all edges" and
//! "all relations" of a vertex are each one contiguous column range.

use crate::primitives::bytes::{varlong, ReadBuffer, StaticBuffer, WriteBuffer};

/// Bits of the first column byte reserved for the prefix tag.
pub const PREFIX_BIT_LEN: u32 = 3;

/// Kind of relation encoded in a column: a property or one side of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectionId {
    /// Vertex property.
    Property,
    /// Edge whose tail is the row's vertex.
    EdgeOut,
    /// Edge whose head is the row's vertex.
    EdgeIn,
}

impl DirectionId {
    /// Two-bit id: relation-category bit followed by the direction bit.
    pub const fn id(self) -> u8 {
        match self {
            DirectionId::Property => 0b00,
            DirectionId::EdgeOut => 0b10,
            DirectionId::EdgeIn => 0b11,
        }
    }

    fn relation_bit(self) -> u8 {
        self.id() >> 1
    }

    fn direction_bit(self) -> u8 {
        self.id() & 1
    }

    fn from_bits(relation_bit: u8, direction_bit: u8) -> Self {
        match (relation_bit, direction_bit) {
            (0, 0) => DirectionId::Property,
            (1, 0) => DirectionId::EdgeOut,
            (1, 1) => DirectionId::EdgeIn,
            (r, d) => panic!("malformed relation prefix: category {r}, direction {d}"),
        }
    }

    /// True for both edge directions.
    pub fn is_edge(self) -> bool {
        self.relation_bit() == 1
    }
}

/// Visibility class of a relation type, the most significant part of the
/// column sort order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeVisibility {
    /// Types defined by the system itself.
    System,
    /// User-defined types.
    #[default]
    Visible,
    /// User-defined types hidden from normal traversal.
    Invisible,
}

impl TypeVisibility {
    const fn class(self) -> u8 {
        match self {
            TypeVisibility::System => 0,
            TypeVisibility::Visible => 1,
            TypeVisibility::Invisible => 2,
        }
    }

    fn from_class(class: u8) -> Self {
        match class {
            0 => TypeVisibility::System,
            1 => TypeVisibility::Visible,
            2 => TypeVisibility::Invisible,
            other => panic!("malformed relation prefix: visibility class {other}"),
        }
    }
}

/// Column range selectors understood by [`IdHandler::get_bounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationCategory {
    /// Property columns only.
    Property,
    /// Edge columns of both directions.
    Edge,
    /// Properties followed by edges.
    Relation,
}

/// Decoded relation-type prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RelationTypeParse {
    /// Relation type id, strictly positive.
    pub type_id: i64,
    /// Property or edge direction.
    pub direction: DirectionId,
    /// Visibility class of the type.
    pub visibility: TypeVisibility,
}

/// Builds and parses relation-type column prefixes.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdHandler;

impl IdHandler {
    fn prefix(direction: DirectionId, visibility: TypeVisibility) -> u8 {
        (visibility.class() << 1) | direction.relation_bit()
    }

    fn stripped_id(type_id: i64, direction: DirectionId) -> i64 {
        assert!(type_id > 0, "relation type id must be positive, got {type_id}");
        assert!(
            type_id <= i64::MAX >> 1,
            "relation type id {type_id} overflows the direction bit"
        );
        (type_id << 1) | i64::from(direction.direction_bit())
    }

    /// Encoded length of a relation-type prefix.
    pub fn relation_type_length(type_id: i64, direction: DirectionId) -> usize {
        varlong::positive_with_prefix_length(
            Self::stripped_id(type_id, direction),
            PREFIX_BIT_LEN,
        )
    }

    /// Appends the relation-type prefix for `type_id`.
    ///
    /// # Panics
    ///
    /// If `type_id` is not positive or does not leave room for the direction bit.
    pub fn write_relation_type(
        out: &mut WriteBuffer,
        type_id: i64,
        direction: DirectionId,
        visibility: TypeVisibility,
    ) {
        varlong::write_positive_with_prefix(
            out,
            Self::stripped_id(type_id, direction),
            Self::prefix(direction, visibility),
            PREFIX_BIT_LEN,
        );
    }

    /// The relation-type prefix as its own buffer.
    pub fn relation_type_buffer(
        type_id: i64,
        direction: DirectionId,
        visibility: TypeVisibility,
    ) -> StaticBuffer {
        let mut out = WriteBuffer::with_capacity(Self::relation_type_length(type_id, direction));
        Self::write_relation_type(&mut out, type_id, direction, visibility);
        out.into_static()
    }

    /// Reads a prefix written by [`IdHandler::write_relation_type`].
    ///
    /// # Panics
    ///
    /// On a prefix no writer produces: visibility class 3 or a property
    /// column carrying a direction bit.
    pub fn read_relation_type(input: &mut ReadBuffer<'_>) -> RelationTypeParse {
        let (stripped, prefix) = varlong::read_positive_with_prefix(input, PREFIX_BIT_LEN);
        let visibility = TypeVisibility::from_class(prefix >> 1);
        let direction = DirectionId::from_bits(prefix & 1, (stripped & 1) as u8);
        RelationTypeParse {
            type_id: stripped >> 1,
            direction,
            visibility,
        }
    }

    /// `[start, end)` column bounds covering `category`, for system types
    /// or for visible user types.
    pub fn get_bounds(category: RelationCategory, system_types: bool) -> (StaticBuffer, StaticBuffer) {
        let class = if system_types {
            TypeVisibility::System.class()
        } else {
            TypeVisibility::Visible.class()
        };
        let (start, end) = match category {
            RelationCategory::Property => (0, 0),
            RelationCategory::Edge => (1, 1),
            RelationCategory::Relation => (0, 1),
        };
        let shift = 8 - PREFIX_BIT_LEN;
        let start = ((class << 1) | start) << shift;
        let end = (((class << 1) | end) + 1) << shift;
        (StaticBuffer::from_byte(start), StaticBuffer::from_byte(end))
    }

    /// Writes a type id inside a value payload, without prefix.
    pub fn write_inline_relation_type(out: &mut WriteBuffer, type_id: i64) {
        varlong::write_positive(out, type_id);
    }

    /// Reads a type id written by [`IdHandler::write_inline_relation_type`].
    pub fn read_inline_relation_type(input: &mut ReadBuffer<'_>) -> i64 {
        varlong::read_positive(input)
    }
}
