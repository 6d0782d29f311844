//! Graph elements on top of the key-column-value model: relation column
//! keys, relation entries and batched vertex fetching.

pub mod batch;
pub mod idhandler;
pub mod relation;

pub use batch::{BatchProcessingQueue, BatchQuery, MultiQueriableStepBatchFetcher, RelationBatchQuery};
pub use idhandler::{DirectionId, IdHandler, RelationCategory, RelationTypeParse, TypeVisibility};
pub use relation::{Relation, RelationCodec};
