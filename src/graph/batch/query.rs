use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::graph::idhandler::RelationCategory;
use crate::graph::relation::{Relation, RelationCodec};
use crate::primitives::bytes::StaticBuffer;
use crate::storage::kcv::{
    EntryList, KeyColumnValueStore, KeySliceQuery, SliceQuery, StoreFeatures, StoreTransaction,
};
use crate::types::{Result, VertexId};

/// A query answered for a whole batch of vertices at once.
pub trait BatchQuery<V> {
    /// Per-vertex result; `Default` stands for "nothing found".
    type Output: Clone + Default;

    /// Runs the query for every vertex of `batch`.
    fn execute(&self, batch: &[V]) -> Result<FxHashMap<V, Self::Output>>;
}

/// Loads the relations of a batch of vertices from a store, one slice per
/// vertex row.
///
/// Stores advertising `multi_query` receive a single multi-key request;
/// others get one request per vertex.
#[derive(Clone)]
pub struct RelationBatchQuery {
    store: Arc<dyn KeyColumnValueStore>,
    multi_query: bool,
    slice: SliceQuery,
    tx: StoreTransaction,
}

impl RelationBatchQuery {
    /// Queries the user-visible relations of `category`.
    pub fn new(
        store: Arc<dyn KeyColumnValueStore>,
        features: &StoreFeatures,
        category: RelationCategory,
        tx: StoreTransaction,
    ) -> Self {
        Self::with_slice(
            store,
            features,
            RelationCodec::category_slice(category, false),
            tx,
        )
    }

    /// Queries an explicit column slice.
    pub fn with_slice(
        store: Arc<dyn KeyColumnValueStore>,
        features: &StoreFeatures,
        slice: SliceQuery,
        tx: StoreTransaction,
    ) -> Self {
        Self {
            store,
            multi_query: features.has_multi_query(),
            slice,
            tx,
        }
    }

    /// Caps the relations returned per vertex.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.slice = self.slice.with_limit(limit);
        self
    }

    fn decode(entries: &EntryList) -> Vec<Relation> {
        entries.iter().map(RelationCodec::parse).collect()
    }
}

impl BatchQuery<VertexId> for RelationBatchQuery {
    type Output = Vec<Relation>;

    fn execute(&self, batch: &[VertexId]) -> Result<FxHashMap<VertexId, Vec<Relation>>> {
        let keys = batch
            .iter()
            .map(RelationCodec::vertex_key)
            .collect::<Result<Vec<StaticBuffer>>>()?;
        let mut out = FxHashMap::default();
        out.reserve(batch.len());
        if self.multi_query {
            let rows = self.store.get_slice_multi(&keys, &self.slice, &self.tx)?;
            for (vertex, key) in batch.iter().zip(&keys) {
                let relations = rows.get(key).map(Self::decode).unwrap_or_default();
                out.insert(vertex.clone(), relations);
            }
        } else {
            for (vertex, key) in batch.iter().zip(keys) {
                let query = KeySliceQuery::new(key, self.slice.clone());
                let entries = self.store.get_slice(&query, &self.tx)?;
                out.insert(vertex.clone(), Self::decode(&entries));
            }
        }
        trace!(
            store = self.store.name(),
            vertices = batch.len(),
            multi_query = self.multi_query,
            "graph.batch.relations"
        );
        Ok(out)
    }
}
