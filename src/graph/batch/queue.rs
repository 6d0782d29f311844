use std::collections::VecDeque;
use std::hash::Hash;

use rustc_hash::FxHashSet;

/// FIFO of bounded batches that holds each element at most once.
///
/// New elements extend the tail batch until it reaches `batch_size`, then
/// start a new batch. Membership is tracked in a set that
/// [`BatchProcessingQueue::soft_remove`] can clear without touching the
/// batches. A soft-removed element that is added again joins the tail batch
/// unless that batch already holds it; no batch holds an element twice.
#[derive(Debug)]
pub struct BatchProcessingQueue<V> {
    batches: VecDeque<Vec<V>>,
    members: FxHashSet<V>,
    /// Soft-removed elements still sitting in a batch.
    detached: FxHashSet<V>,
    batch_size: usize,
}

impl<V> BatchProcessingQueue<V>
where
    V: Clone + Eq + Hash,
{
    /// Creates an empty queue; `batch_size` is raised to at least 1.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batches: VecDeque::new(),
            members: FxHashSet::default(),
            detached: FxHashSet::default(),
            batch_size: batch_size.max(1),
        }
    }

    /// Appends `element` to the tail batch. Returns false if it is already
    /// queued.
    pub fn add_to_batch_to_end(&mut self, element: V) -> bool {
        if !self.members.insert(element.clone()) {
            return false;
        }
        if self.detached.remove(&element)
            && self.batches.back().is_some_and(|tail| tail.contains(&element))
        {
            return true;
        }
        match self.batches.back_mut() {
            Some(tail) if tail.len() < self.batch_size => tail.push(element),
            _ => {
                let mut batch = Vec::with_capacity(self.batch_size);
                batch.push(element);
                self.batches.push_back(batch);
            }
        }
        true
    }

    /// Removes and returns the oldest batch.
    pub fn poll_batch(&mut self) -> Option<Vec<V>> {
        let mut batch = self.batches.pop_front()?;
        let mut seen = FxHashSet::default();
        batch.retain(|element| seen.insert(element.clone()));
        for element in &batch {
            self.members.remove(element);
            self.detached.remove(element);
        }
        Some(batch)
    }

    /// Forgets `element` for deduplication only; it stays in its batch.
    pub fn soft_remove(&mut self, element: &V) -> bool {
        if !self.members.remove(element) {
            return false;
        }
        self.detached.insert(element.clone());
        true
    }

    /// True if `element` is queued and not soft-removed.
    pub fn contains(&self, element: &V) -> bool {
        self.members.contains(element)
    }

    /// True when no batch is pending.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Elements across all pending batches.
    pub fn len(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Pending batches.
    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Maximum batch length.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
