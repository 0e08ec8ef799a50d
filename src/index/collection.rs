//! Append-only record collections
//!
//! Buffers `{id, payload}` records between flushes. Ids come from a counter
//! that survives [`Collection::trim`], so a record id is never reused within
//! a run even though the buffer is emptied after every acknowledged flush.

use serde::{Deserialize, Serialize};

/// Stable numeric record id
pub type RecordId = u64;

/// One buffered record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: RecordId,
    pub value: T,
}

/// Conversion of a payload holding forward references into a flat row
///
/// The resolver `R` supplies final ids for mutable identifiers and any other
/// lookups the row needs.
pub trait Flatten<R: ?Sized> {
    type Flat;
    type Error;

    fn flatten(&self, resolver: &R) -> Result<Self::Flat, Self::Error>;
}

/// Append-only buffer with a monotonically increasing id counter
#[derive(Debug, Clone)]
pub struct Collection<T> {
    next_id: RecordId,
    buffer: Vec<Record<T>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            buffer: Vec::new(),
        }
    }

    /// Append a payload and return its id
    pub fn put(&mut self, value: T) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        self.buffer.push(Record { id, value });
        id
    }

    /// Records buffered since the last trim, in id order
    pub fn objects(&self) -> &[Record<T>] {
        &self.buffer
    }

    /// Buffered records with each payload passed through `patch`
    pub fn objects_with<U, F>(&self, mut patch: F) -> Vec<Record<U>>
    where
        F: FnMut(&T) -> U,
    {
        self.buffer
            .iter()
            .map(|r| Record {
                id: r.id,
                value: patch(&r.value),
            })
            .collect()
    }

    /// Fallible variant of [`objects_with`](Self::objects_with)
    pub fn try_objects_with<U, E, F>(&self, mut patch: F) -> Result<Vec<Record<U>>, E>
    where
        F: FnMut(&T) -> Result<U, E>,
    {
        self.buffer
            .iter()
            .map(|r| {
                Ok(Record {
                    id: r.id,
                    value: patch(&r.value)?,
                })
            })
            .collect()
    }

    /// Resolve every buffered payload into its flat row
    pub fn flatten<R: ?Sized>(&self, resolver: &R) -> Result<Vec<Record<T::Flat>>, T::Error>
    where
        T: Flatten<R>,
    {
        self.try_objects_with(|value| value.flatten(resolver))
    }

    /// Drop buffered records; the id counter keeps running
    pub fn trim(&mut self) {
        self.buffer.clear();
    }

    /// Id the next `put` will return (also the total issued so far)
    pub fn next_id(&self) -> RecordId {
        self.next_id
    }

    /// Buffered record count
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
