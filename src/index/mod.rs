//! In-memory index primitives
//!
//! Everything the ingestion driver owns for the duration of one run:
//!
//! - **dictionary**: string ↔ id dictionaries, arrival-order or sortable
//! - **collection**: append-only record buffers with stable ids
//!
//! # Architecture
//!
//! ```text
//! match callback
//!        ↓
//! Dictionaries: "/pets" → MutableId(slot 3)        (rank unknown yet)
//!        ↓
//! Collections:  {id: 41, operation: slot 3, ...}  → flush → trim
//!        ↓
//! finish: sort() → slot 3 now reads id 1 → flatten index rows
//! ```

pub mod collection;
pub mod dictionary;

pub use collection::{Collection, Flatten, Record, RecordId};
pub use dictionary::{
    ArrivalDictionary, DictEntry, DictionarySet, MutableId, SortedDictionary, StringIndex,
};
