//! Streaming JSON matching
//!
//! Turns chunked report text into subscription callbacks in a single forward
//! pass without materializing the document:
//!
//! - **pattern**: path pattern syntax and the ordered matcher table
//! - **tokenizer**: push tokenizer emitting structural events
//! - **tracker**: live path and frame stack, deciding what to accumulate
//! - **parser**: tokenizer + tracker behind one `feed`/`end` API
//!
//! # Data flow
//!
//! ```text
//! bytes → JsonTokenizer → PathTracker ──lookup──→ PatternTable
//!                              │
//!                              └── MatchHandler::on_match(match, value)
//! ```

pub mod error;
pub mod parser;
pub mod pattern;
pub mod tokenizer;
pub mod tracker;

pub use error::{StreamError, StreamResult};
pub use parser::StreamParser;
pub use pattern::{MatchResult, Mode, PathElement, PathPattern, PatternTable, Segment};
pub use tokenizer::{JsonSink, JsonTokenizer};
pub use tracker::{ContainerKind, MatchHandler, PathTracker};
