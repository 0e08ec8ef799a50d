//! Structural Stack Tracker
//!
//! Mirrors the parser's nesting as an explicit stack of frames plus the live
//! path, and decides at each event which subscription applies.
//!
//! # Accumulation policy
//!
//! ```text
//! frame kind                     accumulates?   on close
//! ---------------------------------------------------------------------
//! shallow target                 scalars only   deliver, drop
//! deep target                    everything     deliver, copy into parent
//!                                               if parent is in deep scope
//! unmatched, inside deep scope   everything     move into parent
//! unmatched, outside deep scope  nothing        -
//! ```
//!
//! A shallow target inside a deep scope is delivered to its own handler only;
//! the deep ancestor never sees it.
//!
//! Scalars matched by a `value()` subscription are delivered immediately and
//! never stored in any accumulator.

use crate::stream::error::StreamError;
use crate::stream::pattern::{MatchResult, Mode, PathElement, PatternTable};
use serde_json::{Map, Value};

/// Receiver of matched values
pub trait MatchHandler<H> {
    type Error: From<StreamError>;

    fn on_match(&mut self, matched: &MatchResult<H>, value: Value) -> Result<(), Self::Error>;
}

/// Container kind of a stack frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

#[derive(Debug)]
enum Accumulator {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl Accumulator {
    fn new(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Object => Accumulator::Object(Map::new()),
            ContainerKind::Array => Accumulator::Array(Vec::new()),
        }
    }

    fn insert(&mut self, at: Option<&PathElement>, value: Value) {
        match (self, at) {
            (Accumulator::Object(map), Some(PathElement::Key(key))) => {
                map.insert(key.clone(), value);
            }
            (Accumulator::Array(items), _) => items.push(value),
            // Object without a key cannot happen with a well-formed event stream
            (Accumulator::Object(_), _) => {}
        }
    }

    fn into_value(self) -> Value {
        match self {
            Accumulator::Object(map) => Value::Object(map),
            Accumulator::Array(items) => Value::Array(items),
        }
    }
}

#[derive(Debug)]
struct Frame<H> {
    kind: ContainerKind,
    acc: Option<Accumulator>,
    active: Option<MatchResult<H>>,
    /// This frame is a deep target or lies inside one
    deep_scope: bool,
    next_index: usize,
}

/// Live path and frame stack for one parse pass
#[derive(Debug)]
pub struct PathTracker<H> {
    table: PatternTable<H>,
    frames: Vec<Frame<H>>,
    path: Vec<PathElement>,
}

impl<H: Clone> PathTracker<H> {
    pub fn new(table: PatternTable<H>) -> Self {
        Self {
            table,
            frames: Vec::new(),
            path: Vec::new(),
        }
    }

    /// The live path (one element per open container)
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn table(&self) -> &PatternTable<H> {
        &self.table
    }

    /// Drop all in-progress state
    pub fn reset(&mut self) {
        self.frames.clear();
        self.path.clear();
    }

    /// In array context, point the trailing path element at the next child
    fn advance_index(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.kind == ContainerKind::Array {
                if let Some(last) = self.path.last_mut() {
                    *last = PathElement::Index(frame.next_index);
                }
                frame.next_index += 1;
            }
        }
    }

    fn parent_in_deep_scope(&self) -> bool {
        self.frames.last().map_or(false, |f| f.deep_scope)
    }

    fn insert_into_top(&mut self, value: Value) {
        let at = self.path.last();
        if let Some(acc) = self.frames.last_mut().and_then(|f| f.acc.as_mut()) {
            acc.insert(at, value);
        }
    }

    pub fn open(&mut self, kind: ContainerKind) {
        self.advance_index();

        let active = self
            .table
            .lookup(&self.path)
            .filter(|m| m.mode != Mode::Value);
        let mode = active.as_ref().map(|m| m.mode);
        // A shallow target ends any enclosing deep scope
        let deep_scope = match mode {
            Some(Mode::Shallow) => false,
            Some(Mode::Deep) => true,
            _ => self.parent_in_deep_scope(),
        };
        let collecting = deep_scope || active.is_some();

        self.frames.push(Frame {
            kind,
            acc: collecting.then(|| Accumulator::new(kind)),
            active,
            deep_scope,
            next_index: 0,
        });
        self.path.push(match kind {
            ContainerKind::Object => PathElement::Key(String::new()),
            ContainerKind::Array => PathElement::Index(0),
        });
    }

    pub fn key(&mut self, name: String) {
        if self.frames.last().map(|f| f.kind) == Some(ContainerKind::Object) {
            if let Some(last) = self.path.last_mut() {
                *last = PathElement::Key(name);
            }
        }
    }

    pub fn value<M: MatchHandler<H>>(&mut self, scalar: Value, handler: &mut M) -> Result<(), M::Error> {
        self.advance_index();

        match self.table.lookup(&self.path) {
            Some(matched) => {
                if matched.mode == Mode::Deep && self.parent_in_deep_scope() {
                    self.insert_into_top(scalar.clone());
                }
                handler.on_match(&matched, scalar)
            }
            None => {
                self.insert_into_top(scalar);
                Ok(())
            }
        }
    }

    pub fn close<M: MatchHandler<H>>(&mut self, handler: &mut M) -> Result<(), M::Error> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| StreamError::parse(0, "close without open container"))?;
        self.path.pop();

        let value = match frame.acc {
            Some(acc) => acc.into_value(),
            None => return Ok(()),
        };
        let parent_deep = self.parent_in_deep_scope();

        match frame.active {
            Some(matched) if matched.mode == Mode::Deep => {
                if parent_deep {
                    self.insert_into_top(value.clone());
                }
                handler.on_match(&matched, value)
            }
            Some(matched) => handler.on_match(&matched, value),
            None => {
                if parent_deep {
                    self.insert_into_top(value);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parser::StreamParser;
    use serde_json::json;

    /// Collects every delivery
    #[derive(Default)]
    pub(crate) struct Collector {
        pub hits: Vec<(&'static str, Mode, Vec<PathElement>, Value)>,
        pub fail_on: Option<&'static str>,
    }

    impl MatchHandler<&'static str> for Collector {
        type Error = StreamError;

        fn on_match(
            &mut self,
            matched: &MatchResult<&'static str>,
            value: Value,
        ) -> Result<(), StreamError> {
            if self.fail_on == Some(matched.handler) {
                return Err(StreamError::parse(0, "handler refused"));
            }
            self.hits
                .push((matched.handler, matched.mode, matched.captures.clone(), value));
            Ok(())
        }
    }

    impl Collector {
        fn count(&self, handler: &str) -> usize {
            self.hits.iter().filter(|h| h.0 == handler).count()
        }

        fn values(&self, handler: &str) -> Vec<&Value> {
            self.hits
                .iter()
                .filter(|h| h.0 == handler)
                .map(|h| &h.3)
                .collect()
        }
    }

    fn run(patterns: &[(&str, &'static str)], text: &str, chunk_size: usize) -> Collector {
        let table = PatternTable::compile(patterns.iter().copied()).unwrap();
        let mut parser = StreamParser::new(table);
        let mut collector = Collector::default();
        for chunk in text.as_bytes().chunks(chunk_size) {
            parser.feed(chunk, &mut collector).unwrap();
        }
        parser.end(&mut collector).unwrap();
        collector
    }

    fn key(s: &str) -> PathElement {
        PathElement::Key(s.to_string())
    }

    const REPORT: &str = r#"{
        "version": "2.0",
        "ops": {
            "listPets": {
                "path": "/pets",
                "method": "get",
                "tests": [
                    {"key": "t1", "outcome": {"criticality": 4}},
                    {"key": "t2", "outcome": {"criticality": 1}}
                ],
                "flags": [true, {"nested": 1}, false]
            },
            "addPet": {
                "path": "/pets",
                "method": "post",
                "tests": [{"key": "t3", "outcome": {"criticality": 5}}]
            }
        }
    }"#;

    #[test]
    fn test_root_deep_is_chunk_size_invariant() {
        let expected: Value = serde_json::from_str(REPORT).unwrap();

        for chunk_size in [1, 2, 3, 5, 7, 16, 64, REPORT.len()] {
            let collector = run(&[("$.deep()", "root")], REPORT, chunk_size);
            assert_eq!(collector.count("root"), 1, "chunk size {}", chunk_size);
            assert_eq!(collector.values("root")[0], &expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_root_scalar_document() {
        let collector = run(&[("$.deep()", "root")], "  17 ", 1);
        assert_eq!(collector.values("root"), vec![&json!(17)]);
    }

    #[test]
    fn test_value_subscription_with_captures() {
        let collector = run(&[("$.ops.*.method.value()", "method")], REPORT, 4);

        assert_eq!(collector.count("method"), 2);
        assert_eq!(collector.hits[0].2, vec![key("listPets")]);
        assert_eq!(collector.hits[0].3, json!("get"));
        assert_eq!(collector.hits[1].2, vec![key("addPet")]);
        assert_eq!(collector.hits[1].3, json!("post"));
    }

    #[test]
    fn test_array_index_captures() {
        let collector = run(
            &[("$.ops.*.tests.*.outcome.criticality.value()", "crit")],
            REPORT,
            3,
        );

        let captures: Vec<_> = collector.hits.iter().map(|h| h.2.clone()).collect();
        assert_eq!(
            captures,
            vec![
                vec![key("listPets"), PathElement::Index(0)],
                vec![key("listPets"), PathElement::Index(1)],
                vec![key("addPet"), PathElement::Index(0)],
            ]
        );
        assert_eq!(
            collector.values("crit"),
            vec![&json!(4), &json!(1), &json!(5)]
        );
    }

    #[test]
    fn test_index_literal_in_array() {
        let collector = run(&[("$.ops.listPets.flags.[2].value()", "third")], REPORT, 8);
        assert_eq!(collector.values("third"), vec![&json!(false)]);
    }

    #[test]
    fn test_shallow_receives_only_scalars() {
        let collector = run(
            &[
                ("$.ops.*.shallow()", "op"),
                ("$.ops.*.tests.*.deep()", "test"),
            ],
            REPORT,
            5,
        );

        assert_eq!(collector.count("op"), 2);
        assert_eq!(collector.count("test"), 3);

        assert_eq!(
            collector.values("op")[0],
            &json!({"path": "/pets", "method": "get"})
        );
        assert_eq!(
            collector.values("test")[0],
            &json!({"key": "t1", "outcome": {"criticality": 4}})
        );

        // Test deliveries happen before the enclosing operation closes
        let first_op = collector.hits.iter().position(|h| h.0 == "op").unwrap();
        let first_test = collector.hits.iter().position(|h| h.0 == "test").unwrap();
        assert!(first_test < first_op);
    }

    #[test]
    fn test_shallow_array_drops_nested_containers() {
        let collector = run(&[("$.ops.listPets.flags.shallow()", "flags")], REPORT, 6);
        assert_eq!(collector.values("flags"), vec![&json!([true, false])]);
    }

    #[test]
    fn test_shallow_inside_deep_is_not_propagated() {
        let collector = run(
            &[
                ("$.ops.listPets.deep()", "op"),
                ("$.ops.listPets.tests.[0].shallow()", "first"),
            ],
            REPORT,
            7,
        );

        assert_eq!(collector.values("first"), vec![&json!({"key": "t1"})]);

        let op = collector.values("op")[0];
        assert_eq!(op["tests"], json!([{"key": "t2", "outcome": {"criticality": 1}}]));
        assert_eq!(op["method"], json!("get"));
    }

    #[test]
    fn test_deep_inside_deep_propagates() {
        let collector = run(
            &[
                ("$.ops.listPets.deep()", "op"),
                ("$.ops.listPets.tests.*.deep()", "test"),
            ],
            REPORT,
            9,
        );

        assert_eq!(collector.count("test"), 2);
        let op = collector.values("op")[0];
        assert_eq!(op["tests"][1]["key"], json!("t2"));
        assert_eq!(op["flags"], json!([true, {"nested": 1}, false]));

        // Inner deliveries come first
        assert_eq!(collector.hits.last().unwrap().0, "op");
    }

    #[test]
    fn test_value_match_is_not_materialized() {
        let collector = run(
            &[("$.deep()", "root"), ("$.version.value()", "version")],
            REPORT,
            11,
        );

        assert_eq!(collector.values("version"), vec![&json!("2.0")]);
        let root = collector.values("root")[0];
        assert!(root.get("version").is_none());
        assert!(root.get("ops").is_some());
    }

    #[test]
    fn test_unmatched_subscription_is_silent() {
        let collector = run(
            &[("$.opz.*.deep()", "typo"), ("$.ops.*.missing.value()", "absent")],
            REPORT,
            10,
        );
        assert_eq!(collector.count("typo"), 0);
        assert_eq!(collector.count("absent"), 0);
        assert!(collector.hits.is_empty());
    }

    #[test]
    fn test_handler_error_aborts_feed() {
        let table = PatternTable::compile([("$.ops.*.method.value()", "method")]).unwrap();
        let mut parser = StreamParser::new(table);
        let mut collector = Collector {
            fail_on: Some("method"),
            ..Default::default()
        };

        let result = parser.feed(REPORT.as_bytes(), &mut collector);
        assert!(result.is_err());
        assert!(collector.hits.is_empty());
    }

    #[test]
    fn test_live_path_tracks_depth() {
        let table: PatternTable<&'static str> = PatternTable::new();
        let mut tracker = PathTracker::new(table);
        let mut collector = Collector::default();

        tracker.open(ContainerKind::Object);
        tracker.key("a".to_string());
        tracker.open(ContainerKind::Array);
        tracker.value(json!(1), &mut collector).unwrap();
        tracker.value(json!(2), &mut collector).unwrap();
        assert_eq!(tracker.path(), &[key("a"), PathElement::Index(1)]);
        assert_eq!(tracker.depth(), 2);

        tracker.close(&mut collector).unwrap();
        assert_eq!(tracker.path(), &[key("a")]);
        tracker.close(&mut collector).unwrap();
        assert!(tracker.path().is_empty());
    }
}
