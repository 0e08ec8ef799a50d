//! Chunk-fed matcher front end
//!
//! Joins the tokenizer and the tracker: bytes go in, matched values come out
//! through a [`MatchHandler`].

use crate::stream::error::{StreamError, StreamResult};
use crate::stream::pattern::PatternTable;
use crate::stream::tokenizer::{JsonSink, JsonTokenizer};
use crate::stream::tracker::{ContainerKind, MatchHandler, PathTracker};
use serde_json::Value;

/// Streaming parser bound to one subscription table
#[derive(Debug)]
pub struct StreamParser<H> {
    tokenizer: JsonTokenizer,
    tracker: PathTracker<H>,
    closed: bool,
}

impl<H: Clone> StreamParser<H> {
    pub fn new(table: PatternTable<H>) -> Self {
        Self {
            tokenizer: JsonTokenizer::new(),
            tracker: PathTracker::new(table),
            closed: false,
        }
    }

    /// Compile subscriptions and build a parser in one step
    pub fn from_patterns<'a, I>(subscriptions: I) -> StreamResult<Self>
    where
        I: IntoIterator<Item = (&'a str, H)>,
    {
        Ok(Self::new(PatternTable::compile(subscriptions)?))
    }

    /// Feed a chunk; all triggered handlers run before this returns
    pub fn feed<M: MatchHandler<H>>(&mut self, chunk: &[u8], handler: &mut M) -> Result<(), M::Error> {
        if self.closed {
            return Err(StreamError::Closed.into());
        }
        let mut sink = TrackerSink {
            tracker: &mut self.tracker,
            handler,
        };
        self.tokenizer.feed(chunk, &mut sink)
    }

    /// Signal end of input
    pub fn end<M: MatchHandler<H>>(&mut self, handler: &mut M) -> Result<(), M::Error> {
        if self.closed {
            return Err(StreamError::Closed.into());
        }
        self.closed = true;
        let mut sink = TrackerSink {
            tracker: &mut self.tracker,
            handler,
        };
        let result = self.tokenizer.end(&mut sink);
        self.tracker.reset();
        result
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.tokenizer.offset()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

struct TrackerSink<'a, H, M> {
    tracker: &'a mut PathTracker<H>,
    handler: &'a mut M,
}

impl<H: Clone, M: MatchHandler<H>> JsonSink for TrackerSink<'_, H, M> {
    type Error = M::Error;

    fn start_object(&mut self) -> Result<(), Self::Error> {
        self.tracker.open(ContainerKind::Object);
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), Self::Error> {
        self.tracker.close(&mut *self.handler)
    }

    fn start_array(&mut self) -> Result<(), Self::Error> {
        self.tracker.open(ContainerKind::Array);
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), Self::Error> {
        self.tracker.close(&mut *self.handler)
    }

    fn key(&mut self, key: String) -> Result<(), Self::Error> {
        self.tracker.key(key);
        Ok(())
    }

    fn scalar(&mut self, value: Value) -> Result<(), Self::Error> {
        self.tracker.value(value, &mut *self.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::pattern::MatchResult;

    #[derive(Default)]
    struct Counter {
        seen: usize,
    }

    impl MatchHandler<u8> for Counter {
        type Error = StreamError;

        fn on_match(&mut self, _matched: &MatchResult<u8>, _value: Value) -> Result<(), StreamError> {
            self.seen += 1;
            Ok(())
        }
    }

    #[test]
    fn test_feed_after_end_is_rejected() {
        let mut parser = StreamParser::from_patterns([("$.a.value()", 0u8)]).unwrap();
        let mut counter = Counter::default();

        parser.feed(br#"{"a": 1}"#, &mut counter).unwrap();
        parser.end(&mut counter).unwrap();
        assert_eq!(counter.seen, 1);
        assert!(parser.is_closed());
        assert_eq!(parser.offset(), 8);

        assert_eq!(parser.feed(b"{}", &mut counter), Err(StreamError::Closed));
        assert_eq!(parser.end(&mut counter), Err(StreamError::Closed));
    }

    #[test]
    fn test_truncated_document_fails_on_end() {
        let mut parser = StreamParser::from_patterns([("$.a.value()", 0u8)]).unwrap();
        let mut counter = Counter::default();

        parser.feed(br#"{"a": 1, "b": ["#, &mut counter).unwrap();
        assert!(matches!(
            parser.end(&mut counter),
            Err(StreamError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_fails_before_input() {
        let result = StreamParser::from_patterns([("$.a.b", 0u8)]);
        assert!(matches!(result, Err(StreamError::Pattern { .. })));
    }
}
