//! Push tokenizer for chunked JSON text
//!
//! Consumes bytes in arbitrarily sized chunks and emits structural events to
//! a [`JsonSink`]. Nothing but the token currently being read is buffered:
//! strings, numbers and literals may be split across any chunk boundary,
//! including inside escapes and multi-byte UTF-8 sequences.
//!
//! Numbers become `serde_json::Number`, so a number outside the `f64` range
//! (`1e400`) is rejected as out of range even though the grammar allows it.
//!
//! ```text
//! feed(b"{\"a\": [1, tr")   → start_object, key("a"), start_array, scalar(1)
//! feed(b"ue]}")              → scalar(true), end_array, end_object
//! end()                      → ok (top-level value complete)
//! ```

use crate::stream::error::StreamError;
use serde_json::{Number, Value};

/// Receiver of structural events
pub trait JsonSink {
    type Error: From<StreamError>;

    fn start_object(&mut self) -> Result<(), Self::Error>;
    fn end_object(&mut self) -> Result<(), Self::Error>;
    fn start_array(&mut self) -> Result<(), Self::Error>;
    fn end_array(&mut self) -> Result<(), Self::Error>;
    fn key(&mut self, key: String) -> Result<(), Self::Error>;
    /// A scalar: null, bool, number or string
    fn scalar(&mut self, value: Value) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash,
    /// Collecting `\uXXXX` hex digits
    Unicode { digits: u8, code: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting any value
    Value,
    /// Just after `[`: a value or `]`
    FirstElement,
    /// Just after `{`: a key or `}`
    FirstKey,
    /// After `,` in an object
    Key,
    Colon,
    /// After a complete value inside a container
    CommaOrEnd,
    String { is_key: bool, escape: Escape },
    Number,
    Literal { word: &'static [u8], matched: usize },
    /// Top-level value complete, only whitespace may follow
    Done,
    /// A previous error poisoned the tokenizer
    Failed,
}

/// Incremental JSON tokenizer
#[derive(Debug)]
pub struct JsonTokenizer {
    state: State,
    stack: Vec<Container>,
    buf: Vec<u8>,
    /// High surrogate waiting for its low half
    pending_surrogate: Option<u32>,
    offset: u64,
}

impl Default for JsonTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonTokenizer {
    pub fn new() -> Self {
        Self {
            state: State::Value,
            stack: Vec::new(),
            buf: Vec::new(),
            pending_surrogate: None,
            offset: 0,
        }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current container nesting depth
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True once a complete top-level value has been read
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Feed one chunk of text
    pub fn feed<S: JsonSink>(&mut self, chunk: &[u8], sink: &mut S) -> Result<(), S::Error> {
        if self.state == State::Failed {
            return Err(StreamError::Closed.into());
        }

        let mut i = 0;
        while i < chunk.len() {
            match self.step(chunk[i], sink) {
                Ok(true) => {
                    i += 1;
                    self.offset += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Signal end of input
    pub fn end<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), S::Error> {
        if self.state == State::Number && self.stack.is_empty() {
            if let Err(e) = self.finish_number(sink) {
                self.state = State::Failed;
                return Err(e);
            }
        }

        match self.state {
            State::Done => Ok(()),
            State::Failed => Err(StreamError::Closed.into()),
            _ => {
                self.state = State::Failed;
                Err(StreamError::UnexpectedEnd {
                    offset: self.offset,
                }
                .into())
            }
        }
    }

    fn error<E: From<StreamError>>(&self, message: impl Into<String>) -> E {
        StreamError::parse(self.offset, message).into()
    }

    /// Process one byte; returns false when the byte must be re-dispatched
    fn step<S: JsonSink>(&mut self, b: u8, sink: &mut S) -> Result<bool, S::Error> {
        match self.state {
            State::String { is_key, escape } => {
                self.string_byte(b, is_key, escape, sink)?;
                Ok(true)
            }
            State::Number => {
                if matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
                    self.buf.push(b);
                    Ok(true)
                } else {
                    self.finish_number(sink)?;
                    Ok(false)
                }
            }
            State::Literal { word, matched } => {
                if word.get(matched) != Some(&b) {
                    return Err(self.error(format!(
                        "invalid literal, expected '{}'",
                        String::from_utf8_lossy(word)
                    )));
                }
                if matched + 1 == word.len() {
                    let value = match word[0] {
                        b't' => Value::Bool(true),
                        b'f' => Value::Bool(false),
                        _ => Value::Null,
                    };
                    sink.scalar(value)?;
                    self.after_value();
                } else {
                    self.state = State::Literal {
                        word,
                        matched: matched + 1,
                    };
                }
                Ok(true)
            }
            _ if is_whitespace(b) => Ok(true),
            State::Value => {
                self.begin_value(b, sink)?;
                Ok(true)
            }
            State::FirstElement => {
                if b == b']' {
                    self.close(Container::Array, sink)?;
                } else {
                    self.begin_value(b, sink)?;
                }
                Ok(true)
            }
            State::FirstKey => {
                match b {
                    b'"' => self.begin_string(true),
                    b'}' => self.close(Container::Object, sink)?,
                    _ => return Err(self.error("expected object key or '}'")),
                }
                Ok(true)
            }
            State::Key => {
                if b != b'"' {
                    return Err(self.error("expected object key"));
                }
                self.begin_string(true);
                Ok(true)
            }
            State::Colon => {
                if b != b':' {
                    return Err(self.error("expected ':'"));
                }
                self.state = State::Value;
                Ok(true)
            }
            State::CommaOrEnd => {
                match (b, self.stack.last()) {
                    (b',', Some(Container::Object)) => self.state = State::Key,
                    (b',', Some(Container::Array)) => self.state = State::Value,
                    (b'}', Some(Container::Object)) => self.close(Container::Object, sink)?,
                    (b']', Some(Container::Array)) => self.close(Container::Array, sink)?,
                    _ => return Err(self.error(format!("unexpected '{}'", b as char))),
                }
                Ok(true)
            }
            State::Done => Err(self.error("trailing data after top-level value")),
            State::Failed => Err(StreamError::Closed.into()),
        }
    }

    fn begin_value<S: JsonSink>(&mut self, b: u8, sink: &mut S) -> Result<(), S::Error> {
        match b {
            b'{' => {
                self.stack.push(Container::Object);
                self.state = State::FirstKey;
                sink.start_object()
            }
            b'[' => {
                self.stack.push(Container::Array);
                self.state = State::FirstElement;
                sink.start_array()
            }
            b'"' => {
                self.begin_string(false);
                Ok(())
            }
            b'-' | b'0'..=b'9' => {
                self.buf.clear();
                self.buf.push(b);
                self.state = State::Number;
                Ok(())
            }
            b't' => self.begin_literal(b"true"),
            b'f' => self.begin_literal(b"false"),
            b'n' => self.begin_literal(b"null"),
            _ => Err(self.error(format!("unexpected '{}'", b as char))),
        }
    }

    fn begin_literal<E>(&mut self, word: &'static [u8]) -> Result<(), E> {
        self.state = State::Literal { word, matched: 1 };
        Ok(())
    }

    fn begin_string(&mut self, is_key: bool) {
        self.buf.clear();
        self.pending_surrogate = None;
        self.state = State::String {
            is_key,
            escape: Escape::None,
        };
    }

    fn string_byte<S: JsonSink>(
        &mut self,
        b: u8,
        is_key: bool,
        escape: Escape,
        sink: &mut S,
    ) -> Result<(), S::Error> {
        match escape {
            Escape::None => match b {
                b'"' => {
                    if self.pending_surrogate.is_some() {
                        return Err(self.error("unpaired surrogate escape"));
                    }
                    let bytes = std::mem::take(&mut self.buf);
                    let text = String::from_utf8(bytes)
                        .map_err(|_| self.error::<S::Error>("invalid UTF-8 in string"))?;
                    if is_key {
                        self.state = State::Colon;
                        sink.key(text)?;
                    } else {
                        sink.scalar(Value::String(text))?;
                        self.after_value();
                    }
                }
                b'\\' => {
                    self.state = State::String {
                        is_key,
                        escape: Escape::Backslash,
                    }
                }
                0x00..=0x1f => return Err(self.error("control character in string")),
                _ => {
                    if self.pending_surrogate.is_some() {
                        return Err(self.error("unpaired surrogate escape"));
                    }
                    self.buf.push(b);
                }
            },
            Escape::Backslash => {
                let unescaped = match b {
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'b' => 0x08,
                    b'f' => 0x0c,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'u' => {
                        self.state = State::String {
                            is_key,
                            escape: Escape::Unicode { digits: 0, code: 0 },
                        };
                        return Ok(());
                    }
                    _ => return Err(self.error(format!("invalid escape '\\{}'", b as char))),
                };
                if self.pending_surrogate.is_some() {
                    return Err(self.error("unpaired surrogate escape"));
                }
                self.buf.push(unescaped);
                self.state = State::String {
                    is_key,
                    escape: Escape::None,
                };
            }
            Escape::Unicode { digits, code } => {
                let digit = (b as char)
                    .to_digit(16)
                    .ok_or_else(|| self.error::<S::Error>("invalid \\u escape"))?;
                let code = code * 16 + digit;
                if digits + 1 < 4 {
                    self.state = State::String {
                        is_key,
                        escape: Escape::Unicode {
                            digits: digits + 1,
                            code,
                        },
                    };
                    return Ok(());
                }
                self.push_code_unit(code)?;
                self.state = State::String {
                    is_key,
                    escape: Escape::None,
                };
            }
        }
        Ok(())
    }

    fn push_code_unit<E: From<StreamError>>(&mut self, code: u32) -> Result<(), E> {
        let scalar = match (self.pending_surrogate.take(), code) {
            (None, 0xD800..=0xDBFF) => {
                self.pending_surrogate = Some(code);
                return Ok(());
            }
            (Some(high), 0xDC00..=0xDFFF) => 0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00),
            (None, 0xDC00..=0xDFFF) | (Some(_), _) => {
                return Err(self.error("unpaired surrogate escape"));
            }
            (None, code) => code,
        };

        let ch = char::from_u32(scalar).ok_or_else(|| self.error::<E>("invalid code point"))?;
        let mut utf8 = [0u8; 4];
        self.buf
            .extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        Ok(())
    }

    fn finish_number<S: JsonSink>(&mut self, sink: &mut S) -> Result<(), S::Error> {
        let text = std::str::from_utf8(&self.buf).unwrap_or_default();
        let number = match text.parse::<Number>() {
            Ok(number) => number,
            Err(_) => {
                let reason = match text.parse::<f64>() {
                    Ok(f) if f.is_infinite() => "number out of range",
                    _ => "invalid number",
                };
                return Err(self.error(format!(
                    "{} '{}'",
                    reason,
                    String::from_utf8_lossy(&self.buf)
                )));
            }
        };
        self.buf.clear();
        sink.scalar(Value::Number(number))?;
        self.after_value();
        Ok(())
    }

    fn close<S: JsonSink>(&mut self, container: Container, sink: &mut S) -> Result<(), S::Error> {
        self.stack.pop();
        self.after_value();
        match container {
            Container::Object => sink.end_object(),
            Container::Array => sink.end_array(),
        }
    }

    fn after_value(&mut self) {
        self.state = if self.stack.is_empty() {
            State::Done
        } else {
            State::CommaOrEnd
        };
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records events as compact strings
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub events: Vec<String>,
    }

    impl JsonSink for Recorder {
        type Error = StreamError;

        fn start_object(&mut self) -> Result<(), StreamError> {
            self.events.push("{".to_string());
            Ok(())
        }
        fn end_object(&mut self) -> Result<(), StreamError> {
            self.events.push("}".to_string());
            Ok(())
        }
        fn start_array(&mut self) -> Result<(), StreamError> {
            self.events.push("[".to_string());
            Ok(())
        }
        fn end_array(&mut self) -> Result<(), StreamError> {
            self.events.push("]".to_string());
            Ok(())
        }
        fn key(&mut self, key: String) -> Result<(), StreamError> {
            self.events.push(format!("k:{}", key));
            Ok(())
        }
        fn scalar(&mut self, value: Value) -> Result<(), StreamError> {
            self.events.push(format!("v:{}", value));
            Ok(())
        }
    }

    fn tokenize_chunks(chunks: &[&[u8]]) -> Result<Vec<String>, StreamError> {
        let mut tokenizer = JsonTokenizer::new();
        let mut recorder = Recorder::default();
        for chunk in chunks {
            tokenizer.feed(chunk, &mut recorder)?;
        }
        tokenizer.end(&mut recorder)?;
        Ok(recorder.events)
    }

    fn tokenize(text: &str) -> Result<Vec<String>, StreamError> {
        tokenize_chunks(&[text.as_bytes()])
    }

    #[test]
    fn test_basic_events() {
        let events = tokenize(r#"{"a": [1, -2.5e3, true, false, null, "x"], "b": {}}"#).unwrap();
        assert_eq!(
            events,
            vec![
                "{", "k:a", "[", "v:1", "v:-2500.0", "v:true", "v:false", "v:null", "v:\"x\"",
                "]", "k:b", "{", "}", "}"
            ]
        );
    }

    #[test]
    fn test_byte_at_a_time() {
        let text = r#"{"name": "caf\u00e9 \ud83d\ude00 ü", "n": 12345, "list": [[], [0]]}"#;
        let whole = tokenize(text).unwrap();

        let bytes = text.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        let split = tokenize_chunks(&chunks).unwrap();

        assert_eq!(whole, split);
        assert_eq!(whole[2], "v:\"café 😀 ü\"");
    }

    #[test]
    fn test_top_level_scalars() {
        assert_eq!(tokenize("42").unwrap(), vec!["v:42"]);
        assert_eq!(tokenize_chunks(&[b"4", b"2 "]).unwrap(), vec!["v:42"]);
        assert_eq!(tokenize(" \"s\" ").unwrap(), vec!["v:\"s\""]);
        assert_eq!(tokenize("null").unwrap(), vec!["v:null"]);
    }

    #[test]
    fn test_escapes() {
        let events = tokenize(r#"["a\"b\\c\/d\n\t"]"#).unwrap();
        assert_eq!(events[1], format!("v:{}", Value::String("a\"b\\c/d\n\t".to_string())));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(tokenize(r#"{"a" 1}"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"{"a": 1,}"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"[1 2]"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"[1}"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"tru"#), Err(StreamError::UnexpectedEnd { .. })));
        assert!(matches!(tokenize(r#"trux"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"01"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"{} {}"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(r#"["\ud83d"]"#), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize("[\"a\u{1}\"]"), Err(StreamError::Parse { .. })));
        assert!(matches!(tokenize(""), Err(StreamError::UnexpectedEnd { .. })));
        assert!(matches!(tokenize(r#"{"a": [1"#), Err(StreamError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_huge_number_is_out_of_range() {
        assert!(tokenize("[1e308]").is_ok());
        match tokenize("[1e400]") {
            Err(StreamError::Parse { message, .. }) => {
                assert_eq!(message, "number out of range '1e400'")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_offset_and_poisoning() {
        let mut tokenizer = JsonTokenizer::new();
        let mut recorder = Recorder::default();

        let err = tokenizer.feed(b"[1, @]", &mut recorder).unwrap_err();
        assert_eq!(
            err,
            StreamError::Parse {
                offset: 4,
                message: "unexpected '@'".to_string()
            }
        );

        // A failed tokenizer refuses further input
        assert_eq!(tokenizer.feed(b"1", &mut recorder).unwrap_err(), StreamError::Closed);
    }
}
