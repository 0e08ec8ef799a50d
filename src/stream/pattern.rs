//! Path Pattern Matcher
//!
//! Compiles declarative subscriptions such as `$.operations.*.shallow()` into
//! an ordered matcher table and resolves the live parser path against it.
//!
//! # Syntax
//!
//! ```text
//! $ ( . segment )* . mode()
//!
//! segment := *  |  [*]  |  [n]  |  key
//! mode    := value | shallow | deep
//! ```
//!
//! Keys may contain any character except `.`, `[`, `]`, `(` and `)`.
//! `[n]` only matches array index `n`; a bare key only matches object keys.
//!
//! # Matching
//!
//! Candidates are tried longest first; among equal lengths the one declared
//! first wins. A wildcard matches any key or index and records it as a
//! positional capture.

use crate::stream::error::{StreamError, StreamResult};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, not, value},
    multi::many0,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};
use std::fmt;
use std::str::FromStr;

/// One element of the live parser path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// Object member name
    Key(String),
    /// Array position
    Index(usize),
}

impl PathElement {
    /// Key name, if this element is an object key
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathElement::Key(key) => Some(key),
            PathElement::Index(_) => None,
        }
    }

    /// Array position, if this element is an index
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathElement::Key(_) => None,
            PathElement::Index(idx) => Some(*idx),
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Key(key) => write!(f, "{}", key),
            PathElement::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// A compiled pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

impl Segment {
    fn matches(&self, element: &PathElement) -> bool {
        match (self, element) {
            (Segment::Wildcard, _) => true,
            (Segment::Key(expected), PathElement::Key(actual)) => expected == actual,
            (Segment::Index(expected), PathElement::Index(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// How a matched location is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Scalar leaf, delivered without materialization
    Value,
    /// Container with its immediate scalar children only
    Shallow,
    /// Fully materialized sub-tree
    Deep,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Value => write!(f, "value"),
            Mode::Shallow => write!(f, "shallow"),
            Mode::Deep => write!(f, "deep"),
        }
    }
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    mode: Mode,
}

impl PathPattern {
    /// Compile a pattern string
    pub fn parse(input: &str) -> StreamResult<Self> {
        let trimmed = input.trim();

        if !trimmed.starts_with('$') {
            return Err(StreamError::pattern(input, "must start with '$'"));
        }
        if !trimmed.ends_with("()") {
            return Err(StreamError::pattern(
                input,
                "missing mode suffix: value(), shallow() or deep()",
            ));
        }

        match all_consuming(parse_pattern)(trimmed) {
            Ok((_, (segments, mode))) => Ok(Self { segments, mode }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(StreamError::pattern(
                input,
                format!("unexpected input at '{}'", e.input),
            )),
            Err(nom::Err::Incomplete(_)) => Err(StreamError::pattern(input, "incomplete pattern")),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of segments (the depth this pattern matches at)
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root pattern `$.mode()`
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Match against a live path, collecting wildcard captures left to right
    pub fn matches(&self, path: &[PathElement]) -> Option<Vec<PathElement>> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (segment, element) in self.segments.iter().zip(path) {
            if !segment.matches(element) {
                return None;
            }
            if *segment == Segment::Wildcard {
                captures.push(element.clone());
            }
        }
        Some(captures)
    }
}

impl FromStr for PathPattern {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(idx) => write!(f, ".[{}]", idx)?,
                Segment::Wildcard => write!(f, ".*")?,
            }
        }
        write!(f, ".{}()", self.mode)
    }
}

fn is_key_char(c: char) -> bool {
    !matches!(c, '.' | '[' | ']' | '(' | ')')
}

fn parse_pattern(input: &str) -> IResult<&str, (Vec<Segment>, Mode)> {
    let (input, _) = char('$')(input)?;
    let (input, segments) = many0(preceded(char('.'), parse_segment))(input)?;
    let (input, (_, mode, _)) = tuple((char('.'), parse_mode, tag("()")))(input)?;
    Ok((input, (segments, mode)))
}

fn parse_segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Segment::Wildcard, tag("[*]")),
        map(
            delimited(
                char('['),
                map_res(digit1, |s: &str| s.parse::<usize>()),
                char(']'),
            ),
            Segment::Index,
        ),
        value(Segment::Wildcard, terminated(char('*'), not(take_while1(is_key_char)))),
        // A key directly followed by "(" is the mode, not a segment
        map(terminated(take_while1(is_key_char), not(char('('))), |s: &str| {
            Segment::Key(s.to_string())
        }),
    ))(input)
}

fn parse_mode(input: &str) -> IResult<&str, Mode> {
    alt((
        value(Mode::Value, tag("value")),
        value(Mode::Shallow, tag("shallow")),
        value(Mode::Deep, tag("deep")),
    ))(input)
}

/// The result of resolving a live path against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult<H> {
    /// Handler tag declared with the subscription
    pub handler: H,
    pub mode: Mode,
    /// Wildcard captures in declaration order
    pub captures: Vec<PathElement>,
    /// Subscription depth (segment count)
    pub depth: usize,
}

#[derive(Debug, Clone)]
struct Subscription<H> {
    pattern: PathPattern,
    handler: H,
}

/// Ordered set of compiled subscriptions
#[derive(Debug, Clone)]
pub struct PatternTable<H> {
    entries: Vec<Subscription<H>>,
    max_depth: usize,
}

impl<H> Default for PatternTable<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_depth: 0,
        }
    }
}

impl<H: Clone> PatternTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a whole subscription table at once
    pub fn compile<'a, I>(subscriptions: I) -> StreamResult<Self>
    where
        I: IntoIterator<Item = (&'a str, H)>,
    {
        let mut table = Self::new();
        for (pattern, handler) in subscriptions {
            table.subscribe(pattern, handler)?;
        }
        Ok(table)
    }

    /// Add a subscription, keeping longest-first then declaration order
    pub fn subscribe(&mut self, pattern: &str, handler: H) -> StreamResult<()> {
        let pattern = PathPattern::parse(pattern)?;
        self.max_depth = self.max_depth.max(pattern.len());
        self.entries.push(Subscription { pattern, handler });
        // Stable sort keeps declaration order among equal lengths
        self.entries
            .sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
        Ok(())
    }

    /// Find the best subscription for a live path
    pub fn lookup(&self, path: &[PathElement]) -> Option<MatchResult<H>> {
        if path.len() > self.max_depth {
            return None;
        }

        self.entries
            .iter()
            .skip_while(|entry| entry.pattern.len() > path.len())
            .take_while(|entry| entry.pattern.len() == path.len())
            .find_map(|entry| {
                entry.pattern.matches(path).map(|captures| MatchResult {
                    handler: entry.handler.clone(),
                    mode: entry.pattern.mode(),
                    captures,
                    depth: entry.pattern.len(),
                })
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deepest subscription depth in the table
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
