//! Query parser
//!
//! Parses the query grammar into a term match tree:
//!
//! ```text
//! query := or
//! or    := and ('|' and)*
//! and   := simple (('&' | juxtaposition) simple)*
//! simple:= '-' simple | '(' or ')' | term
//! term  := [stream ':'] ( '"' token+ '"' | token )
//! token := any non-space not in & | ( ) : - " ; '\' escapes
//! ```
//!
//! Juxtaposition is an implicit AND. A quoted phrase must have at least
//! two tokens. A leading `-` negates; `--x` cancels via the builder.

use std::collections::HashMap;

use crate::error::{Error, ErrorCode, Result};
use crate::index::term::StreamId;
use crate::plan::term_match::{Builder, BuilderOp, TermMatchNode};

// ============================================================================
// StreamConfiguration
// ============================================================================

/// Maps stream names usable as `name:term` prefixes onto stream ids. The
/// unprefixed stream is always 0.
#[derive(Clone, Debug, Default)]
pub struct StreamConfiguration {
    names: HashMap<String, StreamId>,
}

impl StreamConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(mut self, name: &str, id: StreamId) -> Self {
        self.names.insert(name.to_string(), id);
        self
    }

    pub fn stream_id(&self, name: &str) -> Result<StreamId> {
        self.names.get(name).copied().ok_or_else(|| {
            Error::with_message(
                ErrorCode::UnknownStream,
                format!("no stream named '{}'", name),
            )
        })
    }
}

// ============================================================================
// QueryParser
// ============================================================================

const END_OF_TOKEN: &str = "&|():-\"";
const ESCAPABLE: &str = " \t\x0b\x0c&|\\()\":-";

pub struct QueryParser<'a> {
    chars: Vec<char>,
    position: usize,
    streams: &'a StreamConfiguration,
}

impl<'a> QueryParser<'a> {
    pub fn new(input: &str, streams: &'a StreamConfiguration) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            streams,
        }
    }

    pub fn parse(&mut self) -> Result<TermMatchNode> {
        let tree = self.parse_or()?;
        self.skip_white();
        if let Some(c) = self.peek_char() {
            return Err(Error::at(
                ErrorCode::Syntax,
                format!("unexpected '{}' after query", c),
                self.position,
            ));
        }
        Ok(tree)
    }

    /// Escape query metacharacters so `input` round-trips as one token.
    pub fn escape(input: &str) -> String {
        let mut escaped = String::with_capacity(input.len());
        for c in input.chars() {
            if ESCAPABLE.contains(c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    fn parse_or(&mut self) -> Result<TermMatchNode> {
        let mut builder = Builder::new(BuilderOp::Or);
        builder.add_child(self.parse_and()?);

        loop {
            self.skip_white();
            if self.peek_char() != Some('|') {
                break;
            }
            self.get_char()?;
            builder.add_child(self.parse_and()?);
        }
        Ok(builder.complete().expect("at least one operand"))
    }

    fn parse_and(&mut self) -> Result<TermMatchNode> {
        let mut builder = Builder::new(BuilderOp::And);
        builder.add_child(self.parse_simple()?);

        loop {
            self.skip_white();
            match self.peek_char() {
                Some('&') => {
                    // An explicit '&' demands another operand.
                    self.get_char()?;
                    builder.add_child(self.parse_simple()?);
                }
                // ')' and '|' end the And-production; anything else is an
                // implicit AND.
                Some(')') | Some('|') | None => break,
                Some(_) => builder.add_child(self.parse_simple()?),
            }
        }
        Ok(builder.complete().expect("at least one operand"))
    }

    fn parse_simple(&mut self) -> Result<TermMatchNode> {
        self.skip_white();
        match self.peek_char() {
            Some('-') => {
                self.get_char()?;
                let child = self.parse_simple()?;
                let mut builder = Builder::new(BuilderOp::Not);
                builder.add_child(child);
                Ok(builder.complete().expect("one operand"))
            }
            Some('(') => {
                self.get_char()?;
                let tree = self.parse_or()?;
                self.skip_white();
                self.expect_delimiter(')')?;
                Ok(tree)
            }
            _ => self.parse_term(),
        }
    }

    fn parse_term(&mut self) -> Result<TermMatchNode> {
        // The unprefixed stream is 0.
        let mut stream: StreamId = 0;

        self.skip_white();
        if self.peek_char() == Some('"') {
            return self.parse_phrase(stream);
        }

        let left = self.parse_token()?;
        if self.peek_char() == Some(':') {
            // 'left' turned out to be a stream name.
            self.get_char()?;
            stream = self.streams.stream_id(&left)?;
            if self.peek_char() == Some('"') {
                self.parse_phrase(stream)
            } else {
                let right = self.parse_token()?;
                Ok(TermMatchNode::unigram(&right, stream))
            }
        } else {
            Ok(TermMatchNode::unigram(&left, stream))
        }
    }

    fn parse_phrase(&mut self, stream: StreamId) -> Result<TermMatchNode> {
        let start = self.position;
        self.expect_delimiter('"')?;

        let mut grams: Vec<String> = Vec::new();
        loop {
            self.skip_white();
            if self.peek_char() == Some('"') {
                self.expect_delimiter('"')?;
                break;
            }
            grams.push(self.parse_token()?);
        }

        if grams.len() < 2 {
            return Err(Error::at(
                ErrorCode::EmptyPhrase,
                "a phrase in double-quotes must have at least two tokens",
                start,
            ));
        }
        Ok(TermMatchNode::Phrase { grams, stream })
    }

    fn parse_token(&mut self) -> Result<String> {
        let mut token = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || END_OF_TOKEN.contains(c) {
                break;
            }
            token.push(self.get_with_escape()?);
        }
        if token.is_empty() {
            return Err(Error::at(ErrorCode::Syntax, "expected token", self.position));
        }
        Ok(token)
    }

    fn get_with_escape(&mut self) -> Result<char> {
        let c = self.get_char()?;
        if c != '\\' {
            return Ok(c);
        }
        let position = self.position;
        let escaped = self.get_char()?;
        if ESCAPABLE.contains(escaped) {
            Ok(escaped)
        } else {
            Err(Error::at(ErrorCode::Syntax, "bad escape character", position))
        }
    }

    fn expect_delimiter(&mut self, expected: char) -> Result<()> {
        match self.peek_char() {
            Some(c) if c == expected => {
                self.get_char()?;
                Ok(())
            }
            got => Err(Error::at(
                ErrorCode::Syntax,
                match got {
                    Some(c) => format!("expected '{}', got '{}'", expected, c),
                    None => format!("expected '{}', got end of input", expected),
                },
                self.position,
            )),
        }
    }

    fn skip_white(&mut self) {
        while self
            .peek_char()
            .map_or(false, |c| c.is_whitespace())
        {
            self.position += 1;
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn get_char(&mut self) -> Result<char> {
        match self.chars.get(self.position).copied() {
            Some(c) => {
                self.position += 1;
                Ok(c)
            }
            None => Err(Error::at(
                ErrorCode::Syntax,
                "attempting to read past end of input",
                self.position,
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
