//! Text scanner shared by the tree text formats
//!
//! Both the term match tree and the compile tree have a nested prefix
//! notation (braces for objects, brackets for lists) used by tests and
//! diagnostics. This scanner provides the common token layer.

use crate::error::{Error, ErrorCode, Result};

pub(crate) struct TextScanner {
    chars: Vec<char>,
    pos: usize,
}

impl TextScanner {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn skip_white(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    /// Next character after whitespace, without consuming it.
    pub fn peek(&mut self) -> Option<char> {
        self.skip_white();
        self.chars.get(self.pos).copied()
    }

    fn next_char(&mut self) -> Result<char> {
        match self.chars.get(self.pos).copied() {
            Some(c) => {
                self.pos += 1;
                Ok(c)
            }
            None => Err(Error::at(
                ErrorCode::Syntax,
                "unexpected end of input",
                self.pos,
            )),
        }
    }

    pub fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_white();
        let pos = self.pos;
        let got = self.next_char()?;
        if got != expected {
            return Err(Error::at(
                ErrorCode::Syntax,
                format!("expected '{}', got '{}'", expected, got),
                pos,
            ));
        }
        Ok(())
    }

    pub fn consume_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// An identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn ident(&mut self) -> Result<String> {
        self.skip_white();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .map_or(false, |c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::at(ErrorCode::Syntax, "expected identifier", start));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    pub fn number(&mut self) -> Result<usize> {
        self.skip_white();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .map_or(false, |c| c.is_ascii_digit())
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::at(ErrorCode::Syntax, "expected number", start));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| Error::at(ErrorCode::Syntax, "number out of range", start))
    }

    pub fn boolean(&mut self) -> Result<bool> {
        let pos = self.pos;
        match self.ident()?.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(Error::at(
                ErrorCode::Syntax,
                format!("expected 'true' or 'false', got '{}'", other),
                pos,
            )),
        }
    }

    /// A double-quoted string with `\"` and `\\` escapes.
    pub fn quoted(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            let pos = self.pos;
            match self.next_char()? {
                '"' => return Ok(out),
                '\\' => {
                    let escaped = self.next_char()?;
                    if escaped == '"' || escaped == '\\' {
                        out.push(escaped);
                    } else {
                        return Err(Error::at(ErrorCode::Syntax, "bad escape", pos));
                    }
                }
                c => out.push(c),
            }
        }
    }

    pub fn expect_end(&mut self) -> Result<()> {
        self.skip_white();
        if self.pos != self.chars.len() {
            return Err(Error::at(
                ErrorCode::Syntax,
                "trailing input after tree",
                self.pos,
            ));
        }
        Ok(())
    }
}

/// Escape a string for the quoted form above.
pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
