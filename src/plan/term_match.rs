//! Term match trees
//!
//! The boolean tree the query parser produces and the planner consumes.
//! Leaves name terms (unigrams, phrases, facts); interior nodes are
//! And/Or/Not with And and Or strictly binary. The [`Builder`] enforces
//! the Not canonicalisation: a Not directly under a Not is elided, so no
//! well-formed tree contains a nested negation.
//!
//! Trees have a text form used by tests, e.g.:
//!
//! ```text
//! AndMatch {
//!   Children: [
//!     UnigramMatch("p2", 0),
//!     NotMatch {
//!       Child: UnigramMatch("p3", 0)
//!     }
//!   ]
//! }
//! ```

use crate::error::{Error, ErrorCode, Result};
use crate::index::term::StreamId;
use crate::plan::text::{quote, TextScanner};

// ============================================================================
// TermMatchNode
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermMatchNode {
    Unigram {
        text: String,
        stream: StreamId,
    },
    Phrase {
        grams: Vec<String>,
        stream: StreamId,
    },
    Fact {
        name: String,
    },
    And(Box<TermMatchNode>, Box<TermMatchNode>),
    Or(Box<TermMatchNode>, Box<TermMatchNode>),
    Not(Box<TermMatchNode>),
}

impl TermMatchNode {
    pub fn unigram(text: &str, stream: StreamId) -> Self {
        TermMatchNode::Unigram {
            text: text.to_string(),
            stream,
        }
    }

    pub fn phrase(grams: &[&str], stream: StreamId) -> Self {
        TermMatchNode::Phrase {
            grams: grams.iter().map(|g| g.to_string()).collect(),
            stream,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TermMatchNode::Unigram { .. } => "UnigramMatch",
            TermMatchNode::Phrase { .. } => "PhraseMatch",
            TermMatchNode::Fact { .. } => "FactMatch",
            TermMatchNode::And(..) => "AndMatch",
            TermMatchNode::Or(..) => "OrMatch",
            TermMatchNode::Not(..) => "NotMatch",
        }
    }

    // ------------------------------------------------------------------
    // Text format
    // ------------------------------------------------------------------

    pub fn format(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        let inner = "  ".repeat(indent + 1);
        match self {
            TermMatchNode::Unigram { text, stream } => {
                out.push_str(&format!("UnigramMatch({}, {})", quote(text), stream));
            }
            TermMatchNode::Phrase { grams, stream } => {
                out.push_str("PhraseMatch {\n");
                out.push_str(&format!("{}StreamId: {},\n", inner, stream));
                out.push_str(&format!("{}Grams: [", inner));
                for (i, gram) in grams.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&quote(gram));
                }
                out.push_str("]\n");
                out.push_str(&format!("{}}}", pad));
            }
            TermMatchNode::Fact { name } => {
                out.push_str(&format!("FactMatch({})", quote(name)));
            }
            TermMatchNode::And(left, right) | TermMatchNode::Or(left, right) => {
                out.push_str(self.type_name());
                out.push_str(" {\n");
                out.push_str(&format!("{}Children: [\n", inner));
                let item = "  ".repeat(indent + 2);
                out.push_str(&item);
                left.write(out, indent + 2);
                out.push_str(",\n");
                out.push_str(&item);
                right.write(out, indent + 2);
                out.push('\n');
                out.push_str(&format!("{}]\n", inner));
                out.push_str(&format!("{}}}", pad));
            }
            TermMatchNode::Not(child) => {
                out.push_str("NotMatch {\n");
                out.push_str(&format!("{}Child: ", inner));
                child.write(out, indent + 1);
                out.push('\n');
                out.push_str(&format!("{}}}", pad));
            }
        }
    }

    pub fn parse(text: &str) -> Result<TermMatchNode> {
        let mut scanner = TextScanner::new(text);
        let node = Self::parse_node(&mut scanner)?;
        scanner.expect_end()?;
        Ok(node)
    }

    fn parse_node(scanner: &mut TextScanner) -> Result<TermMatchNode> {
        let pos = scanner.position();
        let name = scanner.ident()?;
        match name.as_str() {
            "UnigramMatch" => {
                scanner.expect('(')?;
                let text = scanner.quoted()?;
                scanner.expect(',')?;
                let stream = scanner.number()?;
                scanner.expect(')')?;
                Ok(TermMatchNode::Unigram {
                    text,
                    stream: stream as StreamId,
                })
            }
            "FactMatch" => {
                scanner.expect('(')?;
                let name = scanner.quoted()?;
                scanner.expect(')')?;
                Ok(TermMatchNode::Fact { name })
            }
            "PhraseMatch" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "StreamId")?;
                let stream = scanner.number()?;
                scanner.expect(',')?;
                Self::expect_field(scanner, "Grams")?;
                scanner.expect('[')?;
                let mut grams = Vec::new();
                loop {
                    grams.push(scanner.quoted()?);
                    if !scanner.consume_if(',') {
                        break;
                    }
                }
                scanner.expect(']')?;
                scanner.expect('}')?;
                Ok(TermMatchNode::Phrase {
                    grams,
                    stream: stream as StreamId,
                })
            }
            "AndMatch" | "OrMatch" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Children")?;
                scanner.expect('[')?;
                let mut children = vec![Self::parse_node(scanner)?];
                while scanner.consume_if(',') {
                    children.push(Self::parse_node(scanner)?);
                }
                scanner.expect(']')?;
                scanner.expect('}')?;
                if children.len() < 2 {
                    return Err(Error::at(
                        ErrorCode::Syntax,
                        format!("{} requires at least two children", name),
                        pos,
                    ));
                }
                // Left-fold, matching the builder.
                let mut iter = children.into_iter();
                let mut node = iter.next().expect("at least two children");
                for child in iter {
                    node = if name == "AndMatch" {
                        TermMatchNode::And(Box::new(node), Box::new(child))
                    } else {
                        TermMatchNode::Or(Box::new(node), Box::new(child))
                    };
                }
                Ok(node)
            }
            "NotMatch" => {
                scanner.expect('{')?;
                Self::expect_field(scanner, "Child")?;
                let child = Self::parse_node(scanner)?;
                scanner.expect('}')?;
                Ok(TermMatchNode::Not(Box::new(child)))
            }
            other => Err(Error::at(
                ErrorCode::Syntax,
                format!("unknown node type '{}'", other),
                pos,
            )),
        }
    }

    fn expect_field(scanner: &mut TextScanner, field: &str) -> Result<()> {
        let pos = scanner.position();
        let name = scanner.ident()?;
        if name != field {
            return Err(Error::at(
                ErrorCode::Syntax,
                format!("expected field '{}', got '{}'", field, name),
                pos,
            ));
        }
        scanner.expect(':')
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderOp {
    And,
    Or,
    Not,
}

/// Accumulates children for one interior node. And/Or fold their children
/// into a left-leaning binary chain; Not takes exactly one child and
/// cancels a directly nested Not.
pub struct Builder {
    op: BuilderOp,
    node: Option<TermMatchNode>,
}

impl Builder {
    pub fn new(op: BuilderOp) -> Self {
        Self { op, node: None }
    }

    pub fn add_child(&mut self, child: TermMatchNode) {
        self.node = Some(match (self.op, self.node.take()) {
            (BuilderOp::And, Some(node)) => {
                TermMatchNode::And(Box::new(node), Box::new(child))
            }
            (BuilderOp::Or, Some(node)) => TermMatchNode::Or(Box::new(node), Box::new(child)),
            (BuilderOp::Not, Some(_)) => panic!("Not accepts exactly one child"),
            (BuilderOp::Not, None) => match child {
                TermMatchNode::Not(inner) => *inner,
                other => TermMatchNode::Not(Box::new(other)),
            },
            (_, None) => child,
        });
    }

    /// The finished node, or None when no children were added.
    pub fn complete(self) -> Option<TermMatchNode> {
        self.node
    }
}

// ============================================================================
// Tests
// ============================================================================
