//! Schema grammar and the field cursor that walks it.
//!
//! A grammar maps composite-type names to ordered member lists. The cursor
//! expands composite members in place (recursive descent over an explicit
//! frame stack) and yields only terminals: primitive tags and
//! indirection-marked composite names. Fixed-count members are yielded
//! exactly `count` times; UNBOUNDED members are yielded on every request and
//! never advance — the data-run decoder stops requesting when its byte
//! extent is exhausted.

use std::collections::HashMap;

use crate::error::{Result, Sir0Error};
use crate::model::TypeTag;

/// Cardinality of a schema member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    Fixed(u32),
    Unbounded,
}

/// One token of a member: a primitive tag, an inline composite expansion,
/// or an indirection-marked composite (the member is a pointer slot whose
/// target struct has the named type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldToken {
    Prim(TypeTag),
    Composite(String),
    Indirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub token: FieldToken,
    pub count: Count,
}

/// A terminal yielded by the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Prim(TypeTag),
    Indirect(String),
}

/// Pre-parsed grammar: composite-type name -> ordered member list, plus the
/// start type used for the root struct. Read-only and reusable across
/// decode/encode invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaGrammar {
    types: HashMap<String, Vec<Member>>,
    root_type: String,
}

impl SchemaGrammar {
    pub fn new(root_type: impl Into<String>, types: HashMap<String, Vec<Member>>) -> Self {
        Self {
            types,
            root_type: root_type.into(),
        }
    }

    /// Parses the JSON schema-source format: an object whose optional
    /// `"$root"` key names the start type (default `"Root"`) and whose other
    /// keys map composite names to arrays of member strings,
    /// `[&]token[*count]` with `*0` meaning UNBOUNDED.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| Sir0Error::schema(format!("schema json: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Sir0Error::schema("schema json root must be an object"))?;
        let mut root_type = "Root".to_string();
        let mut types = HashMap::new();
        for (key, val) in obj {
            if key == "$root" {
                root_type = val
                    .as_str()
                    .ok_or_else(|| Sir0Error::schema("$root must be a string"))?
                    .to_string();
                continue;
            }
            let arr = val
                .as_array()
                .ok_or_else(|| Sir0Error::schema(format!("type '{key}' must be an array")))?;
            let mut members = Vec::with_capacity(arr.len());
            for entry in arr {
                let text = entry.as_str().ok_or_else(|| {
                    Sir0Error::schema(format!("member of '{key}' must be a string"))
                })?;
                members.push(parse_member(text)?);
            }
            types.insert(key.clone(), members);
        }
        Ok(Self { types, root_type })
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn sequence(&self, name: &str) -> Option<&[Member]> {
        self.types.get(name).map(Vec::as_slice)
    }
}

fn parse_member(text: &str) -> Result<Member> {
    let text = text.trim();
    let (body, count) = match text.split_once('*') {
        Some((body, n)) => {
            let n: u32 = n
                .trim()
                .parse()
                .map_err(|_| Sir0Error::schema(format!("bad repeat count in '{text}'")))?;
            let count = if n == 0 { Count::Unbounded } else { Count::Fixed(n) };
            (body.trim(), count)
        }
        None => (text, Count::Fixed(1)),
    };
    let token = if let Some(name) = body.strip_prefix('&') {
        FieldToken::Indirect(name.to_string())
    } else if let Some(tag) = TypeTag::parse(body) {
        FieldToken::Prim(tag)
    } else if !body.is_empty() {
        FieldToken::Composite(body.to_string())
    } else {
        return Err(Sir0Error::schema(format!("empty member token in '{text}'")));
    };
    Ok(Member { token, count })
}

// Guards turning grammar cycles into errors instead of unbounded descent.
const MAX_FRAMES: usize = 64;
const MAX_EXPANSIONS: usize = 4096;

struct Frame<'g> {
    seq: &'g [Member],
    pos: usize,
    rep: u32,
}

/// Stateful traversal yielding the next terminal field token of a grammar.
pub struct FieldCursor<'g> {
    grammar: &'g SchemaGrammar,
    stack: Vec<Frame<'g>>,
}

impl<'g> FieldCursor<'g> {
    pub fn new(grammar: &'g SchemaGrammar, start_type: &str) -> Result<Self> {
        let seq = grammar
            .sequence(start_type)
            .ok_or_else(|| Sir0Error::schema(format!("unknown composite type '{start_type}'")))?;
        Ok(Self {
            grammar,
            stack: vec![Frame { seq, pos: 0, rep: 0 }],
        })
    }

    /// Returns the next terminal without consuming it, or `None` when the
    /// outermost frame is exhausted. Descent through composite members is
    /// performed eagerly and is idempotent.
    pub fn peek(&mut self) -> Result<Option<Terminal>> {
        self.descend()?;
        let Some(frame) = self.stack.last() else {
            return Ok(None);
        };
        terminal_of(&frame.seq[frame.pos].token).map(Some)
    }

    /// Consumes and returns the next terminal; requesting past the outermost
    /// frame is a contract violation.
    pub fn take(&mut self) -> Result<Terminal> {
        self.descend()?;
        let Some(frame) = self.stack.last_mut() else {
            return Err(Sir0Error::schema("field cursor exhausted"));
        };
        let member = &frame.seq[frame.pos];
        let terminal = terminal_of(&member.token)?;
        match member.count {
            Count::Fixed(n) => {
                frame.rep += 1;
                if frame.rep >= n {
                    frame.pos += 1;
                    frame.rep = 0;
                }
            }
            Count::Unbounded => {}
        }
        Ok(terminal)
    }

    /// Pops exhausted frames and expands composite members until the top of
    /// the stack sits on a terminal, or the stack empties.
    fn descend(&mut self) -> Result<()> {
        let mut expansions = 0usize;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(());
            };
            if frame.pos >= frame.seq.len() {
                self.stack.pop();
                continue;
            }
            let member = &frame.seq[frame.pos];
            let name = match &member.token {
                FieldToken::Composite(name) => name.clone(),
                _ => return Ok(()),
            };
            // Composite expansion: account for the repetition now, then push
            // a frame for the named sequence.
            match member.count {
                Count::Fixed(n) => {
                    frame.rep += 1;
                    if frame.rep >= n {
                        frame.pos += 1;
                        frame.rep = 0;
                    }
                }
                Count::Unbounded => {}
            }
            expansions += 1;
            if expansions > MAX_EXPANSIONS || self.stack.len() >= MAX_FRAMES {
                return Err(Sir0Error::schema(format!(
                    "runaway expansion of composite type '{name}' (recursive schema?)"
                )));
            }
            let seq = self
                .grammar
                .sequence(&name)
                .ok_or_else(|| Sir0Error::schema(format!("unknown composite type '{name}'")))?;
            self.stack.push(Frame { seq, pos: 0, rep: 0 });
        }
    }
}

fn terminal_of(token: &FieldToken) -> Result<Terminal> {
    match token {
        FieldToken::Prim(tag) => Ok(Terminal::Prim(*tag)),
        FieldToken::Indirect(name) => Ok(Terminal::Indirect(name.clone())),
        // descend() never leaves a composite on top of the stack.
        FieldToken::Composite(name) => Err(Sir0Error::schema(format!(
            "composite '{name}' yielded as terminal"
        ))),
    }
}
