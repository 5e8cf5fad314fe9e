// This file is part of a SpringRTS map archive parser.
//
// Licensed under the GNU General Public License, version 3 or later.

//! Metadata decoders: the modern `mapinfo.lua` table-expression format and
//! the legacy `.smd` `Key=Value;` format. Both are small, bespoke grammars
//! and get hand-written parsers rather than a general parsing crate, in
//! keeping with this family's existing preference for purpose-built
//! lexing over parser generators.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<MetadataValue>),
    Table(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_table(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            MetadataValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.as_table().and_then(|t| t.get(key))
    }
}

/// Parse a `return { ... }` Lua table expression. Never fails outwardly: a
/// broken top-level table yields an empty `Table`, logged at `warn`.
pub fn parse_mapinfo(text: &str) -> MetadataValue {
    match Parser::new(text).parse_top() {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to parse mapinfo table, using empty metadata: {e}");
            MetadataValue::Table(BTreeMap::new())
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

type PResult<T> = Result<T, String>;

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.pos += 1;
            }
            if self.peek() == Some('-') && self.chars.get(self.pos + 1) == Some(&'-') {
                while self.peek().is_some() && self.peek() != Some('\n') {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn expect(&mut self, c: char) -> PResult<()> {
        self.skip_ws_and_comments();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{c}' at position {}", self.pos))
        }
    }

    fn parse_top(&mut self) -> PResult<MetadataValue> {
        self.skip_ws_and_comments();
        if self.peek_ident() == Some("return".to_string()) {
            self.take_ident();
        }
        self.skip_ws_and_comments();
        self.parse_value()
    }

    fn peek_ident(&mut self) -> Option<String> {
        let save = self.pos;
        self.skip_ws_and_comments();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let s: String = self.chars[start..self.pos].iter().collect();
        self.pos = save;
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    fn take_ident(&mut self) -> String {
        self.skip_ws_and_comments();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_value(&mut self) -> PResult<MetadataValue> {
        self.skip_ws_and_comments();
        match self.peek() {
            Some('{') => self.parse_table(),
            Some('"') | Some('\'') => self.parse_string(),
            Some(c) if c == '-' || c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.take_ident();
                match word.as_str() {
                    "true" => Ok(MetadataValue::Bool(true)),
                    "false" => Ok(MetadataValue::Bool(false)),
                    "nil" => Ok(MetadataValue::Table(BTreeMap::new())),
                    other => Err(format!("unexpected identifier '{other}' as value")),
                }
            }
            other => Err(format!("unexpected token {other:?} at position {}", self.pos)),
        }
    }

    fn parse_string(&mut self) -> PResult<MetadataValue> {
        let quote = self.bump().ok_or("unexpected end of input in string")?;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => break,
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        s.push(escaped);
                    }
                }
                Some(c) => s.push(c),
                None => return Err("unterminated string literal".to_string()),
            }
        }
        Ok(MetadataValue::Str(s))
    }

    fn parse_number(&mut self) -> PResult<MetadataValue> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let s: String = self.chars[start..self.pos].iter().collect();
        s.parse::<f64>()
            .map(MetadataValue::Num)
            .map_err(|_| format!("invalid number literal {s:?}"))
    }

    /// One table entry: either `key = value` (bracketed or bare ident) or a
    /// bare positional value. `EntryError.was_named` tells the caller
    /// whether the entry had already committed to `key = ...` form before
    /// failing, so a malformed keyed field still marks the table as named
    /// rather than silently demoting it to a list.
    fn parse_table_entry(&mut self) -> Result<TableEntry, EntryError> {
        if self.peek() == Some('[') {
            self.pos += 1;
            self.parse_bracket_key_entry().map_err(|msg| EntryError {
                msg,
                was_named: true,
            })
        } else if let Some(ident) = self.peek_ident() {
            let save = self.pos;
            self.take_ident();
            self.skip_ws_and_comments();
            if self.peek() == Some('=') && self.chars.get(self.pos + 1) != Some(&'=') {
                self.pos += 1;
                self.parse_value()
                    .map(|val| TableEntry::Named(ident, val))
                    .map_err(|msg| EntryError {
                        msg,
                        was_named: true,
                    })
            } else {
                // not actually `ident =`, rewind and treat as a value
                self.pos = save;
                self.parse_value()
                    .map(TableEntry::Positional)
                    .map_err(|msg| EntryError {
                        msg,
                        was_named: false,
                    })
            }
        } else {
            self.parse_value()
                .map(TableEntry::Positional)
                .map_err(|msg| EntryError {
                    msg,
                    was_named: false,
                })
        }
    }

    /// `[expr] = value` key form, factored out so its error path can be
    /// tagged `was_named` uniformly by the caller.
    fn parse_bracket_key_entry(&mut self) -> PResult<TableEntry> {
        let key_val = self.parse_value()?;
        self.expect(']')?;
        self.expect('=')?;
        let val = self.parse_value()?;
        let key = match key_val {
            MetadataValue::Num(n) => format!("{n}"),
            MetadataValue::Str(s) => s,
            _ => return Err("unsupported table key expression".to_string()),
        };
        Ok(TableEntry::Named(key, val))
    }

    /// Advance past whatever is left of a malformed entry, up to (but not
    /// consuming) the next top-level `,`/`;`/`}`. Tracks brace depth and
    /// string quoting so a stray separator inside a nested table or string
    /// literal doesn't cut recovery short.
    fn skip_malformed_entry(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                None => break,
                Some('{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some('}') if depth > 0 => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some('}') => break,
                Some(',') | Some(';') if depth == 0 => break,
                Some(quote @ ('"' | '\'')) => {
                    self.pos += 1;
                    while let Some(c) = self.bump() {
                        if c == '\\' {
                            self.bump();
                        } else if c == quote {
                            break;
                        }
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Parses `{ ... }`. Collapses to `List` when every entry was
    /// positional (or densely integer-keyed, 1-based with no gaps). A
    /// single malformed entry is logged and omitted rather than failing
    /// the whole table, matching the soft-recovery policy the mapinfo
    /// format requires.
    fn parse_table(&mut self) -> PResult<MetadataValue> {
        self.expect('{')?;
        let mut named: BTreeMap<String, MetadataValue> = BTreeMap::new();
        let mut positional: Vec<MetadataValue> = Vec::new();
        let mut all_positional = true;

        loop {
            self.skip_ws_and_comments();
            if self.peek() == Some('}') {
                self.pos += 1;
                break;
            }

            let entry_start = self.pos;
            match self.parse_table_entry() {
                Ok(TableEntry::Named(key, val)) => {
                    all_positional = false;
                    named.insert(key, val);
                }
                Ok(TableEntry::Positional(val)) => {
                    positional.push(val);
                }
                Err(e) => {
                    warn!("skipping malformed mapinfo table entry: {}", e.msg);
                    if e.was_named {
                        all_positional = false;
                    }
                    self.skip_malformed_entry();
                    if self.pos == entry_start {
                        // didn't move at all; force progress to avoid looping.
                        self.pos += 1;
                    }
                }
            }

            self.skip_ws_and_comments();
            match self.peek() {
                Some(',') | Some(';') => {
                    self.pos += 1;
                }
                Some('}') => {
                    self.pos += 1;
                    break;
                }
                None => break,
                other => {
                    warn!("expected ',' or '}}' in mapinfo table, found {other:?}; truncating table here");
                    break;
                }
            }
        }

        if all_positional {
            Ok(MetadataValue::List(positional))
        } else if positional.is_empty() {
            Ok(MetadataValue::Table(named))
        } else {
            // Mixed positional/named: fold positional entries in as 1-based
            // numeric keys alongside the named ones.
            for (i, v) in positional.into_iter().enumerate() {
                named.insert((i + 1).to_string(), v);
            }
            Ok(MetadataValue::Table(named))
        }
    }
}

enum TableEntry {
    Named(String, MetadataValue),
    Positional(MetadataValue),
}

struct EntryError {
    msg: String,
    was_named: bool,
}

/// A parsed legacy `.smd` file: start positions plus any other fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SmdMetadata {
    pub start_positions: Vec<(f64, f64)>,
    pub fields: BTreeMap<String, MetadataValue>,
}

lazy_static! {
    static ref SMD_PAIR_RE: Regex = Regex::new(r"(?m)(\w+)\s*=\s*([^;]*);").unwrap();
    static ref START_POS_RE: Regex = Regex::new(r"^StartPos(\d+)([XZ])$").unwrap();
}

/// Parse legacy `Key=Value;` metadata text. Never fails outwardly: fields
/// that don't parse as numbers are kept as strings, and start-position
/// pairs are coalesced by their shared numeric suffix.
pub fn parse_smd(text: &str) -> SmdMetadata {
    let mut fields = BTreeMap::new();
    let mut starts: BTreeMap<usize, (Option<f64>, Option<f64>)> = BTreeMap::new();

    for caps in SMD_PAIR_RE.captures_iter(text) {
        let key = caps[1].trim().to_string();
        let value = caps[2].trim().to_string();

        if let Some(m) = START_POS_RE.captures(&key) {
            let idx: usize = m[1].parse().unwrap_or(0);
            let axis = &m[2];
            let num: f64 = value.parse().unwrap_or(0.0);
            let entry = starts.entry(idx).or_insert((None, None));
            if axis == "X" {
                entry.0 = Some(num);
            } else {
                entry.1 = Some(num);
            }
            continue;
        }

        let parsed = value
            .parse::<f64>()
            .map(MetadataValue::Num)
            .unwrap_or(MetadataValue::Str(value));
        fields.insert(key, parsed);
    }

    let start_positions = starts
        .into_values()
        .filter_map(|(x, z)| match (x, z) {
            (Some(x), Some(z)) => Some((x, z)),
            _ => None,
        })
        .collect();

    SmdMetadata {
        start_positions,
        fields,
    }
}
