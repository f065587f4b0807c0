//! A restricted reader for the closed Python-literal grammar the device's
//! `repr(...)` output is drawn from: `None`, booleans, integers, floats,
//! byte strings, text strings, tuples, lists, dicts and sets.
//!
//! This is deliberately not a general expression evaluator — it exists so
//! the host never re-introduces code-execution surface while decoding
//! device replies.

use std::collections::BTreeMap;
use std::fmt;

/// A decoded literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
    Set(Vec<Literal>),
}

impl Literal {
    /// View this literal as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// View this literal as an int, if it is one (bools count as 0/1).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// View this literal as bytes, if it is a bytes literal.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Literal::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// View this literal as a list/tuple of items, if it is one.
    pub fn as_seq(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(v) | Literal::Tuple(v) | Literal::Set(v) => Some(v),
            _ => None,
        }
    }

    /// View this literal as a dict's key/value pairs, if it is one.
    pub fn as_pairs(&self) -> Option<&[(Literal, Literal)]> {
        match self {
            Literal::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "literal parse error: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// Parse one literal from `s`, requiring the whole (trimmed) string to be consumed.
pub fn parse(s: &str) -> Result<Literal, ParseError> {
    let mut p = Parser {
        chars: s.trim().chars().collect(),
        pos: 0,
    };
    let v = p.value()?;
    p.skip_ws();
    if p.pos != p.chars.len() {
        return Err(ParseError(format!("trailing input at byte {}", p.pos)));
    }
    Ok(v)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
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

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.bump() == Some(c) {
            Ok(())
        } else {
            Err(ParseError(format!("expected '{c}' at byte {}", self.pos)))
        }
    }

    fn value(&mut self) -> Result<Literal, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('N') => self.keyword("None", Literal::None),
            Some('T') => self.keyword("True", Literal::Bool(true)),
            Some('F') => self.keyword("False", Literal::Bool(false)),
            Some('(') => self.tuple(),
            Some('[') => self.seq(']').map(Literal::List),
            Some('{') => self.dict_or_set(),
            Some('b') => self.bytes(),
            Some('\'') | Some('"') => self.string().map(Literal::Str),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) => Err(ParseError(format!("unexpected char '{c}'"))),
            None => Err(ParseError("unexpected end of input".into())),
        }
    }

    fn keyword(&mut self, kw: &str, value: Literal) -> Result<Literal, ParseError> {
        for expected in kw.chars() {
            if self.bump() != Some(expected) {
                return Err(ParseError(format!("expected keyword {kw}")));
            }
        }
        Ok(value)
    }

    fn tuple(&mut self) -> Result<Literal, ParseError> {
        let items = self.seq(')')?;
        Ok(Literal::Tuple(items))
    }

    fn seq(&mut self, close: char) -> Result<Vec<Literal>, ParseError> {
        self.bump(); // opening bracket
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(close) {
            self.bump();
            return Ok(items);
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_ws();
                    if self.peek() == Some(close) {
                        self.bump();
                        break;
                    }
                }
                Some(c) if c == close => {
                    self.bump();
                    break;
                }
                _ => return Err(ParseError(format!("expected ',' or '{close}'"))),
            }
        }
        Ok(items)
    }

    fn dict_or_set(&mut self) -> Result<Literal, ParseError> {
        self.bump(); // '{'
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Literal::Dict(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.bump();
            let mut pairs = vec![(first, self.value()?)];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(',') => {
                        self.bump();
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.bump();
                            break;
                        }
                        let k = self.value()?;
                        self.expect(':')?;
                        let v = self.value()?;
                        pairs.push((k, v));
                    }
                    Some('}') => {
                        self.bump();
                        break;
                    }
                    _ => return Err(ParseError("expected ',' or '}'".into())),
                }
            }
            Ok(Literal::Dict(pairs))
        } else {
            let mut items = vec![first];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(',') => {
                        self.bump();
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.bump();
                            break;
                        }
                        items.push(self.value()?);
                    }
                    Some('}') => {
                        self.bump();
                        break;
                    }
                    _ => return Err(ParseError("expected ',' or '}'".into())),
                }
            }
            Ok(Literal::Set(items))
        }
    }

    fn bytes(&mut self) -> Result<Literal, ParseError> {
        self.bump(); // 'b'
        let b = self.raw_byte_string()?;
        Ok(Literal::Bytes(b))
    }

    fn string(&mut self) -> Result<String, ParseError> {
        self.raw_string()
    }

    fn raw_string(&mut self) -> Result<String, ParseError> {
        let quote = self.bump().ok_or_else(|| ParseError("expected quote".into()))?;
        if quote != '\'' && quote != '"' {
            return Err(ParseError("expected quote".into()));
        }
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError("unterminated string".into())),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('x') => {
                        let hi = self.bump().ok_or_else(|| ParseError("bad \\x escape".into()))?;
                        let lo = self.bump().ok_or_else(|| ParseError("bad \\x escape".into()))?;
                        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                            .map_err(|_| ParseError("bad \\x escape".into()))?;
                        out.push(byte as char);
                    }
                    Some(other) => out.push(other),
                    None => return Err(ParseError("unterminated escape".into())),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(out)
    }

    /// Like [`Self::raw_string`], but for a `b'...'` bytes literal: a `\xHH`
    /// escape yields exactly the one raw byte it names, never re-encoded
    /// through `char`/UTF-8. Unescaped characters are expected to be plain
    /// ASCII (the only kind of byte a `b'...'` source ever leaves unescaped)
    /// and are pushed as their single byte value.
    fn raw_byte_string(&mut self) -> Result<Vec<u8>, ParseError> {
        let quote = self.bump().ok_or_else(|| ParseError("expected quote".into()))?;
        if quote != '\'' && quote != '"' {
            return Err(ParseError("expected quote".into()));
        }
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(ParseError("unterminated string".into())),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push(b'\n'),
                    Some('r') => out.push(b'\r'),
                    Some('t') => out.push(b'\t'),
                    Some('\\') => out.push(b'\\'),
                    Some('\'') => out.push(b'\''),
                    Some('"') => out.push(b'"'),
                    Some('x') => {
                        let hi = self.bump().ok_or_else(|| ParseError("bad \\x escape".into()))?;
                        let lo = self.bump().ok_or_else(|| ParseError("bad \\x escape".into()))?;
                        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                            .map_err(|_| ParseError("bad \\x escape".into()))?;
                        out.push(byte);
                    }
                    Some(other) => out.extend_from_slice(other.to_string().as_bytes()),
                    None => return Err(ParseError("unterminated escape".into())),
                },
                Some(c) => out.extend_from_slice(c.to_string().as_bytes()),
            }
        }
        Ok(out)
    }

    fn number(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else if c == '.' || c == 'e' || c == 'E' || c == '+' || (c == '-' && is_float) {
                is_float = true;
                self.bump();
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| ParseError(format!("bad float literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| ParseError(format!("bad int literal '{text}'")))
        }
    }
}

/// Convenience: parse a dict-of-int-or-null literal into a `BTreeMap`,
/// as used by `fileinfo` replies keyed by path.
pub fn parse_dict(s: &str) -> Result<BTreeMap<String, Literal>, ParseError> {
    let lit = parse(s)?;
    let pairs = lit
        .as_pairs()
        .ok_or_else(|| ParseError("expected a dict literal".into()))?;
    let mut map = BTreeMap::new();
    for (k, v) in pairs {
        let key = k
            .as_str()
            .ok_or_else(|| ParseError("dict key was not a string".into()))?
            .to_string();
        map.insert(key, v.clone());
    }
    Ok(map)
}
