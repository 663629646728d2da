//! Restricted literal data reader.
//!
//! Property sections and directive arguments in a script are literal data only:
//! integers, floats, quoted strings, `True`/`False`/`None`, lists, tuples and
//! dicts. Nothing else is evaluated.
//!
//! ```
//! use learnsim::literal::{parse_literal, Literal};
//!
//! let lit = parse_literal("{'label': 'train', 'phases': ('a', 'b')}").unwrap();
//! let dict = lit.as_dict().unwrap();
//! assert_eq!(dict.get("label").and_then(Literal::as_str), Some("train"));
//! ```

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Dict(Dict),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Literal::Int(i) => Some(i as f64),
            Literal::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Literal::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Literal::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Literal::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    pub fn as_seq(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) | Literal::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Literal::Tuple(_))
    }

    /// A string, or a list/tuple made only of strings.
    pub fn as_names(&self) -> Option<Vec<&str>> {
        match self {
            Literal::Str(s) => Some(vec![s.as_str()]),
            Literal::List(items) | Literal::Tuple(items) => {
                items.iter().map(Literal::as_str).collect()
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::None => "NoneType",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::Str(_) => "str",
            Literal::List(_) => "list",
            Literal::Tuple(_) => "tuple",
            Literal::Dict(_) => "dict",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{x:.1}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "'{s}'"),
            Literal::List(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
            Literal::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Literal::Dict(d) => {
                write!(f, "{{")?;
                for (i, (k, v)) in d.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Insertion-ordered literal dict. Re-inserting a key keeps its position and
/// replaces the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(Literal, Literal)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: Literal, value: Literal) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Lookup by string key.
    pub fn get(&self, key: &str) -> Option<&Literal> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Literal, &Literal)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Merge `other` into `self`; keys of `other` win.
    pub fn merge(&mut self, other: &Dict) {
        for (k, v) in other.iter() {
            self.insert(k.clone(), v.clone());
        }
    }
}

/// Parse exactly one literal; trailing text is an error.
pub fn parse_literal(input: &str) -> Result<Literal> {
    let mut r = Reader::new(input);
    r.skip_ws();
    let value = r.value()?;
    r.skip_ws();
    if !r.at_end() {
        return Err(r.error("unexpected trailing text"));
    }
    Ok(value)
}

/// Parse a dict literal.
pub fn parse_dict(input: &str) -> Result<Dict> {
    match parse_literal(input)? {
        Literal::Dict(d) => Ok(d),
        other => Err(Error::Literal {
            input: input.to_string(),
            offset: 0,
            message: format!("expected a dict, got a {}", other.type_name()),
        }),
    }
}

/// Parse a whitespace-separated sequence of literals, e.g. `'reward' {'subject': 1}`.
pub fn parse_sequence(input: &str) -> Result<Vec<Literal>> {
    let mut r = Reader::new(input);
    let mut out = Vec::new();
    r.skip_ws();
    while !r.at_end() {
        out.push(r.value()?);
        r.skip_ws();
    }
    Ok(out)
}

struct Reader<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Literal {
            input: self.src.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, b: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Result<Literal> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'\'' | b'"') => self.string().map(Literal::Str),
            Some(b'[') => {
                self.pos += 1;
                let (items, _) = self.items(b']')?;
                Ok(Literal::List(items))
            }
            Some(b'(') => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.items(b')')?;
                // `('a')` is a parenthesised value, `('a',)` a one-tuple.
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Literal::Tuple(items))
                }
            }
            Some(b'{') => {
                self.pos += 1;
                self.dict().map(Literal::Dict)
            }
            Some(b'+' | b'-' | b'.' | b'0'..=b'9') => self.number(),
            Some(b'A'..=b'Z') => self.constant(),
            Some(_) => Err(self.error("expected a number, string, list, tuple or dict")),
        }
    }

    /// Comma-separated values up to `close`. Returns whether the last item was
    /// followed by a comma.
    fn items(&mut self, close: u8) -> Result<(Vec<Literal>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            if self.eat(b',') {
                trailing_comma = true;
                continue;
            }
            trailing_comma = false;
            if self.eat(close) {
                return Ok((items, trailing_comma));
            }
            return Err(self.error(format!("expected ',' or '{}'", close as char)));
        }
    }

    fn dict(&mut self) -> Result<Dict> {
        let mut dict = Dict::new();
        loop {
            if self.eat(b'}') {
                return Ok(dict);
            }
            let key = self.value()?;
            if matches!(key, Literal::List(_) | Literal::Dict(_)) {
                return Err(self.error(format!("unhashable dict key of type {}", key.type_name())));
            }
            if !self.eat(b':') {
                return Err(self.error("expected ':' after dict key"));
            }
            let value = self.value()?;
            dict.insert(key, value);
            if self.eat(b',') {
                continue;
            }
            if self.eat(b'}') {
                return Ok(dict);
            }
            return Err(self.error("expected ',' or '}'"));
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bytes[self.pos];
        self.pos += 1;
        let mut out = String::new();
        let rest = &self.src[self.pos..];
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    let Some((_, esc)) = chars.next() else {
                        break;
                    };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' | '\'' | '"' => out.push(esc),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                '\n' => break,
                c if c as u32 == quote as u32 => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    /// `True`, `False` or `None`; any other bare word is rejected.
    fn constant(&mut self) -> Result<Literal> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        match &self.src[start..self.pos] {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            word => {
                let message = format!("'{word}' is not a literal");
                self.pos = start;
                Err(self.error(message))
            }
        }
    }

    fn number(&mut self) -> Result<Literal> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        let mut is_float = false;
        let mut digits = 0;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => digits += 1,
                b'.' if !is_float => is_float = true,
                b'e' | b'E' if digits > 0 => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        self.pos += 1;
                    }
                    continue;
                }
                _ => break,
            }
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        if digits == 0 {
            self.pos = start;
            return Err(self.error("malformed number"));
        }
        if is_float {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| self.error(format!("malformed number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| self.error(format!("integer '{text}' out of range")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_parameter_dict() {
        let lit = parse_literal(
            "{'behaviors': ['R0', 'R1'], 'start_v': {('E0', 'R0'): -1, 'default': 0.5}, 'beta': 1.5e0}",
        )
        .unwrap();
        let d = lit.as_dict().unwrap();
        assert_eq!(d.get("behaviors").unwrap().as_names().unwrap(), vec!["R0", "R1"]);
        let start_v = d.get("start_v").unwrap().as_dict().unwrap();
        assert_eq!(start_v.get("default"), Some(&Literal::Float(0.5)));
        let (key, value) = start_v.iter().next().unwrap();
        assert!(key.is_tuple());
        assert_eq!(value.as_f64(), Some(-1.0));
        assert_eq!(d.get("beta").unwrap().as_f64(), Some(1.5));
    }

    #[test]
    fn parenthesised_value_is_not_a_tuple() {
        assert_eq!(parse_literal("('a')").unwrap(), Literal::Str("a".into()));
        assert_eq!(
            parse_literal("('a',)").unwrap(),
            Literal::Tuple(vec![Literal::Str("a".into())])
        );
        assert_eq!(parse_literal("()").unwrap(), Literal::Tuple(vec![]));
    }

    #[test]
    fn rejects_code_and_garbage() {
        assert!(parse_literal("__import__('os')").is_err());
        assert!(parse_literal("{'a': 1").is_err());
        assert!(parse_literal("{'a' 1}").is_err());
        assert!(parse_literal("[1, 2] 3").is_err());
        assert!(parse_literal("{[1]: 2}").is_err());
        assert!(parse_literal("'open").is_err());
        assert!(parse_literal("Truth").is_err());
        assert!(parse_literal("NONE").is_err());
    }

    #[test]
    fn constants_pass_through() {
        let d = parse_dict("{'grid': True, 'legend': False, 'color': None}").unwrap();
        assert_eq!(d.get("grid").and_then(Literal::as_bool), Some(true));
        assert_eq!(d.get("legend"), Some(&Literal::Bool(false)));
        assert_eq!(d.get("color"), Some(&Literal::None));
        assert_eq!(
            Literal::Dict(d).to_string(),
            "{'grid': True, 'legend': False, 'color': None}"
        );
    }

    #[test]
    fn later_keys_override_in_place() {
        let d = parse_dict("{'a': 1, 'b': 2, 'a': 3}").unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("a"), Some(&Literal::Int(3)));
        assert_eq!(d.iter().next().unwrap().0.as_str(), Some("a"));
    }

    #[test]
    fn sequence_of_directive_arguments() {
        let args = parse_sequence("('S1', 'R1') {'subject': 'all'}  [1, 2]").unwrap();
        assert_eq!(args.len(), 3);
        assert!(args[0].is_tuple());
        assert!(args[1].as_dict().is_some());
        assert_eq!(args[2].as_seq().unwrap().len(), 2);
    }

    #[test]
    fn display_round_trips_shapes() {
        let lit = parse_literal("{'k': ('x',), 'n': [1, 2.0]}").unwrap();
        assert_eq!(lit.to_string(), "{'k': ('x',), 'n': [1, 2.0]}");
    }
}
