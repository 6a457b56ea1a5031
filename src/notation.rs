//! Simple recursive-descent parsing of sentence fixtures:
//!
//! ```text
//! // comment
//! LEFT-WALL: Wd+;
//! the: D+;
//! cat: D- & Ss+ | {cat.v} [1.5] S- & O+;
//! very?: <2.1> EA+;
//! ```
//!
//! Each entry is a word, an optional `?` marking it optional, and its disjuncts
//! separated by `|`. A disjunct may start with `{word string}`, `[cost]` and
//! `<hierarchy.position>`, followed by `()` or connectors joined with `&`.
//! Minus connectors are written farthest first, plus connectors nearest first.

use regex::Regex;
use std::str::FromStr;

use crate::sentence::{ConnectorSpec, DisjunctSpec, Sentence};
use crate::wordgraph::HierPosition;
use crate::Err;

impl FromStr for Sentence {
  type Err = Err;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut sent = Sentence::new();
    let s = parse_words(s, &mut sent)?;
    assert!(s.is_empty());

    if sent.is_empty() {
      Err("empty sentence".into())
    } else {
      Ok(sent)
    }
  }
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, excerpt(s)).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, excerpt(s)).into())
  }
}

fn excerpt(s: &str) -> &str {
  match s.char_indices().nth(30) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Skips whitespace and // comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"(?:\s+|//[^\n]*)*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// A word: anything up to whitespace or one of the entry delimiters
fn parse_word_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(WORD, r"[^\s:?;|]+");
  needed_re(&WORD, s).map_err(|e| format!("word: {}", e).into())
}

fn parse_cost(s: &str) -> ParseResult<'_, f64> {
  regex_static!(NUMBER, r"-?[0-9]+(\.[0-9]+)?");
  let (_, s) = needed_char('[', s)?;
  let s = skip_whitespace(s);
  let (num, s) = needed_re(&NUMBER, s).map_err(|e| format!("cost: {}", e))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(']', s)?;
  Ok((num.parse::<f64>()?, s))
}

fn parse_hier_position(s: &str) -> ParseResult<'_, HierPosition> {
  regex_static!(DOTTED_NUMBERS, r"[0-9]+(\.[0-9]+)*");
  let (_, s) = needed_char('<', s)?;
  let (dotted, s) = needed_re(&DOTTED_NUMBERS, s).map_err(|e| format!("position: {}", e))?;
  let (_, s) = needed_char('>', s)?;

  let parts = dotted
    .split('.')
    .map(|n| n.parse::<u32>())
    .collect::<Result<Vec<_>, _>>()?;
  if parts.len() % 2 != 0 {
    return Err(format!("position {} must be (word, alternative) pairs", dotted).into());
  }
  Ok((HierPosition(parts), s))
}

fn parse_word_string(s: &str) -> ParseResult<'_, String> {
  regex_static!(BRACED, r"[^}]+");
  let (_, s) = needed_char('{', s)?;
  let (string, s) = needed_re(&BRACED, s).map_err(|e| format!("word string: {}", e))?;
  let (_, s) = needed_char('}', s)?;
  Ok((string.trim().to_string(), s))
}

/// A connector with its direction mark: `@Ss*b+`
fn parse_connector<'a>(s: &'a str, sent: &mut Sentence) -> ParseResult<'a, (char, ConnectorSpec)> {
  regex_static!(CONNECTOR, r"@?[hd]?[A-Z][A-Z0-9_]*[a-z*]*[+-]");
  let (text, s) = needed_re(&CONNECTOR, s).map_err(|e| format!("connector: {}", e))?;
  let (multi, text) = match text.strip_prefix('@') {
    Some(rest) => (true, rest),
    None => (false, text),
  };
  let (name, dir) = text.split_at(text.len() - 1);
  let spec = sent.connector(name, multi)?;
  Ok(((dir.chars().next().unwrap(), spec), s))
}

fn parse_disjunct<'a>(s: &'a str, sent: &mut Sentence) -> ParseResult<'a, DisjunctSpec> {
  let mut d = DisjunctSpec::new(Vec::new(), Vec::new(), 0.0);
  let mut s = s;

  if s.starts_with('{') {
    let (string, rest) = parse_word_string(s)?;
    d.word_string = Some(string);
    s = skip_whitespace(rest);
  }
  if s.starts_with('[') {
    let (cost, rest) = parse_cost(s)?;
    d.cost = cost;
    s = skip_whitespace(rest);
  }
  if s.starts_with('<') {
    let (origin, rest) = parse_hier_position(s)?;
    d.origin = origin;
    s = skip_whitespace(rest);
  }

  if let Some(rest) = s.strip_prefix("()") {
    return Ok((d, rest));
  }

  loop {
    let ((dir, spec), rest) = parse_connector(s, sent)?;
    if dir == '-' {
      d.left.push(spec);
    } else {
      d.right.push(spec);
    }
    s = skip_whitespace(rest);
    if let (Some(_), rest) = optional_char('&', s) {
      s = skip_whitespace(rest);
    } else {
      break;
    }
  }
  // plus connectors are written nearest first
  d.right.reverse();
  Ok((d, s))
}

/// word [?] : disjunct | disjunct ... ;
fn parse_word<'a>(s: &'a str, sent: &mut Sentence) -> ParseResult<'a, usize> {
  let (name, s) = parse_word_name(s)?;
  let (optional, s) = optional_char('?', s);
  let s = skip_whitespace(s);
  let (_, s) = needed_char(':', s).map_err(|e| -> Err { format!("word {}: {}", name, e).into() })?;
  let w = sent.push_word(name, optional.is_some());

  let mut rem = skip_whitespace(s);
  if let (Some(_), rest) = optional_char(';', rem) {
    return Ok((w, rest));
  }
  loop {
    let (d, s) =
      parse_disjunct(rem, sent).map_err(|e| -> Err { format!("word {}: {}", name, e).into() })?;
    sent.push_disjunct(w, d);
    let s = skip_whitespace(s);
    if let (Some(_), s) = optional_char('|', s) {
      rem = skip_whitespace(s);
    } else {
      let (_, s) =
        needed_char(';', s).map_err(|e| -> Err { format!("word {}: {}", name, e).into() })?;
      return Ok((w, s));
    }
  }
}

fn parse_words<'a>(s: &'a str, sent: &mut Sentence) -> Result<&'a str, Err> {
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok(rem);
    }
    let (_, s) = parse_word(rem, sent)?;
    rem = s;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_sentence() {
    let sent: Sentence = r#"
      // a comment
      LEFT-WALL: Wd+;
      the: D+;
      cat: Wd- & D- & @Ss*b+ | {cat.v} [1.5] <1.0> A- & B+ & C+;
      sat?: ();
      .: ;
    "#
    .parse()
    .unwrap();

    assert_eq!(sent.len(), 5);
    assert_eq!(sent.words[0].string, "LEFT-WALL");
    assert!(sent.words[3].optional);
    assert!(sent.words[4].disjuncts.is_empty());

    let cat = &sent.words[2];
    assert_eq!(cat.disjuncts.len(), 2);
    let d0 = &cat.disjuncts[0];
    assert_eq!(d0.left.len(), 2);
    assert_eq!(sent.connectors.get(d0.left[0].desc).string, "Wd");
    assert!(d0.right[0].multi);
    assert_eq!(d0.cost, 0.0);

    let d1 = &cat.disjuncts[1];
    assert_eq!(d1.word_string.as_deref(), Some("cat.v"));
    assert_eq!(d1.cost, 1.5);
    assert_eq!(d1.origin, HierPosition(vec![1, 0]));
    // shallow first: C+ links farther than B+
    assert_eq!(sent.connectors.get(d1.right[0].desc).string, "C");
    assert_eq!(sent.connectors.get(d1.right[1].desc).string, "B");

    let sat = &sent.words[3].disjuncts[0];
    assert!(sat.left.is_empty() && sat.right.is_empty());
  }

  #[test]
  fn test_parse_errors() {
    assert!("".parse::<Sentence>().is_err());
    assert!("a: A+".parse::<Sentence>().is_err());
    assert!("a A+;".parse::<Sentence>().is_err());
    assert!("a: a+;".parse::<Sentence>().is_err());
    assert!("a: A+ &;".parse::<Sentence>().is_err());
    assert!("a: <1> A+;".parse::<Sentence>().is_err());
    assert!("a: [x] A+;".parse::<Sentence>().is_err());
  }
}
