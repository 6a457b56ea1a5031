use std::fmt;

use crate::connector::{ConnectorTable, DescId};
use crate::wordgraph::HierPosition;
use crate::Err;

/// A connector as handed in by the caller, before preparation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorSpec {
  pub desc: DescId,
  pub multi: bool,
}

/// One way a word can take part in a linkage, as handed in by the caller.
/// Both chains are stored shallow (farthest-linking) connector first.
#[derive(Debug, Clone, PartialEq)]
pub struct DisjunctSpec {
  pub left: Vec<ConnectorSpec>,
  pub right: Vec<ConnectorSpec>,
  pub cost: f64,
  /// Overrides the word's own string in linkages using this disjunct
  pub word_string: Option<String>,
  pub origin: HierPosition,
}

impl DisjunctSpec {
  pub fn new(left: Vec<ConnectorSpec>, right: Vec<ConnectorSpec>, cost: f64) -> Self {
    Self {
      left,
      right,
      cost,
      word_string: None,
      origin: HierPosition::root(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
  pub string: String,
  /// May be absent from a linkage without counting as a null word
  pub optional: bool,
  pub disjuncts: Vec<DisjunctSpec>,
}

/// A tokenized sentence with every word's disjuncts
#[derive(Debug, Clone, Default)]
pub struct Sentence {
  pub words: Vec<Word>,
  pub connectors: ConnectorTable,
}

impl Sentence {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn push_word(&mut self, string: impl Into<String>, optional: bool) -> usize {
    self.words.push(Word {
      string: string.into(),
      optional,
      disjuncts: Vec::new(),
    });
    self.words.len() - 1
  }

  pub fn push_disjunct(&mut self, word: usize, disjunct: DisjunctSpec) {
    self.words[word].disjuncts.push(disjunct);
  }

  /// Interns a connector name, see [`ConnectorTable::intern`]
  pub fn connector(&mut self, name: &str, multi: bool) -> Result<ConnectorSpec, Err> {
    Ok(ConnectorSpec {
      desc: self.connectors.intern(name)?,
      multi,
    })
  }

  pub fn num_disjuncts(&self) -> usize {
    self.words.iter().map(|w| w.disjuncts.len()).sum()
  }
}

impl fmt::Display for Sentence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, w) in self.words.iter().enumerate() {
      if i > 0 {
        write!(f, " ")?;
      }
      write!(f, "{}", w.string)?;
      if w.optional {
        write!(f, "?")?;
      }
    }
    Ok(())
  }
}
