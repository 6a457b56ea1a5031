use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::connector::{Connector, ConnectorDisplay, ConnectorIdx, ConnectorTable};
use crate::pool::{Pool, PoolStats, Snapshot};
use crate::sentence::{ConnectorSpec, Sentence};
use crate::wordgraph::{OriginId, Origins};

crate::define_idx!(
  /// A disjunct inside a [`DisjunctBlock`]
  DisjunctIdx
);

#[derive(Debug, Clone, PartialEq)]
pub struct Disjunct {
  /// Shallow connector of the left chain
  pub left: Option<ConnectorIdx>,
  /// Shallow connector of the right chain
  pub right: Option<ConnectorIdx>,
  pub cost: f64,
  pub word_string: Rc<str>,
  pub origin: OriginId,
}

/// All disjuncts and connectors of one sentence, laid out in two pools,
/// plus each word's list of live disjuncts.
#[derive(Debug, Clone, Default)]
pub struct DisjunctBlock {
  pub connectors: Pool<ConnectorIdx, Connector>,
  pub disjuncts: Pool<DisjunctIdx, Disjunct>,
  pub words: Vec<Vec<DisjunctIdx>>,
  pub origins: Origins,
}

/// A copy of a block taken before pruning, see [`DisjunctBlock::save`]
#[derive(Debug, Clone)]
pub struct SavedBlock {
  connectors: Snapshot<ConnectorIdx, Connector>,
  disjuncts: Snapshot<DisjunctIdx, Disjunct>,
  words: Vec<Vec<DisjunctIdx>>,
}

/// Iterates a connector chain from its shallow end
pub struct Chain<'a> {
  block: &'a DisjunctBlock,
  next: Option<ConnectorIdx>,
}

impl<'a> Iterator for Chain<'a> {
  type Item = (ConnectorIdx, &'a Connector);

  fn next(&mut self) -> Option<Self::Item> {
    let idx = self.next?;
    let c = self.block.connector(idx);
    self.next = c.next;
    Some((idx, c))
  }
}

impl DisjunctBlock {
  pub fn new() -> Self {
    Default::default()
  }

  /// Number of words
  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn connector(&self, idx: ConnectorIdx) -> &Connector {
    &self.connectors[idx]
  }

  pub fn disjunct(&self, idx: DisjunctIdx) -> &Disjunct {
    &self.disjuncts[idx]
  }

  pub fn chain(&self, head: Option<ConnectorIdx>) -> Chain<'_> {
    Chain { block: self, next: head }
  }

  /// Live disjuncts of `word`
  pub fn word(&self, word: usize) -> &[DisjunctIdx] {
    &self.words[word]
  }

  pub fn num_disjuncts(&self) -> usize {
    self.words.iter().map(Vec::len).sum()
  }

  /// Connectors reachable from live disjuncts, counting shared ones once
  pub fn num_live_connectors(&self) -> usize {
    let mut seen = vec![false; self.connectors.len()];
    let mut n = 0;
    for &d in self.words.iter().flatten() {
      let d = self.disjunct(d);
      for (idx, _) in self.chain(d.left).chain(self.chain(d.right)) {
        if !seen[idx.0 as usize] {
          seen[idx.0 as usize] = true;
          n += 1;
        }
      }
    }
    n
  }

  /// Drops all contents but keeps the pools' storage
  pub fn reset(&mut self) {
    self.connectors.reset();
    self.disjuncts.reset();
    self.words.clear();
  }

  pub fn save(&self) -> SavedBlock {
    SavedBlock {
      connectors: self.connectors.snapshot(),
      disjuncts: self.disjuncts.snapshot(),
      words: self.words.clone(),
    }
  }

  pub fn restore(&mut self, saved: &SavedBlock) {
    self.connectors.restore(&saved.connectors);
    self.disjuncts.restore(&saved.disjuncts);
    self.words.clone_from(&saved.words);
  }

  pub fn stats(&self) -> (PoolStats, PoolStats) {
    (self.connectors.stats(), self.disjuncts.stats())
  }

  /// Allocates a chain given shallow connector first, returning its head
  fn push_chain(&mut self, specs: &[ConnectorSpec], origin: OriginId) -> Option<ConnectorIdx> {
    let mut next = None;
    for spec in specs.iter().rev() {
      let mut c = Connector::new(spec.desc, spec.multi, origin);
      c.next = next;
      next = Some(self.connectors.alloc(c));
    }
    if let Some(head) = next {
      self.connectors[head].shallow = true;
    }
    next
  }

  pub fn display<'a>(&'a self, table: &'a ConnectorTable, d: DisjunctIdx) -> DisjunctDisplay<'a> {
    DisjunctDisplay {
      block: self,
      table,
      d,
    }
  }
}

/// Renders a disjunct in the notation it was read from
pub struct DisjunctDisplay<'a> {
  block: &'a DisjunctBlock,
  table: &'a ConnectorTable,
  d: DisjunctIdx,
}

impl fmt::Display for DisjunctDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let d = self.block.disjunct(self.d);
    let mut parts = Vec::new();
    for (_, c) in self.block.chain(d.left) {
      let connector = ConnectorDisplay { table: self.table, connector: c };
      parts.push(format!("{}-", connector));
    }
    let mut right = Vec::new();
    for (_, c) in self.block.chain(d.right) {
      let connector = ConnectorDisplay { table: self.table, connector: c };
      right.push(format!("{}+", connector));
    }
    parts.extend(right.into_iter().rev());

    write!(f, "{}: ", d.word_string)?;
    if parts.is_empty() {
      write!(f, "()")
    } else {
      write!(f, "{}", parts.join(" & "))
    }
  }
}

/// Builds the block a parse starts from: identical disjuncts of a word merged
/// (lower cost kept, origins joined), then `nearest_word`/`farthest_word` set on
/// every connector. Disjuncts whose chains cannot fit in the sentence are dropped.
pub fn prepare(sent: &Sentence) -> DisjunctBlock {
  let mut block = DisjunctBlock::new();
  let len = sent.len() as i32;

  for (w, word) in sent.words.iter().enumerate() {
    // (left, right, string) -> index into `kept`
    let mut seen: HashMap<(&[ConnectorSpec], &[ConnectorSpec], &str), usize> = HashMap::new();
    let mut kept: Vec<(usize, f64, OriginId)> = Vec::new();

    for (i, spec) in word.disjuncts.iter().enumerate() {
      let string = spec.word_string.as_deref().unwrap_or(&word.string);
      let origin = block.origins.single(&spec.origin);
      match seen.get(&(&spec.left[..], &spec.right[..], string)) {
        Some(&k) => {
          let (_, cost, prev_origin) = kept[k];
          kept[k].1 = cost.min(spec.cost);
          kept[k].2 = block.origins.merge(prev_origin, origin);
        }
        None => {
          seen.insert((&spec.left[..], &spec.right[..], string), kept.len());
          kept.push((i, spec.cost, origin));
        }
      }
    }

    let mut list = Vec::with_capacity(kept.len());
    for (i, cost, origin) in kept {
      let spec = &word.disjuncts[i];
      let string = spec.word_string.as_deref().unwrap_or(&word.string);
      let left = block.push_chain(&spec.left, origin);
      let right = block.push_chain(&spec.right, origin);
      if set_dist_fields(&mut block, &sent.connectors, left, w as i32, -1, len)
        && set_dist_fields(&mut block, &sent.connectors, right, w as i32, 1, len)
      {
        list.push(block.disjuncts.alloc(Disjunct {
          left,
          right,
          cost,
          word_string: Rc::from(string),
          origin,
        }));
      }
    }
    block.words.push(list);
  }

  block
}

/// Sets the reach of each connector of a chain hanging off word `w` in direction
/// `dir` (-1 left, 1 right). The deepest connector is nearest the word. Returns
/// false if some connector cannot reach any word.
fn set_dist_fields(
  block: &mut DisjunctBlock,
  table: &ConnectorTable,
  head: Option<ConnectorIdx>,
  w: i32,
  dir: i32,
  len: i32,
) -> bool {
  let chain = block.chain(head).map(|(idx, _)| idx).collect::<Vec<_>>();
  let depth = chain.len() as i32;
  let mut ok = true;

  for (i, idx) in chain.into_iter().enumerate() {
    let c = &mut block.connectors[idx];
    c.nearest_word = w + dir * (depth - i as i32);
    let limit = table.get(c.desc).length_limit.map_or(len, |l| l as i32);
    c.farthest_word = if dir < 0 {
      (w - limit).max(0)
    } else {
      (w + limit).min(len - 1)
    };
    if (c.nearest_word - c.farthest_word) * dir > 0 {
      ok = false;
    }
  }
  ok
}
