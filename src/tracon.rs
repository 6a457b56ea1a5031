use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::connector::{Connector, ConnectorIdx, ConnectorTable, DescId};
use crate::disjunct::{Disjunct, DisjunctBlock};
use crate::wordgraph::OriginId;

/// What a packed block is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMode {
  /// Tracons are per word, and a chain head is distinct from the same
  /// connectors appearing deeper in another chain
  Pruning,
  /// Tracons are per (word, origin), and carry their final reach
  Parsing,
}

/// Identity of a trailing connector sequence: the connector itself plus the
/// already-canonical rest of the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TraconKey {
  desc: DescId,
  multi: bool,
  shallow: bool,
  nearest_word: i32,
  farthest_word: i32,
  next: Option<ConnectorIdx>,
}

/// Hash-consing table for one direction
#[derive(Debug, Default)]
struct TraconSet {
  map: HashMap<TraconKey, ConnectorIdx>,
}

impl TraconSet {
  fn clear(&mut self) {
    self.map.clear();
  }
}

/// Result of packing a block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackStats {
  /// Distinct tracons by direction: 0 left, 1 right
  pub tracons: [usize; 2],
  /// Chains that reused an existing tracon
  pub shared: usize,
  /// Distinct uppercase connector types heading a chain, by direction and word
  pub uc_per_word: [Vec<usize>; 2],
}

struct Packer<'a> {
  src: &'a DisjunctBlock,
  dst: &'a mut DisjunctBlock,
  mode: PackMode,
  share: bool,
  sets: [TraconSet; 2],
  next_id: u32,
  stats: PackStats,
}

impl Packer<'_> {
  fn pack_chain(&mut self, dir: usize, head: Option<ConnectorIdx>, is_head: bool) -> Option<ConnectorIdx> {
    let head = head?;
    let c = *self.src.connector(head);
    let next = self.pack_chain(dir, c.next, false);

    let key = TraconKey {
      desc: c.desc,
      multi: c.multi,
      shallow: self.mode == PackMode::Pruning && c.shallow,
      nearest_word: c.nearest_word,
      farthest_word: c.farthest_word,
      next,
    };
    if self.share {
      if let Some(&idx) = self.sets[dir].map.get(&key) {
        if is_head {
          self.stats.shared += 1;
        }
        return Some(idx);
      }
    }

    let idx = self.dst.connectors.alloc(Connector {
      tracon_id: self.next_id,
      next,
      ..c
    });
    self.next_id += 1;
    self.stats.tracons[dir] += 1;
    if self.share {
      self.sets[dir].map.insert(key, idx);
    }
    Some(idx)
  }
}

/// Copies the live disjuncts of `src` into `dst` (reset first), sharing identical
/// trailing connector sequences and numbering them. Without `share` every connector
/// is copied and numbered on its own.
///
/// Tracon ids start at 1 and are unique across the whole block, so a tracon id
/// also identifies the word (and in parsing mode the origin) it belongs to.
pub fn pack_sentence(
  src: &DisjunctBlock,
  dst: &mut DisjunctBlock,
  table: &ConnectorTable,
  mode: PackMode,
  share: bool,
) -> PackStats {
  dst.reset();
  dst.origins.clone_from(&src.origins);

  let mut packer = Packer {
    src,
    dst,
    mode,
    share,
    sets: Default::default(),
    next_id: 1,
    stats: PackStats::default(),
  };

  for (w, list) in src.words.iter().enumerate() {
    let mut token: Option<(usize, Option<OriginId>)> = None;
    let mut packed = Vec::with_capacity(list.len());

    for &d in list {
      let dj = src.disjunct(d);
      let tok = match mode {
        PackMode::Pruning => (w, None),
        PackMode::Parsing => (w, Some(dj.origin)),
      };
      if token != Some(tok) {
        packer.sets[0].clear();
        packer.sets[1].clear();
        token = Some(tok);
      }

      let left = packer.pack_chain(0, dj.left, true);
      let right = packer.pack_chain(1, dj.right, true);
      packed.push(packer.dst.disjuncts.alloc(Disjunct {
        left,
        right,
        ..dj.clone()
      }));
    }
    packer.dst.words.push(packed);
  }

  let mut stats = packer.stats;
  for dir in 0..2 {
    stats.uc_per_word[dir] = dst
      .words
      .iter()
      .map(|list| {
        list
          .iter()
          .filter_map(|&d| {
            let dj = dst.disjunct(d);
            let head = if dir == 0 { dj.left } else { dj.right };
            head.map(|c| table.get(dst.connector(c).desc).uc_num)
          })
          .collect::<HashSet<_>>()
          .len()
      })
      .collect();
  }

  debug!(
    ?mode,
    share,
    disjuncts = dst.num_disjuncts(),
    left_tracons = stats.tracons[0],
    right_tracons = stats.tracons[1],
    shared = stats.shared,
    "packed sentence"
  );
  stats
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::disjunct::prepare;
  use crate::sentence::Sentence;

  /// (name, multi, nearest, farthest) of each connector, shallow first
  fn walk(block: &DisjunctBlock, table: &ConnectorTable, head: Option<ConnectorIdx>) -> Vec<(String, bool, i32, i32)> {
    block
      .chain(head)
      .map(|(_, c)| (table.get(c.desc).string.clone(), c.multi, c.nearest_word, c.farthest_word))
      .collect()
  }

  const SENTENCE: &str = "
    a: A+ & B+ & C+ | A+ & B+ | @A+ & B+ & C+ | C+;
    b: A- | A- & D+;
    c: <1.0> B- | <1.1> B- & E+ | <1.1> B-;
    d: D- & C- | C-;
    e: E- & C-;
  ";

  #[test]
  fn test_round_trip() {
    let sent: Sentence = SENTENCE.parse().unwrap();
    let src = prepare(&sent);

    for mode in [PackMode::Pruning, PackMode::Parsing] {
      let mut dst = DisjunctBlock::new();
      pack_sentence(&src, &mut dst, &sent.connectors, mode, true);
      assert_eq!(dst.num_disjuncts(), src.num_disjuncts());

      for w in 0..src.len() {
        for (&ds, &dd) in src.word(w).iter().zip(dst.word(w)) {
          let (ds, dd) = (src.disjunct(ds), dst.disjunct(dd));
          assert_eq!(walk(&src, &sent.connectors, ds.left), walk(&dst, &sent.connectors, dd.left));
          assert_eq!(walk(&src, &sent.connectors, ds.right), walk(&dst, &sent.connectors, dd.right));
          assert_eq!(ds.word_string, dd.word_string);
          assert_eq!(ds.origin, dd.origin);
        }
      }
    }
  }

  #[test]
  fn test_sharing() {
    let sent: Sentence = SENTENCE.parse().unwrap();
    let src = prepare(&sent);
    let mut dst = DisjunctBlock::new();

    let stats = pack_sentence(&src, &mut dst, &sent.connectors, PackMode::Parsing, true);
    let a = dst.word(0);
    let first = dst.disjunct(a[0]);
    let second = dst.disjunct(a[1]);
    // below its C+, "A+ & B+ & C+" is the whole of "A+ & B+"
    let deeper = dst.connector(first.right.unwrap()).next;
    assert_eq!(deeper, second.right);
    assert!(stats.shared > 0);

    // in pruning mode a chain head is kept apart from the same connectors deeper down
    let mut pruning = DisjunctBlock::new();
    pack_sentence(&src, &mut pruning, &sent.connectors, PackMode::Pruning, true);
    let a = pruning.word(0);
    let deeper = pruning.connector(pruning.disjunct(a[0]).right.unwrap()).next;
    assert_ne!(deeper, pruning.disjunct(a[1]).right);
    // the deepest A+ is still shared
    let a_deep = pruning.connector(deeper.unwrap()).next;
    let a_deep_2 = pruning.connector(pruning.disjunct(a[1]).right.unwrap()).next;
    assert!(a_deep.is_some());
    assert_eq!(a_deep, a_deep_2);
  }

  #[test]
  fn test_ids_not_shared_across_words_or_origins() {
    let sent: Sentence = SENTENCE.parse().unwrap();
    let src = prepare(&sent);
    let mut dst = DisjunctBlock::new();
    pack_sentence(&src, &mut dst, &sent.connectors, PackMode::Parsing, true);

    // "C-" on words 3 and 4 is the same sequence but on different words
    let d_c = dst.disjunct(dst.word(3)[1]).left.unwrap();
    let e_c = dst.connector(dst.disjunct(dst.word(4)[0]).left.unwrap()).next.unwrap();
    assert_ne!(dst.connector(d_c).tracon_id, dst.connector(e_c).tracon_id);

    // word 2: "B-" from alternative 1.0 and from 1.1 stay apart
    let c = dst.word(2);
    let b0 = dst.disjunct(c[0]).left.unwrap();
    let b1 = dst.disjunct(c[1]).left.unwrap();
    assert_ne!(b0, b1);
  }

  #[test]
  fn test_no_sharing() {
    let sent: Sentence = SENTENCE.parse().unwrap();
    let src = prepare(&sent);
    let mut dst = DisjunctBlock::new();
    let stats = pack_sentence(&src, &mut dst, &sent.connectors, PackMode::Parsing, false);

    assert_eq!(stats.shared, 0);
    assert_eq!(dst.connectors.len(), stats.tracons[0] + stats.tracons[1]);
    let ids = dst.connectors.iter().map(|(_, c)| c.tracon_id).collect::<Vec<_>>();
    assert_eq!(ids, (1..=ids.len() as u32).collect::<Vec<_>>());
    assert_eq!(stats.uc_per_word[1][0], 2);
    assert_eq!(stats.uc_per_word[0][0], 0);
  }
}
