use std::collections::HashMap;

use tracing::debug;

use crate::connector::{Connector, ConnectorIdx, ConnectorTable, BAD_WORD};
use crate::disjunct::{DisjunctBlock, DisjunctIdx};
use crate::sentence::Sentence;

#[derive(Debug, Clone, Copy)]
struct PowerEntry {
  c: ConnectorIdx,
  shallow: bool,
}

/// Connectors of one word pointing one way, bucketed by uppercase type,
/// shallow connectors ahead of deep ones in each bucket
#[derive(Debug, Default)]
struct PowerTable {
  buckets: HashMap<u32, Vec<PowerEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneStats {
  pub deleted: usize,
  pub passes: usize,
  pub remaining: usize,
}

struct PowerPruner<'a> {
  block: &'a mut DisjunctBlock,
  table: &'a ConnectorTable,
  optional: Vec<bool>,
  null_links: bool,
  /// tables[0][w]: left-pointing connectors of w, tables[1][w]: right-pointing
  tables: [Vec<PowerTable>; 2],
  /// live disjuncts whose chains pass through each connector
  refcount: Vec<u32>,
  changed: usize,
}

impl<'a> PowerPruner<'a> {
  fn new(sent: &Sentence, block: &'a mut DisjunctBlock, null_links: bool, table: &'a ConnectorTable) -> Self {
    let len = block.len();
    let mut pruner = Self {
      refcount: vec![0; block.connectors.len()],
      block,
      table,
      optional: sent.words.iter().map(|w| w.optional).collect(),
      null_links,
      tables: [
        (0..len).map(|_| PowerTable::default()).collect(),
        (0..len).map(|_| PowerTable::default()).collect(),
      ],
      changed: 0,
    };

    for w in 0..len {
      for i in 0..pruner.block.words[w].len() {
        let d = pruner.block.disjunct(pruner.block.words[w][i]);
        let (left, right) = (d.left, d.right);
        pruner.insert_chain(0, w, left);
        pruner.insert_chain(1, w, right);
      }
    }
    for dir in 0..2 {
      for t in pruner.tables[dir].iter_mut() {
        for bucket in t.buckets.values_mut() {
          bucket.sort_by_key(|e| !e.shallow);
        }
      }
    }
    pruner
  }

  fn insert_chain(&mut self, dir: usize, w: usize, head: Option<ConnectorIdx>) {
    let mut next = head;
    while let Some(idx) = next {
      let c = *self.block.connector(idx);
      self.refcount[idx.0 as usize] += 1;
      if self.refcount[idx.0 as usize] == 1 {
        let uc = self.table.get(c.desc).uc_num;
        self.tables[dir][w].buckets.entry(uc).or_default().push(PowerEntry {
          c: idx,
          shallow: c.shallow,
        });
      }
      next = c.next;
    }
  }

  fn release_chain(&mut self, head: Option<ConnectorIdx>) {
    let mut next = head;
    while let Some(idx) = next {
      self.refcount[idx.0 as usize] -= 1;
      next = self.block.connector(idx).next;
    }
  }

  /// Every word strictly between `lword` and `rword` is optional
  fn optional_gap(&self, lword: i32, rword: i32) -> bool {
    ((lword + 1)..rword).all(|w| self.optional[w as usize])
  }

  /// Whether `lc` on `lword` (pointing right) and `rc` on `rword` (pointing left)
  /// could form a link in some linkage
  fn possible_connection(
    &self,
    lc: &Connector,
    rc: &Connector,
    lshallow: bool,
    rshallow: bool,
    lword: i32,
    rword: i32,
  ) -> bool {
    if !lshallow && !rshallow {
      return false;
    }
    if !self.table.easy_match(lc.desc, rc.desc) {
      return false;
    }
    if lc.nearest_word > rword || rc.nearest_word < lword {
      return false;
    }
    if lc.farthest_word < rword || rc.farthest_word > lword {
      return false;
    }
    if rword - lword == 1 {
      return lc.next.is_none() && rc.next.is_none();
    }
    if !self.null_links
      && lc.next.is_none()
      && rc.next.is_none()
      && !lc.multi
      && !rc.multi
      && !self.optional_gap(lword, rword)
    {
      return false;
    }
    true
  }

  /// Looks among the right-pointing connectors of word `w` for a partner of
  /// `c`, a left-pointing connector on `word_c`
  fn right_table_search(&self, w: i32, c: &Connector, shallow: bool, word_c: i32) -> bool {
    let uc = self.table.get(c.desc).uc_num;
    let Some(bucket) = self.tables[1][w as usize].buckets.get(&uc) else {
      return false;
    };
    for e in bucket {
      if self.refcount[e.c.0 as usize] == 0 {
        continue;
      }
      if !shallow && !e.shallow {
        return false;
      }
      if self.possible_connection(self.block.connector(e.c), c, e.shallow, shallow, w, word_c) {
        return true;
      }
    }
    false
  }

  /// Looks among the left-pointing connectors of word `w` for a partner of
  /// `c`, a right-pointing connector on `word_c`
  fn left_table_search(&self, w: i32, c: &Connector, shallow: bool, word_c: i32) -> bool {
    let uc = self.table.get(c.desc).uc_num;
    let Some(bucket) = self.tables[0][w as usize].buckets.get(&uc) else {
      return false;
    };
    for e in bucket {
      if self.refcount[e.c.0 as usize] == 0 {
        continue;
      }
      if !shallow && !e.shallow {
        return false;
      }
      if self.possible_connection(c, self.block.connector(e.c), shallow, e.shallow, word_c, w) {
        return true;
      }
    }
    false
  }

  /// Finds the nearest word each connector of a left chain on `w` can still reach,
  /// tightening `nearest_word`. Returns the word found for the head, or -1.
  fn left_connector_list_update(&mut self, c: Option<ConnectorIdx>, w: i32, shallow: bool) -> i32 {
    let Some(idx) = c else {
      return w;
    };
    let conn = *self.block.connector(idx);
    let n = self.left_connector_list_update(conn.next, w, false) - 1;
    if n < 0 {
      return -1;
    }

    let mut n = n.min(conn.nearest_word);
    let mut found = -1;
    while n >= conn.farthest_word {
      if self.right_table_search(n, &conn, shallow, w) {
        found = n;
        break;
      }
      n -= 1;
    }
    if found < conn.nearest_word {
      self.block.connectors[idx].nearest_word = found;
      self.changed += 1;
    }
    found
  }

  /// Mirror of `left_connector_list_update`; failure is the sentence length
  fn right_connector_list_update(&mut self, c: Option<ConnectorIdx>, w: i32, shallow: bool) -> i32 {
    let len = self.block.len() as i32;
    let Some(idx) = c else {
      return w;
    };
    let conn = *self.block.connector(idx);
    let n = self.right_connector_list_update(conn.next, w, false) + 1;
    if n >= len {
      return len;
    }

    let mut n = n.max(conn.nearest_word);
    let mut found = len;
    while n <= conn.farthest_word {
      if self.left_table_search(n, &conn, shallow, w) {
        found = n;
        break;
      }
      n += 1;
    }
    if found > conn.nearest_word {
      self.block.connectors[idx].nearest_word = found;
      self.changed += 1;
    }
    found
  }

  fn delete(&mut self, d: DisjunctIdx, bad_side: Option<ConnectorIdx>) {
    if let Some(head) = bad_side {
      self.block.connectors[head].nearest_word = BAD_WORD;
    }
    let dj = self.block.disjunct(d);
    let (left, right) = (dj.left, dj.right);
    self.release_chain(left);
    self.release_chain(right);
  }

  /// Checks the left chains of all words, left to right
  fn left_pass(&mut self) -> usize {
    let mut deleted = 0;
    for w in 0..self.block.len() {
      let list = std::mem::take(&mut self.block.words[w]);
      let mut kept = Vec::with_capacity(list.len());
      for d in list {
        let left = self.block.disjunct(d).left;
        let bad = match left {
          None => false,
          Some(c) => {
            self.block.connector(c).is_bad()
              || self.left_connector_list_update(left, w as i32, true) < 0
          }
        };
        if bad {
          self.delete(d, left);
          deleted += 1;
        } else {
          kept.push(d);
        }
      }
      self.block.words[w] = kept;
    }
    deleted
  }

  /// Checks the right chains of all words, right to left
  fn right_pass(&mut self) -> usize {
    let len = self.block.len() as i32;
    let mut deleted = 0;
    for w in (0..self.block.len()).rev() {
      let list = std::mem::take(&mut self.block.words[w]);
      let mut kept = Vec::with_capacity(list.len());
      for d in list {
        let right = self.block.disjunct(d).right;
        let bad = match right {
          None => false,
          Some(c) => {
            self.block.connector(c).is_bad()
              || self.right_connector_list_update(right, w as i32, true) >= len
          }
        };
        if bad {
          self.delete(d, right);
          deleted += 1;
        } else {
          kept.push(d);
        }
      }
      self.block.words[w] = kept;
    }
    deleted
  }
}

/// Power pruning: deletes disjuncts having a connector that can't find a partner
/// anywhere in its reach, until nothing more can be deleted. `null_links` relaxes
/// the rule that the words inside a link between two deepest connectors must
/// attach to one of its ends.
pub fn power_prune(sent: &Sentence, block: &mut DisjunctBlock, null_links: bool) -> PruneStats {
  let before = block.num_disjuncts();
  let table = &sent.connectors;
  let mut pruner = PowerPruner::new(sent, block, null_links, table);
  let mut stats = PruneStats::default();

  loop {
    let deleted = pruner.left_pass() + pruner.right_pass();
    stats.passes += 2;
    stats.deleted += deleted;
    if deleted == 0 {
      break;
    }
  }

  stats.remaining = pruner.block.num_disjuncts();
  debug!(
    before,
    after = stats.remaining,
    passes = stats.passes,
    nearest_updates = pruner.changed,
    null_links,
    "power pruned"
  );
  stats
}

/// Non-optional words left without disjuncts; each must be a null word
pub fn expected_null_count(sent: &Sentence, block: &DisjunctBlock) -> usize {
  block
    .words
    .iter()
    .zip(sent.words.iter())
    .filter(|(list, word)| list.is_empty() && !word.optional)
    .count()
}
