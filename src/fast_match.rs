use std::collections::HashMap;

use tracing::debug;

use crate::connector::{Connector, ConnectorIdx, ConnectorTable, DescId};
use crate::disjunct::{DisjunctBlock, DisjunctIdx};
use crate::utils::table_size;

/// A disjunct of the middle word returned by [`FastMatcher::form_match_list`],
/// with the sides it matched on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEntry {
  pub d: DisjunctIdx,
  pub match_left: bool,
  pub match_right: bool,
}

/// Open-addressed table from uppercase connector type to the disjuncts of one word
/// whose head connector (on one side) has that type
#[derive(Debug)]
struct MatchTable {
  mask: usize,
  slots: Vec<Option<(u32, Vec<DisjunctIdx>)>>,
}

impl MatchTable {
  fn new(distinct: usize) -> Self {
    let size = table_size(distinct);
    Self {
      mask: size - 1,
      slots: (0..size).map(|_| None).collect(),
    }
  }

  fn bucket_mut(&mut self, uc: u32) -> &mut Vec<DisjunctIdx> {
    let mut h = uc as usize & self.mask;
    loop {
      match &self.slots[h] {
        Some((key, _)) if *key != uc => h = (h + 1) & self.mask,
        _ => break,
      }
    }
    &mut self.slots[h].get_or_insert_with(|| (uc, Vec::new())).1
  }

  fn lookup(&self, uc: u32) -> &[DisjunctIdx] {
    let mut h = uc as usize & self.mask;
    loop {
      match &self.slots[h] {
        None => return &[],
        Some((key, list)) if *key == uc => return list,
        Some(_) => h = (h + 1) & self.mask,
      }
    }
  }

  fn occupied(&self) -> usize {
    self.slots.iter().filter(|s| s.is_some()).count()
  }
}

/// Remembers `easy_match` results by connector name pair
#[derive(Debug, Default)]
struct MatchCache {
  results: HashMap<(DescId, DescId), bool>,
}

impl MatchCache {
  fn matches(&mut self, table: &ConnectorTable, a: DescId, b: DescId) -> bool {
    *self.results.entry((a, b)).or_insert_with(|| table.easy_match(a, b))
  }
}

/// Finds the disjuncts of a middle word able to link to the connectors
/// reaching it from the two ends of a range.
///
/// Results are pushed on a stack: a call returns the stack position its entries
/// start at, and the caller pops back to it with [`FastMatcher::pop_match_list`]
/// when done. Calls may nest as long as they pop in reverse order.
pub struct FastMatcher<'a> {
  block: &'a DisjunctBlock,
  table: &'a ConnectorTable,
  /// tables[0][w] keys left chains by type, disjuncts sorted by `nearest_word`
  /// descending; tables[1][w] keys right chains, sorted ascending
  tables: [Vec<MatchTable>; 2],
  match_list: Vec<MatchEntry>,
  /// Position on the stack of each disjunct matched on its left in the current call
  left_flag: Vec<Option<u32>>,
  cache: MatchCache,
}

impl<'a> FastMatcher<'a> {
  pub fn new(block: &'a DisjunctBlock, table: &'a ConnectorTable) -> Self {
    let mut tables: [Vec<MatchTable>; 2] = Default::default();

    for list in block.words.iter() {
      for (dir, dir_tables) in tables.iter_mut().enumerate() {
        let mut buckets: HashMap<u32, Vec<DisjunctIdx>> = HashMap::new();
        for &d in list {
          let dj = block.disjunct(d);
          let head = if dir == 0 { dj.left } else { dj.right };
          if let Some(c) = head {
            let uc = table.get(block.connector(c).desc).uc_num;
            buckets.entry(uc).or_default().push(d);
          }
        }

        let mut t = MatchTable::new(buckets.len());
        for (uc, mut list) in buckets {
          let nearest = |d: &DisjunctIdx| {
            let dj = block.disjunct(*d);
            let head = if dir == 0 { dj.left } else { dj.right };
            head.map_or(0, |c| block.connector(c).nearest_word)
          };
          if dir == 0 {
            list.sort_by_key(|d| std::cmp::Reverse(nearest(d)));
          } else {
            list.sort_by_key(nearest);
          }
          *t.bucket_mut(uc) = list;
        }
        dir_tables.push(t);
      }
    }

    let slots = tables.iter().flatten().map(|t| t.slots.len()).sum::<usize>();
    let occupied = tables.iter().flatten().map(MatchTable::occupied).sum::<usize>();
    debug!(words = block.len(), slots, occupied, "built fast matcher");

    Self {
      block,
      table,
      tables,
      match_list: Vec::new(),
      left_flag: vec![None; block.disjuncts.len()],
      cache: MatchCache::default(),
    }
  }

  /// Word `w`'s disjuncts whose left head can link to `lc` (on word `lw`) and/or whose
  /// right head can link to `rc` (on word `rw`). When `lc` is given only disjuncts
  /// matching it are returned, flagged also when they match `rc`.
  ///
  /// `cached_left`/`cached_right` replace the table lookup with a previously
  /// recorded subset of that word's candidates, in table order.
  #[allow(clippy::too_many_arguments)]
  pub fn form_match_list(
    &mut self,
    w: i32,
    lc: Option<ConnectorIdx>,
    lw: i32,
    rc: Option<ConnectorIdx>,
    rw: i32,
    cached_left: Option<&[DisjunctIdx]>,
    cached_right: Option<&[DisjunctIdx]>,
  ) -> usize {
    let start = self.match_list.len();
    let block = self.block;
    let lc = lc.map(|c| block.connector(c));
    let rc = rc.map(|c| block.connector(c));

    let left_list: &[DisjunctIdx] = match lc {
      Some(c) => match cached_left {
        Some(list) => list,
        None => self.tables[0][w as usize].lookup(self.table.get(c.desc).uc_num),
      },
      None => &[],
    };
    if lc.is_some() && left_list.is_empty() {
      return start;
    }

    let right_list: &[DisjunctIdx] = match rc {
      Some(c) => match cached_right {
        Some(list) => list,
        None if w >= c.farthest_word => {
          self.tables[1][w as usize].lookup(self.table.get(c.desc).uc_num)
        }
        None => &[],
      },
      None => &[],
    };

    for &d in right_list {
      if right_head(block, d).nearest_word > rw {
        break;
      }
      self.left_flag[d.0 as usize] = None;
    }

    if let Some(lc) = lc {
      for &d in left_list {
        let dl = left_head(block, d);
        if dl.nearest_word < lw {
          break;
        }
        if lw < dl.farthest_word {
          continue;
        }
        if !self.cache.matches(self.table, lc.desc, dl.desc) || !block.origins.compatible(lc.origin, dl.origin) {
          continue;
        }
        self.left_flag[d.0 as usize] = Some(self.match_list.len() as u32);
        self.match_list.push(MatchEntry {
          d,
          match_left: true,
          match_right: false,
        });
      }
      if self.match_list.len() == start {
        return start;
      }
    }

    if let Some(rc) = rc {
      for &d in right_list {
        let dr = right_head(block, d);
        if dr.nearest_word > rw {
          break;
        }
        if rw > dr.farthest_word {
          continue;
        }
        let flag = self.left_flag[d.0 as usize];
        if lc.is_some() && flag.is_none() {
          continue;
        }
        if !self.cache.matches(self.table, dr.desc, rc.desc) || !block.origins.compatible(dr.origin, rc.origin) {
          continue;
        }
        match flag {
          Some(pos) => self.match_list[pos as usize].match_right = true,
          None => self.match_list.push(MatchEntry {
            d,
            match_left: false,
            match_right: true,
          }),
        }
      }
    }

    start
  }

  /// The entries pushed from `start` on
  pub fn entries(&self, start: usize) -> &[MatchEntry] {
    &self.match_list[start..]
  }

  pub fn entry(&self, i: usize) -> MatchEntry {
    self.match_list[i]
  }

  /// One past the last entry on the stack
  pub fn end(&self) -> usize {
    self.match_list.len()
  }

  pub fn pop_match_list(&mut self, start: usize) {
    debug_assert!(start <= self.match_list.len());
    self.match_list.truncate(start);
  }

  /// Orders the entries from `start` on by disjunct cost, cheapest first
  pub fn sort_by_cost(&mut self, start: usize) {
    let block = self.block;
    self.match_list[start..].sort_by(|a, b| {
      block
        .disjunct(a.d)
        .cost
        .total_cmp(&block.disjunct(b.d).cost)
    });
  }
}

fn left_head(block: &DisjunctBlock, d: DisjunctIdx) -> &Connector {
  match block.disjunct(d).left {
    Some(c) => block.connector(c),
    None => panic!("disjunct {:?} in a left match table has no left connector", d),
  }
}

fn right_head(block: &DisjunctBlock, d: DisjunctIdx) -> &Connector {
  match block.disjunct(d).right {
    Some(c) => block.connector(c),
    None => panic!("disjunct {:?} in a right match table has no right connector", d),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::disjunct::prepare;
  use crate::sentence::Sentence;
  use crate::tracon::{pack_sentence, PackMode};

  fn packed(src: &str) -> (Sentence, DisjunctBlock) {
    let sent: Sentence = src.parse().unwrap();
    let prepared = prepare(&sent);
    let mut block = DisjunctBlock::new();
    pack_sentence(&prepared, &mut block, &sent.connectors, PackMode::Parsing, true);
    (sent, block)
  }

  fn right_of(block: &DisjunctBlock, w: usize, i: usize) -> ConnectorIdx {
    block.disjunct(block.word(w)[i]).right.unwrap()
  }

  fn left_of(block: &DisjunctBlock, w: usize, i: usize) -> ConnectorIdx {
    block.disjunct(block.word(w)[i]).left.unwrap()
  }

  const SENTENCE: &str = "
    a: A+;
    b: A- & B+ | A- | Ax- & C+ | B+ | D-;
    c: B- | C-;
  ";

  #[test]
  fn test_left_only() {
    let (sent, block) = packed(SENTENCE);
    let mut fm = FastMatcher::new(&block, &sent.connectors);

    let start = fm.form_match_list(1, Some(right_of(&block, 0, 0)), 0, None, 2, None, None);
    let found = fm.entries(start).iter().map(|e| e.d).collect::<Vec<_>>();
    // A- matches A+, and so does Ax- since A+ has no subscript
    assert_eq!(found.len(), 3);
    assert!(fm.entries(start).iter().all(|e| e.match_left && !e.match_right));
    fm.pop_match_list(start);
    assert_eq!(fm.end(), 0);
  }

  #[test]
  fn test_both_sides() {
    let (sent, block) = packed(SENTENCE);
    let mut fm = FastMatcher::new(&block, &sent.connectors);

    let start = fm.form_match_list(
      1,
      Some(right_of(&block, 0, 0)),
      0,
      Some(left_of(&block, 2, 0)),
      2,
      None,
      None,
    );
    let both = fm
      .entries(start)
      .iter()
      .filter(|e| e.match_left && e.match_right)
      .map(|e| e.d)
      .collect::<Vec<_>>();
    assert_eq!(both, vec![block.word(1)[0]]);
    // "B+" alone doesn't match on the left, so it isn't returned
    assert!(fm.entries(start).iter().all(|e| e.match_left));
  }

  #[test]
  fn test_right_only() {
    let (sent, block) = packed(SENTENCE);
    let mut fm = FastMatcher::new(&block, &sent.connectors);

    let start = fm.form_match_list(1, None, 0, Some(left_of(&block, 2, 0)), 2, None, None);
    let found = fm.entries(start).iter().map(|e| e.d).collect::<Vec<_>>();
    assert_eq!(found, vec![block.word(1)[0], block.word(1)[3]]);
    assert!(fm.entries(start).iter().all(|e| !e.match_left && e.match_right));
  }

  #[test]
  fn test_no_left_match_short_circuits() {
    let (sent, block) = packed("a: Q+; b: A- & B+; c: B-;");
    let mut fm = FastMatcher::new(&block, &sent.connectors);
    let start = fm.form_match_list(
      1,
      Some(right_of(&block, 0, 0)),
      0,
      Some(left_of(&block, 2, 0)),
      2,
      None,
      None,
    );
    assert!(fm.entries(start).is_empty());
  }

  #[test]
  fn test_nested_calls() {
    let (sent, block) = packed(SENTENCE);
    let mut fm = FastMatcher::new(&block, &sent.connectors);

    let outer = fm.form_match_list(1, Some(right_of(&block, 0, 0)), 0, None, 2, None, None);
    let outer_end = fm.end();
    let inner = fm.form_match_list(1, None, 0, Some(left_of(&block, 2, 1)), 2, None, None);
    assert_eq!(inner, outer_end);
    assert_eq!(fm.entries(inner).len(), 1);
    fm.pop_match_list(inner);
    assert_eq!(fm.end(), outer_end);
    fm.pop_match_list(outer);
  }

  #[test]
  fn test_incompatible_alternatives() {
    let (sent, block) = packed("a: <0.0> A+; b: <0.1> A-;");
    let mut fm = FastMatcher::new(&block, &sent.connectors);
    let start = fm.form_match_list(1, Some(right_of(&block, 0, 0)), 0, None, 2, None, None);
    assert!(fm.entries(start).is_empty());
  }

  #[test]
  fn test_cached_list() {
    let (sent, block) = packed(SENTENCE);
    let mut fm = FastMatcher::new(&block, &sent.connectors);
    let cached = [block.word(1)[1]];
    let start = fm.form_match_list(1, Some(right_of(&block, 0, 0)), 0, None, 2, Some(&cached), None);
    assert_eq!(fm.entries(start).iter().map(|e| e.d).collect::<Vec<_>>(), cached);
  }
}
