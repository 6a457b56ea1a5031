use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::connector::{Connector, ConnectorIdx};
use crate::disjunct::{Disjunct, DisjunctBlock, DisjunctIdx};
use crate::fast_match::{FastMatcher, MatchEntry};
use crate::parse::Resources;
use crate::sentence::Sentence;

/// Above this many linkages a count is reported as a combinatorial explosion, and
/// a parse set whose choices multiply past it can't be enumerated by index
pub const PARSE_NUM_OVERFLOW: i64 = 1 << 24;

/// Number of linkages, saturated at `i32::MAX`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Count(i64);

impl Count {
  pub const ZERO: Count = Count(0);
  pub const ONE: Count = Count(1);
  pub const MAX: Count = Count(i32::MAX as i64);

  /// Saturates a wide total, returning whether it had to
  pub fn clamp(total: i64) -> (Count, bool) {
    if total > Self::MAX.0 {
      (Self::MAX, true)
    } else {
      (Count(total.max(0)), false)
    }
  }

  pub fn get(self) -> i64 {
    self.0
  }

  pub fn is_zero(self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for Count {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// `total += a * b`, saturating
fn muladd(total: &mut i64, a: i64, b: i64) {
  *total = total.saturating_add(a.saturating_mul(b));
}

/// Memo table key. Connectors are identified by tracon id, 0 standing for none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TableKey {
  lw: i32,
  rw: i32,
  l_id: u32,
  r_id: u32,
  null_count: u32,
}

impl TableKey {
  pub(crate) fn new(
    block: &DisjunctBlock,
    lw: i32,
    rw: i32,
    le: Option<ConnectorIdx>,
    re: Option<ConnectorIdx>,
    null_count: u32,
  ) -> Self {
    let id = |c: Option<ConnectorIdx>| c.map_or(0, |c| block.connector(c).tracon_id);
    Self {
      lw,
      rw,
      l_id: id(le),
      r_id: id(re),
      null_count,
    }
  }
}

thread_local! {
  /// The largest memo table used on this thread, kept for its allocation
  static KEPT_TABLE: RefCell<HashMap<TableKey, Count>> = RefCell::new(HashMap::new());
}

/// Memo table borrowing the thread's kept allocation, handed back on drop
#[derive(Debug)]
struct CountTable {
  map: HashMap<TableKey, Count>,
}

impl CountTable {
  fn take() -> Self {
    let mut map = KEPT_TABLE
      .try_with(|kept| std::mem::take(&mut *kept.borrow_mut()))
      .unwrap_or_default();
    map.clear();
    Self { map }
  }
}

impl Drop for CountTable {
  fn drop(&mut self) {
    let map = std::mem::take(&mut self.map);
    let _ = KEPT_TABLE.try_with(|kept| {
      let mut kept = kept.borrow_mut();
      if map.capacity() > kept.capacity() {
        *kept = map;
      }
    });
  }
}

/// What is known about the counts through a connector at one middle word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Expectation {
  #[default]
  Unknown,
  /// No disjunct of the word matches the connector
  NoMatch,
  /// Zero for every null count up to and including this one
  ZeroUpTo(u32),
}

impl Expectation {
  fn known_zero(self, null_count: u32) -> bool {
    match self {
      Expectation::Unknown => false,
      Expectation::NoMatch => true,
      Expectation::ZeroUpTo(n) => null_count <= n,
    }
  }

  fn merge(self, other: Self) -> Self {
    match (self, other) {
      (Expectation::NoMatch, _) | (_, Expectation::NoMatch) => Expectation::NoMatch,
      (Expectation::ZeroUpTo(a), Expectation::ZeroUpTo(b)) => Expectation::ZeroUpTo(a.max(b)),
      (Expectation::Unknown, x) | (x, Expectation::Unknown) => x,
    }
  }
}

#[derive(Debug, Clone, Default)]
struct WordSlot {
  expect: Expectation,
  /// (word, null count): every word from this one up to the given word (exclusive)
  /// is known zero for null counts up to the given one
  skip_to: Option<(i32, u32)>,
  /// At null count 0, the matching disjuncts not known to give zero
  match_list: Option<Rc<[DisjunctIdx]>>,
}

/// Per-connector knowledge about each word in its reach
#[derive(Debug)]
struct WordVector {
  base: i32,
  slots: Vec<WordSlot>,
}

impl WordVector {
  fn new(c: &Connector) -> Self {
    let base = c.nearest_word.min(c.farthest_word);
    let len = (c.nearest_word - c.farthest_word).unsigned_abs() as usize + 1;
    Self {
      base,
      slots: vec![WordSlot::default(); len],
    }
  }

  fn slot(&self, w: i32) -> Option<&WordSlot> {
    usize::try_from(w - self.base).ok().and_then(|i| self.slots.get(i))
  }

  fn slot_mut(&mut self, w: i32) -> Option<&mut WordSlot> {
    usize::try_from(w - self.base).ok().and_then(|i| self.slots.get_mut(i))
  }

  /// First word from `w` on that isn't known zero at `null_count`, or past `end`.
  /// Shortens the skip chain it walked.
  fn next_word(&mut self, w: i32, end: i32, null_count: u32) -> i32 {
    let mut cur = w;
    while cur <= end {
      let Some(slot) = self.slot(cur) else {
        break;
      };
      match slot.skip_to {
        Some((next, upto)) if upto >= null_count && next > cur => cur = next,
        _ if slot.expect.known_zero(null_count) => cur += 1,
        _ => break,
      }
    }
    if cur > w + 1 {
      if let Some(slot) = self.slot_mut(w) {
        if slot.skip_to.is_none_or(|(next, upto)| upto < null_count || next < cur) {
          slot.skip_to = Some((cur, null_count));
        }
      }
    }
    cur
  }
}

/// The inclusive range of words a link from `le` (on `lw`) and/or `re` (on `rw`) can land on
pub(crate) fn middle_words(
  block: &DisjunctBlock,
  lw: i32,
  rw: i32,
  le: Option<ConnectorIdx>,
  re: Option<ConnectorIdx>,
) -> (i32, i32) {
  let (mut start, mut end) = (lw + 1, rw - 1);
  if let Some(c) = le {
    let c = block.connector(c);
    start = start.max(c.nearest_word);
    end = end.min(c.farthest_word);
  }
  if let Some(c) = re {
    let c = block.connector(c);
    start = start.max(c.farthest_word);
    end = end.min(c.nearest_word);
  }
  (start, end)
}

/// The ways a link between `a` and `b` leaves their chains: the connectors that
/// remain to be linked inside the range, one pair per multi-connector reuse
pub(crate) fn link_variants(
  block: &DisjunctBlock,
  a: ConnectorIdx,
  b: ConnectorIdx,
) -> impl Iterator<Item = (Option<ConnectorIdx>, Option<ConnectorIdx>)> {
  let (ca, cb) = (block.connector(a), block.connector(b));
  [
    Some((ca.next, cb.next)),
    ca.multi.then_some((Some(a), cb.next)),
    cb.multi.then_some((ca.next, Some(b))),
    (ca.multi && cb.multi).then_some((Some(a), Some(b))),
  ]
  .into_iter()
  .flatten()
}

/// What a term taught about the counts through the connector heading the range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracked {
  Zero,
  NonZero,
  Unknown,
}

/// State of one counting pass: the memo table, the fast matcher and the word-range caches
pub struct CountContext<'a> {
  pub(crate) block: &'a DisjunctBlock,
  pub(crate) matcher: FastMatcher<'a>,
  optional: Vec<bool>,
  pub(crate) islands_ok: bool,
  table: CountTable,
  /// Indexed by tracon id
  word_vectors: Vec<Option<WordVector>>,
  resources: Option<&'a Resources>,
  check_interval: u64,
  calls: u64,
  exhausted: bool,
  clamped: usize,
}

impl<'a> CountContext<'a> {
  pub fn new(sent: &'a Sentence, block: &'a DisjunctBlock, islands_ok: bool) -> Self {
    Self {
      block,
      matcher: FastMatcher::new(block, &sent.connectors),
      optional: sent.words.iter().map(|w| w.optional).collect(),
      islands_ok,
      table: CountTable::take(),
      word_vectors: (0..=block.connectors.len()).map(|_| None).collect(),
      resources: None,
      check_interval: 1 << 18,
      calls: 0,
      exhausted: false,
      clamped: 0,
    }
  }

  /// Polls `resources` once every `check_interval` memo misses
  pub fn set_resources(&mut self, resources: &'a Resources, check_interval: u32) {
    self.resources = Some(resources);
    self.check_interval = check_interval.max(1) as u64;
  }

  /// Whether the resource budget ran out; counts are meaningless if so
  pub fn exhausted(&self) -> bool {
    self.exhausted
  }

  /// How many memo entries were saturated
  pub fn clamped(&self) -> usize {
    self.clamped
  }

  pub fn table_len(&self) -> usize {
    self.table.map.len()
  }

  /// Rough bytes held by the memo table and word vectors
  pub fn memory_estimate(&self) -> usize {
    let entry = std::mem::size_of::<(TableKey, Count)>() + 8;
    let slots = self
      .word_vectors
      .iter()
      .flatten()
      .map(|wv| wv.slots.len())
      .sum::<usize>();
    self.table.map.capacity() * entry + slots * std::mem::size_of::<WordSlot>()
  }

  /// Memo lookup only, without counting
  pub(crate) fn lookup(&self, key: &TableKey) -> Option<Count> {
    self.table.map.get(key).copied()
  }

  fn pseudocount(&self, lw: i32, rw: i32, le: Option<ConnectorIdx>, re: Option<ConnectorIdx>, null_count: u32) -> Option<Count> {
    self.lookup(&TableKey::new(self.block, lw, rw, le, re, null_count))
  }

  /// False only if the memo table already knows every way of making the link
  /// between `a` and `b` gives zero
  fn link_possible(&self, lw: i32, rw: i32, a: ConnectorIdx, b: ConnectorIdx, null_count: u32) -> bool {
    link_variants(self.block, a, b)
      .any(|(x, y)| self.pseudocount(lw, rw, x, y, null_count).is_none_or(|c| !c.is_zero()))
  }

  fn count_link(&mut self, lw: i32, rw: i32, a: ConnectorIdx, b: ConnectorIdx, null_count: u32) -> i64 {
    let mut total = 0i64;
    for (x, y) in link_variants(self.block, a, b) {
      total = total.saturating_add(self.do_count(lw, rw, x, y, null_count).get());
    }
    total
  }

  pub(crate) fn is_optional(&self, w: i32) -> bool {
    self.optional[w as usize]
  }

  fn num_optional_words(&self, lw: i32, rw: i32) -> i32 {
    ((lw + 1)..rw).filter(|&w| self.is_optional(w)).count() as i32
  }

  fn poll_exhausted(&mut self) -> bool {
    if self.exhausted {
      return true;
    }
    self.calls += 1;
    if let Some(resources) = self.resources {
      if self.calls % self.check_interval == 0 && resources.exhausted(self.memory_estimate()) {
        warn!(calls = self.calls, table = self.table_len(), "resources exhausted while counting");
        self.exhausted = true;
      }
    }
    self.exhausted
  }

  fn clamp(&mut self, total: i64) -> Count {
    let (count, clamped) = Count::clamp(total);
    if clamped {
      self.clamped += 1;
      if self.clamped == 1 {
        warn!(total, "linkage count saturated");
      }
    }
    count
  }

  pub(crate) fn next_word(&mut self, c: ConnectorIdx, w: i32, end: i32, null_count: u32) -> i32 {
    let id = self.block.connector(c).tracon_id as usize;
    match self.word_vectors[id].as_mut() {
      Some(wv) => wv.next_word(w, end, null_count),
      None => w,
    }
  }

  pub(crate) fn cached_list(&self, c: ConnectorIdx, w: i32) -> Option<Rc<[DisjunctIdx]>> {
    let id = self.block.connector(c).tracon_id as usize;
    self.word_vectors[id].as_ref()?.slot(w)?.match_list.clone()
  }

  fn record(&mut self, c: ConnectorIdx, w: i32, expect: Expectation, list: Option<Rc<[DisjunctIdx]>>) {
    let conn = self.block.connector(c);
    let wv = self.word_vectors[conn.tracon_id as usize].get_or_insert_with(|| WordVector::new(conn));
    if let Some(slot) = wv.slot_mut(w) {
      slot.expect = slot.expect.merge(expect);
      if list.is_some() {
        slot.match_list = list;
      }
    }
  }

  /// Number of ways to link the words strictly between `lw` and `rw`, given the
  /// connectors `le` (reaching right from `lw`) and `re` (reaching left from `rw`)
  /// still to be linked, with exactly `null_count` of those words left unlinked.
  pub fn do_count(
    &mut self,
    lw: i32,
    rw: i32,
    le: Option<ConnectorIdx>,
    re: Option<ConnectorIdx>,
    null_count: u32,
  ) -> Count {
    let key = TableKey::new(self.block, lw, rw, le, re, null_count);
    if let Some(count) = self.lookup(&key) {
      return count;
    }
    if self.poll_exhausted() {
      self.table.map.insert(key, Count::ZERO);
      return Count::ZERO;
    }
    assert!(lw < rw, "bad word range {}..{}", lw, rw);

    let count = if rw == lw + 1 {
      if le.is_none() && re.is_none() && null_count == 0 {
        Count::ONE
      } else {
        Count::ZERO
      }
    } else if le.is_none() && re.is_none() {
      self.count_free_span(lw, rw, null_count)
    } else {
      self.count_middle(lw, rw, le, re, null_count)
    };

    self.table.map.insert(key, count);
    count
  }

  fn count_free_span(&mut self, lw: i32, rw: i32, null_count: u32) -> Count {
    let span = rw - lw - 1;
    if null_count == 0 || (!self.islands_ok && lw != -1) {
      // optional words may or may not be counted as nulls here; the morphology
      // check later discards linkages with the wrong number
      let n = null_count as i32;
      return if n <= span && n >= span - self.num_optional_words(lw, rw) {
        Count::ONE
      } else {
        Count::ZERO
      };
    }

    let block = self.block;
    let w = lw + 1;
    let mut total = 0i64;
    for opt in 0..=self.is_optional(w) as u32 {
      let n = null_count + opt;
      for &d in block.word(w as usize) {
        let d = block.disjunct(d);
        if d.left.is_none() {
          total = total.saturating_add(self.do_count(w, rw, d.right, None, n - 1).get());
        }
      }
      total = total.saturating_add(self.do_count(w, rw, None, None, n - 1).get());
    }
    self.clamp(total)
  }

  fn count_middle(
    &mut self,
    lw: i32,
    rw: i32,
    le: Option<ConnectorIdx>,
    re: Option<ConnectorIdx>,
    null_count: u32,
  ) -> Count {
    let block = self.block;
    let (tracked, tracking_left) = match (le, re) {
      (Some(c), _) => (c, true),
      (None, Some(c)) => (c, false),
      (None, None) => unreachable!("free spans are counted apart"),
    };
    let (start, end) = middle_words(block, lw, rw, le, re);

    let mut total = 0i64;
    let mut w = start;
    loop {
      w = self.next_word(tracked, w, end, null_count);
      if w > end {
        break;
      }

      let cached = if null_count == 0 {
        self.cached_list(tracked, w)
      } else {
        None
      };
      let from_cache = cached.is_some();
      let mstart = if tracking_left {
        self.matcher.form_match_list(w, le, lw, re, rw, cached.as_deref(), None)
      } else {
        self.matcher.form_match_list(w, le, lw, re, rw, None, cached.as_deref())
      };
      let mend = self.matcher.end();

      let mut all_zero = true;
      let mut survivors = Vec::new();
      for i in mstart..mend {
        let e = self.matcher.entry(i);
        let d = block.disjunct(e.d);
        let mut d_zero = true;
        for lnull in 0..=null_count {
          let (term, seen) = self.count_term(lw, rw, le, re, w, e, d, lnull, null_count - lnull);
          total = total.saturating_add(term);
          if seen != Tracked::Zero {
            d_zero = false;
          }
        }
        if !d_zero {
          all_zero = false;
          survivors.push(e.d);
        }
      }
      self.matcher.pop_match_list(mstart);

      if !self.exhausted {
        let expect = if mend == mstart && !from_cache {
          Expectation::NoMatch
        } else if all_zero {
          Expectation::ZeroUpTo(null_count)
        } else {
          Expectation::Unknown
        };
        let list = (null_count == 0 && !from_cache && !all_zero).then(|| Rc::from(survivors));
        self.record(tracked, w, expect, list);
      }
      w += 1;
    }
    self.clamp(total)
  }

  /// The linkages in which middle word `w` uses disjunct `d` with `lnull` nulls left of
  /// it and `rnull` right of it, and what that showed about the count through the
  /// connector heading the range.
  #[allow(clippy::too_many_arguments)]
  fn count_term(
    &mut self,
    lw: i32,
    rw: i32,
    le: Option<ConnectorIdx>,
    re: Option<ConnectorIdx>,
    w: i32,
    e: MatchEntry,
    d: &Disjunct,
    lnull: u32,
    rnull: u32,
  ) -> (i64, Tracked) {
    let left_pair = match (le, d.left) {
      (Some(a), Some(b)) if e.match_left => Some((a, b)),
      _ => None,
    };
    let right_pair = match (d.right, re) {
      (Some(a), Some(b)) if e.match_right => Some((a, b)),
      _ => None,
    };

    let lpossible = left_pair.is_some_and(|(a, b)| self.link_possible(lw, w, a, b, lnull));
    let rpossible = (lpossible || le.is_none())
      && right_pair.is_some_and(|(a, b)| self.link_possible(w, rw, a, b, rnull));
    if !lpossible && !rpossible {
      return (0, Tracked::Zero);
    }

    let mut l_bnr = None;
    let mut r_bnl = None;
    if !(lpossible && rpossible) {
      if lpossible {
        l_bnr = Some(self.do_count(w, rw, d.right, re, rnull));
      } else if le.is_none() {
        r_bnl = Some(self.do_count(lw, w, None, d.left, lnull));
      }
    }

    let mut total = 0i64;
    let mut leftcount = 0i64;
    let mut left_seen = if lpossible { Tracked::Unknown } else { Tracked::Zero };
    if let Some((a, b)) = left_pair {
      if lpossible && (rpossible || l_bnr.is_some_and(|c| !c.is_zero())) {
        leftcount = self.count_link(lw, w, a, b, lnull);
        left_seen = if leftcount > 0 { Tracked::NonZero } else { Tracked::Zero };
        if leftcount > 0 {
          let bnr = match l_bnr {
            Some(c) => c,
            None => self.do_count(w, rw, d.right, re, rnull),
          };
          muladd(&mut total, leftcount, bnr.get());
        }
      }
    }

    let mut right_seen = if rpossible { Tracked::Unknown } else { Tracked::Zero };
    if let Some((a, b)) = right_pair {
      if rpossible && (leftcount > 0 || r_bnl.is_some_and(|c| !c.is_zero())) {
        let rightcount = self.count_link(w, rw, a, b, rnull);
        right_seen = if rightcount > 0 { Tracked::NonZero } else { Tracked::Zero };
        if rightcount > 0 {
          muladd(&mut total, leftcount, rightcount);
          if le.is_none() {
            let bnl = match r_bnl {
              Some(c) => c,
              None => self.do_count(lw, w, None, d.left, lnull),
            };
            muladd(&mut total, rightcount, bnl.get());
          }
        }
      }
    }

    (total, if le.is_some() { left_seen } else { right_seen })
  }

  /// Counts the linkages of the whole sentence with `null_count` null words. The
  /// walls at -1 and the sentence length are virtual words.
  pub fn do_parse(&mut self, null_count: u32) -> Count {
    let len = self.block.len() as i32;
    let count = self.do_count(-1, len, None, None, null_count + 1);
    debug!(
      null_count,
      %count,
      table = self.table_len(),
      clamped = self.clamped,
      exhausted = self.exhausted,
      "counted"
    );
    if count.get() > PARSE_NUM_OVERFLOW {
      warn!(%count, "combinatorial explosion");
    }
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::disjunct::prepare;
  use crate::parse::Resources;
  use crate::tracon::{pack_sentence, PackMode};
  use std::time::Duration;

  fn packed(sent: &Sentence) -> DisjunctBlock {
    let prepared = prepare(sent);
    let mut block = DisjunctBlock::new();
    pack_sentence(&prepared, &mut block, &sent.connectors, PackMode::Parsing, true);
    block
  }

  fn count(src: &str, null_count: u32, islands_ok: bool) -> Count {
    let sent: Sentence = src.parse().unwrap();
    let block = packed(&sent);
    let mut ctx = CountContext::new(&sent, &block, islands_ok);
    ctx.do_parse(null_count)
  }

  #[test]
  fn test_clamp() {
    assert_eq!(Count::clamp(5), (Count(5), false));
    assert_eq!(Count::clamp(i64::MAX), (Count::MAX, true));
    assert_eq!(Count::clamp(-3), (Count::ZERO, false));
  }

  #[test]
  fn test_simple_chain() {
    assert_eq!(count("a: A+; b: A- & B+; c: B-;", 0, false), Count::ONE);
    assert_eq!(count("a: A+; b: A- & B+; c: B-;", 1, false), Count::ZERO);
  }

  #[test]
  fn test_adjacent_words() {
    let sent: Sentence = "a: A+; b: A-;".parse().unwrap();
    let block = packed(&sent);
    let mut ctx = CountContext::new(&sent, &block, false);
    assert_eq!(ctx.do_count(0, 1, None, None, 0), Count::ONE);
    assert_eq!(ctx.do_count(0, 1, None, None, 1), Count::ZERO);
    let a_plus = block.disjunct(block.word(0)[0]).right;
    assert_eq!(ctx.do_count(0, 1, a_plus, None, 0), Count::ZERO);
  }

  #[test]
  fn test_two_readings() {
    let src = "a: A+ & B+ | A+; b: A- | A- & C+; c: B- | C-;";
    assert_eq!(count(src, 0, false), Count(2));
  }

  #[test]
  fn test_multi_connector() {
    assert_eq!(count("a: @A+; b: A-; c: A-;", 0, false), Count::ONE);
    assert_eq!(count("a: A+; b: A-; c: A-;", 0, false), Count::ZERO);
  }

  #[test]
  fn test_null_word() {
    let src = "a: A+; b: A-; c: B-;";
    assert_eq!(count(src, 0, false), Count::ZERO);
    assert_eq!(count(src, 1, false), Count::ONE);
  }

  #[test]
  fn test_islands() {
    // "a b" and "c d" can only be two islands
    let src = "a: A+; b: A-; c: B+; d: B-;";
    assert_eq!(count(src, 0, false), Count::ZERO);
    assert_eq!(count(src, 1, false), Count::ZERO);
    assert_eq!(count(src, 1, true), Count::ONE);
  }

  #[test]
  fn test_optional_word_skipped() {
    assert_eq!(count("a: A+; b?: (); c: A-;", 0, false), Count::ONE);
  }

  #[test]
  fn test_unreachable_connector() {
    let mut sent: Sentence = "a: A+; b: (); c: A-;".parse().unwrap();
    sent.connectors.set_length_limit("A", 1).unwrap();
    let block = packed(&sent);
    let mut ctx = CountContext::new(&sent, &block, false);
    let a_plus = block.disjunct(block.word(0)[0]).right;
    let a_minus = block.disjunct(block.word(2)[0]).left;
    assert_eq!(ctx.do_count(0, 2, a_plus, a_minus, 0), Count::ZERO);
    assert_eq!(ctx.do_parse(0), Count::ZERO);
  }

  #[test]
  fn test_saturation() {
    let mut src = String::from("w0: A+;\n");
    for w in 1..=40 {
      src.push_str(&format!("w{}: {{x.a}} A- & A+ | {{x.b}} A- & A+;\n", w));
    }
    src.push_str("w41: A-;\n");
    let sent: Sentence = src.parse().unwrap();
    let block = packed(&sent);
    let mut ctx = CountContext::new(&sent, &block, false);

    assert_eq!(ctx.do_parse(0), Count::MAX);
    assert!(ctx.clamped() > 0);
    // a suffix short enough not to saturate
    let w30 = block.disjunct(block.word(30)[0]).right;
    assert_eq!(ctx.do_count(30, 42, w30, None, 0), Count(1 << 10));
  }

  #[test]
  fn test_exhausted() {
    let sent: Sentence = "a: A+; b: A- & B+; c: B-;".parse().unwrap();
    let block = packed(&sent);
    let resources = Resources::new(Some(Duration::ZERO), None);
    let mut ctx = CountContext::new(&sent, &block, false);
    ctx.set_resources(&resources, 1);
    assert_eq!(ctx.do_parse(0), Count::ZERO);
    assert!(ctx.exhausted());
  }

  #[test]
  fn test_word_vector_skips() {
    let mut wv = WordVector {
      base: 2,
      slots: vec![WordSlot::default(); 6],
    };
    wv.slots[0].expect = Expectation::ZeroUpTo(1);
    wv.slots[1].expect = Expectation::NoMatch;
    wv.slots[2].expect = Expectation::ZeroUpTo(0);

    assert_eq!(wv.next_word(2, 7, 0), 5);
    assert_eq!(wv.slots[0].skip_to, Some((5, 0)));
    // the shortcut doesn't apply to a higher null count
    assert_eq!(wv.next_word(2, 7, 1), 4);
    assert_eq!(wv.next_word(2, 3, 0), 4);
    assert_eq!(Expectation::ZeroUpTo(2).merge(Expectation::ZeroUpTo(1)), Expectation::ZeroUpTo(2));
    assert_eq!(Expectation::Unknown.merge(Expectation::NoMatch), Expectation::NoMatch);
  }

  #[test]
  fn test_repeat_is_identical() {
    let src = "a: A+ & B+ | A+; b: A- | A- & C+; c: B- | C-;";
    let sent: Sentence = src.parse().unwrap();
    let block = packed(&sent);
    let first = CountContext::new(&sent, &block, false).do_parse(0);
    // the second context reuses the first one's table allocation
    let second = CountContext::new(&sent, &block, false).do_parse(0);
    assert_eq!(first, second);
  }
}
