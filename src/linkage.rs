use std::cmp::Ordering;
use std::fmt;

use crate::connector::DescId;
use crate::disjunct::{DisjunctBlock, DisjunctIdx};
use crate::extract::RawLinkage;
use crate::sentence::Sentence;
use crate::wordgraph::HierPosition;

/// Disjunct costs closer than this compare equal
const COST_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
  pub lw: usize,
  pub rw: usize,
  pub lc: DescId,
  pub rc: DescId,
  /// The two connector names intersected, see [`crate::connector::ConnectorTable::link_name`]
  pub name: String,
}

/// What a word contributes to a linkage
#[derive(Debug, Clone, PartialEq)]
pub struct ChosenDisjunct {
  pub word_string: String,
  pub cost: f64,
  pub origin: Vec<HierPosition>,
}

/// Cost model and bookkeeping of one linkage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkageInfo {
  /// Index in the parse forest the linkage came from, or the try number if sampled
  pub index: i64,
  /// Null count of the pass that found it
  pub null_count: u32,
  /// Null words, not counting optional words the linkage has no use for
  pub unused_word_cost: usize,
  pub disjunct_cost: f64,
  /// Sum over links of the words they span
  pub link_cost: usize,
  pub violations: usize,
  /// Words taking part, nulls included
  pub num_words: usize,
  pub sampled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Linkage {
  pub links: Vec<Link>,
  /// Per word, none for a null word
  pub chosen: Vec<Option<ChosenDisjunct>>,
  /// Per word, whether it is absent from the linkage altogether
  pub skipped: Vec<bool>,
  pub info: LinkageInfo,
}

impl Linkage {
  /// Materializes a linkage read off the forest, or returns none if its chosen
  /// disjuncts come from incompatible tokenizations or, without islands, it doesn't
  /// have exactly `null_count` real nulls.
  pub fn build(
    sent: &Sentence,
    block: &DisjunctBlock,
    raw: &RawLinkage,
    null_count: u32,
    islands_ok: bool,
  ) -> Option<Self> {
    let chosen = raw.chosen.iter().flatten().copied().collect::<Vec<DisjunctIdx>>();
    for (i, &a) in chosen.iter().enumerate() {
      let a = block.disjunct(a).origin;
      if !chosen[i + 1..].iter().all(|&b| block.origins.compatible(a, block.disjunct(b).origin)) {
        return None;
      }
    }

    let positions = chosen
      .iter()
      .flat_map(|&d| block.origins.get(block.disjunct(d).origin))
      .collect::<Vec<_>>();
    let skipped = raw
      .chosen
      .iter()
      .zip(&sent.words)
      .map(|(d, word)| {
        d.is_none()
          && word.optional
          && !word.disjuncts.iter().any(|spec| {
            spec.origin.depth() > 0 && positions.iter().any(|&p| spec.origin.selected_by(p))
          })
      })
      .collect::<Vec<_>>();
    let unused = raw
      .chosen
      .iter()
      .zip(&skipped)
      .filter(|&(d, &skip)| d.is_none() && !skip)
      .count();
    if !islands_ok && unused != null_count as usize {
      return None;
    }

    let mut links = raw
      .links
      .iter()
      .map(|l| {
        let (lc, rc) = (block.connector(l.lc).desc, block.connector(l.rc).desc);
        Link {
          lw: l.lw as usize,
          rw: l.rw as usize,
          lc,
          rc,
          name: sent.connectors.link_name(lc, rc),
        }
      })
      .collect::<Vec<_>>();
    links.sort_by_key(|l| (l.lw, l.rw));

    let chosen = raw
      .chosen
      .iter()
      .map(|d| {
        d.map(|d| {
          let dj = block.disjunct(d);
          ChosenDisjunct {
            word_string: dj.word_string.to_string(),
            cost: dj.cost,
            origin: block.origins.get(dj.origin).to_vec(),
          }
        })
      })
      .collect::<Vec<_>>();

    let info = LinkageInfo {
      null_count,
      unused_word_cost: unused,
      disjunct_cost: chosen.iter().flatten().map(|c| c.cost).sum(),
      link_cost: links.iter().map(|l| l.rw - l.lw - 1).sum(),
      num_words: skipped.iter().filter(|&&s| !s).count(),
      ..Default::default()
    };
    Some(Self {
      links,
      chosen,
      skipped,
      info,
    })
  }

  /// Same links and same disjuncts on every word
  pub fn same_as(&self, other: &Self) -> bool {
    self.links == other.links && self.chosen == other.chosen
  }

  /// Word strings as shown: the chosen disjunct's string, `[word]` for a null word,
  /// and nothing for a skipped one
  pub fn words<'a>(&'a self, sent: &'a Sentence) -> impl Iterator<Item = (usize, String)> + 'a {
    self
      .chosen
      .iter()
      .enumerate()
      .filter(|&(w, _)| !self.skipped[w])
      .map(|(w, c)| match c {
        Some(c) => (w, c.word_string.clone()),
        None => (w, format!("[{}]", sent.words[w].string)),
      })
  }
}

impl fmt::Display for Linkage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let info = &self.info;
    writeln!(
      f,
      "unused={} dis={:.2} len={} vio={}",
      info.unused_word_cost, info.disjunct_cost, info.link_cost, info.violations
    )?;
    for l in &self.links {
      writeln!(f, "{} {} {}", l.lw, l.rw, l.name)?;
    }
    Ok(())
  }
}

/// Orders linkages by violations, unused words, disjunct cost, link cost, then word count
pub fn vdal_order(a: &Linkage, b: &Linkage) -> Ordering {
  let (a, b) = (&a.info, &b.info);
  a.violations
    .cmp(&b.violations)
    .then(a.unused_word_cost.cmp(&b.unused_word_cost))
    .then_with(|| {
      if (a.disjunct_cost - b.disjunct_cost).abs() < COST_EPSILON {
        Ordering::Equal
      } else {
        a.disjunct_cost.total_cmp(&b.disjunct_cost)
      }
    })
    .then(a.link_cost.cmp(&b.link_cost))
    .then(a.num_words.cmp(&b.num_words))
}

/// Sorts best first. Sampled linkages may repeat, so with `dedup` later copies of a
/// linkage are dropped.
pub fn sort_linkages(linkages: &mut Vec<Linkage>, dedup: bool) {
  linkages.sort_by(vdal_order);
  if dedup {
    let mut kept: Vec<Linkage> = Vec::with_capacity(linkages.len());
    for l in linkages.drain(..) {
      // equal linkages sort next to each other, up to cost ties
      if !kept.iter().rev().take_while(|k| vdal_order(k, &l) == Ordering::Equal).any(|k| k.same_as(&l)) {
        kept.push(l);
      }
    }
    *linkages = kept;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::count::CountContext;
  use crate::disjunct::prepare;
  use crate::extract::build_parse_set;
  use crate::tracon::{pack_sentence, PackMode};

  fn linkages(src: &str, null_count: u32, islands_ok: bool) -> (Sentence, Vec<Option<Linkage>>) {
    let sent: Sentence = src.parse().unwrap();
    let prepared = prepare(&sent);
    let mut block = DisjunctBlock::new();
    pack_sentence(&prepared, &mut block, &sent.connectors, PackMode::Parsing, true);
    let mut ctx = CountContext::new(&sent, &block, islands_ok);
    ctx.do_parse(null_count);
    let forest = build_parse_set(&mut ctx, null_count, false);
    let all = (0..forest.count())
      .map(|i| Linkage::build(&sent, &block, &forest.list_links(i), null_count, islands_ok))
      .collect();
    (sent, all)
  }

  #[test]
  fn test_build() {
    let (sent, all) = linkages("a: A+; b: [0.5] A- & Bs+; c: B*-;", 0, false);
    assert_eq!(all.len(), 1);
    let l = all[0].as_ref().unwrap();
    let links = l.links.iter().map(|l| (l.lw, l.rw, l.name.as_str())).collect::<Vec<_>>();
    assert_eq!(links, vec![(0, 1, "A"), (1, 2, "Bs")]);
    assert_eq!(l.info.disjunct_cost, 0.5);
    assert_eq!(l.info.link_cost, 0);
    assert_eq!(l.info.num_words, 3);
    assert_eq!(l.words(&sent).map(|(_, s)| s).collect::<Vec<_>>(), vec!["a", "b", "c"]);
  }

  #[test]
  fn test_alternatives_not_mixed() {
    // word 1 splits two ways: "b" alone, or "b1 b2"
    let src = "
      a: A+;
      b?: <1.0> A- & C+;
      b1?: <1.1> A- & B+;
      b2?: <1.1> B- & C+;
      c: C-;
    ";
    let (sent, all) = linkages(src, 0, false);
    let sane = all.iter().flatten().collect::<Vec<_>>();
    assert_eq!(sane.len(), 2);
    for l in &sane {
      let shown = l.words(&sent).map(|(_, s)| s).collect::<Vec<_>>();
      assert!(shown == ["a", "b", "c"] || shown == ["a", "b1", "b2", "c"], "{:?}", shown);
      assert_eq!(l.info.unused_word_cost, 0);
    }
  }

  #[test]
  fn test_unselected_optional_word_is_not_null() {
    let src = "
      a: A+;
      b?: <1.0> A- & C+;
      b1?: <1.1> A- & B+;
      c: C-;
    ";
    let (_, all) = linkages(src, 0, false);
    let sane = all.iter().flatten().collect::<Vec<_>>();
    assert_eq!(sane.len(), 1);
    assert!(sane[0].skipped[2]);

    // the count takes "b1" as the null, but no chosen word selects its alternative
    let (_, all) = linkages(src, 1, false);
    assert_eq!(all.len(), 1);
    assert!(all[0].is_none());
  }

  #[test]
  fn test_sort_and_dedup() {
    let (_, all) = linkages("a: [1] A+ | [0] B+; b: A- | B-;", 0, false);
    let mut sorted = all.into_iter().flatten().collect::<Vec<_>>();
    assert_eq!(sorted.len(), 2);
    let copy = sorted[0].clone();
    sorted.push(copy);

    sort_linkages(&mut sorted, true);
    assert_eq!(sorted.len(), 2);
    assert_eq!(sorted[0].links[0].name, "B");
    assert_eq!(vdal_order(&sorted[0], &sorted[1]), Ordering::Less);
  }

  #[test]
  fn test_cost_tolerance() {
    let mut a = Linkage {
      links: Vec::new(),
      chosen: Vec::new(),
      skipped: Vec::new(),
      info: LinkageInfo {
        disjunct_cost: 1.0,
        link_cost: 2,
        ..Default::default()
      },
    };
    let mut b = a.clone();
    b.info.disjunct_cost = 1.0 + 1e-9;
    b.info.link_cost = 1;
    assert_eq!(vdal_order(&a, &b), Ordering::Greater);
    a.info.violations = 0;
    b.info.violations = 1;
    assert_eq!(vdal_order(&a, &b), Ordering::Less);
  }
}
