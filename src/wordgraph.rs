use std::collections::HashMap;
use std::fmt;

crate::define_idx!(
  /// A set of tokenization positions, see [`Origins`]
  OriginId
);

/// Where a token sits in the tokenization hierarchy: pairs of
/// (unsplit word number, alternative number), outermost first.
/// The empty position is a plain word that came from no alternative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HierPosition(pub Vec<u32>);

impl HierPosition {
  pub fn root() -> Self {
    Self(Vec::new())
  }

  /// Number of alternative levels
  pub fn depth(&self) -> usize {
    self.0.len() / 2
  }

  /// Two tokens can appear in the same linkage unless they come from different
  /// alternatives of the same unsplit word. The first differing entry decides:
  /// an unsplit-word entry means two separate words, an alternative entry means
  /// a conflict.
  pub fn in_same_alternative(&self, other: &Self) -> bool {
    match self.0.iter().zip(other.0.iter()).position(|(a, b)| a != b) {
      Some(i) => i % 2 == 0,
      None => true,
    }
  }

  /// Whether a linkage using a token at `chosen` has selected the alternative this
  /// position belongs to.
  pub fn selected_by(&self, chosen: &Self) -> bool {
    chosen.0.starts_with(&self.0)
  }
}

impl fmt::Display for HierPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, n) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ".")?;
      }
      write!(f, "{}", n)?;
    }
    Ok(())
  }
}

/// Interned sets of hierarchy positions. A disjunct's origin is a set because
/// identical disjuncts coming from different alternatives are merged.
#[derive(Debug, Clone, Default)]
pub struct Origins {
  sets: Vec<Vec<HierPosition>>,
  by_set: HashMap<Vec<HierPosition>, OriginId>,
}

impl Origins {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn intern(&mut self, mut set: Vec<HierPosition>) -> OriginId {
    set.sort();
    set.dedup();
    if let Some(&id) = self.by_set.get(&set) {
      return id;
    }
    let id = OriginId(self.sets.len() as u32);
    self.sets.push(set.clone());
    self.by_set.insert(set, id);
    id
  }

  pub fn single(&mut self, pos: &HierPosition) -> OriginId {
    self.intern(vec![pos.clone()])
  }

  pub fn get(&self, id: OriginId) -> &[HierPosition] {
    &self.sets[id.0 as usize]
  }

  pub fn merge(&mut self, a: OriginId, b: OriginId) -> OriginId {
    if a == b {
      return a;
    }
    let mut set = self.get(a).to_vec();
    set.extend_from_slice(self.get(b));
    self.intern(set)
  }

  /// Whether some token of `a` and some token of `b` can be in one linkage
  pub fn compatible(&self, a: OriginId, b: OriginId) -> bool {
    if a == b {
      return true;
    }
    let (a, b) = (self.get(a), self.get(b));
    if a.iter().chain(b.iter()).any(|p| p.depth() == 0) {
      return true;
    }
    a.iter().any(|pa| b.iter().any(|pb| pa.in_same_alternative(pb)))
  }

  pub fn len(&self) -> usize {
    self.sets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sets.is_empty()
  }
}

#[test]
fn test_in_same_alternative() {
  let plain = HierPosition::root();
  let w3a0 = HierPosition(vec![3, 0]);
  let w3a1 = HierPosition(vec![3, 1]);
  let w4a1 = HierPosition(vec![4, 1]);
  let w3a0_w1a1 = HierPosition(vec![3, 0, 1, 1]);
  let w3a0_w1a0 = HierPosition(vec![3, 0, 1, 0]);

  assert!(plain.in_same_alternative(&w3a0));
  assert!(w3a0.in_same_alternative(&w3a0));
  assert!(!w3a0.in_same_alternative(&w3a1));
  assert!(w3a1.in_same_alternative(&w4a1));
  assert!(w3a0.in_same_alternative(&w3a0_w1a1));
  assert!(!w3a1.in_same_alternative(&w3a0_w1a1));
  assert!(!w3a0_w1a0.in_same_alternative(&w3a0_w1a1));

  assert!(w3a0.selected_by(&w3a0_w1a1));
  assert!(!w3a1.selected_by(&w3a0_w1a1));
  assert!(plain.selected_by(&w3a1));
}

#[test]
fn test_origin_sets() {
  let mut origins = Origins::new();
  let a = origins.single(&HierPosition(vec![0, 0]));
  let b = origins.single(&HierPosition(vec![0, 1]));
  let c = origins.single(&HierPosition(vec![0, 1]));
  assert_eq!(b, c);
  assert!(!origins.compatible(a, b));

  let ab = origins.merge(a, b);
  assert_eq!(origins.get(ab).len(), 2);
  assert!(origins.compatible(ab, a));
  assert!(origins.compatible(ab, b));
  assert_eq!(origins.merge(b, a), ab);
}
