use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::wordgraph::OriginId;
use crate::Err;

crate::define_idx!(
  /// Interned connector name, see [`ConnectorTable`]
  DescId
);

crate::define_idx!(
  /// A connector inside a [`crate::disjunct::DisjunctBlock`]
  ConnectorIdx
);

/// `nearest_word` of a connector whose disjunct has been marked for deletion
pub const BAD_WORD: i32 = i32::MAX;

/// Optional head/dependent mark written as a leading `h` or `d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadDep {
  None,
  Head,
  Dependent,
}

/// Everything about a connector that depends only on its name
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorDesc {
  pub string: String,
  pub head_dep: HeadDep,
  /// Dense id of the uppercase part, used as the hash key by the fast matcher
  /// and the power tables
  pub uc_num: u32,
  uc_range: (usize, usize),
  /// Max distance to a partner word, `None` if unlimited
  pub length_limit: Option<u32>,
}

impl ConnectorDesc {
  pub fn uc(&self) -> &str {
    &self.string[self.uc_range.0..self.uc_range.1]
  }

  /// Lowercase subscript, possibly containing `*` wildcards
  pub fn lc(&self) -> &str {
    &self.string[self.uc_range.1..]
  }
}

/// Interns connector names, so connectors can refer to them by a small id
#[derive(Debug, Clone, Default)]
pub struct ConnectorTable {
  descs: Vec<ConnectorDesc>,
  by_name: HashMap<String, DescId>,
  uc_nums: HashMap<String, u32>,
}

impl ConnectorTable {
  pub fn new() -> Self {
    Default::default()
  }

  /// Returns the id for `name` (no direction suffix, no multi mark), interning it if new.
  /// Errors if `name` isn't a well-formed connector name.
  pub fn intern(&mut self, name: &str) -> Result<DescId, Err> {
    lazy_static! {
      static ref CONNECTOR_NAME: Regex = Regex::new(r"^([hd]?)([A-Z][A-Z0-9_]*)([a-z*]*)$").unwrap();
    }

    if let Some(&id) = self.by_name.get(name) {
      return Ok(id);
    }

    let caps = CONNECTOR_NAME
      .captures(name)
      .ok_or_else(|| -> Err { format!("bad connector name {:?}", name).into() })?;
    let head_dep = match &caps[1] {
      "h" => HeadDep::Head,
      "d" => HeadDep::Dependent,
      _ => HeadDep::None,
    };
    let uc = caps.get(2).unwrap();

    let next_uc = self.uc_nums.len() as u32;
    let uc_num = *self.uc_nums.entry(uc.as_str().to_string()).or_insert(next_uc);

    let id = DescId(self.descs.len() as u32);
    self.descs.push(ConnectorDesc {
      string: name.to_string(),
      head_dep,
      uc_num,
      uc_range: (uc.start(), uc.end()),
      length_limit: None,
    });
    self.by_name.insert(name.to_string(), id);
    Ok(id)
  }

  pub fn get(&self, id: DescId) -> &ConnectorDesc {
    &self.descs[id.0 as usize]
  }

  pub fn lookup(&self, name: &str) -> Option<DescId> {
    self.by_name.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.descs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.descs.is_empty()
  }

  /// Limits how far connectors named `name` may reach. Interns `name` if needed.
  pub fn set_length_limit(&mut self, name: &str, limit: u32) -> Result<(), Err> {
    let id = self.intern(name)?;
    self.descs[id.0 as usize].length_limit = Some(limit);
    Ok(())
  }

  /// Whether two connector names can be the two ends of one link: same uppercase part,
  /// not both heads or both dependents, and subscripts agreeing letter by letter
  /// where `*` and a missing letter match anything.
  pub fn easy_match(&self, a: DescId, b: DescId) -> bool {
    if a == b {
      return self.get(a).head_dep == HeadDep::None;
    }
    let (a, b) = (self.get(a), self.get(b));
    if a.uc_num != b.uc_num {
      return false;
    }
    if a.head_dep != HeadDep::None && a.head_dep == b.head_dep {
      return false;
    }
    a.lc()
      .bytes()
      .zip(b.lc().bytes())
      .all(|(x, y)| x == y || x == b'*' || y == b'*')
  }

  /// The name shown on a link between `a` and `b`: the shared uppercase part followed by
  /// the more specific subscript, letter by letter.
  pub fn link_name(&self, a: DescId, b: DescId) -> String {
    let (a, b) = (self.get(a), self.get(b));
    let mut name = a.uc().to_string();
    let (la, lb) = (a.lc().as_bytes(), b.lc().as_bytes());
    for i in 0..la.len().max(lb.len()) {
      let c = match (la.get(i), lb.get(i)) {
        (Some(b'*'), Some(&y)) => y,
        (Some(&x), _) => x,
        (None, Some(&y)) => y,
        (None, None) => unreachable!(),
      };
      name.push(c as char);
    }
    name
  }
}

/// One connector of a disjunct's chain, as stored in a disjunct block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connector {
  pub desc: DescId,
  pub multi: bool,
  /// Closest word this connector could link to
  pub nearest_word: i32,
  /// Farthest word this connector could link to
  pub farthest_word: i32,
  /// Identity of the trailing connector sequence starting here; 0 until packed
  pub tracon_id: u32,
  /// Head of its chain (links farthest)
  pub shallow: bool,
  /// The deeper connector of the chain (links nearer), if any
  pub next: Option<ConnectorIdx>,
  /// Origins of the disjunct this connector belongs to
  pub origin: OriginId,
}

impl Connector {
  pub fn new(desc: DescId, multi: bool, origin: OriginId) -> Self {
    Self {
      desc,
      multi,
      nearest_word: 0,
      farthest_word: 0,
      tracon_id: 0,
      shallow: false,
      next: None,
      origin,
    }
  }

  pub fn is_bad(&self) -> bool {
    self.nearest_word == BAD_WORD
  }
}

/// Displays a connector name with its multi mark, e.g. `@Ss*b`
pub struct ConnectorDisplay<'a> {
  pub table: &'a ConnectorTable,
  pub connector: &'a Connector,
}

impl fmt::Display for ConnectorDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.connector.multi {
      write!(f, "@")?;
    }
    write!(f, "{}", self.table.get(self.connector.desc).string)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table(names: &[&str]) -> (ConnectorTable, Vec<DescId>) {
    let mut t = ConnectorTable::new();
    let ids = names.iter().map(|n| t.intern(n).unwrap()).collect();
    (t, ids)
  }

  #[test]
  fn test_subscript_matching() {
    let (t, ids) = table(&["S", "Ss", "Sp", "Ss*b", "Ssxb", "O"]);
    let [s, ss, sp, ssb, ssxb, o] = ids[..] else { panic!() };

    assert!(t.easy_match(s, ss));
    assert!(t.easy_match(ss, s));
    assert!(!t.easy_match(ss, sp));
    assert!(t.easy_match(ssb, ssxb));
    assert!(t.easy_match(ssb, ss));
    assert!(!t.easy_match(s, o));
  }

  #[test]
  fn test_head_dependent() {
    let (t, ids) = table(&["hA", "dA", "A"]);
    let [h, d, plain] = ids[..] else { panic!() };

    assert!(t.easy_match(h, d));
    assert!(t.easy_match(h, plain));
    assert!(!t.easy_match(h, h));
    assert!(!t.easy_match(d, d));
    assert!(t.easy_match(plain, plain));
  }

  #[test]
  fn test_link_name() {
    let (t, ids) = table(&["Ss*b", "Sstb", "S", "dXa"]);
    assert_eq!(t.link_name(ids[0], ids[1]), "Sstb");
    assert_eq!(t.link_name(ids[2], ids[1]), "Sstb");
    assert_eq!(t.link_name(ids[0], ids[2]), "Ss*b");
    assert_eq!(t.get(ids[3]).uc(), "X");
    assert_eq!(t.get(ids[3]).lc(), "a");
  }

  #[test]
  fn test_bad_names() {
    let mut t = ConnectorTable::new();
    assert!(t.intern("a").is_err());
    assert!(t.intern("A+").is_err());
    assert!(t.intern("").is_err());
    assert_eq!(t.intern("Wd").unwrap(), t.intern("Wd").unwrap());
    assert_eq!(t.len(), 1);
  }
}
