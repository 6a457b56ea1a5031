use std::fmt;
use std::marker::PhantomData;

/// Index types handed out by a [`Pool`]
pub trait Idx: Copy + Eq + fmt::Debug {
  fn new(idx: usize) -> Self;
  fn index(self) -> usize;
}

/// Declares a `u32` newtype usable as a pool index
#[macro_export]
macro_rules! define_idx {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct $name(pub u32);

    impl $crate::pool::Idx for $name {
      fn new(idx: usize) -> Self {
        assert!(idx <= u32::MAX as usize, "pool index overflow");
        Self(idx as u32)
      }

      fn index(self) -> usize {
        self.0 as usize
      }
    }
  };
}

/// Counters describing a pool's usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
  /// Elements currently allocated
  pub live: usize,
  /// Elements handed out over the pool's lifetime, across resets
  pub issued: usize,
  /// Elements the backing storage can hold without growing
  pub capacity: usize,
  /// Number of times the pool was reset
  pub resets: usize,
}

impl fmt::Display for PoolStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} live, {} issued, {} capacity, {} resets",
      self.live, self.issued, self.capacity, self.resets
    )
  }
}

/// A bulk arena: elements are only ever appended, and are released all at once
/// by `reset`. Indices stay valid until the next reset or restore.
#[derive(Debug, Clone)]
pub struct Pool<I, T> {
  items: Vec<T>,
  issued: usize,
  resets: usize,
  _idx: PhantomData<fn() -> I>,
}

/// Saved contents of a pool, see [`Pool::snapshot`]
#[derive(Debug, Clone)]
pub struct Snapshot<I, T> {
  items: Vec<T>,
  _idx: PhantomData<fn() -> I>,
}

impl<I, T> Default for Pool<I, T> {
  fn default() -> Self {
    Self {
      items: Vec::new(),
      issued: 0,
      resets: 0,
      _idx: PhantomData,
    }
  }
}

impl<I: Idx, T> Pool<I, T> {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      items: Vec::with_capacity(capacity),
      ..Default::default()
    }
  }

  pub fn alloc(&mut self, item: T) -> I {
    let idx = I::new(self.items.len());
    self.items.push(item);
    self.issued += 1;
    idx
  }

  /// Index the next `alloc` will return
  pub fn next_idx(&self) -> I {
    I::new(self.items.len())
  }

  /// Get an idx. Assumes valid, panics on OOB
  pub fn get(&self, idx: I) -> &T {
    &self.items[idx.index()]
  }

  /// Mutably get an idx. Assumes valid, panics on OOB
  pub fn get_mut(&mut self, idx: I) -> &mut T {
    &mut self.items[idx.index()]
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
    self.items.iter().enumerate().map(|(i, t)| (I::new(i), t))
  }

  /// Drops every element, keeping the allocation for reuse
  pub fn reset(&mut self) {
    self.items.clear();
    self.resets += 1;
  }

  pub fn stats(&self) -> PoolStats {
    PoolStats {
      live: self.items.len(),
      issued: self.issued,
      capacity: self.items.capacity(),
      resets: self.resets,
    }
  }
}

impl<I: Idx, T: Clone> Pool<I, T> {
  pub fn snapshot(&self) -> Snapshot<I, T> {
    Snapshot {
      items: self.items.clone(),
      _idx: PhantomData,
    }
  }

  /// Returns the pool to the contents of `snapshot`, reusing the current allocation
  pub fn restore(&mut self, snapshot: &Snapshot<I, T>) {
    self.items.clone_from(&snapshot.items);
  }
}

impl<I: Idx, T> std::ops::Index<I> for Pool<I, T> {
  type Output = T;

  fn index(&self, idx: I) -> &T {
    self.get(idx)
  }
}

impl<I: Idx, T> std::ops::IndexMut<I> for Pool<I, T> {
  fn index_mut(&mut self, idx: I) -> &mut T {
    self.get_mut(idx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  define_idx!(TestIdx);

  #[test]
  fn test_alloc_and_reset() {
    let mut pool: Pool<TestIdx, &str> = Pool::new();
    let a = pool.alloc("a");
    let b = pool.alloc("b");
    assert_eq!(a, TestIdx(0));
    assert_eq!(b, TestIdx(1));
    assert_eq!(pool[b], "b");

    pool.reset();
    assert!(pool.is_empty());
    assert_eq!(pool.alloc("c"), TestIdx(0));

    let stats = pool.stats();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.issued, 3);
    assert_eq!(stats.resets, 1);
  }

  #[test]
  fn test_snapshot_restore() {
    let mut pool: Pool<TestIdx, u32> = Pool::new();
    let a = pool.alloc(1);
    pool.alloc(2);
    let snap = pool.snapshot();

    pool[a] = 10;
    pool.alloc(3);
    assert_eq!(pool.len(), 3);

    pool.restore(&snap);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[a], 1);
  }
}
