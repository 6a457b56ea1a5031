use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::count::CountContext;
use crate::disjunct::{prepare, DisjunctBlock};
use crate::extract::{build_parse_set, ParseForest, RandState};
use crate::linkage::{sort_linkages, Linkage};
use crate::prune::{expected_null_count, power_prune};
use crate::sentence::Sentence;
use crate::tracon::{pack_sentence, PackMode};
use crate::utils::plural;

/// Random linkages tried beyond the linkage limit before giving up on finding
/// that many with a consistent tokenization
pub const MAX_TRIES: i64 = 250_000;

/// Sampling state carried from one non-repeatable parse to the next. Threads
/// parsing at once may interleave updates, which only shuffles the samples.
static GLOBAL_RAND_STATE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
  pub min_null_count: u32,
  /// Capped at the sentence length
  pub max_null_count: u32,
  pub islands_ok: bool,
  pub linkage_limit: usize,
  pub max_parse_time: Option<Duration>,
  /// Budget in bytes over the estimated size of the memo table and parse forest
  pub max_memory: Option<usize>,
  pub repeatable_rand: bool,
  /// Shorter sentences are packed without sharing tracons
  pub min_len_encoding: usize,
  pub resource_check_interval: u32,
  pub sort_match_list: bool,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self {
      min_null_count: 0,
      max_null_count: 0,
      islands_ok: false,
      linkage_limit: 100,
      max_parse_time: None,
      max_memory: None,
      repeatable_rand: true,
      min_len_encoding: 4,
      resource_check_interval: 1 << 18,
      sort_match_list: false,
    }
  }
}

/// Time and memory budget of one parse, started when created
#[derive(Debug, Clone)]
pub struct Resources {
  start: Instant,
  max_parse_time: Option<Duration>,
  max_memory: Option<usize>,
}

impl Resources {
  pub fn new(max_parse_time: Option<Duration>, max_memory: Option<usize>) -> Self {
    Self {
      start: Instant::now(),
      max_parse_time,
      max_memory,
    }
  }

  pub fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }

  pub fn exhausted(&self, memory_estimate: usize) -> bool {
    self.max_parse_time.is_some_and(|max| self.elapsed() >= max)
      || self.max_memory.is_some_and(|max| memory_estimate > max)
  }
}

/// Checks applied to each extracted linkage. A linkage with violations is kept
/// but isn't valid.
pub trait PostProcessor {
  fn violations(&self, sentence: &Sentence, linkage: &Linkage) -> usize;
}

/// Accepts every linkage
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPostProcessing;

impl PostProcessor for NoPostProcessing {
  fn violations(&self, _sentence: &Sentence, _linkage: &Linkage) -> usize {
    0
  }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
  /// Best first
  pub linkages: Vec<Linkage>,
  /// Null count of the last pass run
  pub null_count: u32,
  /// Linkages counted at `null_count`, capped at `i32::MAX`
  pub num_linkages_found: i64,
  /// Extracted linkages with a consistent tokenization
  pub num_linkages_alloced: usize,
  pub num_linkages_post_processed: usize,
  pub num_valid_linkages: usize,
  /// Linkages were sampled at random rather than listed in order
  pub sampled: bool,
  pub overflowed: bool,
  pub resources_exhausted: bool,
}

impl ParseOutcome {
  /// Valid linkages, or -1 if the parse ran out of time or memory
  pub fn linkage_count(&self) -> i64 {
    if self.resources_exhausted {
      -1
    } else {
      self.num_valid_linkages as i64
    }
  }

  fn exhaust(&mut self) {
    warn!(null_count = self.null_count, "resources exhausted, dropping the parse");
    *self = Self {
      null_count: self.null_count,
      resources_exhausted: true,
      ..Default::default()
    };
  }
}

impl Sentence {
  pub fn parse(&self) -> ParseOutcome {
    self.parse_with(&ParseOptions::default(), &NoPostProcessing)
  }

  pub fn parse_with(&self, opts: &ParseOptions, post: &dyn PostProcessor) -> ParseOutcome {
    classic_parse(self, opts, post)
  }
}

fn sampling_seed() -> u32 {
  match GLOBAL_RAND_STATE.load(Ordering::Relaxed) {
    0 => SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map_or(1, |d| d.subsec_nanos() | 1),
    state => state,
  }
}

/// Reads linkages off the forest into `outcome`: in index order if there are few
/// enough, otherwise sampled at random
fn process_linkages(
  sent: &Sentence,
  block: &DisjunctBlock,
  forest: &ParseForest,
  opts: &ParseOptions,
  post: &dyn PostProcessor,
  outcome: &mut ParseOutcome,
) {
  let found = forest.count();
  let alloced = found.min(opts.linkage_limit as i64);
  let sampled = forest.overflowed() || found > opts.linkage_limit as i64;
  let max_tries = if sampled {
    (alloced + MAX_TRIES).min(found)
  } else {
    alloced
  };
  if forest.overflowed() {
    warn!(
      limit = opts.linkage_limit,
      "count overflow, considering a random subset of linkages"
    );
  }

  let mut rand = RandState::seeded(sampling_seed());
  let mut linkages = Vec::with_capacity(alloced as usize);
  let mut insane = 0usize;
  for itry in 0..max_tries {
    if linkages.len() as i64 >= alloced {
      break;
    }
    let raw = if sampled {
      if opts.repeatable_rand {
        forest.list_random_links(&mut RandState::seeded((itry as u32).wrapping_add(1).wrapping_neg()))
      } else {
        forest.list_random_links(&mut rand)
      }
    } else {
      forest.list_links(itry)
    };

    match Linkage::build(sent, block, &raw, outcome.null_count, opts.islands_ok) {
      Some(mut linkage) => {
        linkage.info.index = itry;
        linkage.info.sampled = sampled;
        linkage.info.violations = post.violations(sent, &linkage);
        linkages.push(linkage);
      }
      None => insane += 1,
    }
  }
  if sampled && !opts.repeatable_rand {
    GLOBAL_RAND_STATE.store(rand.state(), Ordering::Relaxed);
  }
  if insane > 0 {
    debug!(insane, "discarded linkages mixing tokenizations");
  }

  sort_linkages(&mut linkages, sampled);
  outcome.num_linkages_alloced = linkages.len();
  outcome.num_linkages_post_processed = linkages.len();
  outcome.num_valid_linkages = linkages.iter().filter(|l| l.info.violations == 0).count();
  outcome.sampled = sampled;
  outcome.overflowed = forest.overflowed();
  outcome.linkages = linkages;
}

/// Parses with increasing null counts until one gives a valid linkage. Each pass
/// prunes, packs, counts, and extracts; running out of resources anywhere drops
/// everything found.
#[tracing::instrument(skip_all, fields(len = sent.len()))]
pub fn classic_parse(sent: &Sentence, opts: &ParseOptions, post: &dyn PostProcessor) -> ParseOutcome {
  let resources = Resources::new(opts.max_parse_time, opts.max_memory);
  let mut outcome = ParseOutcome::default();
  if sent.is_empty() {
    return outcome;
  }

  let prepared = prepare(sent);
  let mut pruning = DisjunctBlock::new();
  pack_sentence(&prepared, &mut pruning, &sent.connectors, PackMode::Pruning, true);
  let saved = pruning.save();
  debug!(disjuncts = pruning.num_disjuncts(), "prepared");

  let max_null_count = opts.max_null_count.min(sent.len() as u32);
  let share = sent.len() >= opts.min_len_encoding;
  let mut pruned_for: Option<bool> = None;
  let mut expected_nulls = 0;
  let mut parsing = DisjunctBlock::new();

  for null_count in opts.min_null_count..=max_null_count {
    let null_links = null_count > 0;
    if pruned_for != Some(null_links) {
      pruning.restore(&saved);
      let stats = power_prune(sent, &mut pruning, null_links);
      expected_nulls = expected_null_count(sent, &pruning);
      pruned_for = Some(null_links);
      debug!(
        deleted = stats.deleted,
        remaining = stats.remaining,
        expected_nulls,
        "pruned"
      );
    }
    if expected_nulls > null_count as usize {
      debug!(null_count, expected_nulls, "skipping null count below what pruning left");
      continue;
    }
    outcome.null_count = null_count;
    if resources.exhausted(0) {
      outcome.exhaust();
      return outcome;
    }

    pack_sentence(&pruning, &mut parsing, &sent.connectors, PackMode::Parsing, share);
    let mut ctx = CountContext::new(sent, &parsing, opts.islands_ok);
    ctx.set_resources(&resources, opts.resource_check_interval);
    let count = ctx.do_parse(null_count);
    if ctx.exhausted() || resources.exhausted(ctx.memory_estimate()) {
      outcome.exhaust();
      return outcome;
    }
    outcome.num_linkages_found = count.get();
    info!(
      null_count,
      found = count.get(),
      "counted {} linkage{}",
      count,
      plural(count.get())
    );
    if count.is_zero() {
      continue;
    }

    let forest = build_parse_set(&mut ctx, null_count, opts.sort_match_list);
    if resources.exhausted(ctx.memory_estimate() + forest.memory_estimate()) {
      outcome.exhaust();
      return outcome;
    }
    process_linkages(sent, &parsing, &forest, opts, post, &mut outcome);
    if resources.exhausted(0) {
      outcome.exhaust();
      return outcome;
    }

    info!(
      null_count,
      alloced = outcome.num_linkages_alloced,
      valid = outcome.num_valid_linkages,
      "extracted"
    );
    if outcome.num_valid_linkages > 0 {
      break;
    }
  }
  outcome
}
