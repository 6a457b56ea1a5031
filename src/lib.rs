//! Counting and extraction engine for link grammar parsing.
//!
//! A [`Sentence`] lists each word's disjuncts; [`Sentence::parse`] prunes them,
//! counts every planar linkage with dynamic programming, and reads out the best ones.
//!
//! ```
//! use linkparse::Sentence;
//!
//! let sent: Sentence = "the: D+; cat: D- & S+; runs: S-;".parse().unwrap();
//! let outcome = sent.parse();
//! assert_eq!(outcome.linkage_count(), 1);
//! assert_eq!(outcome.linkages[0].links[1].name, "S");
//! ```

#[macro_use]
extern crate lazy_static;

pub mod connector;
pub mod count;
pub mod disjunct;
pub mod extract;
pub mod fast_match;
pub mod linkage;
pub mod notation;
pub mod parse;
pub mod pool;
pub mod prune;
pub mod sentence;
pub mod tracon;
pub mod utils;
pub mod wordgraph;

pub use crate::count::Count;
pub use crate::linkage::{Link, Linkage, LinkageInfo};
pub use crate::parse::{classic_parse, NoPostProcessing, ParseOptions, ParseOutcome, PostProcessor};
pub use crate::sentence::Sentence;
pub use crate::utils::Err;
