use std::env;
use std::fs;
use std::process;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use linkparse::{Err, NoPostProcessing, ParseOptions, Sentence};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Reads a sentence in disjunct notation from FILE and prints its linkages.

Options:
  -h, --help          Print this message
  -n, --nulls N       Allow up to N null words (defaults to 0)
  -i, --islands       Allow disconnected islands
  -l, --limit N       Print at most N linkages (defaults to 100)
  -t, --timeout SECS  Give up after SECS seconds
  -r, --random        Don't repeat the same random sample on every run",
    prog_name
  )
}

fn parse(sent: &Sentence, opts: &ParseOptions) -> Result<(), Err> {
  let outcome = sent.parse_with(opts, &NoPostProcessing);

  if outcome.resources_exhausted {
    println!("Timeout, no linkages");
    return Ok(());
  }

  println!(
    "Found {} linkage{} ({} valid, {} null{}{})",
    outcome.num_linkages_found,
    linkparse::utils::plural(outcome.num_linkages_found),
    outcome.num_valid_linkages,
    outcome.null_count,
    linkparse::utils::plural(outcome.null_count),
    if outcome.sampled { ", random sample" } else { "" }
  );

  for (i, linkage) in outcome.linkages.iter().enumerate() {
    let words = linkage.words(sent).map(|(_, s)| s).collect::<Vec<_>>();
    println!("\nLinkage {}: {}", i + 1, words.join(" "));
    print!("{}", linkage);
  }

  Ok(())
}

struct Args {
  filename: String,
  opts: ParseOptions,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn number<T: std::str::FromStr>(
    flag: &str,
    value: Option<String>,
    prog_name: &str,
  ) -> Result<T, String> {
    value
      .and_then(|v| v.parse().ok())
      .ok_or_else(|| Self::make_error_message(&format!("{} needs a number", flag), prog_name))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "linkparse"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap_or_default();

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut filename: Option<String> = None;
    let mut opts = ParseOptions::default();

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-n" || o == "--nulls" {
        opts.max_null_count = Self::number(&o, iter.next(), &prog_name)?;
      } else if o == "-i" || o == "--islands" {
        opts.islands_ok = true;
      } else if o == "-l" || o == "--limit" {
        opts.linkage_limit = Self::number(&o, iter.next(), &prog_name)?;
      } else if o == "-t" || o == "--timeout" {
        let secs: f64 = Self::number(&o, iter.next(), &prog_name)?;
        opts.max_parse_time = Some(Duration::from_secs_f64(secs.max(0.0)));
      } else if o == "-r" || o == "--random" {
        opts.repeatable_rand = false;
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self { filename, opts })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let args = match Args::parse(env::args().collect()) {
    Ok(args) => args,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let src = fs::read_to_string(&args.filename)?;
  let sent: Sentence = src.parse()?;
  println!("{}", sent);
  parse(&sent, &args.opts)
}
