use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Size of an open-addressed table that will hold `entries` distinct keys,
/// leaving at least two thirds of the slots free. Never returns 0.
///
/// ```
/// assert_eq!(linkparse::utils::table_size(0), 1);
/// assert_eq!(linkparse::utils::table_size(1), 4);
/// assert_eq!(linkparse::utils::table_size(6), 32);
/// ```
pub fn table_size(entries: usize) -> usize {
  if entries == 0 {
    1
  } else {
    (3 * entries).next_power_of_two()
  }
}

/// "s" unless n == 1, for log and CLI messages
pub fn plural(n: impl Into<i64>) -> &'static str {
  if n.into() == 1 { "" } else { "s" }
}
