//! Bounded paging parameters.

use serde::Serialize;

/// Hard upper bound on rows returned by any list operation.
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// A clamped `(limit, offset)` pair.
///
/// The only constructor is [`Page::new`], so every value that reaches a store
/// is already within `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
  limit:  i64,
  offset: i64,
}

impl Page {
  pub fn new(limit: i64, offset: i64) -> Self {
    Self {
      limit:  limit.clamp(1, MAX_PAGE_LIMIT),
      offset: offset.max(0),
    }
  }

  /// Build a page from optional request parameters.
  pub fn from_params(
    limit: Option<i64>,
    offset: Option<i64>,
    default_limit: i64,
  ) -> Self {
    Self::new(limit.unwrap_or(default_limit), offset.unwrap_or(0))
  }

  pub fn limit(&self) -> i64 { self.limit }

  pub fn offset(&self) -> i64 { self.offset }
}

impl Default for Page {
  fn default() -> Self { Self::new(50, 0) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clamps_oversized_limit() {
    let page = Page::new(99_999, 0);
    assert_eq!(page.limit(), MAX_PAGE_LIMIT);
  }

  #[test]
  fn clamps_non_positive_limit_and_negative_offset() {
    let page = Page::new(0, -5);
    assert_eq!(page.limit(), 1);
    assert_eq!(page.offset(), 0);
    assert_eq!(Page::new(-10, 3).limit(), 1);
  }

  #[test]
  fn from_params_uses_default_limit() {
    let page = Page::from_params(None, Some(20), 25);
    assert_eq!(page.limit(), 25);
    assert_eq!(page.offset(), 20);
  }
}
