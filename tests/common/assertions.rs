//! Domain-specific assertion macros for logrelay harnesses.
//!
//! These wrap `pretty_assertions` and add failure messages that say which
//! part of the pipeline broke.

// ---------------------------------------------------------------------------
// Page assertions
// ---------------------------------------------------------------------------

/// Assert the timestamps of a page, in returned order.
///
/// ```rust
/// assert_stamps!(result, [4, 3]);
/// ```
#[macro_export]
macro_rules! assert_stamps {
    ($result:expr, [$($ts:expr),* $(,)?]) => {{
        let result: &logrelay_core::PageResult = &$result;
        let actual: Vec<i64> = result.data.iter().map(|r| r.timestamp()).collect();
        let expected: Vec<i64> = vec![$($ts),*];
        pretty_assertions::assert_eq!(
            actual, expected,
            "assert_stamps! failed for page {} (pageSize {})",
            result.page, result.page_size
        );
    }};
}

/// Assert the cursor of a page. `None` on either side is written `_`.
///
/// ```rust
/// assert_cursor!(result, 4, 3);
/// assert_cursor!(empty, _, _);
/// ```
#[macro_export]
macro_rules! assert_cursor {
    ($result:expr, _, _) => {{
        let result: &logrelay_core::PageResult = &$result;
        pretty_assertions::assert_eq!(
            result.cursor,
            logrelay_core::Cursor::default(),
            "assert_cursor! failed: empty page must have an empty cursor"
        );
    }};
    ($result:expr, $prev:expr, $next:expr) => {{
        let result: &logrelay_core::PageResult = &$result;
        pretty_assertions::assert_eq!(
            result.cursor,
            logrelay_core::Cursor { prev: Some($prev), next: Some($next) },
            "assert_cursor! failed"
        );
    }};
}

// ---------------------------------------------------------------------------
// Error assertions
// ---------------------------------------------------------------------------

/// Assert that a result is a validation error naming `field`.
///
/// ```rust
/// assert_validation_field!(cache.get_ordered_logs(&q, 0, 10).await, "page");
/// ```
#[macro_export]
macro_rules! assert_validation_field {
    ($result:expr, $field:expr) => {{
        match $result {
            Err(err) => match err.field() {
                Some(field) => pretty_assertions::assert_eq!(field, $field),
                None => panic!(
                    "assert_validation_field! failed: expected a validation error on {:?}, got {err}",
                    $field
                ),
            },
            Ok(_) => panic!(
                "assert_validation_field! failed: expected a validation error on {:?}, got Ok",
                $field
            ),
        }
    }};
}

// ---------------------------------------------------------------------------
// Ordering helpers
// ---------------------------------------------------------------------------

pub fn is_non_increasing(values: &[i64]) -> bool {
    values.windows(2).all(|w| w[0] >= w[1])
}

pub fn is_non_decreasing(values: &[i64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}
