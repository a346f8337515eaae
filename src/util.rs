// cansocket/src/util.rs
//
// Timeout budget helpers for the blocking waits.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

use std::time::Duration;

/// Converts a timeout in milliseconds, where any negative value means
/// "wait forever", into an optional duration.
pub fn timeout_from_msecs(msecs: i64) -> Option<Duration> {
    u64::try_from(msecs).ok().map(Duration::from_millis)
}

/// Gets what is left of a timeout budget after `elapsed`.
/// A budget of `None` never runs out.
#[inline]
pub fn remaining_timeout(timeout: Option<Duration>, elapsed: Duration) -> Option<Duration> {
    timeout.map(|t| t.saturating_sub(elapsed))
}

/// Whether a timeout budget is used up.
#[inline]
pub fn timed_out(timeout: Option<Duration>, elapsed: Duration) -> bool {
    matches!(remaining_timeout(timeout, elapsed), Some(t) if t.is_zero())
}

/////////////////////////////////////////////////////////////////////////////
