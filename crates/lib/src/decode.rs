//! Failure policy for best-effort decoding.
//!
//! Some inputs are allowed to be malformed depending on who produced them and
//! which contract version they were written against. Callers pass one of
//! these policies into the decode call instead of re-deriving the behavior
//! from version comparisons at each call site.

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy {
  /// Drop the problem silently and continue with defaults.
  Ignore,
  /// Log the problem as a warning and continue with defaults.
  Warn,
  /// Turn the problem into a hard error.
  Fail,
}

impl DecodePolicy {
  /// Apply the policy to a decode problem.
  ///
  /// Returns `Err(message)` only for [`DecodePolicy::Fail`].
  pub fn apply(self, message: String) -> Result<(), String> {
    match self {
      DecodePolicy::Ignore => {
        debug!(message = %message, "ignoring decode problem");
        Ok(())
      }
      DecodePolicy::Warn => {
        warn!("{}", message);
        Ok(())
      }
      DecodePolicy::Fail => Err(message),
    }
  }
}
