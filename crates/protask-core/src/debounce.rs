use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Holds back search text until typing pauses for `window`.
///
/// Every push restarts the timer; only the latest text is ever released.
#[derive(Debug)]
pub struct SearchDebouncer {
  window: Duration,
  pending: Option<String>,
  deadline: Option<Instant>,
}

impl Default for SearchDebouncer {
  fn default() -> Self {
    Self::new(DEFAULT_SEARCH_DEBOUNCE)
  }
}

impl SearchDebouncer {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      pending: None,
      deadline: None,
    }
  }

  pub fn push(
    &mut self,
    text: impl Into<String>,
    now: Instant,
  ) {
    self.pending = Some(text.into());
    self.deadline = Some(now + self.window);
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Releases the pending text once its deadline has passed.
  pub fn poll(
    &mut self,
    now: Instant,
  ) -> Option<String> {
    match self.deadline {
      | Some(deadline) if now >= deadline => {
        self.deadline = None;
        self.pending.take()
      }
      | _ => None,
    }
  }
}
