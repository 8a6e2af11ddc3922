use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  score::{performance_window, VendorScoreSnapshot},
  store::HoldStore,
};

use crate::Engine;

impl<S, D> Engine<S, D>
where
  S: HoldStore,
  D: Dispatcher,
{
  /// Score `vendor_id` over the trailing 30-day window ending at `now`.
  ///
  /// Never fails. An unknown vendor or an unreadable store yields the
  /// base-only snapshot so enrollment is not blocked by a scoring outage.
  pub async fn compute_score(&self, vendor_id: Uuid, now: DateTime<Utc>) -> VendorScoreSnapshot {
    let (since, until) = performance_window(now);
    match self.store.vendor_activity(vendor_id, since, until).await {
      Ok(Some(activity)) => VendorScoreSnapshot::from_activity(&activity, now),
      Ok(None) => {
        debug!(%vendor_id, "vendor unknown to store; using base score");
        VendorScoreSnapshot::default()
      }
      Err(e) => {
        warn!(%vendor_id, error = %e, "scoring data unavailable; using base score");
        VendorScoreSnapshot::default()
      }
    }
  }
}
