//! Best-effort structured tracking events for trip creation/completion and
//! geocode queries.
//!
//! Grounded in the account/device expansion (§3): a lightweight event
//! consumed only by the log sink, never persisted separately, since "log
//! formatting" is out of scope but emitting the event is not.

use chrono::Utc;
use tracing::info;

/// Emit one tracking event. Never fails — a tracking event is not part of
/// any request's success/failure path.
pub fn emit(account_id: &str, region: &str, event: &str) {
    info!(
        target: "trasa::tracking",
        account_id = account_id,
        region = region,
        event = event,
        timestamp = %Utc::now(),
        "tracking event"
    );
}
