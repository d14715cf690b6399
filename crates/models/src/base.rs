//! Identity and timestamp rules shared by every persisted type.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

/// Fresh globally unique identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time truncated to microseconds, the finest precision every backend keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated_at` for an entity: the current time, but always strictly
/// after both `created_at` and the previous `updated_at`.
pub fn next_update(created_at: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous.max(created_at);
    let now = now();
    if now > floor {
        now
    } else {
        floor + Duration::microseconds(1)
    }
}
