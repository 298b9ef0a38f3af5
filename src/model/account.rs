//! Account / device records.
//!
//! The distilled spec's Non-goals exclude "end-user account management
//! *beyond* authenticate-and-record-device" — device registration on first
//! authenticated contact is therefore in scope. Persisted in the same
//! key-value store as trips, under a separate key prefix (`accounts:<uid>`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device that has authenticated as a given account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub last_seen: DateTime<Utc>,
    pub idp: String,
}

/// An account, identified by the `uid` claim out of a bearer token, plus the
/// devices that have used it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    pub devices: Vec<DeviceRecord>,
}

impl Account {
    pub fn new(uid: impl Into<String>) -> Self {
        Account {
            uid: uid.into(),
            devices: Vec::new(),
        }
    }

    /// Record (or refresh) a device's last-seen timestamp. `device_id`
    /// identifies the device across sessions; a device that has never been
    /// seen before is appended.
    pub fn record_device(&mut self, device_id: impl Into<String>, idp: impl Into<String>) {
        let device_id = device_id.into();
        let idp = idp.into();
        if let Some(existing) = self.devices.iter_mut().find(|d| d.device_id == device_id) {
            existing.last_seen = Utc::now();
            existing.idp = idp;
        } else {
            self.devices.push(DeviceRecord {
                device_id,
                last_seen: Utc::now(),
                idp,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_the_same_device_twice_does_not_duplicate() {
        let mut account = Account::new("uid-1");
        account.record_device("device-a", "idp-1");
        account.record_device("device-a", "idp-1");
        assert_eq!(account.devices.len(), 1);
    }

    #[test]
    fn recording_a_new_device_appends() {
        let mut account = Account::new("uid-1");
        account.record_device("device-a", "idp-1");
        account.record_device("device-b", "idp-1");
        assert_eq!(account.devices.len(), 2);
    }
}
