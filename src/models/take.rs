use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a scheduled dose stands.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TakeStatus {
    Pending,
    Taken,
    Missed,
}

impl TakeStatus {
    /// Only a pending dose may move, and only once.
    pub fn can_become(self, next: TakeStatus) -> bool {
        matches!(
            (self, next),
            (TakeStatus::Pending, TakeStatus::Taken) | (TakeStatus::Pending, TakeStatus::Missed)
        )
    }
}

impl fmt::Display for TakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TakeStatus::Pending => "pending",
            TakeStatus::Taken => "taken",
            TakeStatus::Missed => "missed",
        };
        f.write_str(s)
    }
}

/// One scheduled dose of a medication, stored under `medication-takes/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MedicationTake {
    #[serde(skip)]
    pub id: Option<String>,
    pub medication_id: String,
    pub patient_id: String,
    /// As entered, e.g. "08:00" or a full timestamp.
    pub scheduled_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_time: Option<DateTime<Utc>>,
    pub status: TakeStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::mapper::empty_as_none"
    )]
    pub notes: Option<String>,
}

impl MedicationTake {
    /// A dose that just became due.
    pub fn pending(medication_id: &str, patient_id: &str, scheduled_time: &str) -> Self {
        Self {
            id: None,
            medication_id: medication_id.to_string(),
            patient_id: patient_id.to_string(),
            scheduled_time: scheduled_time.to_string(),
            taken_time: None,
            status: TakeStatus::Pending,
            notes: None,
        }
    }

    /// `taken_time` is present exactly when the dose was taken.
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.status, self.taken_time.is_some()) {
            (TakeStatus::Taken, false) => Err("a taken dose needs a takenTime".into()),
            (TakeStatus::Pending | TakeStatus::Missed, true) => {
                Err(format!("a {} dose cannot have a takenTime", self.status))
            }
            _ => Ok(()),
        }
    }
}
