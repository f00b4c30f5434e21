use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A medication followed by a patient, stored under `medications/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    /// Store key. `None` until the record has been persisted; never written as a field.
    #[serde(skip)]
    pub id: Option<String>,
    pub patient_id: String,
    pub name: String,
    /// Free text, e.g. "500mg".
    pub dosage: String,
    /// Free text, e.g. "3 fois par jour".
    pub frequency: String,
    /// Scheduled times in the order the user typed them.
    #[serde(default)]
    pub hours: Vec<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::mapper::empty_as_none"
    )]
    pub notes: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::mapper::empty_as_none"
    )]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or overwriting a medication.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MedicationInput {
    #[validate(length(min = 1, message = "A patient is required"))]
    pub patient_id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub dosage: String,
    #[validate(length(min = 1, max = 100))]
    pub frequency: String,
    #[validate(custom = "validate_hours")]
    pub hours: Vec<String>,
    /// Defaults to the moment of creation.
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn validate_hours(hours: &[String]) -> Result<(), ValidationError> {
    if hours.is_empty() || hours.iter().any(|hour| hour.trim().is_empty()) {
        return Err(ValidationError::new("hours"));
    }
    Ok(())
}

/// Splits a comma-separated list of times as typed in a form: "08:00, 14:00".
pub fn parse_hours(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|hour| !hour.is_empty())
        .map(str::to_string)
        .collect()
}

impl Medication {
    /// Builds an unpersisted medication stamped with the current time.
    pub fn new(input: MedicationInput) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            patient_id: input.patient_id,
            name: input.name.trim().to_string(),
            dosage: input.dosage.trim().to_string(),
            frequency: input.frequency.trim().to_string(),
            hours: input.hours.iter().map(|h| h.trim().to_string()).collect(),
            start_date: input.start_date.unwrap_or(now),
            end_date: input.end_date,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            image_url: input.image_url.filter(|u| !u.trim().is_empty()),
            created_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Free-form medication note a caregiver keeps for a patient, stored under
/// `medicaments/{patientUid}/{key}`. The stored keys are French.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CaregiverMedication {
    #[serde(skip)]
    pub key: Option<String>,
    #[serde(rename = "nom")]
    pub name: String,
    pub dosage: String,
    #[serde(rename = "frequence")]
    pub frequency: String,
    /// Times as typed, possibly empty.
    #[serde(rename = "heures", default)]
    pub hours: String,
    #[serde(rename = "dateAjout")]
    pub added_at: DateTime<Utc>,
    #[serde(rename = "ajoutePar")]
    pub added_by: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaregiverMedicationInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub dosage: String,
    #[validate(length(min = 1, max = 100))]
    pub frequency: String,
    #[serde(default)]
    pub hours: String,
}

impl CaregiverMedication {
    pub fn new(input: CaregiverMedicationInput) -> Self {
        Self {
            key: None,
            name: input.name.trim().to_string(),
            dosage: input.dosage.trim().to_string(),
            frequency: input.frequency.trim().to_string(),
            hours: input.hours.trim().to_string(),
            added_at: Utc::now(),
            added_by: "aidant".to_string(),
        }
    }
}
