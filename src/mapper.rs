//! Conversion between store snapshots and typed records.
//!
//! Decoding is strict: a payload missing a field, carrying an unknown role or
//! status, or breaking a record invariant yields a `DecodeError` naming the
//! offending path. The record id always comes from the snapshot key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::backend::Snapshot;
use crate::error::{AppError, DecodeError};
use crate::models::{CaregiverMedication, Medication, MedicationTake, User};

/// A record type stored as one child of a collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Takes the identity the store assigned to this record.
    fn attach_key(&mut self, key: &str) -> Result<(), String>;

    /// Invariants the payload must satisfy beyond its shape.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Record for User {
    fn attach_key(&mut self, key: &str) -> Result<(), String> {
        if self.uid != key {
            return Err(format!("uid '{}' does not match its key", self.uid));
        }
        Ok(())
    }
}

impl Record for Medication {
    fn attach_key(&mut self, key: &str) -> Result<(), String> {
        self.id = Some(key.to_string());
        Ok(())
    }
}

impl Record for MedicationTake {
    fn attach_key(&mut self, key: &str) -> Result<(), String> {
        self.id = Some(key.to_string());
        Ok(())
    }

    fn check(&self) -> Result<(), String> {
        self.check_invariants()
    }
}

impl Record for CaregiverMedication {
    fn attach_key(&mut self, key: &str) -> Result<(), String> {
        self.key = Some(key.to_string());
        Ok(())
    }
}

/// Decodes a single-record snapshot. An absent record is `Ok(None)`.
pub fn decode<T: Record>(snapshot: &Snapshot) -> Result<Option<T>, DecodeError> {
    let Some(value) = snapshot.value() else {
        return Ok(None);
    };
    let fail = |reason: String| DecodeError {
        path: snapshot.path().to_string(),
        reason,
    };
    let mut record: T = serde_json::from_value(value.clone()).map_err(|e| fail(e.to_string()))?;
    let key = snapshot
        .key()
        .ok_or_else(|| fail("record stored at the root".into()))?;
    record.attach_key(key).map_err(fail)?;
    record.check().map_err(fail)?;
    Ok(Some(record))
}

/// Decodes every child of a collection snapshot, in key order.
pub fn decode_list<T: Record>(snapshot: &Snapshot) -> Result<Vec<T>, DecodeError> {
    let mut records = Vec::new();
    for child in snapshot.children() {
        if let Some(record) = decode(&child)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Encodes a record as the JSON object stored in the backend.
pub fn encode<T: Record>(record: &T) -> Result<Value, AppError> {
    record.check().map_err(AppError::Validation)?;
    serde_json::to_value(record)
        .map_err(|e| AppError::InternalServerError(format!("Failed to encode record: {}", e)))
}

/// Encodes a record as a field map, for merge writes.
pub fn encode_fields<T: Record>(record: &T) -> Result<Map<String, Value>, AppError> {
    match encode(record)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(AppError::InternalServerError(
            "Record did not encode to an object".into(),
        )),
    }
}

/// Serde helper: optional strings stored as `""` read back as `None`.
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DbPath;
    use crate::models::{Role, TakeStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(path: &str, value: Value) -> Snapshot {
        Snapshot::new(DbPath::parse(path).unwrap(), Some(value))
    }

    #[test]
    fn test_decode_user_with_empty_optional_fields() {
        let snap = snapshot(
            "users/u1",
            json!({
                "uid": "u1",
                "email": "a@x.com",
                "name": "Alice",
                "role": "patient",
                "createdAt": "2024-03-01T08:00:00.000Z",
                "photoURL": "",
                "phoneNumber": ""
            }),
        );
        let user: User = decode(&snap).unwrap().unwrap();
        assert_eq!(user.role, Role::Patient);
        assert_eq!(user.photo_url, None);
        assert_eq!(user.phone_number, None);
    }

    #[test]
    fn test_decode_rejects_unknown_role() {
        let snap = snapshot(
            "users/u1",
            json!({
                "uid": "u1",
                "email": "a@x.com",
                "name": "Alice",
                "role": "doctor",
                "createdAt": "2024-03-01T08:00:00Z"
            }),
        );
        let err = decode::<User>(&snap).unwrap_err();
        assert_eq!(err.path, "/users/u1");
    }

    #[test]
    fn test_decode_medication_list_attaches_keys() {
        let snap = snapshot(
            "medications",
            json!({
                "-k2": {
                    "patientId": "p1", "name": "B", "dosage": "1", "frequency": "1",
                    "hours": ["09:00"], "startDate": "2024-03-01T08:00:00Z",
                    "createdAt": "2024-03-01T08:00:00Z"
                },
                "-k1": {
                    "patientId": "p1", "name": "A", "dosage": "1", "frequency": "1",
                    "hours": ["08:00"], "startDate": "2024-03-01T08:00:00Z",
                    "createdAt": "2024-03-01T08:00:00Z"
                }
            }),
        );
        let medications: Vec<Medication> = decode_list(&snap).unwrap();
        let ids: Vec<_> = medications.iter().map(|m| m.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["-k1", "-k2"]);
    }

    #[test]
    fn test_decode_list_fails_on_one_malformed_child() {
        let snap = snapshot(
            "medications",
            json!({ "-k1": { "patientId": "p1" } }),
        );
        let err = decode_list::<Medication>(&snap).unwrap_err();
        assert_eq!(err.path, "/medications/-k1");
    }

    #[test]
    fn test_decode_take_checks_invariant() {
        // What an overwrite with only {status, takenTime} used to leave behind.
        let partial = snapshot(
            "medication-takes/t1",
            json!({"status": "taken", "takenTime": "2024-03-01T08:05:00Z"}),
        );
        assert!(decode::<MedicationTake>(&partial).is_err());

        let inconsistent = snapshot(
            "medication-takes/t1",
            json!({
                "medicationId": "m1", "patientId": "p1", "scheduledTime": "08:00",
                "status": "taken"
            }),
        );
        assert!(decode::<MedicationTake>(&inconsistent).is_err());

        let valid = snapshot(
            "medication-takes/t1",
            json!({
                "medicationId": "m1", "patientId": "p1", "scheduledTime": "08:00",
                "status": "pending"
            }),
        );
        let take: MedicationTake = decode(&valid).unwrap().unwrap();
        assert_eq!(take.status, TakeStatus::Pending);
        assert_eq!(take.id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_absent_snapshot_is_none() {
        let snap = Snapshot::new(DbPath::parse("medications/nope").unwrap(), None);
        assert_eq!(decode::<Medication>(&snap).unwrap(), None);
    }

    #[test]
    fn test_encode_rejects_broken_invariant() {
        let mut take = MedicationTake::pending("m1", "p1", "08:00");
        take.status = TakeStatus::Taken;
        assert!(matches!(encode(&take), Err(AppError::Validation(_))));
    }
}
