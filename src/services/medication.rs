//! Medications, scheduled doses and caregiver notes.
//!
//! Every read is a live query: each emission is the complete current result
//! and replaces whatever the consumer held before. Nothing is cached here;
//! each call opens its own subscription against the record store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use log::{debug, error, info};
use serde_json::{json, Value};
use validator::Validate;

use crate::backend::{DbPath, Query, RecordStore, Snapshot, StoreError};
use crate::error::AppError;
use crate::mapper::{self, Record};
use crate::models::{
    CaregiverMedication, CaregiverMedicationInput, Medication, MedicationInput, MedicationTake,
    Role, TakeStatus, User,
};

const MEDICATIONS: &str = "medications";
const TAKES: &str = "medication-takes";
const CAREGIVER_NOTES: &str = "medicaments";
const USERS: &str = "users";

pub type LiveList<T> = BoxStream<'static, Result<Vec<T>, AppError>>;
pub type LiveRecord<T> = BoxStream<'static, Result<Option<T>, AppError>>;

pub struct MedicationService {
    store: Arc<dyn RecordStore>,
}

fn collection(name: &str) -> Result<DbPath, AppError> {
    Ok(DbPath::parse(name)?)
}

/// Path of one record. Ids that cannot be a store key cannot exist either.
fn record(name: &str, id: &str) -> Result<DbPath, AppError> {
    collection(name)?
        .child(id)
        .map_err(|_| AppError::NotFound(format!("No record '{}' in {}", id, name)))
}

fn failed<T: Send + 'static>(err: AppError) -> BoxStream<'static, Result<T, AppError>> {
    futures::stream::once(async move { Err(err) }).boxed()
}

fn persistence(action: &str) -> impl Fn(StoreError) -> AppError + '_ {
    move |err| {
        error!("{} failed: {}", action, err);
        AppError::from(err)
    }
}

/// Decides a status change against the stored dose. Returns the dose as it
/// ends up and, when it changes, the value to store in its place.
fn next_dose(
    path: &DbPath,
    current: Option<&Value>,
    next: TakeStatus,
    owner: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(MedicationTake, Option<Value>), AppError> {
    let missing = || AppError::NotFound(format!("No dose '{}'", path.key().unwrap_or_default()));
    let mut take: MedicationTake =
        mapper::decode(&Snapshot::new(path.clone(), current.cloned()))?.ok_or_else(missing)?;
    if owner.map_or(false, |uid| take.patient_id != uid) {
        return Err(missing());
    }

    if take.status == next {
        return Ok((take, None));
    }
    if !take.status.can_become(next) {
        return Err(AppError::Validation(format!(
            "A {} dose cannot be marked {}",
            take.status, next
        )));
    }

    // Merge into the stored fields so anything else on the dose survives.
    let Some(Value::Object(mut fields)) = current.cloned() else {
        return Err(missing());
    };
    fields.insert("status".into(), json!(next));
    if next == TakeStatus::Taken {
        fields.insert("takenTime".into(), json!(now));
        take.taken_time = Some(now);
    } else {
        fields.remove("takenTime");
        take.taken_time = None;
    }
    take.status = next;
    Ok((take, Some(Value::Object(fields))))
}

impl MedicationService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn live_list<T: Record + Send + 'static>(&self, path: DbPath, query: Option<Query>) -> LiveList<T> {
        self.store
            .watch(&path, query)
            .map(|snapshot| -> Result<Vec<T>, AppError> {
                let snapshot = snapshot?;
                let records = mapper::decode_list(&snapshot)?;
                debug!("{} now holds {} records", snapshot.path(), records.len());
                Ok(records)
            })
            .boxed()
    }

    fn live_record<T: Record + Send + 'static>(&self, path: DbPath) -> LiveRecord<T> {
        self.store
            .watch(&path, None)
            .map(|snapshot| -> Result<Option<T>, AppError> { Ok(mapper::decode(&snapshot?)?) })
            .boxed()
    }

    /// The `patientId` of a medication must name an existing patient.
    async fn ensure_patient(&self, patient_id: &str) -> Result<(), AppError> {
        let not_a_patient =
            || AppError::Validation(format!("'{}' is not a registered patient", patient_id));
        let path = record(USERS, patient_id).map_err(|_| not_a_patient())?;
        let user: Option<User> = mapper::decode(&self.store.get(&path).await?)?;
        match user {
            Some(user) if user.role == Role::Patient => Ok(()),
            _ => Err(not_a_patient()),
        }
    }

    /// Stores a new medication under a generated key and returns the key.
    pub async fn add_medication(&self, input: MedicationInput) -> Result<String, AppError> {
        input.validate()?;
        self.ensure_patient(&input.patient_id).await?;

        let medication = Medication::new(input);
        let path = self.store.push(&collection(MEDICATIONS)?);
        let value = mapper::encode(&medication)?;
        self.store
            .set(&path, value)
            .await
            .map_err(persistence("adding medication"))?;

        let id = path.key().unwrap_or_default().to_string();
        info!("medication {} added for {}", id, medication.patient_id);
        Ok(id)
    }

    /// Overwrites a medication, keeping its original creation time.
    pub async fn update_medication(
        &self,
        id: &str,
        input: MedicationInput,
    ) -> Result<Medication, AppError> {
        input.validate()?;
        let path = record(MEDICATIONS, id)?;
        let existing: Medication = mapper::decode(&self.store.get(&path).await?)?
            .ok_or_else(|| AppError::NotFound(format!("No medication '{}'", id)))?;
        if existing.patient_id != input.patient_id {
            self.ensure_patient(&input.patient_id).await?;
        }

        let mut medication = Medication::new(input);
        medication.created_at = existing.created_at;
        self.store
            .set(&path, mapper::encode(&medication)?)
            .await
            .map_err(persistence("updating medication"))?;
        medication.id = Some(id.to_string());
        Ok(medication)
    }

    /// Live list of a patient's medications, in creation order.
    pub fn get_patient_medications(&self, patient_id: &str) -> LiveList<Medication> {
        match collection(MEDICATIONS) {
            Ok(path) => self.live_list(
                path,
                Some(Query::order_by_child("patientId").equal_to(patient_id)),
            ),
            Err(err) => failed(err),
        }
    }

    /// Live view of one medication; `None` once it is deleted.
    pub fn get_medication_by_id(&self, id: &str) -> LiveRecord<Medication> {
        match DbPath::parse(MEDICATIONS).and_then(|p| p.child(id)) {
            Ok(path) => self.live_record(path),
            // An id that can never be stored is simply absent.
            Err(_) => futures::stream::once(async { Ok(None) }).boxed(),
        }
    }

    /// Deletes a medication. Deleting an absent id succeeds without effect.
    pub async fn delete_medication(&self, id: &str) -> Result<(), AppError> {
        let Ok(path) = record(MEDICATIONS, id) else {
            return Ok(());
        };
        self.store
            .remove(&path)
            .await
            .map_err(persistence("deleting medication"))?;
        info!("medication {} deleted", id);
        Ok(())
    }

    /// Deletes one of `patient_id`'s own medications. Another patient's
    /// medication is reported as not found and left in place.
    pub async fn delete_patient_medication(&self, patient_id: &str, id: &str) -> Result<(), AppError> {
        let Ok(path) = record(MEDICATIONS, id) else {
            return Ok(());
        };
        let mut foreign = false;
        let mut apply = |current: Option<&Value>| -> Option<Value> {
            let owner = current.map(|value| value.get("patientId").and_then(Value::as_str));
            foreign = matches!(owner, Some(owner) if owner != Some(patient_id));
            match owner {
                Some(_) if !foreign => Some(Value::Null),
                _ => None,
            }
        };
        self.store
            .transaction(&path, &mut apply)
            .await
            .map_err(persistence("deleting medication"))?;
        if foreign {
            return Err(AppError::NotFound(format!("No record '{}' in {}", id, MEDICATIONS)));
        }
        info!("medication {} of {} deleted", id, patient_id);
        Ok(())
    }

    /// Stores a scheduled dose and returns its key.
    pub async fn add_medication_take(&self, take: MedicationTake) -> Result<String, AppError> {
        if take.medication_id.trim().is_empty() || take.patient_id.trim().is_empty() {
            return Err(AppError::Validation(
                "A dose needs a medication and a patient".into(),
            ));
        }
        let value = mapper::encode(&take)?;
        let path = self.store.push(&collection(TAKES)?);
        self.store
            .set(&path, value)
            .await
            .map_err(persistence("adding dose"))?;
        Ok(path.key().unwrap_or_default().to_string())
    }

    /// Moves a dose to `next` in one store transaction. With `owner`, a dose
    /// of another patient is reported as not found and left untouched.
    async fn transition(
        &self,
        take_id: &str,
        next: TakeStatus,
        owner: Option<&str>,
    ) -> Result<MedicationTake, AppError> {
        let path = record(TAKES, take_id)?;
        let now = Utc::now();
        let mut outcome = None;
        let mut apply = |current: Option<&Value>| -> Option<Value> {
            match next_dose(&path, current, next, owner, now) {
                Ok((take, write)) => {
                    outcome = Some(Ok(take));
                    write
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    None
                }
            }
        };
        self.store
            .transaction(&path, &mut apply)
            .await
            .map_err(persistence("recording dose"))?;
        outcome.unwrap_or_else(|| Err(AppError::NotFound(format!("No dose '{}'", take_id))))
    }

    /// Records a pending dose as taken now. Merges `status` and `takenTime`
    /// into the stored dose; a dose already taken is left as it is.
    pub async fn mark_as_taken(&self, take_id: &str) -> Result<MedicationTake, AppError> {
        self.transition(take_id, TakeStatus::Taken, None).await
    }

    pub async fn mark_as_missed(&self, take_id: &str) -> Result<MedicationTake, AppError> {
        self.transition(take_id, TakeStatus::Missed, None).await
    }

    /// `mark_as_taken` for one of `patient_id`'s own doses.
    pub async fn mark_patient_dose_taken(
        &self,
        patient_id: &str,
        take_id: &str,
    ) -> Result<MedicationTake, AppError> {
        self.transition(take_id, TakeStatus::Taken, Some(patient_id))
            .await
    }

    /// Live list of every dose recorded for a patient.
    pub fn get_patient_history(&self, patient_id: &str) -> LiveList<MedicationTake> {
        match collection(TAKES) {
            Ok(path) => self.live_list(
                path,
                Some(Query::order_by_child("patientId").equal_to(patient_id)),
            ),
            Err(err) => failed(err),
        }
    }

    /// Live list of the notes caregivers keep for a patient.
    pub fn caregiver_medications(&self, patient_uid: &str) -> LiveList<CaregiverMedication> {
        match record(CAREGIVER_NOTES, patient_uid) {
            Ok(path) => self.live_list(path, None),
            Err(err) => failed(err),
        }
    }

    pub async fn add_caregiver_medication(
        &self,
        patient_uid: &str,
        input: CaregiverMedicationInput,
    ) -> Result<String, AppError> {
        input.validate()?;
        let parent = record(CAREGIVER_NOTES, patient_uid)?;
        let note = CaregiverMedication::new(input);
        let path = self.store.push(&parent);
        self.store
            .set(&path, mapper::encode(&note)?)
            .await
            .map_err(persistence("adding caregiver note"))?;
        Ok(path.key().unwrap_or_default().to_string())
    }

    pub async fn remove_caregiver_medication(
        &self,
        patient_uid: &str,
        key: &str,
    ) -> Result<(), AppError> {
        let path = match record(CAREGIVER_NOTES, patient_uid).map(|parent| parent.child(key)) {
            Ok(Ok(path)) => path,
            // A key that cannot be stored cannot be there to remove.
            _ => return Ok(()),
        };
        self.store
            .remove(&path)
            .await
            .map_err(persistence("removing caregiver note"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn service_with_patient() -> (MedicationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (uid, role) in [("p1", Role::Patient), ("p2", Role::Patient), ("c1", Role::Aidant)] {
            let user = User::new(uid, &format!("{}@x.com", uid), uid, role);
            store
                .set(
                    &DbPath::parse(&format!("users/{}", uid)).unwrap(),
                    mapper::encode(&user).unwrap(),
                )
                .await
                .unwrap();
        }
        (MedicationService::new(store.clone()), store)
    }

    fn aspirin(patient_id: &str) -> MedicationInput {
        MedicationInput {
            patient_id: patient_id.into(),
            name: "Aspirin".into(),
            dosage: "500mg".into(),
            frequency: "2x/day".into(),
            hours: vec!["08:00".into(), "20:00".into()],
            start_date: None,
            end_date: None,
            notes: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_added_medication_appears_in_live_list() {
        let (service, _) = service_with_patient().await;
        let id = service.add_medication(aspirin("p1")).await.unwrap();

        let mut live = service.get_patient_medications("p1");
        let list = live.next().await.unwrap().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(list[0].name, "Aspirin");
        assert_eq!(list[0].hours, vec!["08:00", "20:00"]);

        // Re-subscribing yields the same result.
        let mut again = service.get_patient_medications("p1");
        assert_eq!(again.next().await.unwrap().unwrap(), list);
    }

    #[tokio::test]
    async fn test_live_list_holds_only_that_patients_medications() {
        let (service, _) = service_with_patient().await;
        let mine = service.add_medication(aspirin("p1")).await.unwrap();
        let mut other = aspirin("p2");
        other.name = "Ibuprofen".into();
        let theirs = service.add_medication(other).await.unwrap();

        let first = service.get_patient_medications("p1").next().await.unwrap().unwrap();
        let ids: Vec<_> = first.iter().map(|m| m.id.clone().unwrap()).collect();
        assert_eq!(ids, vec![mine.clone()]);

        let second = service.get_patient_medications("p2").next().await.unwrap().unwrap();
        let ids: Vec<_> = second.iter().map(|m| m.id.clone().unwrap()).collect();
        assert_eq!(ids, vec![theirs]);
        assert_eq!(second[0].name, "Ibuprofen");

        let mut live = service.get_patient_medications("p1");
        live.next().await.unwrap().unwrap();
        service.delete_medication(&mine).await.unwrap();
        assert!(live.next().await.unwrap().unwrap().is_empty());
        let second = service.get_patient_medications("p2").next().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_patient_invariant_on_add() {
        let (service, _) = service_with_patient().await;
        assert!(matches!(
            service.add_medication(aspirin("c1")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.add_medication(aspirin("nobody")).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_and_live_record() {
        let (service, _) = service_with_patient().await;
        let id = service.add_medication(aspirin("p1")).await.unwrap();

        let mut one = service.get_medication_by_id(&id);
        assert!(one.next().await.unwrap().unwrap().is_some());

        service.delete_medication(&id).await.unwrap();
        assert_eq!(one.next().await.unwrap().unwrap(), None);

        // Deleting again is a no-op.
        service.delete_medication(&id).await.unwrap();
        let mut list = service.get_patient_medications("p1");
        assert!(list.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unstorable_ids_delete_as_no_op() {
        let (service, _) = service_with_patient().await;
        service.delete_medication("a.b").await.unwrap();
        service.delete_patient_medication("p1", "a.b").await.unwrap();
        service.remove_caregiver_medication("p1", "a.b").await.unwrap();
        service.remove_caregiver_medication("a.b", "k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_patient_scoped_calls_leave_other_patients_alone() {
        let (service, _) = service_with_patient().await;
        let theirs = service.add_medication(aspirin("p2")).await.unwrap();
        let take_id = service
            .add_medication_take(MedicationTake::pending(&theirs, "p2", "08:00"))
            .await
            .unwrap();

        assert!(matches!(
            service.mark_patient_dose_taken("p1", &take_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_patient_medication("p1", &theirs).await,
            Err(AppError::NotFound(_))
        ));

        let takes = service.get_patient_history("p2").next().await.unwrap().unwrap();
        assert_eq!(takes[0].status, TakeStatus::Pending);
        assert_eq!(takes[0].taken_time, None);
        let medication = service.get_medication_by_id(&theirs).next().await.unwrap().unwrap();
        assert!(medication.is_some());

        // The owner can still do both.
        let taken = service.mark_patient_dose_taken("p2", &take_id).await.unwrap();
        assert_eq!(taken.status, TakeStatus::Taken);
        service.delete_patient_medication("p2", &theirs).await.unwrap();
        let medication = service.get_medication_by_id(&theirs).next().await.unwrap().unwrap();
        assert_eq!(medication, None);
        service.delete_patient_medication("p2", &theirs).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_changes_keep_dose_consistent() {
        let (service, store) = service_with_patient().await;
        let service = Arc::new(service);

        for _ in 0..10 {
            let take_id = service
                .add_medication_take(MedicationTake::pending("m1", "p1", "08:00"))
                .await
                .unwrap();
            let missed = tokio::spawn({
                let service = service.clone();
                let take_id = take_id.clone();
                async move { service.mark_as_missed(&take_id).await }
            });
            let taken = tokio::spawn({
                let service = service.clone();
                let take_id = take_id.clone();
                async move { service.mark_as_taken(&take_id).await }
            });
            let (missed, taken) = (missed.await.unwrap(), taken.await.unwrap());

            let winner = match (missed, taken) {
                (Ok(take), Err(AppError::Validation(_))) | (Err(AppError::Validation(_)), Ok(take)) => {
                    take
                }
                other => panic!("expected exactly one status change, got {:?}", other),
            };
            let path = DbPath::parse(TAKES).unwrap().child(&take_id).unwrap();
            let stored: MedicationTake = mapper::decode(&store.get(&path).await.unwrap())
                .unwrap()
                .unwrap();
            assert_eq!(stored.status, winner.status);
            assert_eq!(stored.taken_time.is_some(), winner.status == TakeStatus::Taken);
        }

        let history = service.get_patient_history("p1").next().await.unwrap().unwrap();
        assert_eq!(history.len(), 10);
        assert!(history.iter().all(|take| take.status != TakeStatus::Pending));
    }

    #[tokio::test]
    async fn test_delete_rejected_by_store() {
        let (service, store) = service_with_patient().await;
        let id = service.add_medication(aspirin("p1")).await.unwrap();
        store.deny_writes(&DbPath::parse("medications").unwrap());
        assert!(matches!(
            service.delete_medication(&id).await,
            Err(AppError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_creation_time() {
        let (service, _) = service_with_patient().await;
        let id = service.add_medication(aspirin("p1")).await.unwrap();
        let mut live = service.get_medication_by_id(&id);
        let original = live.next().await.unwrap().unwrap().unwrap();

        let mut input = aspirin("p1");
        input.dosage = "1g".into();
        let updated = service.update_medication(&id, input).await.unwrap();
        assert_eq!(updated.created_at, original.created_at);

        let stored = live.next().await.unwrap().unwrap().unwrap();
        assert_eq!(stored.dosage, "1g");

        assert!(matches!(
            service.update_medication("missing", aspirin("p1")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_as_taken_merges_and_is_idempotent() {
        let (service, _) = service_with_patient().await;
        let take_id = service
            .add_medication_take(MedicationTake::pending("m1", "p1", "08:00"))
            .await
            .unwrap();

        let taken = service.mark_as_taken(&take_id).await.unwrap();
        assert_eq!(taken.status, TakeStatus::Taken);
        let first_time = taken.taken_time.unwrap();

        let again = service.mark_as_taken(&take_id).await.unwrap();
        assert_eq!(again.taken_time, Some(first_time));

        let mut history = service.get_patient_history("p1");
        let takes = history.next().await.unwrap().unwrap();
        assert_eq!(takes.len(), 1);
        // The merge keeps the fields the dose was created with.
        assert_eq!(takes[0].medication_id, "m1");
        assert_eq!(takes[0].scheduled_time, "08:00");
        assert_eq!(takes[0].status, TakeStatus::Taken);
        assert_eq!(takes[0].taken_time, Some(first_time));

        assert!(matches!(
            service.mark_as_missed(&take_id).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missed_dose_cannot_be_taken() {
        let (service, _) = service_with_patient().await;
        let take_id = service
            .add_medication_take(MedicationTake::pending("m1", "p1", "20:00"))
            .await
            .unwrap();
        service.mark_as_missed(&take_id).await.unwrap();
        assert!(matches!(
            service.mark_as_taken(&take_id).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.mark_as_taken("unknown").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_caregiver_notes() {
        let (service, _) = service_with_patient().await;
        let mut notes = service.caregiver_medications("p1");
        assert!(notes.next().await.unwrap().unwrap().is_empty());

        let key = service
            .add_caregiver_medication(
                "p1",
                CaregiverMedicationInput {
                    name: "Doliprane".into(),
                    dosage: "1g".into(),
                    frequency: "3x/jour".into(),
                    hours: "08:00, 14:00".into(),
                },
            )
            .await
            .unwrap();
        let list = notes.next().await.unwrap().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].key.as_deref(), Some(key.as_str()));
        assert_eq!(list[0].added_by, "aidant");

        service.remove_caregiver_medication("p1", &key).await.unwrap();
        assert!(notes.next().await.unwrap().unwrap().is_empty());
    }
}
