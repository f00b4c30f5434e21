use std::sync::Arc;

use crate::auth::MSG_REQUIRED;
use crate::error::AppError;
use crate::models::{CaregiverMedication, CaregiverMedicationInput, Role, User};
use crate::navigation::Route;
use crate::services::{AuthService, MedicationService};

use super::{admit, LiveView, ViewState};

pub const MSG_NOTE_ADDED: &str = "Médicament ajouté avec succès !";
pub const MSG_NOTE_ADD_FAILED: &str = "Erreur lors de l'ajout";
pub const MSG_NOTE_REMOVED: &str = "Médicament supprimé";

/// One patient as seen by a caregiver, with the notes kept for them.
pub struct PatientDetails {
    auth: Arc<AuthService>,
    medications: Arc<MedicationService>,
    patient_uid: String,
    patient: LiveView<Option<User>>,
    notes: LiveView<Vec<CaregiverMedication>>,
    notice: ViewState<String>,
}

impl PatientDetails {
    pub fn new(
        auth: Arc<AuthService>,
        medications: Arc<MedicationService>,
        patient_uid: &str,
    ) -> Self {
        Self {
            auth,
            medications,
            patient_uid: patient_uid.to_string(),
            patient: LiveView::idle(),
            notes: LiveView::idle(),
            notice: ViewState::Idle,
        }
    }

    pub async fn open(&mut self) -> Option<Route> {
        if let Err(route) = admit(&self.auth, Role::Aidant).await {
            return Some(route);
        }
        if self.patient_uid.is_empty() {
            return Some(Route::AidantDashboard);
        }
        self.patient.follow(self.auth.watch_user(&self.patient_uid));
        self.notes
            .follow(self.medications.caregiver_medications(&self.patient_uid));
        None
    }

    pub fn patient_uid(&self) -> &str {
        &self.patient_uid
    }

    pub fn patient(&self) -> ViewState<Option<User>> {
        self.patient.current()
    }

    pub async fn settled_patient(&mut self) -> ViewState<Option<User>> {
        self.patient.settled().await
    }

    pub fn notes(&self) -> ViewState<Vec<CaregiverMedication>> {
        self.notes.current()
    }

    pub async fn settled_notes(&mut self) -> ViewState<Vec<CaregiverMedication>> {
        self.notes.settled().await
    }

    pub async fn next_notes(&mut self) -> ViewState<Vec<CaregiverMedication>> {
        self.notes.changed().await
    }

    pub fn notice(&self) -> &ViewState<String> {
        &self.notice
    }

    /// Name, dosage and frequency are required; hours may stay empty.
    pub async fn add_note(&mut self, input: CaregiverMedicationInput) -> Result<String, AppError> {
        let result = if input.name.trim().is_empty()
            || input.dosage.trim().is_empty()
            || input.frequency.trim().is_empty()
        {
            Err(AppError::Validation(MSG_REQUIRED.into()))
        } else {
            self.medications
                .add_caregiver_medication(&self.patient_uid, input)
                .await
        };
        self.notice = match &result {
            Ok(_) => ViewState::Ready(MSG_NOTE_ADDED.into()),
            Err(AppError::Validation(msg)) => ViewState::Failed(msg.clone()),
            Err(_) => ViewState::Failed(MSG_NOTE_ADD_FAILED.into()),
        };
        result
    }

    pub async fn remove_note(&mut self, key: &str) -> Result<(), AppError> {
        let result = self
            .medications
            .remove_caregiver_medication(&self.patient_uid, key)
            .await;
        self.notice = ViewState::from_result(result.clone().map(|()| MSG_NOTE_REMOVED.to_string()));
        result
    }

    pub fn close(&mut self) {
        self.patient.stop();
        self.notes.stop();
    }

    pub fn go_back(&mut self) -> Route {
        self.close();
        Route::AidantDashboard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalIdentityProvider, MemoryStore};
    use crate::session::SessionStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        auth: Arc<AuthService>,
        medications: Arc<MedicationService>,
        patient_uid: String,
    }

    async fn caregiver_with_patient() -> Fixture {
        let identity = Arc::new(LocalIdentityProvider::new("test_secret", 1, 4));
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(SessionStore::new(identity.as_ref()));
        let auth = Arc::new(AuthService::new(identity, store.clone(), session));
        let patient = auth
            .register("p@x.com", "secret1", "Paul", Role::Patient)
            .await
            .unwrap();
        auth.logout().await.unwrap();
        auth.register("c@x.com", "secret1", "Claire", Role::Aidant)
            .await
            .unwrap();
        Fixture {
            auth,
            medications: Arc::new(MedicationService::new(store)),
            patient_uid: patient.uid,
        }
    }

    fn note(name: &str) -> CaregiverMedicationInput {
        CaregiverMedicationInput {
            name: name.into(),
            dosage: "1g".into(),
            frequency: "3x/jour".into(),
            hours: String::new(),
        }
    }

    #[tokio::test]
    async fn test_patient_info_and_notes() {
        let f = caregiver_with_patient().await;
        let mut page = PatientDetails::new(f.auth, f.medications, &f.patient_uid);
        assert_eq!(page.open().await, None);

        let patient = page.settled_patient().await;
        assert_eq!(patient.ready().cloned().flatten().unwrap().name, "Paul");
        assert_eq!(page.settled_notes().await, ViewState::Ready(vec![]));

        let key = page.add_note(note("Doliprane")).await.unwrap();
        assert_eq!(page.notice(), &ViewState::Ready(MSG_NOTE_ADDED.to_string()));
        let mut notes = page.notes();
        while notes.ready().map_or(true, Vec::is_empty) {
            notes = page.next_notes().await;
        }
        let stored = notes.ready().unwrap();
        assert_eq!(stored[0].key.as_deref(), Some(key.as_str()));
        assert_eq!(stored[0].added_by, "aidant");

        page.remove_note(&key).await.unwrap();
        while notes.ready().map_or(true, |n| !n.is_empty()) {
            notes = page.next_notes().await;
        }
        assert_eq!(page.go_back(), Route::AidantDashboard);
    }

    #[tokio::test]
    async fn test_note_requires_name() {
        let f = caregiver_with_patient().await;
        let mut page = PatientDetails::new(f.auth, f.medications, &f.patient_uid);
        page.open().await;
        assert!(page.add_note(note(" ")).await.is_err());
        assert_eq!(page.notice(), &ViewState::Failed(MSG_REQUIRED.to_string()));
    }

    #[tokio::test]
    async fn test_unknown_patient_shows_nothing() {
        let f = caregiver_with_patient().await;
        let mut page = PatientDetails::new(f.auth, f.medications, "nobody");
        page.open().await;
        assert_eq!(page.settled_patient().await, ViewState::Ready(None));
    }
}
