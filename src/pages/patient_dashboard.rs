use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::MSG_REQUIRED;
use crate::backend::Principal;
use crate::error::AppError;
use crate::models::medication::parse_hours;
use crate::models::{Medication, MedicationInput, MedicationTake, Role};
use crate::navigation::Route;
use crate::services::{AuthService, MedicationService};

use super::{admit, LiveView, ViewState};

pub const MSG_ADDED: &str = "Médicament ajouté avec succès";
pub const MSG_ADD_FAILED: &str = "Impossible d'ajouter le médicament";
pub const MSG_DELETED: &str = "Médicament supprimé";
pub const MSG_DELETE_FAILED: &str = "Impossible de supprimer le médicament";
pub const MSG_LOAD_FAILED: &str = "Impossible de charger vos médicaments";

/// The add-medication form. Hours are typed as one comma-separated field.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MedicationForm {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub hours: String,
}

impl MedicationForm {
    fn into_input(self, patient_id: &str) -> Result<MedicationInput, AppError> {
        let hours = parse_hours(&self.hours);
        if self.name.trim().is_empty()
            || self.dosage.trim().is_empty()
            || self.frequency.trim().is_empty()
            || hours.is_empty()
        {
            return Err(AppError::Validation(MSG_REQUIRED.into()));
        }
        Ok(MedicationInput {
            patient_id: patient_id.to_string(),
            name: self.name,
            dosage: self.dosage,
            frequency: self.frequency,
            hours,
            start_date: None,
            end_date: None,
            notes: None,
            image_url: None,
        })
    }
}

/// Failures the user caused keep their own message; anything else gets the
/// page's generic one.
fn notice_for(err: &AppError, fallback: &str) -> String {
    match err {
        AppError::Validation(msg) => msg.clone(),
        _ => fallback.to_string(),
    }
}

pub struct PatientDashboard {
    auth: Arc<AuthService>,
    medications: Arc<MedicationService>,
    principal: Option<Principal>,
    user_name: String,
    list: LiveView<Vec<Medication>>,
    history: LiveView<Vec<MedicationTake>>,
    notice: ViewState<String>,
}

impl PatientDashboard {
    pub fn new(auth: Arc<AuthService>, medications: Arc<MedicationService>) -> Self {
        Self {
            auth,
            medications,
            principal: None,
            user_name: String::new(),
            list: LiveView::idle(),
            history: LiveView::idle(),
            notice: ViewState::Idle,
        }
    }

    /// Loads the signed-in patient and starts following their medications.
    /// Returns the route to show instead when nobody is signed in or the
    /// user is a caregiver.
    pub async fn open(&mut self) -> Option<Route> {
        let (principal, name) = match admit(&self.auth, Role::Patient).await {
            Ok(admitted) => admitted,
            Err(route) => return Some(route),
        };
        self.user_name = name;
        self.list
            .follow(self.medications.get_patient_medications(&principal.uid));
        self.principal = Some(principal);
        None
    }

    /// Starts following the dose history as well.
    pub fn open_history(&mut self) -> Result<(), AppError> {
        let uid = self.patient_id()?.to_string();
        self.history
            .follow(self.medications.get_patient_history(&uid));
        Ok(())
    }

    fn patient_id(&self) -> Result<&str, AppError> {
        self.principal
            .as_ref()
            .map(|p| p.uid.as_str())
            .ok_or_else(|| AppError::Unauthorized("Patient dashboard is not open".into()))
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn medications(&self) -> ViewState<Vec<Medication>> {
        match self.list.current() {
            ViewState::Failed(_) => ViewState::Failed(MSG_LOAD_FAILED.into()),
            state => state,
        }
    }

    pub fn medications_count(&self) -> usize {
        self.list.current().ready().map_or(0, Vec::len)
    }

    pub async fn settled_medications(&mut self) -> ViewState<Vec<Medication>> {
        self.list.settled().await;
        self.medications()
    }

    pub async fn next_medications(&mut self) -> ViewState<Vec<Medication>> {
        self.list.changed().await;
        self.medications()
    }

    pub async fn settled_history(&mut self) -> ViewState<Vec<MedicationTake>> {
        self.history.settled().await
    }

    pub fn notice(&self) -> &ViewState<String> {
        &self.notice
    }

    pub async fn add_medication(&mut self, form: MedicationForm) -> Result<String, AppError> {
        let input = form.into_input(self.patient_id()?);
        let result = match input {
            Ok(input) => {
                self.notice = ViewState::Loading;
                self.medications.add_medication(input).await
            }
            Err(err) => Err(err),
        };
        self.notice = match &result {
            Ok(_) => ViewState::Ready(MSG_ADDED.into()),
            Err(err) => ViewState::Failed(notice_for(err, MSG_ADD_FAILED)),
        };
        result
    }

    /// Deletes one of the patient's medications.
    pub async fn delete_medication(&mut self, id: &str) -> Result<(), AppError> {
        let uid = self.patient_id()?.to_string();
        let result = self.medications.delete_patient_medication(&uid, id).await;
        self.notice = match &result {
            Ok(()) => ViewState::Ready(MSG_DELETED.into()),
            Err(err) => ViewState::Failed(notice_for(err, MSG_DELETE_FAILED)),
        };
        result
    }

    /// Records a dose of one of the patient's medications as due.
    pub async fn record_dose(
        &mut self,
        medication_id: &str,
        scheduled_time: &str,
    ) -> Result<String, AppError> {
        let take = MedicationTake::pending(medication_id, self.patient_id()?, scheduled_time);
        self.medications.add_medication_take(take).await
    }

    pub async fn mark_taken(&mut self, take_id: &str) -> Result<MedicationTake, AppError> {
        let uid = self.patient_id()?.to_string();
        self.medications.mark_patient_dose_taken(&uid, take_id).await
    }

    /// Stops following live data.
    pub fn close(&mut self) {
        self.list.stop();
        self.history.stop();
    }

    pub async fn logout(&mut self) -> Result<Route, AppError> {
        self.close();
        self.auth.logout().await?;
        self.principal = None;
        Ok(Route::Login)
    }
}
