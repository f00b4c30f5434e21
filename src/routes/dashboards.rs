use actix_web::{delete, get, post, web, HttpResponse, Responder};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedPrincipal;
use crate::context::AppContext;
use crate::error::AppError;
use crate::pages::{AidantDashboard, MedicationForm, PatientDashboard};

use super::{redirect, Keyed};

fn patient_page(ctx: &AppContext) -> PatientDashboard {
    PatientDashboard::new(ctx.auth.clone(), ctx.medications.clone())
}

/// The patient's medications, as currently stored.
#[get("/patient-dashboard")]
pub async fn patient_dashboard(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let medications = page.settled_medications().await;
    let body = json!({
        "userName": page.user_name(),
        "medicationsCount": page.medications_count(),
        "medications": medications.as_ref().map(|list| {
            list.iter()
                .map(|m| Keyed::new(&m.id, m))
                .collect::<Vec<_>>()
        }),
    });
    page.close();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/patient-dashboard/medications")]
pub async fn add_medication(
    ctx: web::Data<AppContext>,
    principal: AuthenticatedPrincipal,
    form: web::Json<MedicationForm>,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let id = page.add_medication(form.into_inner()).await?;
    info!("{} added medication {}", principal.0.uid, id);
    Ok(HttpResponse::Created().json(json!({ "id": id, "notice": page.notice() })))
}

#[delete("/patient-dashboard/medications/{id}")]
pub async fn delete_medication(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    page.delete_medication(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "notice": page.notice() })))
}

/// Every dose recorded for the patient.
#[get("/patient-dashboard/history")]
pub async fn history(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    page.open_history()?;
    let history = page.settled_history().await;
    let body = json!({
        "history": history.as_ref().map(|takes| {
            takes.iter()
                .map(|t| Keyed::new(&t.id, t))
                .collect::<Vec<_>>()
        }),
    });
    page.close();
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseRequest {
    pub medication_id: String,
    pub scheduled_time: String,
}

#[post("/patient-dashboard/takes")]
pub async fn record_dose(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    dose: web::Json<DoseRequest>,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let id = page
        .record_dose(&dose.medication_id, &dose.scheduled_time)
        .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[post("/patient-dashboard/takes/{id}/taken")]
pub async fn mark_taken(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let mut page = patient_page(&ctx);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let take = page.mark_taken(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(Keyed::new(&take.id, &take)))
}

/// The caregiver's patient directory.
#[get("/aidant-dashboard")]
pub async fn aidant_dashboard(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
) -> Result<impl Responder, AppError> {
    let mut page = AidantDashboard::new(ctx.auth.clone());
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let patients = page.settled_patients().await;
    let body = json!({
        "userName": page.user_name(),
        "patients": patients,
    });
    page.close();
    Ok(HttpResponse::Ok().json(body))
}
