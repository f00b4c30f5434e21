use actix_web::{delete, get, post, web, HttpResponse, Responder};
use serde_json::json;

use crate::auth::AuthenticatedPrincipal;
use crate::context::AppContext;
use crate::error::AppError;
use crate::models::CaregiverMedicationInput;
use crate::pages::PatientDetails;

use super::{redirect, Keyed};

#[get("/patient-details/{uid}")]
pub async fn patient_details(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let uid = path.into_inner();
    let mut page = PatientDetails::new(ctx.auth.clone(), ctx.medications.clone(), &uid);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let patient = page.settled_patient().await;
    let notes = page.settled_notes().await;
    let body = json!({
        "uid": page.patient_uid(),
        "patient": patient,
        "medicaments": notes.as_ref().map(|list| {
            list.iter()
                .map(|n| Keyed::new(&n.key, n))
                .collect::<Vec<_>>()
        }),
    });
    page.go_back();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/patient-details/{uid}/medicaments")]
pub async fn add_note(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    path: web::Path<String>,
    note: web::Json<CaregiverMedicationInput>,
) -> Result<impl Responder, AppError> {
    let uid = path.into_inner();
    let mut page = PatientDetails::new(ctx.auth.clone(), ctx.medications.clone(), &uid);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    let key = page.add_note(note.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "key": key, "notice": page.notice() })))
}

#[delete("/patient-details/{uid}/medicaments/{key}")]
pub async fn remove_note(
    ctx: web::Data<AppContext>,
    _principal: AuthenticatedPrincipal,
    path: web::Path<(String, String)>,
) -> Result<impl Responder, AppError> {
    let (uid, key) = path.into_inner();
    let mut page = PatientDetails::new(ctx.auth.clone(), ctx.medications.clone(), &uid);
    if let Some(route) = page.open().await {
        return Ok(redirect(route));
    }
    page.remove_note(&key).await?;
    Ok(HttpResponse::Ok().json(json!({ "notice": page.notice() })))
}
