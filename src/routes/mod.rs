pub mod auth;
pub mod dashboards;
pub mod health;
pub mod patients;

use actix_web::http::header::LOCATION;
use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;

use crate::navigation::Route;

/// Registers every page route. `health` is registered separately so it can
/// sit outside any middleware.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(auth::root)
        .service(auth::login)
        .service(auth::register)
        .service(auth::logout)
        .service(auth::home)
        .service(dashboards::patient_dashboard)
        .service(dashboards::add_medication)
        .service(dashboards::delete_medication)
        .service(dashboards::history)
        .service(dashboards::record_dose)
        .service(dashboards::mark_taken)
        .service(dashboards::aidant_dashboard)
        .service(patients::patient_details)
        .service(patients::add_note)
        .service(patients::remove_note);
}

/// A stored record together with the key it lives under.
#[derive(Debug, Serialize)]
pub struct Keyed<'a, T> {
    pub id: Option<&'a str>,
    #[serde(flatten)]
    pub record: &'a T,
}

impl<'a, T> Keyed<'a, T> {
    pub fn new(id: &'a Option<String>, record: &'a T) -> Self {
        Self {
            id: id.as_deref(),
            record,
        }
    }
}

/// Sends the client to another page instead of the one it asked for.
pub fn redirect(route: Route) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((LOCATION, route.path()))
        .json(json!({ "redirect": route }))
}
