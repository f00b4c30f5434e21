use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::context::AppContext;

/// Liveness plus whether someone is signed in on this process.
#[get("/health")]
pub async fn health(ctx: web::Data<AppContext>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "signedIn": ctx.session.current_principal().is_some(),
        "timestamp": Utc::now()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalIdentityProvider, MemoryStore};
    use actix_web::test;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let ctx = AppContext::new(
            Arc::new(LocalIdentityProvider::new("test_secret", 1, 4)),
            Arc::new(MemoryStore::new()),
        );
        let app = test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(ctx))
                .service(health),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["signedIn"], false);
        assert!(json["timestamp"].is_string());
    }
}
