#![allow(dead_code)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::middleware::Logger;
use actix_web::{test, web, App, Error};
use serde_json::{json, Value};

use medreminder::auth::SessionGuard;
use medreminder::backend::{LocalIdentityProvider, MemoryStore};
use medreminder::routes::{self, health};
use medreminder::AppContext;

/// A fresh in-process backend. bcrypt cost 4 keeps the tests fast.
pub fn context() -> AppContext {
    AppContext::new(
        Arc::new(LocalIdentityProvider::new("test_secret", 1, 4)),
        Arc::new(MemoryStore::new()),
    )
}

pub async fn init_app(
    ctx: AppContext,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = Error> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(ctx.clone()))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("")
                    .wrap(SessionGuard::new(ctx.identity.clone()))
                    .configure(routes::config),
            ),
    )
    .await
}

pub fn register_payload(name: &str, email: &str, role: &str) -> Value {
    json!({
        "name": name,
        "email": email,
        "password": "secret1",
        "confirmPassword": "secret1",
        "role": role
    })
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Registers an account, logs it in and returns `(uid, token)`.
pub async fn register_and_login<S, B>(app: &S, name: &str, email: &str, role: &str) -> (String, String)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(register_payload(name, email, role))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "email": email, "password": "secret1" }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert!(resp.status().is_success(), "login failed: {}", resp.status());
    let body: Value = test::read_body_json(resp).await;
    let uid = body["uid"].as_str().expect("uid").to_string();
    let token = body["token"].as_str().expect("token").to_string();
    (uid, token)
}
