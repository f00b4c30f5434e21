use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::backend::Principal;
use crate::error::AppError;

/// The principal `SessionGuard` verified for this request.
///
/// Only usable on guarded routes; anywhere else extraction fails with
/// `AppError::Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

impl FromRequest for AuthenticatedPrincipal {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<Principal>().cloned() {
            Some(principal) => ready(Ok(AuthenticatedPrincipal(principal))),
            None => {
                let err = AppError::Unauthorized("No verified session on this request".to_string());
                ready(Err(err.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;

    #[actix_rt::test]
    async fn test_extracts_principal_from_extensions() {
        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(Principal {
            uid: "u1".into(),
            email: "a@x.com".into(),
            id_token: "token".into(),
        });

        let mut payload = Payload::None;
        let extracted = AuthenticatedPrincipal::from_request(&req, &mut payload)
            .await
            .unwrap();
        assert_eq!(extracted.0.uid, "u1");
    }

    #[actix_rt::test]
    async fn test_missing_principal_is_unauthorized() {
        let req = test::TestRequest::default().to_http_request();

        let mut payload = Payload::None;
        let err = AuthenticatedPrincipal::from_request(&req, &mut payload)
            .await
            .unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }
}
