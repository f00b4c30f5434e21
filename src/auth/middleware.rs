use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::debug;

use crate::backend::IdentityProvider;
use crate::error::AppError;

/// Paths reachable without a session.
const PUBLIC_PATHS: &[&str] = &["/", "/login", "/register", "/home", "/health"];

/// Requires `Authorization: Bearer <id token>` on every page except the public
/// ones, and hands the verified `Principal` to handlers via request extensions.
pub struct SessionGuard {
    identity: Arc<dyn IdentityProvider>,
}

impl SessionGuard {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionGuardService {
            service,
            identity: self.identity.clone(),
        }))
    }
}

pub struct SessionGuardService<S> {
    service: S,
    identity: Arc<dyn IdentityProvider>,
}

impl<S, B> Service<ServiceRequest> for SessionGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if PUBLIC_PATHS.contains(&req.path()) {
            return Box::pin(self.service.call(req));
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        let verified = match token {
            Some(token) => self
                .identity
                .verify_id_token(token)
                .map_err(|e| AppError::Unauthorized(e.to_string())),
            None => Err(AppError::Unauthorized("Missing token".into())),
        };

        match verified {
            Ok(principal) => {
                debug!("{} {} as {}", req.method(), req.path(), principal.uid);
                req.extensions_mut().insert(principal);
                Box::pin(self.service.call(req))
            }
            Err(app_err) => Box::pin(async move { Err(app_err.into()) }),
        }
    }
}
