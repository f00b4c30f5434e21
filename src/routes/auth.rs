use actix_web::{get, post, web, HttpResponse, Responder};
use log::info;
use serde_json::json;

use crate::auth::{AuthenticatedPrincipal, LoginForm, RegisterForm};
use crate::context::AppContext;
use crate::error::AppError;
use crate::navigation::Route;
use crate::pages::{LoginPage, RegisterPage};

use super::redirect;

const MSG_ACCOUNT_CREATED: &str =
    "Votre compte a été créé avec succès ! Connectez-vous maintenant.";

/// The empty path shows the login page.
#[get("/")]
pub async fn root() -> impl Responder {
    redirect(Route::Login)
}

/// Log in
///
/// Returns the id token to send as `Authorization: Bearer` on guarded pages,
/// and the dashboard to open. `destination` is null when the account has no
/// profile.
#[post("/login")]
pub async fn login(
    ctx: web::Data<AppContext>,
    form: web::Json<LoginForm>,
) -> Result<impl Responder, AppError> {
    let mut page = LoginPage::with_form(ctx.auth.clone(), form.into_inner());
    let destination = page.submit().await?;
    let principal = page
        .principal()
        .ok_or_else(|| AppError::InternalServerError("Login left no principal".into()))?;

    Ok(HttpResponse::Ok().json(json!({
        "token": principal.id_token,
        "uid": principal.uid,
        "email": principal.email,
        "destination": destination,
    })))
}

/// Create an account
///
/// The new account is not left signed in; the client is sent to `/login`.
#[post("/register")]
pub async fn register(
    ctx: web::Data<AppContext>,
    form: web::Json<RegisterForm>,
) -> Result<impl Responder, AppError> {
    let mut page = RegisterPage::with_form(ctx.auth.clone(), form.into_inner());
    let destination = page.submit().await?;
    Ok(HttpResponse::Created().json(json!({
        "message": MSG_ACCOUNT_CREATED,
        "destination": destination,
    })))
}

/// Sign out
///
/// Guarded like the dashboards: only the bearer of the current session's
/// token can end it.
#[post("/logout")]
pub async fn logout(
    ctx: web::Data<AppContext>,
    principal: AuthenticatedPrincipal,
) -> Result<impl Responder, AppError> {
    ctx.auth.logout().await?;
    info!("{} signed out", principal.0.uid);
    Ok(HttpResponse::Ok().json(json!({ "destination": Route::Login })))
}

#[get("/home")]
pub async fn home(ctx: web::Data<AppContext>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "page": Route::Home,
        "signedIn": ctx.auth.is_logged_in(),
    }))
}
