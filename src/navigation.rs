use serde::{Serialize, Serializer};
use std::fmt;

use crate::models::Role;

/// The pages of the application, addressed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    Login,
    Register,
    Home,
    PatientDashboard,
    AidantDashboard,
    PatientDetails(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".into(),
            Route::Register => "/register".into(),
            Route::Home => "/home".into(),
            Route::PatientDashboard => "/patient-dashboard".into(),
            Route::AidantDashboard => "/aidant-dashboard".into(),
            Route::PatientDetails(uid) => format!("/patient-details/{}", uid),
        }
    }

    /// Resolves a path. The empty path is the login page.
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_matches('/');
        let mut parts = trimmed.splitn(2, '/');
        match (parts.next().unwrap_or(""), parts.next()) {
            ("", None) | ("login", None) => Some(Route::Login),
            ("register", None) => Some(Route::Register),
            ("home", None) => Some(Route::Home),
            ("patient-dashboard", None) => Some(Route::PatientDashboard),
            ("aidant-dashboard", None) => Some(Route::AidantDashboard),
            ("patient-details", Some(uid)) if !uid.is_empty() && !uid.contains('/') => {
                Some(Route::PatientDetails(uid.to_string()))
            }
            _ => None,
        }
    }

    /// Where a user lands after logging in.
    pub fn dashboard_for(role: Role) -> Route {
        match role {
            Role::Patient => Route::PatientDashboard,
            Role::Aidant => Route::AidantDashboard,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path())
    }
}
