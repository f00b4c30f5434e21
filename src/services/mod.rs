pub mod auth;
pub mod medication;

pub use auth::{AuthService, LoginOutcome};
pub use medication::{LiveList, LiveRecord, MedicationService};
