#![doc = "The `medreminder` library crate."]
#![doc = ""]
#![doc = "Medication reminders for patients and their caregivers: account and session"]
#![doc = "handling, medication and dose records kept in a realtime record store, the"]
#![doc = "page controllers built on top of them, and the HTTP shell serving those pages."]

pub mod auth;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod mapper;
pub mod models;
pub mod navigation;
pub mod pages;
pub mod routes;
pub mod services;
pub mod session;

pub use crate::context::AppContext;
pub use crate::error::AppError;
