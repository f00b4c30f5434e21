pub mod medication;
pub mod take;
pub mod user;

pub use medication::{
    CaregiverMedication, CaregiverMedicationInput, Medication, MedicationInput,
};
pub use take::{MedicationTake, TakeStatus};
pub use user::{Role, User};
