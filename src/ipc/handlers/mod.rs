pub mod backup_exchange;
pub mod core;
pub mod marks;
pub mod reports;
pub mod students;
pub mod validation;
