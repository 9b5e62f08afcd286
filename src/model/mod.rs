pub mod employee;
pub mod role;
pub mod settings;
