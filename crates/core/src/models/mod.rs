pub mod budget;
pub mod expense;
pub mod fixed_expense;
pub mod month;
pub mod settings;
