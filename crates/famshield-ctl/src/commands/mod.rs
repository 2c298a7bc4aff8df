pub mod check;
pub mod config;
pub mod pin;
pub mod scan;
