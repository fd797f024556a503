pub mod admin;
pub mod auth;
pub mod codes;
pub mod csv_import;
pub mod purchase;
pub mod sale;
