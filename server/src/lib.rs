pub mod auth;
pub mod config;
pub mod handlers;
pub mod mail;
pub mod models;
pub mod payment;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
