pub mod api;
pub mod clients;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod utils;
