pub mod circuit_breaker;
pub mod context;
pub mod event;
pub mod health;
pub mod message;
pub mod notification;
pub mod response;
pub mod retry;
pub mod user;
