pub mod auth;
pub mod config;
pub mod deploy;
pub mod deployments;
pub mod detect;
pub mod health;
pub mod repos;
pub mod source;
