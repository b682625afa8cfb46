//! PsiLua: coordination des demandes de suivi et des séances entre
//! patients et psychologues.

pub mod appointments;
pub mod authorization;
pub mod config;
pub mod db;
pub mod metrics;
pub mod models;
pub mod requests;
pub mod roster;
pub mod services;
pub mod snapshot;
pub mod utils;
