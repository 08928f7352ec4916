//! Arena shooter: authoritative server simulation and the client-side
//! prediction, reconciliation and interpolation pipeline.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
