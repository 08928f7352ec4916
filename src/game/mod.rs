//! Game simulation modules

pub mod combat;
pub mod constants;
pub mod input;
pub mod physics;
pub mod respawn;
pub mod server;
pub mod snapshot;
pub mod world;

pub use server::{GameHandle, GameServer};
pub use world::{PlayerState, World};

/// Server-assigned player identity, unique and increasing for the process lifetime
pub type PlayerId = u32;
