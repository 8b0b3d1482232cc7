//! `finders_client`
//!
//! Client-side systems:
//! - Connection lifecycle and inbound dispatch
//! - Player roster with local-player identification
//! - Local prediction and send throttling
//! - Interpolation for remote player positions
//! - Typed notifications for presentation code

pub mod client;
pub mod events;
pub mod input;
pub mod interp;
pub mod roster;

pub use client::{ConnectionState, GameClient};
