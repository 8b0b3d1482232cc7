//! `finders_shared`
//!
//! Shared libraries for the multiplayer client and its tooling.
//!
//! Design goals:
//! - Explicit, versionable wire format.
//! - Transport behind traits; the core only polls.
//! - Clear separation of concerns (net, channels, config, events, math).
//! - No `unsafe`.

pub mod channel;
pub mod config;
pub mod event;
pub mod loopback;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::channel::*;
    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
