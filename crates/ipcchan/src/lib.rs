//! Typed message and request channels across a main/window process boundary.
//!
//! A backend ("main") process and any number of UI ("window") processes talk
//! over named channels whose payload types are fixed at compile time.
//! Message channels are fire-and-forget with any number of listeners; request
//! channels have exactly one handler and answer every call.
//!
//! # Crate Structure
//!
//! - [`channel`]: channel definitions, payload codec and wire packets
//! - [`transport`]: the transport seam, an in-process hub and Unix sockets
//! - [`endpoint`]: window and listener registries, dispatchers, endpoints

/// Re-export channel types.
pub mod channel {
    pub use ipcchan_channel::*;
}

/// Re-export transport types.
pub mod transport {
    pub use ipcchan_transport::*;
}

/// Re-export endpoint types.
pub mod endpoint {
    pub use ipcchan_endpoint::*;
}
