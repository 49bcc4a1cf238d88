#![deny(clippy::all)]

//! Remote terminal session client.
//!
//! One [`SessionClient`] owns one session end to end: it connects the
//! transport channel, joins the backend session, streams keystrokes out
//! and output bytes in, keeps terminal dimensions negotiated, and tears
//! everything down exactly once. The [`ExpirationTimer`] counts down the
//! server-issued deadline independently and mediates extensions; the
//! [`ResizeCoordinator`] keeps the backend's idea of the terminal size in
//! step with what is actually rendered.

mod config;
mod error;
mod expiry;
mod resize;
mod session;
mod state;

pub mod test_support;

pub use config::ClientConfig;
pub use error::StartError;
pub use expiry::ExpirationState;
pub use expiry::ExpirationTimer;
pub use expiry::ExtensionOutcome;
pub use resize::ResizeCoordinator;
pub use session::SessionClient;
pub use session::SessionHandle;
pub use state::ConnectionState;
