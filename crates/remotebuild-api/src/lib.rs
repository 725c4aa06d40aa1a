//! HTTP boundary of the Remotebuild server.

pub mod error;
pub mod response;
pub mod routes;
pub mod state;

pub use state::AppState;
