//! Infrastructure layer: long-lived network endpoints.

pub mod discovery;
pub mod http;
pub mod relay;
pub mod upstream;

pub use http::{router, AppState};
pub use relay::RelayManager;
