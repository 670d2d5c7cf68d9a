//! HTTP and chat-webhook frontend for the car model classifier.

pub mod api;
pub mod line;

pub use api::{router, AppState};
pub use line::LineBot;
