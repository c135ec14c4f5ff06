// Public API for integration tests and potential library usage

pub mod api;
pub mod llm;
pub mod protocol;
pub mod router;
pub mod server;
pub mod state;
pub mod types;
pub mod ws;
