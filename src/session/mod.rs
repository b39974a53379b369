// Public API - what other modules can use
pub use handlers::create_session;
pub use service::AuthService;
pub use types::{LoginRequest, SessionClaims, SessionResponse};

// Internal modules
mod handlers;
pub mod repository;
pub mod service;
mod token;
mod types;
