#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{ClientConfig, Endpoints};
pub use error::{Error, OperationFailure};
pub use notify::{Notifier, SilentNotifier, TracingNotifier};
pub use session::{SessionManager, SessionPhase, SessionSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore, REFRESH_TOKEN_KEY, TOKEN_KEY};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{ApiError, ApiRequest, Method, Transport};
pub use types::{
    AccessToken, LoginResponse, Operation, PasswordChange, Payload, RefreshToken, UserProfile,
};
