pub mod errors;
pub mod id;
pub mod identity;

pub use errors::{BackendError, ConfigError, PotluckError};
pub use id::{new_id, now_timestamp};
pub use identity::Identity;

pub type Result<T> = std::result::Result<T, PotluckError>;
