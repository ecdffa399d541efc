pub mod auth;
pub mod deploy;
pub mod deployments;
pub mod detect;
pub mod events;
pub mod health;

pub use auth::*;
pub use deploy::*;
pub use deployments::*;
pub use detect::*;
pub use events::*;
pub use health::*;
