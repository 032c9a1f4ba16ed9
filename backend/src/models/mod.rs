pub mod provider;
pub mod session;
pub mod user;

pub use provider::OidcProvider;
pub use session::Session;
pub use user::{NewUser, User, UserKind};
