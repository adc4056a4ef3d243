//! Authentication and account management.
//!
//! - **password**: Argon2 hashing of user passwords
//! - **path_matcher**: which request paths need a user
//! - **session_store**: session id to user id mapping (memory or database)
//! - **user_store**: user rows in SurrealDB
//! - **service**: registration, login, sessions and password reset
//! - **extractor**: request authenticators (Basic header or session cookie)
//!
//! ## Usage
//!
//! ```ignore
//! let auth = AuthService::new(UserStore::new(db));
//! auth.register("bob@dylan.com", "b0b").await?;
//! let session_id = auth.create_session("bob@dylan.com").await;
//! ```

mod error;
mod extractor;
mod password;
pub mod path_matcher;
pub mod session_store;
mod service;
mod user_store;

pub use error::{AuthError, AuthResult};
pub use extractor::{
    AuthType, Authenticator, BasicAuth, SessionAuth, cookie_value,
    decode_base64_authorization_header, extract_base64_authorization_header,
    extract_user_credentials,
};
pub use password::{hash_password, verify_password};
pub use path_matcher::{ExcludedPath, requires_auth};
pub use service::AuthService;
pub use session_store::{DbSessionStore, MemorySessionStore, SessionStore};
pub use user_store::{UserLookup, UserStore};
