//! Request header extractors.

mod api_key;
mod session;

pub use api_key::{ApiKey, API_KEY_HEADER};
pub use session::{SessionUser, USER_ID_HEADER};
