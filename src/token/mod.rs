//! Anti-replay tokens for form submission.

mod store;

pub use store::{Token, TokenStore, default_token_ttl, TOKEN_BYTES};
