//! Magic-link authentication.

pub mod routes;
pub mod tokens;

pub use routes::{AuthRouteState, auth_routes};
pub use tokens::{Claims, MAGIC_LINK_TTL, SESSION_TTL, TokenIssuer};
