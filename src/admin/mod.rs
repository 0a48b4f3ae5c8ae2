//! Administration of authorized users.

pub mod routes;
pub mod validation;

pub use routes::{AdminRouteState, admin_routes};
pub use validation::{NewUser, parse_seed_users};

use crate::error::DatabaseError;
use crate::store::Database;

/// Create every user in an `email:Name,...` list that does not exist yet.
pub async fn seed_users(db: &dyn Database, raw: &str) -> Result<usize, DatabaseError> {
    let users = parse_seed_users(raw);
    for user in &users {
        db.upsert_user(&user.email, &user.name).await?;
    }
    tracing::info!(count = users.len(), "Seed users ensured");
    Ok(users.len())
}
