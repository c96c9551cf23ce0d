use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Build the connection pool shared by every handler. Handlers only touch
/// the database through `web::block`, so the pool size bounds the number of
/// concurrent blocking queries.
pub fn create_pool(database_url: &str) -> DbPool {
    let max_size: u32 = std::env::var("DB_POOL_MAX_SIZE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(10);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .expect("Failed to create database connection pool")
}
