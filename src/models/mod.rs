pub mod user;

pub use user::{InMemoryUserRepository, PgUserRepository, User, UserRepository};
