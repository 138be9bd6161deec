pub mod error;
pub mod persistence;
pub mod sqlite;

pub use error::StoreError;
pub use persistence::Persistence;
pub use sqlite::SqliteStore;
