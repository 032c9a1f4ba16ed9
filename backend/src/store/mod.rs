pub mod sqlite;

pub use sqlite::Store;
