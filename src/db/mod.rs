pub mod connection;
pub mod history;
pub mod schema;

pub use connection::Database;
