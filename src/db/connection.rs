use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use crate::errors::MarketdeskError;

/// SQLite handle for the analysis history. Cloning shares the connection.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MarketdeskError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| MarketdeskError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| MarketdeskError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, MarketdeskError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MarketdeskError::Database(format!("Failed to open in-memory db: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MarketdeskError::Database(format!("Failed to set pragmas: {}", e)))?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), MarketdeskError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(super::schema::CREATE_TABLES)
            .map_err(|e| MarketdeskError::Database(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}
