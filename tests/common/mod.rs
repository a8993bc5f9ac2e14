//! Shared helpers for MongoDB-backed integration tests.
//!
//! Tests gate on `MONGODB_URI`; without it they print a skip notice and
//! return early. Each test gets a throwaway database dropped on teardown.

use uuid::Uuid;

use squad::infrastructure::mongo::{MongoConnection, Stores};

pub struct TestDb {
    pub conn: MongoConnection,
    pub stores: Stores,
}

impl TestDb {
    /// Connect to a fresh throwaway database, or `None` when no Mongo is
    /// configured in the environment.
    pub async fn connect() -> Option<Self> {
        let Ok(uri) = std::env::var("MONGODB_URI") else {
            eprintln!("MONGODB_URI not set; skipping integration test");
            return None;
        };
        let db_name = format!("squad-test-{}", Uuid::new_v4().simple());
        let conn = match MongoConnection::connect(&uri, &db_name).await {
            Ok(conn) => conn,
            Err(err) => {
                eprintln!("MongoDB unreachable ({err}); skipping integration test");
                return None;
            }
        };
        conn.ensure_indexes().await.expect("index creation failed");
        let stores = Stores::new(&conn);
        Some(Self { conn, stores })
    }

    /// Drop the throwaway database and close the client.
    pub async fn teardown(self) {
        let _ = self.conn.database().drop().await;
        self.conn.close().await;
    }
}
