//! MongoDB target implementation.

use async_trait::async_trait;
use mongodb::bson::{self, doc, spec::BinarySubtype, Binary, Bson, Document};
use mongodb::error::ErrorKind as MongoErrorKind;
use mongodb::{Client, Database};
use tracing::{debug, info};

use super::TargetWriter;
use crate::config::TargetConfig;
use crate::core::{Chunk, Value};
use crate::error::{MigrateError, Result};

/// Server error code for "collection already exists".
const NAMESPACE_EXISTS: i32 = 48;

/// Server error code for "collection does not exist".
const NAMESPACE_NOT_FOUND: i32 = 26;

/// MongoDB target.
pub struct MongoTarget {
    client: Client,
    db: Database,
}

impl MongoTarget {
    /// Connect to the target and verify the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let client = Client::with_options(config.client_options())
            .map_err(|e| MigrateError::connection(e, "creating MongoDB client"))?;

        // The client connects lazily; ping now so setup failures are fatal here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| MigrateError::connection(e, "testing MongoDB target connection"))?;

        info!(
            "Connected to MongoDB target: {}:{}/{}",
            config.host, config.port, config.database
        );

        let db = client.database(&config.database);
        Ok(Self { client, db })
    }
}

fn has_code(err: &mongodb::error::Error, code: i32) -> bool {
    matches!(*err.kind, MongoErrorKind::Command(ref cmd) if cmd.code == code)
}

#[async_trait]
impl TargetWriter for MongoTarget {
    async fn ensure_database(&self) -> Result<()> {
        let names = self
            .client
            .list_database_names()
            .await
            .map_err(|e| MigrateError::connection(e, "listing MongoDB databases"))?;

        if names.iter().any(|n| n == self.db.name()) {
            debug!("Database {} already exists", self.db.name());
        } else {
            // MongoDB materializes a database with its first collection.
            info!(
                "Database {} will be created with its first collection",
                self.db.name()
            );
        }
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let existing = self
            .db
            .list_collection_names()
            .await
            .map_err(|e| MigrateError::dest_insert(collection, e))?;

        if existing.iter().any(|n| n == collection) {
            debug!("Collection {} already exists", collection);
            return Ok(());
        }

        match self.db.create_collection(collection).await {
            Ok(()) => {
                debug!("Created collection {}", collection);
                Ok(())
            }
            Err(e) if has_code(&e, NAMESPACE_EXISTS) => Ok(()),
            Err(e) => Err(MigrateError::dest_insert(collection, e)),
        }
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        match self.db.collection::<Document>(collection).drop().await {
            Ok(()) => Ok(()),
            Err(e) if has_code(&e, NAMESPACE_NOT_FOUND) => Ok(()),
            Err(e) => Err(MigrateError::dest_insert(collection, e)),
        }
    }

    async fn insert_chunk(&self, collection: &str, chunk: Chunk) -> Result<u64> {
        let docs = chunk_to_documents(&chunk)
            .map_err(|e| MigrateError::dest_insert(collection, e))?;
        drop(chunk);

        if docs.is_empty() {
            return Ok(0);
        }

        let result = self
            .db
            .collection::<Document>(collection)
            .insert_many(docs)
            .await
            .map_err(|e| MigrateError::dest_insert(collection, e))?;

        Ok(result.inserted_ids.len() as u64)
    }

    async fn count_documents(&self, collection: &str) -> Result<i64> {
        let count = self
            .db
            .collection::<Document>(collection)
            .count_documents(doc! {})
            .await
            .map_err(|e| MigrateError::dest_insert(collection, e))?;
        Ok(count as i64)
    }

    async fn test_connection(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| MigrateError::connection(e, "pinging MongoDB target"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mongodb"
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

/// Convert every row of a chunk into a BSON document keyed by column name.
pub fn chunk_to_documents(chunk: &Chunk) -> std::result::Result<Vec<Document>, bson::ser::Error> {
    chunk
        .records()
        .map(|record| {
            let mut document = Document::new();
            for (column, value) in record {
                document.insert(column, value_to_bson(value)?);
            }
            Ok(document)
        })
        .collect()
}

/// Convert one column value.
///
/// Decimals and out-of-range unsigned integers are stored as strings so no
/// precision is lost; `TIME` values have no BSON counterpart and are stored
/// as `HH:MM:SS[.fff]` strings.
fn value_to_bson(value: &Value) -> std::result::Result<Bson, bson::ser::Error> {
    let bson = match value {
        Value::Null => Bson::Null,
        Value::Bool(v) => Bson::Boolean(*v),
        Value::I64(v) => Bson::Int64(*v),
        Value::U64(v) => match i64::try_from(*v) {
            Ok(v) => Bson::Int64(v),
            Err(_) => Bson::String(v.to_string()),
        },
        Value::F64(v) => Bson::Double(*v),
        Value::Decimal(v) => Bson::String(v.to_string()),
        Value::Text(v) => Bson::String(v.clone()),
        Value::Bytes(v) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: v.clone(),
        }),
        Value::Date(d) => Bson::DateTime(bson::DateTime::from_millis(
            d.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis(),
        )),
        Value::Time(t) => Bson::String(t.format("%H:%M:%S%.f").to_string()),
        Value::DateTime(dt) => {
            Bson::DateTime(bson::DateTime::from_millis(dt.and_utc().timestamp_millis()))
        }
        Value::Timestamp(ts) => Bson::DateTime(bson::DateTime::from_millis(ts.timestamp_millis())),
        Value::Json(v) => bson::to_bson(v)?,
    };
    Ok(bson)
}
