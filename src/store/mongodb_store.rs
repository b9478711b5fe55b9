use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::Store;

fn default_collection() -> String {
    "auth_records".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

/// The config struct for MongoDB connections.
/// Contains the URI, database name and the collection holding the entries.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct MongoDBConfig {
    pub uri: String,
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Separates the records of several daemons sharing one collection.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// A concrete `Store` implementation that keeps one document per key.
pub struct MongoDBStore {
    entry_collection: Collection<EntryDocument>,
    namespace: String,
}

/// Document shape for storing entries in MongoDB.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct EntryDocument {
    namespace: String,
    key: String,
    value: String,
    #[serde(default)]
    updated_at: Option<String>,
}

impl MongoDBStore {
    /// Creates a new `MongoDBStore` from the given config.
    /// It initializes the client connection and the unique index.
    pub async fn new(config: &MongoDBConfig) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at URI: {}", config.uri);

        let mut client_options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to parse MongoDB URI: {}", e)))?;
        client_options.app_name = Some("authlink".to_string());

        let client = Client::with_options(client_options)
            .map_err(|e| StoreError::Backend(format!("Failed to create MongoDB client: {}", e)))?;

        info!("MongoDB connection established successfully.");

        let entry_collection = client
            .database(&config.database)
            .collection::<EntryDocument>(&config.collection);

        // One value per (namespace, key)
        let mut unique_on_key = IndexModel::default();
        unique_on_key.keys = doc! { "namespace": 1, "key": 1 };
        unique_on_key.options = Some(IndexOptions::builder().unique(true).build());

        entry_collection
            .create_index(unique_on_key, None)
            .await
            .map_err(|e| {
                StoreError::Backend(format!("Failed to create unique index on key: {}", e))
            })?;

        Ok(Self {
            entry_collection,
            namespace: config.namespace.clone(),
        })
    }

    fn key_filter(namespace: &str, key: &str) -> Document {
        doc! { "namespace": namespace, "key": key }
    }

    fn set_update(value: &str, updated_at: &str) -> Document {
        doc! { "$set": { "value": value, "updated_at": updated_at } }
    }

    fn doc_to_value(doc: &EntryDocument) -> String {
        doc.value.clone()
    }
}

#[async_trait]
impl Store for MongoDBStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entry = self
            .entry_collection
            .find_one(Self::key_filter(&self.namespace, key), None)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to query entry: {}", e)))?;
        Ok(entry.as_ref().map(Self::doc_to_value))
    }

    /// Upserts the entry so repeated writes of the same key never conflict.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.entry_collection
            .update_one(
                Self::key_filter(&self.namespace, key),
                Self::set_update(value, &Utc::now().to_rfc3339()),
                options,
            )
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to write entry: {}", e)))?;
        debug!("Stored entry '{}' in namespace '{}'", key, self.namespace);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entry_collection
            .delete_one(Self::key_filter(&self.namespace, key), None)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to delete entry: {}", e)))?;
        Ok(())
    }
}
