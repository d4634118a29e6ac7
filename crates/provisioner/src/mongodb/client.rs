//! MongoDB connection management.

use crate::{config::ProvisionerConfig, error::ProvisionError, mongodb::KarmaRecord};
use mongodb::{bson::doc, options::ClientOptions};

/// MongoDB client wrapper bound to the karmabot collection.
pub struct MongoClient {
    client: mongodb::Client,
    collection: mongodb::Collection<KarmaRecord>,
}

impl MongoClient {
    /// Connects and pings the server, so an unreachable deployment fails here and not on the first index.
    #[tracing::instrument(skip(config), fields(database = %config.database_name, collection = %config.collection_name), err)]
    pub async fn connect(config: &ProvisionerConfig) -> Result<Self, ProvisionError> {
        config.validate()?;

        let mut options = ClientOptions::parse(&config.mongodb_uri).await.map_err(ProvisionError::Connection)?;
        options.app_name = Some(config.app_name.clone());
        options.connect_timeout = Some(config.connect_timeout());
        options.server_selection_timeout = Some(config.server_selection_timeout());

        let client = mongodb::Client::with_options(options).map_err(ProvisionError::Connection)?;
        client.database("admin").run_command(doc! { "ping": 1 }).await.map_err(ProvisionError::Connection)?;
        tracing::debug!("MongoDB ping succeeded");

        let db = client.database(&config.database_name);
        let collection = db.collection::<KarmaRecord>(&config.collection_name);

        Ok(Self { client, collection })
    }

    pub fn collection(&self) -> &mongodb::Collection<KarmaRecord> {
        &self.collection
    }

    pub fn client(&self) -> &mongodb::Client {
        &self.client
    }
}
