pub mod client;
pub mod indexes;
pub mod models;

pub use client::MongoClient;
pub use indexes::{get_index_models, RecordIndex};
pub use models::KarmaRecord;
