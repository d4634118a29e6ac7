//! Index declarations for the karmabot collection.
//!
//! Indexes:
//! - `{ "_id": 1 }` - Primary key (automatic)
//! - `{ "expires": 1 }` - TTL, `expireAfterSeconds: 0`: a record is removed once `expires` has passed
//! - `{ "subject": 1 }` - For lookups by tracked user/entity
//! - `{ "type": 1 }` - For lookups by record category
//! - `{ "gifter": 1 }` - For lookups by the actor that produced the record
//! - `{ "date": 1 }` - For time-range queries
//!
//! Indexes are declared by key pattern only; the server derives the names (`expires_1`, ...).

use mongodb::bson::Document;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use std::fmt;
use std::time::Duration;

/// One of the indexes the provisioner declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordIndex {
    Expires,
    Subject,
    Type,
    Gifter,
    Date,
}

impl RecordIndex {
    pub const ALL: [RecordIndex; 5] =
        [RecordIndex::Expires, RecordIndex::Subject, RecordIndex::Type, RecordIndex::Gifter, RecordIndex::Date];

    /// Document field the index is built on.
    pub fn field(&self) -> &'static str {
        match self {
            RecordIndex::Expires => "expires",
            RecordIndex::Subject => "subject",
            RecordIndex::Type => "type",
            RecordIndex::Gifter => "gifter",
            RecordIndex::Date => "date",
        }
    }

    /// Name the server generates for the key pattern.
    pub fn name(&self) -> String {
        format!("{}_1", self.field())
    }

    /// Ascending single-field key pattern.
    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        keys.insert(self.field(), 1);
        keys
    }

    /// Expiry offset for TTL indexes, `None` for plain indexes.
    pub fn expire_after(&self) -> Option<Duration> {
        match self {
            RecordIndex::Expires => Some(Duration::ZERO),
            _ => None,
        }
    }

    pub fn model(&self) -> IndexModel {
        let builder = IndexModel::builder().keys(self.keys());
        match self.expire_after() {
            Some(expire_after) => {
                builder.options(IndexOptions::builder().expire_after(expire_after).build()).build()
            }
            None => builder.build(),
        }
    }
}

impl fmt::Display for RecordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub fn get_index_models() -> Vec<IndexModel> {
    RecordIndex::ALL.iter().map(RecordIndex::model).collect()
}
