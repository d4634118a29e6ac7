//! MongoDB document model for karma records.
//!
//! The record schema belongs to the bot writing the records; only the fields the
//! indexes are built on are modelled here.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// MongoDB document for a karma record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarmaRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// User or entity the karma is about (indexed)
    pub subject: String,

    /// Record category (indexed)
    #[serde(rename = "type")]
    pub kind: String,

    /// Actor that produced the record (indexed)
    pub gifter: String,

    /// Event time (indexed)
    pub date: DateTime,

    /// Removal time, enforced by the TTL index. Records without it never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime>,
}

impl KarmaRecord {
    pub fn new(subject: impl Into<String>, kind: impl Into<String>, gifter: impl Into<String>) -> Self {
        Self {
            id: None,
            subject: subject.into(),
            kind: kind.into(),
            gifter: gifter.into(),
            date: DateTime::now(),
            expires: None,
        }
    }

    pub fn expiring_at(mut self, expires: DateTime) -> Self {
        self.expires = Some(expires);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc, Bson};

    #[test]
    fn test_record_field_names_match_index_keys() {
        let expires = DateTime::from_millis(1_700_000_000_000);
        let record = KarmaRecord::new("alice", "plusplus", "bob").expiring_at(expires);

        let document = bson::to_document(&record).unwrap();
        assert!(!document.contains_key("_id"));
        assert_eq!(document.get_str("subject").unwrap(), "alice");
        assert_eq!(document.get_str("type").unwrap(), "plusplus");
        assert_eq!(document.get_str("gifter").unwrap(), "bob");
        assert!(matches!(document.get("date"), Some(Bson::DateTime(_))));
        assert_eq!(document.get_datetime("expires").unwrap(), &expires);
    }

    #[test]
    fn test_record_without_expires() {
        let document = doc! {
            "subject": "alice",
            "type": "plusplus",
            "gifter": "bob",
            "date": DateTime::from_millis(0),
        };

        let record: KarmaRecord = bson::from_document(document).unwrap();
        assert_eq!(record.expires, None);
        assert_eq!(record.kind, "plusplus");
        assert!(!bson::to_document(&record).unwrap().contains_key("expires"));
    }
}
