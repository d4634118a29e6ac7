//! Declares the record indexes on the karmabot collection and checks what the collection holds.

use crate::error::{command_error_code, ProvisionError, ProvisionResult};
use crate::metrics::ProvisionerMetrics;
use crate::mongodb::{KarmaRecord, MongoClient, RecordIndex};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::{Collection, IndexModel};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Server code for listing the indexes of a collection that does not exist yet.
const NAMESPACE_NOT_FOUND: i32 = 26;

const ID_INDEX_NAME: &str = "_id_";

/// Ensures the record indexes exist on one collection.
pub struct IndexProvisioner {
    collection: Collection<KarmaRecord>,
    indexes: Vec<RecordIndex>,
    metrics: Arc<ProvisionerMetrics>,
}

impl IndexProvisioner {
    pub fn new(client: &MongoClient, metrics: Arc<ProvisionerMetrics>) -> Self {
        Self::from_collection(client.collection().clone(), metrics)
    }

    pub fn from_collection(collection: Collection<KarmaRecord>, metrics: Arc<ProvisionerMetrics>) -> Self {
        Self { collection, indexes: RecordIndex::ALL.to_vec(), metrics }
    }

    /// Replaces the declared indexes, e.g. to declare them in another order.
    pub fn with_indexes(mut self, indexes: impl IntoIterator<Item = RecordIndex>) -> Self {
        self.indexes = indexes.into_iter().collect();
        self
    }

    pub fn indexes(&self) -> &[RecordIndex] {
        &self.indexes
    }

    /// Declares every index, then reads back the collection's indexes.
    ///
    /// Declaring an index that already exists with the same key and options is a no-op on the
    /// server, so running this repeatedly is safe. The first failed declaration aborts the run.
    #[tracing::instrument(skip(self), fields(collection = %self.collection.name()), err)]
    pub async fn provision(&self) -> ProvisionResult<IndexReport> {
        let start = Instant::now();
        let result = async {
            self.declare_all().await?;
            self.verify_indexes().await
        }
        .await;
        self.metrics.run_duration.record(start.elapsed().as_secs_f64(), &[KeyValue::new("operation", "provision")]);

        match result {
            Ok(report) => {
                tracing::info!(
                    declared = self.indexes.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Indexes provisioned"
                );
                Ok(report)
            }
            Err(err) => {
                self.metrics.record_error(err.kind());
                Err(err)
            }
        }
    }

    /// Compares the collection's indexes with the declared ones without creating anything.
    #[tracing::instrument(skip(self), fields(collection = %self.collection.name()), err)]
    pub async fn verify(&self) -> ProvisionResult<IndexReport> {
        let start = Instant::now();
        let result = self.verify_indexes().await;
        self.metrics.run_duration.record(start.elapsed().as_secs_f64(), &[KeyValue::new("operation", "verify")]);
        if let Err(err) = &result {
            self.metrics.record_error(err.kind());
        }
        result
    }

    async fn declare_all(&self) -> ProvisionResult<()> {
        for index in &self.indexes {
            let created = self
                .collection
                .create_index(index.model())
                .await
                .map_err(|e| ProvisionError::from_index_error(index.name(), e))?;
            tracing::debug!(index = %index, server_name = %created.index_name, "Index declared");
            self.metrics.indexes_declared.add(1, &[KeyValue::new("index", index.name())]);
        }
        Ok(())
    }

    async fn verify_indexes(&self) -> ProvisionResult<IndexReport> {
        let found = self.list_indexes().await?;
        let report = IndexReport::compare(&self.indexes, &found);
        for mismatch in &report.mismatched {
            tracing::warn!(
                index = %mismatch.index,
                found_name = mismatch.found_name.as_deref().unwrap_or("-"),
                expected_expire_after = ?mismatch.expected_expire_after,
                found_expire_after = ?mismatch.found_expire_after,
                differences = ?mismatch.differences,
                "Index exists with different options"
            );
        }
        if !report.missing.is_empty() {
            tracing::warn!(missing = ?report.missing, "Indexes missing");
        }
        if !report.extra.is_empty() {
            tracing::debug!(extra = ?report.extra, "Collection has indexes outside the declared set");
        }
        Ok(report)
    }

    async fn list_indexes(&self) -> ProvisionResult<Vec<IndexModel>> {
        match self.collection.list_indexes().await {
            Ok(cursor) => cursor.try_collect().await.map_err(ProvisionError::from_listing_error),
            Err(err) if command_error_code(&err) == Some(NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(err) => Err(ProvisionError::from_listing_error(err)),
        }
    }
}

/// A declared index whose key pattern exists with other options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMismatch {
    pub index: RecordIndex,
    pub found_name: Option<String>,
    pub expected_expire_after: Option<Duration>,
    pub found_expire_after: Option<Duration>,
    /// Server option names that differ from the declaration, e.g. `unique`
    pub differences: Vec<&'static str>,
}

/// Outcome of comparing a collection's indexes with the declared ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub present: Vec<RecordIndex>,
    pub missing: Vec<RecordIndex>,
    pub mismatched: Vec<IndexMismatch>,
    /// Names of indexes outside the declared set, `_id_` excluded
    pub extra: Vec<String>,
}

impl IndexReport {
    pub fn compare(expected: &[RecordIndex], found: &[IndexModel]) -> Self {
        let mut report = IndexReport::default();

        for index in expected {
            let keys = index.keys();
            match found.iter().find(|model| same_key_pattern(&model.keys, &keys)) {
                None => report.missing.push(*index),
                Some(model) => {
                    let differences = option_differences(*index, model.options.as_ref());
                    if differences.is_empty() {
                        report.present.push(*index);
                    } else {
                        report.mismatched.push(IndexMismatch {
                            index: *index,
                            found_name: model.options.as_ref().and_then(|options| options.name.clone()),
                            expected_expire_after: index.expire_after(),
                            found_expire_after: model.options.as_ref().and_then(|options| options.expire_after),
                            differences,
                        });
                    }
                }
            }
        }

        for model in found {
            let name = model.options.as_ref().and_then(|options| options.name.clone());
            if name.as_deref() == Some(ID_INDEX_NAME) || is_id_key(&model.keys) {
                continue;
            }
            if expected.iter().any(|index| same_key_pattern(&model.keys, &index.keys())) {
                continue;
            }
            report.extra.push(name.unwrap_or_else(|| model.keys.to_string()));
        }

        report
    }

    /// True when every declared index exists with the declared options.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Declared indexes carry no options besides the TTL offset, so any other behavior-changing
/// option on the server side makes the index differ from the declaration.
fn option_differences(index: RecordIndex, options: Option<&IndexOptions>) -> Vec<&'static str> {
    let mut differences = Vec::new();
    let Some(options) = options else {
        if index.expire_after().is_some() {
            differences.push("expireAfterSeconds");
        }
        return differences;
    };

    if options.expire_after != index.expire_after() {
        differences.push("expireAfterSeconds");
    }
    if options.unique == Some(true) {
        differences.push("unique");
    }
    if options.sparse == Some(true) {
        differences.push("sparse");
    }
    if options.partial_filter_expression.is_some() {
        differences.push("partialFilterExpression");
    }
    differences
}

fn is_id_key(keys: &Document) -> bool {
    keys.len() == 1 && keys.contains_key("_id")
}

/// Key patterns match when they list the same fields in the same order with the same direction.
/// Directions are compared numerically since shells may send them as doubles.
fn same_key_pattern(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((field_a, dir_a), (field_b, dir_b))| {
            field_a == field_b
                && match (direction(dir_a), direction(dir_b)) {
                    (Some(x), Some(y)) => x == y,
                    _ => dir_a == dir_b,
                }
        })
}

fn direction(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mongodb::bson::doc;

    fn server_index(keys: Document, name: &str, expire_after: Option<Duration>) -> IndexModel {
        let mut options = IndexOptions::builder().name(name.to_string()).build();
        options.expire_after = expire_after;
        IndexModel::builder().keys(keys).options(options).build()
    }

    fn id_index() -> IndexModel {
        server_index(doc! { "_id": 1 }, "_id_", None)
    }

    fn complete_set() -> Vec<IndexModel> {
        vec![
            id_index(),
            server_index(doc! { "expires": 1 }, "expires_1", Some(Duration::ZERO)),
            server_index(doc! { "subject": 1 }, "subject_1", None),
            server_index(doc! { "type": 1 }, "type_1", None),
            server_index(doc! { "gifter": 1 }, "gifter_1", None),
            server_index(doc! { "date": 1 }, "date_1", None),
        ]
    }

    #[test]
    fn test_complete_collection() {
        let report = IndexReport::compare(&RecordIndex::ALL, &complete_set());
        assert!(report.is_complete());
        assert_eq!(report.present, RecordIndex::ALL.to_vec());
        assert!(report.extra.is_empty());
    }

    #[test]
    fn test_empty_collection_reports_everything_missing() {
        let report = IndexReport::compare(&RecordIndex::ALL, &[]);
        assert!(!report.is_complete());
        assert_eq!(report.missing, RecordIndex::ALL.to_vec());
        assert!(report.present.is_empty());
    }

    #[test]
    fn test_only_id_index() {
        let report = IndexReport::compare(&RecordIndex::ALL, &[id_index()]);
        assert_eq!(report.missing.len(), 5);
        assert!(report.extra.is_empty());
    }

    #[test]
    fn test_ttl_offset_mismatch() {
        let mut found = complete_set();
        found[1] = server_index(doc! { "expires": 1 }, "expires_1", Some(Duration::from_secs(3600)));

        let report = IndexReport::compare(&RecordIndex::ALL, &found);
        assert!(!report.is_complete());
        assert_eq!(report.mismatched.len(), 1);
        assert_matches!(
            &report.mismatched[0],
            IndexMismatch { index: RecordIndex::Expires, found_expire_after: Some(d), expected_expire_after: Some(e), .. }
                if *d == Duration::from_secs(3600) && *e == Duration::ZERO
        );
    }

    #[test]
    fn test_plain_index_missing_ttl() {
        let mut found = complete_set();
        found[1] = server_index(doc! { "expires": 1 }, "expires_1", None);

        let report = IndexReport::compare(&RecordIndex::ALL, &found);
        assert_eq!(report.mismatched[0].found_name.as_deref(), Some("expires_1"));
        assert_eq!(report.mismatched[0].found_expire_after, None);
        assert_eq!(report.mismatched[0].differences, vec!["expireAfterSeconds"]);
    }

    #[rstest::rstest]
    #[case::unique(|o: &mut IndexOptions| o.unique = Some(true), "unique")]
    #[case::sparse(|o: &mut IndexOptions| o.sparse = Some(true), "sparse")]
    #[case::partial_filter(
        |o: &mut IndexOptions| o.partial_filter_expression = Some(doc! { "type": "plusplus" }),
        "partialFilterExpression"
    )]
    #[case::ttl_on_plain_key(|o: &mut IndexOptions| o.expire_after = Some(Duration::from_secs(60)), "expireAfterSeconds")]
    fn test_non_declared_option_is_a_mismatch(#[case] set_option: fn(&mut IndexOptions), #[case] option: &str) {
        let mut found = complete_set();
        let mut subject = server_index(doc! { "subject": 1 }, "subject_1", None);
        set_option(subject.options.as_mut().unwrap());
        found[2] = subject;

        let report = IndexReport::compare(&RecordIndex::ALL, &found);
        assert!(!report.is_complete());
        assert!(!report.present.contains(&RecordIndex::Subject));
        assert_eq!(report.mismatched.len(), 1);
        assert_eq!(report.mismatched[0].index, RecordIndex::Subject);
        assert_eq!(report.mismatched[0].differences, vec![option]);
    }

    #[test]
    fn test_explicit_false_options_still_match() {
        let mut found = complete_set();
        let options = found[3].options.as_mut().unwrap();
        options.unique = Some(false);
        options.sparse = Some(false);

        let report = IndexReport::compare(&RecordIndex::ALL, &found);
        assert!(report.is_complete());
    }

    #[test]
    fn test_extra_and_descending_indexes() {
        let mut found = complete_set();
        found.retain(|model| model.keys != doc! { "date": 1 });
        found.push(server_index(doc! { "date": -1 }, "date_-1", None));
        found.push(server_index(doc! { "subject": 1, "date": -1 }, "subject_1_date_-1", None));

        let report = IndexReport::compare(&RecordIndex::ALL, &found);
        assert_eq!(report.missing, vec![RecordIndex::Date]);
        assert_eq!(report.extra, vec!["date_-1".to_string(), "subject_1_date_-1".to_string()]);
    }

    #[test]
    fn test_double_direction_matches() {
        let found = vec![server_index(doc! { "gifter": 1.0 }, "gifter_1", None)];
        let report = IndexReport::compare(&[RecordIndex::Gifter], &found);
        assert_eq!(report.present, vec![RecordIndex::Gifter]);
    }

    #[test]
    fn test_compare_respects_declared_subset() {
        let report = IndexReport::compare(&[RecordIndex::Type, RecordIndex::Subject], &complete_set());
        assert_eq!(report.present, vec![RecordIndex::Type, RecordIndex::Subject]);
        assert_eq!(report.extra, vec!["expires_1".to_string(), "gifter_1".to_string(), "date_1".to_string()]);
    }
}
