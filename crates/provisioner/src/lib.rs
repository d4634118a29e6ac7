//! Index provisioning for the karmabot MongoDB collection.
//!
//! The karmabot records live in the `karmabot` collection of the `karmabot` database and are
//! looked up by `subject`, `type`, `gifter` and `date`. Records carry an `expires` timestamp and
//! are removed by the server once it has passed, through a TTL index with a zero second offset.
//!
//! This crate declares those five indexes. It never reads or writes records.
//!
//! ## Behavior
//!
//! - **Idempotent**: indexes are declared by key pattern, declaring an existing one is a no-op
//! - **Fail fast**: the server is pinged before anything is declared, the first failed
//!   declaration aborts the run and the driver error is surfaced unmodified
//! - **Verifiable**: after declaring, the collection's indexes are read back and compared with
//!   the declared set

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod mongodb;
pub mod provisioner;

pub use config::ProvisionerConfig;
pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::{IndexProvisioner, IndexReport};

use crate::metrics::ProvisionerMetrics;
use crate::mongodb::MongoClient;
use std::sync::Arc;

/// Connects with `config` and provisions the indexes, or only verifies them when `verify_only` is set.
pub async fn run(config: &ProvisionerConfig, verify_only: bool) -> ProvisionResult<IndexReport> {
    let metrics = Arc::new(ProvisionerMetrics::register());
    let client = MongoClient::connect(config).await.inspect_err(|e| metrics.record_error(e.kind()))?;
    let provisioner = IndexProvisioner::new(&client, metrics);

    if verify_only {
        provisioner.verify().await
    } else {
        provisioner.provision().await
    }
}
