//! OpenTube Database Layer
//!
//! The media catalog: which artifacts exist, who owns them and who may read
//! them. `MediaCatalog` is the seam the services depend on; `MediaRepository`
//! implements it on Postgres.

pub mod catalog;
pub mod db;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use catalog::{MediaCatalog, VideoUpdate};
pub use db::transaction::TransactionGuard;
pub use db::{connect, run_migrations, MediaRepository};
