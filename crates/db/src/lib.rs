pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod storage;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use fixtures::{SeedDataset, SeedRequestInfo, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryRequestRepository, RepositoryError, RequestFilter, RequestPage, RequestRepository,
    SqlRequestRepository, TransitionWrite,
};
pub use storage::{DocumentStore, InMemoryDocumentStore, LocalDocumentStore, StorageError};
