//! Persistence for ApiKey/Provider/Model/Completion/Embedding/ReqIdEntry/
//! Settings (SPEC_FULL.md §3). `Storage` is the trait the rest of the
//! gateway depends on; `SeaOrmStorage` is the only implementation.

pub mod entities;
pub mod seaorm;
pub mod snapshot;
pub mod storage;

pub use seaorm::SeaOrmStorage;
pub use snapshot::{ApiKeyRow, ModelRow, ProviderRow, SettingsRow, StorageSnapshot};
pub use storage::{
    ApiKeyInput, CompletionCreate, CompletionFinalize, CompletionRow, CompletionStatus,
    DedupOutcome, EmbeddingCreate, ModelInput, ProviderInput, Storage, StorageError,
    StorageResult, UsageAggregate,
};
