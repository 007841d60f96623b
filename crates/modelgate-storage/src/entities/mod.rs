pub mod api_keys;
pub mod completions;
pub mod embeddings;
pub mod models;
pub mod providers;
pub mod req_id_entries;
pub mod settings;

pub use api_keys::Entity as ApiKeys;
pub use completions::Entity as Completions;
pub use embeddings::Entity as Embeddings;
pub use models::Entity as Models;
pub use providers::Entity as Providers;
pub use req_id_entries::Entity as ReqIdEntries;
pub use settings::Entity as Settings;
