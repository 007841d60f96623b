//! Minimal admin CRUD surface mounted under `/admin` by `apps/modelgate`.

mod router;

pub use router::router;
