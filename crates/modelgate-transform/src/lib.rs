//! Translation between client wire dialects and the internal IR.
//!
//! One `RequestAdapter`/`ResponseAdapter` implementation per client
//! dialect, each independent of the others — adding a fourth dialect means
//! adding one more pair of impls, not a new row and column in a matrix.

pub mod adapters;

pub use adapters::{
    ClientDialect, DialectAdapter, RequestAdapter, ResponseAdapter, SseFrame, TranslateError,
    adapter_for,
};
