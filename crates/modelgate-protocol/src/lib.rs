//! Wire-format types for every dialect the gateway speaks to clients and
//! providers, plus the internal representation (IR) adapters translate
//! through. Kept free of any transport or persistence concerns.

pub mod anthropic;
pub mod ir;
pub mod openai;
pub mod sse;
