//! Rewrite oracle: the external service consulted for text the
//! deterministic rules cannot translate.

mod http;
pub mod prompt;
mod traits;

pub use http::{extract_completion, ChatCompletionsOracle};
pub use traits::RewriteOracle;
