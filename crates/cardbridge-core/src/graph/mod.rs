//! Card dependency graph.
//!
//! References are discovered by scanning query bodies; the graph is rebuilt
//! for every query because migrations change which cards are already done.

mod dependency;
mod references;

pub use dependency::{build_reverse_graph, DependencyGraph};
pub use references::{
    card_reference, extract_references, parse_card_reference, CARD_REFERENCE_PREFIX,
};
