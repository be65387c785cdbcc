pub mod engine;
pub mod errors;
pub mod loader;
pub mod policy;
pub mod trie;
pub mod types;
pub mod web;

use trie::PathTrie;

/// Fully compiled authorization state, merged from one or more policies.
/// Immutable after construction — policy changes require a service reload,
/// which publishes a fresh `Arc<Acl>`; in-flight requests keep their
/// snapshot.
#[derive(Debug, Default)]
pub struct Acl {
    /// Set when the synthetic root policy was among the inputs: every
    /// request is allowed with root privilege and both tries are empty.
    pub root: bool,
    /// Rules matched on full equality of the normalized request path.
    pub exact: PathTrie,
    /// Rules matched by longest prefix.
    pub glob: PathTrie,
}
