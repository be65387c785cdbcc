use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AclError {
    #[error("failed to load policy file `{path}`")]
    #[diagnostic(
        code(heliopause::acl::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(heliopause::acl::kdl_parse),
        help("Check your KDL file syntax — see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    /// Aggregate of every validation failure found in a single parse pass,
    /// so a policy author sees all mistakes at once.
    #[error("invalid policy document:\n  {}", .0.join("\n  "))]
    #[diagnostic(
        code(heliopause::acl::validation),
        help("Policy documents may contain `name` and `path` blocks; path blocks may contain `policy`, `capabilities`, and `permissions`")
    )]
    Validation(Vec<String>),

    #[error("Invalid policy: {0}")]
    #[diagnostic(code(heliopause::acl::invalid_policy))]
    InvalidPolicy(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(heliopause::acl::io))]
    Io(#[from] std::io::Error),
}
