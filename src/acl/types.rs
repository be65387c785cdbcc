use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

bitflags! {
    /// Capability bitmap attached to a path rule.
    ///
    /// `DENY` is a distinct bit that overrides every other bit at evaluation
    /// time. `ROOT` is the privilege a root ACL reports from the
    /// capabilities query; it can never be named in a policy document, so no
    /// parsed rule carries it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u8 {
        const CREATE = 1 << 0;
        const READ   = 1 << 1;
        const UPDATE = 1 << 2;
        const DELETE = 1 << 3;
        const LIST   = 1 << 4;
        const SUDO   = 1 << 5;
        const ROOT   = 1 << 6;
        const DENY   = 1 << 7;
    }
}

/// Capability names in ascending lexicographic order, so that
/// [`Capability::names`] comes out sorted without an extra pass.
const CAPABILITY_NAMES: [(Capability, &str); 8] = [
    (Capability::CREATE, "create"),
    (Capability::DELETE, "delete"),
    (Capability::DENY, "deny"),
    (Capability::LIST, "list"),
    (Capability::READ, "read"),
    (Capability::ROOT, "root"),
    (Capability::SUDO, "sudo"),
    (Capability::UPDATE, "update"),
];

impl Capability {
    /// Expansion of the `read` policy shorthand.
    pub const READ_SET: Self = Self::READ.union(Self::LIST);
    /// Expansion of the `write` policy shorthand.
    pub const WRITE_SET: Self = Self::CREATE
        .union(Self::READ)
        .union(Self::UPDATE)
        .union(Self::DELETE)
        .union(Self::LIST);
    /// Expansion of the `sudo` policy shorthand.
    pub const SUDO_SET: Self = Self::WRITE_SET.union(Self::SUDO);

    /// Look up a single capability by its document name. `root` is not part
    /// of the document vocabulary and is rejected here.
    pub fn from_capability_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::CREATE),
            "read" => Some(Self::READ),
            "update" => Some(Self::UPDATE),
            "delete" => Some(Self::DELETE),
            "list" => Some(Self::LIST),
            "sudo" => Some(Self::SUDO),
            "deny" => Some(Self::DENY),
            _ => None,
        }
    }

    /// Expand a `policy` shorthand into its canonical capability set.
    pub fn from_shorthand(word: &str) -> Option<Self> {
        match word {
            "deny" => Some(Self::DENY),
            "read" => Some(Self::READ_SET),
            "write" => Some(Self::WRITE_SET),
            "sudo" => Some(Self::SUDO_SET),
            _ => None,
        }
    }

    /// Names of the set bits, sorted ascending.
    pub fn names(self) -> Vec<&'static str> {
        CAPABILITY_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// The operation a request performs on its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
    Help,
}

impl Operation {
    /// The capability a matched rule must carry for this operation.
    /// `help` needs none once a non-deny rule matched.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            Operation::Create => Some(Capability::CREATE),
            Operation::Read => Some(Capability::READ),
            Operation::Update => Some(Capability::UPDATE),
            Operation::Delete => Some(Capability::DELETE),
            Operation::List => Some(Capability::LIST),
            Operation::Help => None,
        }
    }

    /// Whether the operation carries body data subject to parameter
    /// allow/deny filtering.
    pub fn carries_data(self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Help => "help",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "list" => Ok(Operation::List),
            "help" => Ok(Operation::Help),
            other => Err(format!("unknown operation `{other}`")),
        }
    }
}

/// Parameter name -> value list. The value lists are retained for forward
/// compatibility; only the parameter names are consulted at request time.
pub type ParameterMap = HashMap<String, Vec<Value>>;

/// One normalized path rule: a pattern bound to a capability bitmap and
/// optional parameter filters.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRule {
    /// Pattern with any trailing `*` and leading `/` stripped.
    pub prefix: String,
    /// True iff the original pattern ended in `*`.
    pub is_glob: bool,
    pub capabilities: Capability,
    /// Absent means no allow-list constraint; present and empty means no
    /// parameter is allowed; key `"*"` means any parameter is allowed.
    pub allowed_parameters: Option<ParameterMap>,
    /// Same shape; key `"*"` means any parameter is denied.
    pub denied_parameters: Option<ParameterMap>,
}

impl PathRule {
    /// Fold `other` into `self`. Deny dominates: if either side carries the
    /// deny bit the merged rule is exactly `{deny}` with no parameter
    /// filters. Otherwise capabilities union and the parameter maps merge
    /// key-wise, keeping one representative value list per key.
    pub fn merge(&mut self, other: &PathRule) {
        if self.capabilities.contains(Capability::DENY)
            || other.capabilities.contains(Capability::DENY)
        {
            self.capabilities = Capability::DENY;
            self.allowed_parameters = None;
            self.denied_parameters = None;
            return;
        }

        self.capabilities |= other.capabilities;
        self.allowed_parameters =
            merge_parameter_maps(self.allowed_parameters.take(), other.allowed_parameters.as_ref());
        self.denied_parameters =
            merge_parameter_maps(self.denied_parameters.take(), other.denied_parameters.as_ref());
    }
}

/// Key-wise union. Absence means "no constraint from this source", so a
/// present map wins over an absent one.
fn merge_parameter_maps(
    ours: Option<ParameterMap>,
    theirs: Option<&ParameterMap>,
) -> Option<ParameterMap> {
    match (ours, theirs) {
        (None, None) => None,
        (Some(map), None) => Some(map),
        (None, Some(map)) => Some(map.clone()),
        (Some(mut merged), Some(other)) => {
            for (key, values) in other {
                merged.entry(key.clone()).or_insert_with(|| values.clone());
            }
            Some(merged)
        }
    }
}

/// A named collection of path rules in document order. Duplicate patterns
/// are permitted and merged at compile time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    pub name: String,
    pub rules: Vec<PathRule>,
}

impl Policy {
    /// The synthetic root policy. Its name cannot appear in a parsed
    /// document; compiling it produces an ACL that allows everything.
    pub fn root() -> Self {
        Self {
            name: "root".to_string(),
            rules: Vec::new(),
        }
    }
}

// ---------- Request/decision types ----------

/// A single authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// e.g. "secret/prod/db"
    pub path: String,
    pub operation: Operation,
    /// Request body parameters; only the keys are consulted.
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
}

/// The outcome of an authorization request. Never an error: "not permitted"
/// is a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// The effective rule carries `sudo`, reported independently of
    /// `allowed`.
    pub root_privileged: bool,
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct CapabilitiesRequest {
    /// e.g. "secret/prod/db"
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub capabilities: Vec<String>,
}
