use std::borrow::Cow;

use serde_json::Value;

use crate::acl::types::{Capability, Decision, PathRule, Request};
use crate::acl::Acl;

/// Decide whether `req` is permitted and whether the effective rule carries
/// root privilege. Pure and lock-free: any number of calls may run in
/// parallel against the same ACL.
pub fn authorize(acl: &Acl, req: &Request) -> Decision {
    if acl.root {
        return Decision {
            allowed: true,
            root_privileged: true,
        };
    }

    let path = normalize(&req.path);
    let Some(rule) = effective_rule(acl, path) else {
        return Decision {
            allowed: false,
            root_privileged: false,
        };
    };

    // Reported independently of `allowed`, but only when a rule matched.
    let root_privileged = rule.capabilities.contains(Capability::SUDO);

    if rule.capabilities.contains(Capability::DENY) {
        return Decision {
            allowed: false,
            root_privileged,
        };
    }

    if let Some(required) = req.operation.required_capability() {
        if !rule.capabilities.contains(required) {
            return Decision {
                allowed: false,
                root_privileged,
            };
        }
    }

    if req.operation.carries_data() && !parameters_permitted(&rule, &req.data) {
        return Decision {
            allowed: false,
            root_privileged,
        };
    }

    Decision {
        allowed: true,
        root_privileged,
    }
}

/// Effective capability names at `path`, sorted ascending. `["deny"]` when
/// no rule matches or the matched rule denies; `["root"]` on a root ACL.
pub fn capabilities(acl: &Acl, path: &str) -> Vec<String> {
    if acl.root {
        return Capability::ROOT
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
    }

    let path = normalize(path);
    let Some(rule) = effective_rule(acl, path) else {
        return vec!["deny".to_string()];
    };
    if rule.capabilities.contains(Capability::DENY) {
        return vec!["deny".to_string()];
    }

    rule.capabilities
        .names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Select the rule governing `path`: the exact entry, the longest-prefix
/// glob entry, or, when both exist, the exact rule folded into the glob
/// rule with the compile-time merge operator (deny still dominates).
fn effective_rule<'a>(acl: &'a Acl, path: &str) -> Option<Cow<'a, PathRule>> {
    let exact = acl.exact.get(path);
    let glob = acl.glob.longest_prefix(path);

    match (exact, glob) {
        (None, None) => None,
        (Some(rule), None) | (None, Some(rule)) => Some(Cow::Borrowed(rule)),
        (Some(exact), Some(glob)) => {
            let mut merged = glob.clone();
            merged.merge(exact);
            Some(Cow::Owned(merged))
        }
    }
}

/// Denied-first parameter filtering over the request body keys.
fn parameters_permitted(rule: &PathRule, data: &serde_json::Map<String, Value>) -> bool {
    if let Some(denied) = &rule.denied_parameters {
        if denied.contains_key("*") {
            if !data.is_empty() {
                return false;
            }
        } else if data.keys().any(|key| denied.contains_key(key)) {
            return false;
        }
    }

    if let Some(allowed) = &rule.allowed_parameters {
        if !allowed.contains_key("*") && !data.keys().all(|key| allowed.contains_key(key)) {
            return false;
        }
    }

    true
}
