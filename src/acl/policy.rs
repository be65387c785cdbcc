use kdl::{KdlDocument, KdlNode, KdlValue};
use serde_json::Value;

use crate::acl::errors::AclError;
use crate::acl::types::{Capability, ParameterMap, PathRule, Policy};

/// Parse a KDL policy document into a [`Policy`].
///
/// Validation failures are accumulated across the whole document and
/// returned as one aggregate error; no partial policy is produced. The
/// `name` key is optional here: the loader names a policy after its file
/// stem when the document omits it.
pub fn parse_policy(source: &str) -> Result<Policy, AclError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AclError::KdlParse(e.to_string()))?;

    let mut errors = Vec::new();
    let mut name = String::new();
    let mut rules = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "name" => match first_string_arg(node) {
                Some(value) if value == "root" => {
                    errors.push("policy name 'root' is reserved".to_string());
                }
                Some(value) => name = value,
                None => errors.push(format!(
                    "key 'name' requires a string value on line {}",
                    line_of(source, node)
                )),
            },
            "path" => {
                if let Some(rule) = parse_path_block(source, node, &mut errors) {
                    rules.push(rule);
                }
            }
            other => errors.push(format!(
                "invalid key '{}' on line {}",
                other,
                line_of(source, node)
            )),
        }
    }

    if !errors.is_empty() {
        return Err(AclError::Validation(errors));
    }

    Ok(Policy { name, rules })
}

/// Parse one `path "<pattern>" { ... }` block into a normalized rule.
/// Returns `None` when the block is too broken to normalize; the specific
/// failures are pushed onto `errors` either way.
fn parse_path_block(source: &str, node: &KdlNode, errors: &mut Vec<String>) -> Option<PathRule> {
    let Some(pattern) = first_string_arg(node) else {
        errors.push(format!(
            "path block requires a pattern string on line {}",
            line_of(source, node)
        ));
        return None;
    };

    let mut capabilities = Capability::empty();
    let mut allowed_parameters = None;
    let mut denied_parameters = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "policy" => match first_string_arg(child) {
                    Some(word) => match Capability::from_shorthand(&word) {
                        Some(set) => capabilities |= set,
                        None => {
                            errors.push(format!("path \"{pattern}\": invalid policy '{word}'"));
                        }
                    },
                    None => errors.push(format!(
                        "path \"{pattern}\": `policy` requires a string value"
                    )),
                },
                "capabilities" => {
                    for entry in child.entries().iter().filter(|e| e.name().is_none()) {
                        match entry.value().as_string() {
                            Some(name) => match Capability::from_capability_name(name) {
                                Some(capability) => capabilities |= capability,
                                None => errors.push(format!(
                                    "path \"{pattern}\": invalid capability '{name}'"
                                )),
                            },
                            None => errors.push(format!(
                                "path \"{pattern}\": invalid capability '{}'",
                                entry.value()
                            )),
                        }
                    }
                }
                "permissions" => {
                    if let Some(blocks) = child.children() {
                        for block in blocks.nodes() {
                            match block.name().value() {
                                "allowedparameters" => {
                                    allowed_parameters = Some(parameter_map(block));
                                }
                                "deniedparameters" => {
                                    denied_parameters = Some(parameter_map(block));
                                }
                                other => errors.push(format!(
                                    "invalid key '{}' on line {}",
                                    other,
                                    line_of(source, block)
                                )),
                            }
                        }
                    }
                }
                other => errors.push(format!(
                    "invalid key '{}' on line {}",
                    other,
                    line_of(source, child)
                )),
            }
        }
    }

    // Deny terminates: collapse to exactly {deny} and drop any filters.
    if capabilities.contains(Capability::DENY) {
        capabilities = Capability::DENY;
        allowed_parameters = None;
        denied_parameters = None;
    }

    let trimmed = pattern.strip_prefix('/').unwrap_or(&pattern);
    let (prefix, is_glob) = match trimmed.strip_suffix('*') {
        Some(prefix) => (prefix, true),
        None => (trimmed, false),
    };

    Some(PathRule {
        prefix: prefix.to_string(),
        is_glob,
        capabilities,
        allowed_parameters,
        denied_parameters,
    })
}

/// Collect a parameter block. Each child node's name is a parameter name
/// (`"*"` for the wildcard) and its arguments form the value list. An empty
/// block yields an empty map, which is a real constraint and never a
/// wildcard.
fn parameter_map(node: &KdlNode) -> ParameterMap {
    let Some(children) = node.children() else {
        return ParameterMap::new();
    };
    children
        .nodes()
        .iter()
        .map(|param| {
            let values = param
                .entries()
                .iter()
                .filter(|e| e.name().is_none())
                .map(|e| kdl_value_to_json(e.value()))
                .collect();
            (param.name().value().to_string(), values)
        })
        .collect()
}

/// Extract the first positional string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn kdl_value_to_json(value: &KdlValue) -> Value {
    match value {
        KdlValue::String(s) | KdlValue::RawString(s) => Value::String(s.clone()),
        KdlValue::Base2(n) | KdlValue::Base8(n) | KdlValue::Base10(n) | KdlValue::Base16(n) => {
            Value::from(*n)
        }
        KdlValue::Base10Float(f) => Value::from(*f),
        KdlValue::Bool(b) => Value::Bool(*b),
        KdlValue::Null => Value::Null,
    }
}

/// 1-based line of a node's name within the source text.
fn line_of(source: &str, node: &KdlNode) -> usize {
    let offset = node.name().span().offset();
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_POLICY: &str = r#"
// Developer policy
name "dev"

// Deny all paths by default
path "*" {
    policy "deny"
}

// Allow full access to staging
path "stage/*" {
    policy "sudo"
}

// Limited read privilege to production
path "prod/version" {
    policy "read"
}

// Read access to foobar
// Also tests stripping of leading slash
path "/foo/bar" {
    policy "read"
}

// Capabilities are unioned with earlier blocks when compiled into an ACL
path "foo/bar" {
    capabilities "create" "sudo"
    permissions {
        allowedparameters {
            zip
            zap
        }
    }
}

path "baz/bar" {
    capabilities "create" "sudo"
    permissions {
        deniedparameters {
            zip
            zap
        }
    }
}
"#;

    fn params(keys: &[&str]) -> ParameterMap {
        keys.iter().map(|k| (k.to_string(), Vec::new())).collect()
    }

    #[test]
    fn test_parse_full_policy() {
        let policy = parse_policy(RAW_POLICY).unwrap();
        assert_eq!(policy.name, "dev");
        assert_eq!(policy.rules.len(), 6);

        // `path "*"` normalizes to the empty glob prefix with exactly {deny}.
        let deny_all = &policy.rules[0];
        assert_eq!(deny_all.prefix, "");
        assert!(deny_all.is_glob);
        assert_eq!(deny_all.capabilities, Capability::DENY);

        let stage = &policy.rules[1];
        assert_eq!(stage.prefix, "stage/");
        assert!(stage.is_glob);
        assert_eq!(stage.capabilities, Capability::SUDO_SET);

        let prod = &policy.rules[2];
        assert_eq!(prod.prefix, "prod/version");
        assert!(!prod.is_glob);
        assert_eq!(prod.capabilities, Capability::READ | Capability::LIST);

        // Leading slash stripped.
        let foo = &policy.rules[3];
        assert_eq!(foo.prefix, "foo/bar");
        assert!(!foo.is_glob);
        assert_eq!(foo.capabilities, Capability::READ | Capability::LIST);

        let foo_caps = &policy.rules[4];
        assert_eq!(foo_caps.prefix, "foo/bar");
        assert_eq!(
            foo_caps.capabilities,
            Capability::CREATE | Capability::SUDO
        );
        assert_eq!(foo_caps.allowed_parameters, Some(params(&["zip", "zap"])));
        assert!(foo_caps.denied_parameters.is_none());

        let baz = &policy.rules[5];
        assert_eq!(baz.denied_parameters, Some(params(&["zip", "zap"])));
        assert!(baz.allowed_parameters.is_none());
    }

    #[test]
    fn test_parse_bad_root_keys() {
        let source = "name \"test\"\nbad \"foo\"\nnope \"yes\"";
        let err = parse_policy(source).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid key 'bad' on line 2"), "{message}");
        assert!(message.contains("invalid key 'nope' on line 3"), "{message}");
    }

    #[test]
    fn test_parse_bad_path_key() {
        let source = "path \"/\" {\n    capabilities \"read\"\n    capabilites \"read\"\n}";
        let err = parse_policy(source).unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("invalid key 'capabilites' on line 3"),
            "{message}"
        );
    }

    #[test]
    fn test_parse_bad_policy_shorthand() {
        let source = "path \"/\" {\n    policy \"banana\"\n}";
        let err = parse_policy(source).unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("path \"/\": invalid policy 'banana'"),
            "{message}"
        );
    }

    #[test]
    fn test_parse_bad_capability() {
        let source = "path \"/\" {\n    capabilities \"read\" \"banana\"\n}";
        let err = parse_policy(source).unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("path \"/\": invalid capability 'banana'"),
            "{message}"
        );
    }

    #[test]
    fn test_root_capability_not_accepted_from_text() {
        let source = "path \"sys/\" {\n    capabilities \"root\"\n}";
        let err = parse_policy(source).unwrap_err();
        assert!(
            err.to_string()
                .contains("path \"sys/\": invalid capability 'root'"),
        );
    }

    #[test]
    fn test_reserved_root_name() {
        let err = parse_policy("name \"root\"").unwrap_err();
        assert!(err.to_string().contains("policy name 'root' is reserved"));
    }

    #[test]
    fn test_deny_shorthand_ignores_explicit_capabilities() {
        let source = r#"
path "stage/aws/policy/*" {
    policy "deny"
    // This should have no effect
    capabilities "read" "update" "sudo"
}
"#;
        let policy = parse_policy(source).unwrap();
        assert_eq!(policy.rules[0].capabilities, Capability::DENY);
    }

    #[test]
    fn test_deny_drops_parameter_filters() {
        let source = r#"
path "sys/*" {
    policy "deny"
    permissions {
        allowedparameters {
            zip
        }
    }
}
"#;
        let policy = parse_policy(source).unwrap();
        let rule = &policy.rules[0];
        assert_eq!(rule.capabilities, Capability::DENY);
        assert!(rule.allowed_parameters.is_none());
        assert!(rule.denied_parameters.is_none());
    }

    #[test]
    fn test_shorthand_and_capabilities_union() {
        let source = r#"
path "stage/aws/*" {
    policy "read"
    capabilities "update" "sudo"
}
"#;
        let policy = parse_policy(source).unwrap();
        assert_eq!(
            policy.rules[0].capabilities,
            Capability::READ | Capability::LIST | Capability::UPDATE | Capability::SUDO
        );
    }

    #[test]
    fn test_empty_parameter_maps_are_present() {
        let source = r#"
path "cold/weather" {
    policy "write"
    permissions {
        allowedparameters {
        }
        deniedparameters {
        }
    }
}
"#;
        let policy = parse_policy(source).unwrap();
        let rule = &policy.rules[0];
        assert_eq!(rule.allowed_parameters, Some(ParameterMap::new()));
        assert_eq!(rule.denied_parameters, Some(ParameterMap::new()));
    }

    #[test]
    fn test_wildcard_parameter_key() {
        let source = r#"
path "rainy/day" {
    policy "write"
    permissions {
        allowedparameters {
            "*"
        }
    }
}
"#;
        let policy = parse_policy(source).unwrap();
        let allowed = policy.rules[0].allowed_parameters.as_ref().unwrap();
        assert!(allowed.contains_key("*"));
    }

    #[test]
    fn test_parameter_value_lists_retained() {
        let source = r#"
path "foo/bar" {
    policy "write"
    permissions {
        allowedparameters {
            zip "v1" "v2"
        }
    }
}
"#;
        let policy = parse_policy(source).unwrap();
        let allowed = policy.rules[0].allowed_parameters.as_ref().unwrap();
        assert_eq!(
            allowed["zip"],
            vec![Value::String("v1".into()), Value::String("v2".into())]
        );
    }

    #[test]
    fn test_internal_star_is_literal() {
        let policy = parse_policy("path \"foo/*/bar\" { policy \"read\"; }").unwrap();
        let rule = &policy.rules[0];
        assert_eq!(rule.prefix, "foo/*/bar");
        assert!(!rule.is_glob);
    }

    #[test]
    fn test_kdl_syntax_error() {
        let err = parse_policy("path \"unclosed {").unwrap_err();
        assert!(matches!(err, AclError::KdlParse(_)));
    }

    #[test]
    fn test_no_partial_policy_on_error() {
        // One valid path block alongside an invalid key: no policy comes back.
        let source = "path \"ok/*\" {\n    policy \"read\"\n}\nbogus \"x\"";
        assert!(parse_policy(source).is_err());
    }
}
