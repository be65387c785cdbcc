use std::path::Path;

use crate::acl::errors::AclError;
use crate::acl::policy::parse_policy;
use crate::acl::trie::PathTrie;
use crate::acl::types::Policy;
use crate::acl::Acl;

/// Load all `.kdl` policy files from the given directory, in sorted order,
/// returning the policies together with the number of files read. A
/// document that omits the `name` key is named after its file stem; the
/// name `root` is rejected either way.
pub fn load_policies(dir: &Path) -> Result<(Vec<Policy>, usize), AclError> {
    if !dir.is_dir() {
        return Err(AclError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut policies = Vec::new();
    let mut file_count = 0;
    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AclError::PolicyLoad {
                path: path.display().to_string(),
                source,
            })?;
        let mut policy = parse_policy(&contents)?;
        if policy.name.is_empty() {
            policy.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        if policy.name == "root" {
            return Err(AclError::InvalidPolicy(format!(
                "policy file `{}` uses the reserved name `root`",
                path.display()
            )));
        }
        policies.push(policy);
        file_count += 1;
    }

    Ok((policies, file_count))
}

/// Load and compile a policy directory into a single immutable [`Acl`].
pub fn load_acl(dir: &Path) -> Result<Acl, AclError> {
    let (policies, file_count) = load_policies(dir)?;
    let acl = compile(&policies);

    tracing::info!(
        files = file_count,
        policies = policies.len(),
        exact_rules = acl.exact.len(),
        glob_rules = acl.glob.len(),
        "Loaded access control policies"
    );

    Ok(acl)
}

/// Compile policies into an [`Acl`]: shard every rule into the exact or
/// glob trie by its `is_glob` flag and merge duplicates on the same key.
/// The result is independent of policy and rule order for every request
/// the engine can be asked about.
pub fn compile(policies: &[Policy]) -> Acl {
    // The synthetic root policy short-circuits everything.
    if policies.iter().any(|p| p.name == "root" && p.rules.is_empty()) {
        return Acl {
            root: true,
            exact: PathTrie::new(),
            glob: PathTrie::new(),
        };
    }

    let mut exact = PathTrie::new();
    let mut glob = PathTrie::new();

    for policy in policies {
        for rule in &policy.rules {
            let trie = if rule.is_glob { &mut glob } else { &mut exact };
            match trie.get_mut(&rule.prefix) {
                Some(existing) => existing.merge(rule),
                None => trie.insert(&rule.prefix, rule.clone()),
            }
        }
    }

    Acl {
        root: false,
        exact,
        glob,
    }
}
