//! Maps each raw `import` / `re_export` reference's textual specifier to a
//! concrete repo-root-relative file path.
//!
//! Resolution never touches the filesystem beyond the one-time path-alias
//! discovery walk — everything else is matched against the file set the
//! pipeline already discovered, so a repeat run is deterministic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

const JS_LIKE_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];
const RESOLUTION_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "py", "rs", "go"];
const INDEX_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// A discovered `prefix/* -> target/*` path-alias mapping, already
/// normalised to repo-root-relative.
#[derive(Debug, Clone)]
pub struct PathAlias {
    pub prefix: String,
    pub target_rel: String,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    pub aliases: Vec<PathAlias>,
}

impl AliasTable {
    /// Walk from `root` breadth-first (skipping vendored/dependency
    /// directories) for the first project config file declaring path
    /// aliases, per §4.5. The discovered config's directory becomes
    /// `alias_base`; targets are resolved under it and normalised back to
    /// repo-root-relative before being recorded.
    pub fn discover(root: &Path) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let walker = WalkBuilder::new(root)
            .max_depth(Some(6))
            .hidden(false)
            .git_ignore(true)
            .build();
        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                let name = entry.file_name().to_string_lossy();
                if name == "tsconfig.json" || name == "jsconfig.json" {
                    candidates.push(entry.path().to_path_buf());
                }
            }
        }
        // Breadth-first == shallowest path wins; tie-break lexically for determinism.
        candidates.sort_by_key(|p| (p.components().count(), p.clone()));

        for config_path in candidates {
            if let Some(table) = Self::parse_config(root, &config_path) {
                if !table.aliases.is_empty() {
                    return table;
                }
            }
        }
        Self::default()
    }

    fn parse_config(root: &Path, config_path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(config_path).ok()?;
        let stripped = strip_jsonc(&text);
        let value: serde_json::Value = serde_json::from_str(&stripped).ok()?;
        let paths = value
            .get("compilerOptions")
            .and_then(|c| c.get("paths"))
            .and_then(|p| p.as_object())?;

        let alias_base = config_path.parent().unwrap_or(root);
        let base_url = value
            .get("compilerOptions")
            .and_then(|c| c.get("baseUrl"))
            .and_then(|b| b.as_str())
            .map(|b| alias_base.join(b))
            .unwrap_or_else(|| alias_base.to_path_buf());

        let mut aliases = Vec::new();
        for (key, targets) in paths {
            let Some(prefix) = key.strip_suffix("/*") else {
                continue;
            };
            let Some(target) = targets
                .as_array()
                .and_then(|a| a.first())
                .and_then(|t| t.as_str())
                .and_then(|t| t.strip_suffix("/*"))
            else {
                continue;
            };
            let abs_target = base_url.join(target);
            let Ok(rel) = abs_target.strip_prefix(root) else {
                continue;
            };
            aliases.push(PathAlias {
                prefix: prefix.to_string(),
                target_rel: normalize_rel(rel),
            });
        }
        Some(Self { aliases })
    }

    fn match_prefix<'a>(&'a self, specifier: &str) -> Option<(&'a PathAlias, &'a str)> {
        self.aliases.iter().find_map(|alias| {
            let with_slash = format!("{}/", alias.prefix);
            specifier
                .strip_prefix(&with_slash)
                .map(|rest| (alias, rest))
        })
    }
}

/// Strip `//` line comments and trailing commas so a tsconfig-style JSONC
/// file parses with `serde_json`. Good enough for the configs this resolver
/// actually needs to read (no block comments inside string literals).
fn strip_jsonc(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ',' => {
                // Drop the comma if only whitespace follows before a closing bracket.
                let mut lookahead = chars.clone();
                let mut next_significant = None;
                while let Some(&c) = lookahead.peek() {
                    if c.is_whitespace() {
                        lookahead.next();
                    } else {
                        next_significant = Some(c);
                        break;
                    }
                }
                let trailing = matches!(next_significant, Some('}') | Some(']'));
                if !trailing {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn normalize_rel(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                parts.pop();
            }
            std::path::Component::Normal(n) => parts.push(n.to_string_lossy().replace('\\', "/")),
            _ => {}
        }
    }
    parts.join("/")
}

/// Normalize `dir(from) + specifier` into a repo-root-relative path,
/// collapsing `.`/`..` segments. Returns `None` if the result would escape
/// the repo root.
fn normalize_relative_import(from_file: &str, specifier: &str) -> Option<String> {
    let from_dir = Path::new(from_file).parent().unwrap_or(Path::new(""));
    let joined = from_dir.join(specifier);
    let mut parts: Vec<&str> = Vec::new();
    for comp in joined.components() {
        match comp {
            std::path::Component::ParentDir => {
                if parts.pop().is_none() {
                    return None;
                }
            }
            std::path::Component::CurDir => {}
            std::path::Component::Normal(n) => parts.push(n.to_str()?),
            _ => {}
        }
    }
    Some(parts.join("/"))
}

/// Try each extension-substitution rule from §4.5 step 4 and return the
/// first candidate present in `known_files`.
fn resolve_candidate(
    candidate: &str,
    known_files: &std::collections::HashSet<String>,
) -> Option<String> {
    if known_files.contains(candidate) {
        return Some(candidate.to_string());
    }

    if let Some(stem) = JS_LIKE_EXTENSIONS
        .iter()
        .find_map(|ext| candidate.strip_suffix(&format!(".{ext}")))
    {
        for ts_ext in ["ts", "tsx"] {
            let alt = format!("{stem}.{ts_ext}");
            if known_files.contains(&alt) {
                return Some(alt);
            }
        }
    }

    let has_known_ext = RESOLUTION_EXTENSIONS
        .iter()
        .chain(JS_LIKE_EXTENSIONS)
        .any(|ext| candidate.ends_with(&format!(".{ext}")));
    if !has_known_ext {
        for ext in RESOLUTION_EXTENSIONS {
            let alt = format!("{candidate}.{ext}");
            if known_files.contains(&alt) {
                return Some(alt);
            }
        }
        for ext in INDEX_EXTENSIONS {
            let alt = format!("{candidate}/index.{ext}");
            if known_files.contains(&alt) {
                return Some(alt);
            }
        }
    }

    None
}

/// Resolve one `importSource` string against the known file set. Returns
/// the repo-root-relative target path, or `None` for an external/unresolved
/// specifier.
pub fn resolve_import(
    import_source: &str,
    from_file: &str,
    aliases: &AliasTable,
    known_files: &std::collections::HashSet<String>,
) -> Option<String> {
    let candidate = if import_source.starts_with("./") || import_source.starts_with("../") {
        normalize_relative_import(from_file, import_source)?
    } else if let Some((alias, rest)) = aliases.match_prefix(import_source) {
        format!("{}/{}", alias.target_rel, rest)
    } else {
        return None;
    };
    resolve_candidate(&candidate, known_files)
}

/// Resolve every raw reference collected during extraction. Call-type and
/// type-position references are resolved by unambiguous name lookup;
/// import-like references go through `resolve_import`.
pub struct ResolverInput<'a> {
    pub root: &'a Path,
    pub known_files: &'a std::collections::HashSet<String>,
    /// name -> file declaring it, only present when exactly one file does.
    pub unambiguous_symbols: &'a HashMap<String, String>,
}

pub struct ResolvedRef {
    pub target_file_path: Option<String>,
    pub target_symbol_file: Option<String>,
}

pub fn resolve(
    input: &ResolverInput,
    aliases: &AliasTable,
    from_file: &str,
    ref_kind: crate::indexer::RefKind,
    symbol_name: &str,
    import_source: Option<&str>,
) -> ResolvedRef {
    use crate::indexer::RefKind;

    if ref_kind.is_import_like() {
        let target = import_source
            .and_then(|spec| resolve_import(spec, from_file, aliases, input.known_files));
        return ResolvedRef {
            target_file_path: target,
            target_symbol_file: None,
        };
    }

    if matches!(
        ref_kind,
        RefKind::Call
            | RefKind::TypeReference
            | RefKind::Extends
            | RefKind::Implements
            | RefKind::VariableReference
    ) {
        if let Some(file) = input.unambiguous_symbols.get(symbol_name) {
            return ResolvedRef {
                target_file_path: None,
                target_symbol_file: Some(file.clone()),
            };
        }
    }

    ResolvedRef {
        target_file_path: None,
        target_symbol_file: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolves_relative_import_with_extension() {
        let known: HashSet<String> = ["src/api/routes.ts".to_string()].into_iter().collect();
        let aliases = AliasTable::default();
        let resolved = resolve_import("../api/routes", "src/app/index.ts", &aliases, &known);
        assert_eq!(resolved, Some("src/api/routes.ts".to_string()));
    }

    #[test]
    fn resolves_alias_with_js_to_ts_substitution() {
        let known: HashSet<String> = ["src/api/routes.ts".to_string()].into_iter().collect();
        let aliases = AliasTable {
            aliases: vec![PathAlias {
                prefix: "@api".to_string(),
                target_rel: "src/api".to_string(),
            }],
        };
        let resolved = resolve_import("@api/routes.js", "src/index.ts", &aliases, &known);
        assert_eq!(resolved, Some("src/api/routes.ts".to_string()));
    }

    #[test]
    fn external_specifier_is_unresolved() {
        let known: HashSet<String> = HashSet::new();
        let aliases = AliasTable::default();
        assert_eq!(
            resolve_import("react", "src/index.ts", &aliases, &known),
            None
        );
    }

    #[test]
    fn extensionless_relative_import_tries_ts_first() {
        let known: HashSet<String> = ["src/util.ts".to_string()].into_iter().collect();
        let aliases = AliasTable::default();
        let resolved = resolve_import("./util", "src/index.ts", &aliases, &known);
        assert_eq!(resolved, Some("src/util.ts".to_string()));
    }

    #[test]
    fn index_file_resolution() {
        let known: HashSet<String> = ["src/widgets/index.ts".to_string()].into_iter().collect();
        let aliases = AliasTable::default();
        let resolved = resolve_import("./widgets", "src/app.ts", &aliases, &known);
        assert_eq!(resolved, Some("src/widgets/index.ts".to_string()));
    }
}
