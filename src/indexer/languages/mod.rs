pub mod markdown;
pub mod python;
pub mod ruby;
pub mod rust_lang;
pub mod typescript;

use crate::indexer::{ExtractedRef, ExtractedSymbol};

pub trait LanguageExtractor: Send + Sync {
    fn language(&self) -> tree_sitter::Language;
    fn extensions(&self) -> &[&str];
    /// `path` is the repo-root-relative path of the file being parsed —
    /// extractors that emit import references need it as the base for
    /// relative-specifier bookkeeping done downstream by the resolver.
    fn extract(&self, source: &[u8], tree: &tree_sitter::Tree) -> Vec<ExtractedSymbol>;
}

pub fn detect_language(ext: &str) -> Option<&'static str> {
    match ext {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => Some("typescript"),
        "py" | "pyi" => Some("python"),
        "rs" => Some("rust"),
        "rb" => Some("ruby"),
        "md" | "markdown" => Some("markdown"),
        _ => None,
    }
}

pub fn extractor_for(language: &str) -> Option<Box<dyn LanguageExtractor>> {
    match language {
        "typescript" => Some(Box::new(typescript::TypeScriptExtractor)),
        "python" => Some(Box::new(python::PythonExtractor)),
        "rust" => Some(Box::new(rust_lang::RustExtractor)),
        "ruby" => Some(Box::new(ruby::RubyExtractor)),
        "markdown" => Some(Box::new(markdown::MarkdownExtractor)),
        _ => None,
    }
}

/// Module-level references (imports/requires) a language's own symbol tree
/// doesn't already carry. Markdown has none.
pub fn extract_file_level_refs(
    language: &str,
    source: &[u8],
    tree: &tree_sitter::Tree,
) -> Vec<ExtractedRef> {
    match language {
        "typescript" => typescript::extract_file_level_refs(source, tree),
        "python" => python::extract_file_level_refs(source, tree),
        "rust" => rust_lang::extract_file_level_refs(source, tree),
        "ruby" => ruby::extract_file_level_refs(source, tree),
        _ => Vec::new(),
    }
}
