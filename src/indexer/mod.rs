pub mod hasher;
pub mod import_resolver;
pub mod languages;
pub mod pipeline;

pub use pipeline::{Indexer, PipelineStats};

/// A declaration discovered while walking a parse tree.
#[derive(Debug, Clone)]
pub struct ExtractedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub children: Vec<ExtractedSymbol>,
    pub references: Vec<ExtractedRef>,
}

/// A use-site discovered while walking a parse tree. `target_file_path` and
/// `target_symbol_id` are always unset at extraction time; the import
/// resolver fills them in once the full file set is known.
#[derive(Debug, Clone)]
pub struct ExtractedRef {
    pub name: String,
    pub kind: RefKind,
    pub line: usize,
    pub column: usize,
    /// Verbatim module specifier, set only for `Import` / `ReExport` / `ExportAll` / `DynamicImport`.
    pub import_source: Option<String>,
}

impl ExtractedRef {
    pub fn new(name: impl Into<String>, kind: RefKind, line: usize, column: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            column,
            import_source: None,
        }
    }

    pub fn with_import_source(mut self, source: impl Into<String>) -> Self {
        self.import_source = Some(source.into());
        self
    }
}

/// Internal symbol taxonomy produced by language extractors. Several
/// variants collapse onto the same persisted `kind` (see `db_kind`) — the
/// extra granularity (Struct vs Class, Trait vs Interface, ...) only
/// matters while building a signature/doc string for a given language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Fn,
    Method,
    Class,
    Struct,
    Interface,
    Trait,
    Type,
    Enum,
    EnumMember,
    Mod,
    Namespace,
    Const,
    Var,
    Property,
}

impl SymbolKind {
    /// Maps onto the closed set the store persists: function, class,
    /// interface, type, variable, constant, method, property, module,
    /// namespace, enum, enum_member.
    pub fn db_kind(&self) -> &'static str {
        match self {
            Self::Fn => "function",
            Self::Method => "method",
            Self::Class | Self::Struct => "class",
            Self::Interface | Self::Trait => "interface",
            Self::Type => "type",
            Self::Enum => "enum",
            Self::EnumMember => "enum_member",
            Self::Mod => "module",
            Self::Namespace => "namespace",
            Self::Const => "constant",
            Self::Var => "variable",
            Self::Property => "property",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.db_kind())
    }
}

/// The canonical reference-type union (the source repo's schema grew this
/// set across migrations; a fresh implementation adopts the union).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Import,
    Call,
    Extends,
    Implements,
    PropertyAccess,
    TypeReference,
    VariableReference,
    ReExport,
    ExportAll,
    DynamicImport,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Call => "call",
            Self::Extends => "extends",
            Self::Implements => "implements",
            Self::PropertyAccess => "property_access",
            Self::TypeReference => "type_reference",
            Self::VariableReference => "variable_reference",
            Self::ReExport => "re_export",
            Self::ExportAll => "export_all",
            Self::DynamicImport => "dynamic_import",
        }
    }

    pub fn is_import_like(&self) -> bool {
        matches!(
            self,
            Self::Import | Self::ReExport | Self::ExportAll | Self::DynamicImport
        )
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "import" => Self::Import,
            "call" => Self::Call,
            "extends" => Self::Extends,
            "implements" => Self::Implements,
            "property_access" => Self::PropertyAccess,
            "type_reference" => Self::TypeReference,
            "variable_reference" => Self::VariableReference,
            "re_export" => Self::ReExport,
            "export_all" => Self::ExportAll,
            "dynamic_import" => Self::DynamicImport,
            _ => return None,
        })
    }
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn count_symbols(sym: &ExtractedSymbol) -> usize {
    1 + sym.children.iter().map(count_symbols).sum::<usize>()
}

pub(crate) fn count_refs(sym: &ExtractedSymbol) -> usize {
    sym.references.len() + sym.children.iter().map(count_refs).sum::<usize>()
}
