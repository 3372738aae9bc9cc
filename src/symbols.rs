//! Scan Rust sources for named items and search them from an in-memory
//! index.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use syn::ext::IdentExt;
use tantivy::{
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::*,
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    query::{KeywordParser, has_wildcard},
    tantivy_index::{
        SearchIndex,
        WRITER_MEMORY_BUDGET,
        analyzed_text,
        extract_text,
    },
    walker,
};

/// Crate name used for sources that do not belong to any package.
pub const UNNAMED_CRATE: &str = "unnamed";

/// Per-field hit limit.
pub const DEFAULT_LIMIT: usize = 2000;

pub mod fields {
    pub const ITEM_NAME: &str = "item_name";
    pub const MODULE_PATH: &str = "module_path";
    pub const CRATE_NAME: &str = "crate_name";
    pub const KIND: &str = "kind";
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Struct,
    Enum,
    Union,
    Trait,
    Type,
    Fn,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Union => "union",
            SymbolKind::Trait => "trait",
            SymbolKind::Type => "type",
            SymbolKind::Fn => "fn",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "struct" => Some(SymbolKind::Struct),
            "enum" => Some(SymbolKind::Enum),
            "union" => Some(SymbolKind::Union),
            "trait" => Some(SymbolKind::Trait),
            "type" => Some(SymbolKind::Type),
            "fn" => Some(SymbolKind::Fn),
            _ => None,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named item found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub item_name: String,
    pub module_path: String,
    pub crate_name: String,
    pub kind: SymbolKind,
}

// -- Scanning --

#[derive(Deserialize)]
struct Manifest {
    package: Option<Package>,
}

#[derive(Deserialize)]
struct Package {
    name: String,
}

#[derive(Debug, Clone)]
struct CrateInfo {
    name: String,
    root: PathBuf,
}

/// Read `[package].name` from a Cargo manifest. Workspace-only manifests
/// yield `None`.
fn read_package_name(manifest: &Path) -> Result<Option<String>> {
    let text = std::fs::read_to_string(manifest)?;
    let parsed: Manifest =
        toml::from_str(&text).map_err(|source| Error::Manifest {
            path: manifest.to_path_buf(),
            source,
        })?;
    Ok(parsed.package.map(|p| p.name))
}

/// Find the package owning `dir` by walking up to the nearest manifest
/// that declares one. Results are memoized per directory.
fn owning_crate(
    dir: &Path,
    cache: &mut HashMap<PathBuf, Option<CrateInfo>>,
) -> Option<CrateInfo> {
    if let Some(hit) = cache.get(dir) {
        return hit.clone();
    }

    let manifest = dir.join("Cargo.toml");
    let own = if manifest.is_file() {
        match read_package_name(&manifest) {
            Ok(name) => name.map(|name| CrateInfo {
                name,
                root: dir.to_path_buf(),
            }),
            Err(e) => {
                warn!(error = %e, "ignoring manifest");
                None
            }
        }
    } else {
        None
    };

    let info = own.or_else(|| dir.parent().and_then(|p| owning_crate(p, cache)));
    cache.insert(dir.to_path_buf(), info.clone());
    info
}

/// Module segments implied by a file's location relative to its crate's
/// `src/` directory (or the crate root for files outside `src/`).
fn module_segments(relative: &Path) -> Vec<String> {
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    if let Some(last) = segments.pop() {
        let stem = last.strip_suffix(".rs").unwrap_or(&last).to_string();
        let is_root = segments.is_empty() && (stem == "lib" || stem == "main");
        if !is_root && stem != "mod" {
            segments.push(stem);
        }
    }

    segments
}

fn base_module_path(file: &Path, krate: Option<&CrateInfo>) -> String {
    let (crate_ident, relative) = match krate {
        Some(info) => {
            let src = info.root.join("src");
            let relative = file
                .strip_prefix(&src)
                .or_else(|_| file.strip_prefix(&info.root))
                .unwrap_or(file);
            (info.name.replace('-', "_"), relative.to_path_buf())
        }
        None => (
            UNNAMED_CRATE.to_string(),
            file.file_name().map(PathBuf::from).unwrap_or_default(),
        ),
    };

    std::iter::once(crate_ident)
        .chain(module_segments(&relative))
        .collect::<Vec<_>>()
        .join("::")
}

fn collect_items(
    items: &[syn::Item],
    module_path: &str,
    crate_name: &str,
    out: &mut Vec<Symbol>,
) {
    for item in items {
        let (ident, kind) = match item {
            syn::Item::Struct(i) => (&i.ident, SymbolKind::Struct),
            syn::Item::Enum(i) => (&i.ident, SymbolKind::Enum),
            syn::Item::Union(i) => (&i.ident, SymbolKind::Union),
            syn::Item::Trait(i) => (&i.ident, SymbolKind::Trait),
            syn::Item::Type(i) => (&i.ident, SymbolKind::Type),
            syn::Item::Fn(i) => (&i.sig.ident, SymbolKind::Fn),
            syn::Item::Mod(m) => {
                if let Some((_, inner)) = &m.content {
                    let path = format!("{module_path}::{}", m.ident.unraw());
                    collect_items(inner, &path, crate_name, out);
                }
                continue;
            }
            _ => continue,
        };

        out.push(Symbol {
            item_name: ident.unraw().to_string(),
            module_path: module_path.to_string(),
            crate_name: crate_name.to_string(),
            kind,
        });
    }
}

/// Parse one source file and return the items it declares.
pub fn scan_source(
    source: &str,
    module_path: &str,
    crate_name: &str,
) -> std::result::Result<Vec<Symbol>, syn::Error> {
    let file = syn::parse_file(source)?;
    let mut out = Vec::new();
    collect_items(&file.items, module_path, crate_name, &mut out);
    Ok(out)
}

/// Discover every `.rs` file under `root` and extract its items. Files that
/// cannot be read or parsed are logged and skipped.
pub fn scan_crate_sources(root: &Path) -> Result<Vec<Symbol>> {
    let filter = walker::file_filter(&["**/*.rs"])?;
    let files = walker::discover_files(root, &filter)?;
    info!(root = %root.display(), files = files.len(), "scanning Rust sources");

    let mut cache = HashMap::new();
    let jobs: Vec<(PathBuf, String, String)> = files
        .into_iter()
        .map(|file| {
            let dir = file.absolute_path.parent().unwrap_or(Path::new("/"));
            let krate = owning_crate(dir, &mut cache);
            let module_path = base_module_path(&file.absolute_path, krate.as_ref());
            let crate_name = krate
                .map(|k| k.name)
                .unwrap_or_else(|| UNNAMED_CRATE.to_string());
            (file.absolute_path, module_path, crate_name)
        })
        .collect();

    let symbols: Vec<Symbol> = jobs
        .par_iter()
        .flat_map_iter(|(path, module_path, crate_name)| {
            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    return Vec::new();
                }
            };
            match scan_source(&source, module_path, crate_name) {
                Ok(found) => found,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable file");
                    Vec::new()
                }
            }
        })
        .collect();

    info!(symbols = symbols.len(), "scan done");
    Ok(symbols)
}

// -- Index --

#[derive(Clone, Copy)]
struct SymbolFields {
    item_name: Field,
    module_path: Field,
    crate_name: Field,
    kind: Field,
}

pub fn schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(fields::ITEM_NAME, analyzed_text(true));
    builder.add_text_field(fields::MODULE_PATH, analyzed_text(true));
    builder.add_text_field(fields::CRATE_NAME, analyzed_text(true));
    builder.add_text_field(fields::KIND, STRING | STORED);
    builder.build()
}

/// Which field a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    ItemName,
    ModulePath,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolHit {
    pub score: f32,
    pub matched_on: MatchedField,
    #[serde(flatten)]
    pub symbol: Symbol,
}

impl std::fmt::Display for SymbolHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.symbol;
        write!(
            f,
            "{} {} in {} (crate {})",
            s.kind, s.item_name, s.module_path, s.crate_name
        )
    }
}

/// Symbols held in an in-memory index.
pub struct SymbolIndex {
    index: SearchIndex,
    fields: SymbolFields,
}

impl SymbolIndex {
    /// Index `symbols` into a fresh in-memory index.
    pub fn build(symbols: &[Symbol]) -> Result<Self> {
        let index = SearchIndex::open_in_ram(schema())?;
        let fields = SymbolFields {
            item_name: index.field(fields::ITEM_NAME)?,
            module_path: index.field(fields::MODULE_PATH)?,
            crate_name: index.field(fields::CRATE_NAME)?,
            kind: index.field(fields::KIND)?,
        };

        let mut writer: IndexWriter = index.writer(WRITER_MEMORY_BUDGET)?;
        for symbol in symbols {
            writer.add_document(doc!(
                fields.item_name => symbol.item_name.as_str(),
                fields.module_path => symbol.module_path.as_str(),
                fields.crate_name => symbol.crate_name.as_str(),
                fields.kind => symbol.kind.as_str(),
            ))?;
        }
        writer.commit()?;
        info!(symbols = symbols.len(), "indexing done");

        Ok(Self { index, fields })
    }

    pub fn len(&self) -> Result<u64> {
        self.index.num_docs()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Search item names, then module paths, and return both hit lists
    /// concatenated in that order. A symbol matching on both fields
    /// appears twice, once per field.
    pub fn search(
        &self,
        keyword: &str,
        limit: usize,
        kind: Option<SymbolKind>,
    ) -> Result<Vec<SymbolHit>> {
        debug!(keyword, limit, ?kind, "searching symbols");

        let mut hits = self.search_field(
            keyword,
            self.fields.item_name,
            MatchedField::ItemName,
            limit,
            kind,
        )?;
        hits.extend(self.search_field(
            keyword,
            self.fields.module_path,
            MatchedField::ModulePath,
            limit,
            kind,
        )?);
        Ok(hits)
    }

    fn search_field(
        &self,
        keyword: &str,
        field: Field,
        matched_on: MatchedField,
        limit: usize,
        kind: Option<SymbolKind>,
    ) -> Result<Vec<SymbolHit>> {
        let f = self.fields;
        let user_query = self.keyword_query(keyword, field)?;

        let query: Box<dyn Query> = match kind {
            Some(kind) => {
                let term = Term::from_field_text(f.kind, kind.as_str());
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, user_query),
                    (
                        Occur::Must,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                    ),
                ]))
            }
            None => user_query,
        };

        let searcher = self.index.searcher()?;
        let limit = limit.min(searcher.num_docs() as usize);
        if limit == 0 {
            return Ok(vec![]);
        }
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let kind_str = extract_text(&doc, f.kind);
            let Some(kind) = SymbolKind::parse(&kind_str) else {
                warn!(kind = %kind_str, "unknown symbol kind in index");
                continue;
            };
            hits.push(SymbolHit {
                score,
                matched_on,
                symbol: Symbol {
                    item_name: extract_text(&doc, f.item_name),
                    module_path: extract_text(&doc, f.module_path),
                    crate_name: extract_text(&doc, f.crate_name),
                    kind,
                },
            });
        }
        Ok(hits)
    }

    /// `a::b` would otherwise read as field `a`. Plain paths are searched
    /// as a phrase; paths with wildcards require every segment to match.
    fn keyword_query(&self, keyword: &str, field: Field) -> Result<Box<dyn Query>> {
        let parser = KeywordParser::new(&self.index, vec![field]);
        let keyword = keyword.trim();
        if !keyword.contains("::") || keyword.contains('"') {
            return parser.parse(keyword);
        }
        if !has_wildcard(keyword) {
            return parser.parse(&format!("\"{keyword}\""));
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for segment in keyword.split("::").filter(|s| !s.trim().is_empty()) {
            clauses.push((Occur::Must, parser.parse(segment)?));
        }
        if clauses.is_empty() {
            return Err(Error::EmptyQuery);
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }
}

/// Keywords searched when none are given on the command line.
pub const DEMO_KEYWORDS: &[&str] = &["Parser", "SearchIndex", "searchlab::query"];
