//! Every line of every file as its own document.
//!
//! Index shape:
//!
//! - `file_name`: bare file name without directories, raw string, stored,
//!   matched exactly
//! - `line_number`: u64 (1-based), stored, usable in range queries
//! - `contents`: analyzed text, stored

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use tantivy::{
    IndexWriter,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::Query,
    schema::*,
};
use tracing::{info, warn};

use crate::{
    error::Result,
    query::{KeywordParser, numeric_range},
    tantivy_index::{
        SearchIndex,
        WRITER_MEMORY_BUDGET,
        analyzed_text,
        extract_text,
        extract_u64,
    },
    walker,
};

pub mod fields {
    pub const FILE_NAME: &str = "file_name";
    pub const LINE_NUMBER: &str = "line_number";
    pub const CONTENTS: &str = "contents";
}

pub fn schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(fields::FILE_NAME, STRING | STORED);
    builder.add_u64_field(fields::LINE_NUMBER, INDEXED | STORED | FAST);
    builder.add_text_field(fields::CONTENTS, analyzed_text(true));
    builder.build()
}

#[derive(Clone, Copy)]
pub struct LineFields {
    pub file_name: Field,
    pub line_number: Field,
    pub contents: Field,
}

impl LineFields {
    pub fn resolve(index: &SearchIndex) -> Result<Self> {
        Ok(Self {
            file_name: index.field(fields::FILE_NAME)?,
            line_number: index.field(fields::LINE_NUMBER)?,
            contents: index.field(fields::CONTENTS)?,
        })
    }
}

/// One matching line.
#[derive(Debug, Clone, Serialize)]
pub struct LineHit {
    pub score: f32,
    pub file_name: String,
    pub line_number: u64,
    pub contents: String,
}

impl std::fmt::Display for LineHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.file_name, self.line_number, self.contents)
    }
}

/// Adds line documents through a borrowed writer. Nothing is visible to
/// searches until the writer commits.
pub struct LineIndexer<'a> {
    writer: &'a IndexWriter,
    fields: LineFields,
}

impl<'a> LineIndexer<'a> {
    pub fn new(index: &SearchIndex, writer: &'a IndexWriter) -> Result<Self> {
        Ok(Self {
            writer,
            fields: LineFields::resolve(index)?,
        })
    }

    /// Index each line of `text` under `file_name`. Returns the number of
    /// documents added.
    pub fn index_text(&self, file_name: &str, text: &str) -> Result<usize> {
        let f = self.fields;
        let mut count = 0;
        // Line numbers are 1-based.
        for (line_number, line) in (1u64..).zip(text.lines()) {
            self.writer.add_document(doc!(
                f.file_name => file_name,
                f.line_number => line_number,
                f.contents => line,
            ))?;
            count += 1;
        }
        Ok(count)
    }

    /// Index a single file, keyed by its file name. A file that cannot be
    /// read is logged and skipped.
    pub fn index_file(&self, path: &Path) -> Result<usize> {
        let file_name = file_name_of(path);

        match std::fs::read_to_string(path) {
            Ok(text) => self.index_text(&file_name, &text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                Ok(0)
            }
        }
    }

    /// Index every non-hidden file under `dir`, keyed by file name like
    /// [`LineIndexer::index_file`].
    pub fn index_directory(&self, dir: &Path) -> Result<usize> {
        let filter = walker::file_filter(&["**/*"])?;
        let files = walker::discover_files(dir, &filter)?;
        info!(
            dir = %dir.display(),
            files = files.len(),
            "indexing subject documents"
        );

        // Read in parallel, then add sequentially through the one writer.
        let loaded: Vec<_> = files
            .par_iter()
            .filter_map(|file| {
                match std::fs::read_to_string(&file.absolute_path) {
                    Ok(text) => Some((file_name_of(&file.absolute_path), text)),
                    Err(e) => {
                        warn!(
                            path = %file.absolute_path.display(),
                            error = %e,
                            "skipping unreadable file"
                        );
                        None
                    }
                }
            })
            .collect();

        let mut count = 0;
        for (file_name, text) in &loaded {
            count += self.index_text(file_name, text)?;
        }
        Ok(count)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Index every file under `docs_dir` into `index` and commit.
pub fn build_index(index: &SearchIndex, docs_dir: &Path) -> Result<usize> {
    let mut writer: IndexWriter = index.writer(WRITER_MEMORY_BUDGET)?;
    let count = LineIndexer::new(index, &writer)?.index_directory(docs_dir)?;
    writer.commit()?;
    info!(lines = count, "indexing done");
    Ok(count)
}

/// A search to run against the line index.
#[derive(Debug, Clone, PartialEq)]
pub enum LineQuery {
    Keyword(String),
    UpToLine(u64),
}

impl std::fmt::Display for LineQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineQuery::Keyword(k) => write!(f, "'{k}'"),
            LineQuery::UpToLine(n) => write!(f, "lines {n} and earlier"),
        }
    }
}

/// The searches run when none are given on the command line.
pub fn demo_queries() -> Vec<LineQuery> {
    vec![
        LineQuery::Keyword("explorer".into()),
        LineQuery::Keyword("*fish".into()),
        // Zero hits: the analyzer does not stem, so "entities" stays as is.
        LineQuery::Keyword("entity".into()),
        LineQuery::UpToLine(2),
    ]
}

pub struct LineSearch<'a> {
    index: &'a SearchIndex,
    fields: LineFields,
}

impl<'a> LineSearch<'a> {
    pub fn new(index: &'a SearchIndex) -> Result<Self> {
        Ok(Self {
            index,
            fields: LineFields::resolve(index)?,
        })
    }

    pub fn run(&self, query: &LineQuery, limit: usize) -> Result<Vec<LineHit>> {
        match query {
            LineQuery::Keyword(k) => self.search(k, limit),
            LineQuery::UpToLine(n) => self.lines_up_to(*n, limit),
        }
    }

    /// Full-text search over `contents`. Leading wildcards are allowed.
    pub fn search(&self, keyword: &str, limit: usize) -> Result<Vec<LineHit>> {
        let query = KeywordParser::new(self.index, vec![self.fields.contents])
            .allow_leading_wildcard(true)
            .parse(keyword)?;
        self.collect(&*query, limit)
    }

    /// Lines whose number is at most `max_line`.
    pub fn lines_up_to(
        &self,
        max_line: u64,
        limit: usize,
    ) -> Result<Vec<LineHit>> {
        let query = numeric_range(self.index, fields::LINE_NUMBER, 0, max_line)?;
        self.collect(&*query, limit)
    }

    fn collect(&self, query: &dyn Query, limit: usize) -> Result<Vec<LineHit>> {
        let f = self.fields;
        let searcher = self.index.searcher()?;
        let limit = limit.min(searcher.num_docs() as usize);
        if limit == 0 {
            return Ok(vec![]);
        }
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            hits.push(LineHit {
                score,
                file_name: extract_text(&doc, f.file_name),
                line_number: extract_u64(&doc, f.line_number),
                contents: extract_text(&doc, f.contents),
            });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKY: &str = "The sky was full of strange entities.\n\
                       An explorer looked up.\n\
                       Nobody answered.\n";
    const SEA: &str = "A starfish rested on the sand.\n\
                       \n\
                       The explorer waded in after the crayfish.\n";

    fn fixture() -> (SearchIndex, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("sky.txt"), SKY).unwrap();
        std::fs::write(tmp.path().join("sea.txt"), SEA).unwrap();

        let index = SearchIndex::open_in_ram(schema()).unwrap();
        build_index(&index, tmp.path()).unwrap();
        (index, tmp)
    }

    #[test]
    fn one_document_per_line() {
        let (index, _tmp) = fixture();
        // Three lines each, including the empty one.
        assert_eq!(index.num_docs().unwrap(), 6);
    }

    #[test]
    fn keyword_search() {
        let (index, _tmp) = fixture();
        let hits = LineSearch::new(&index)
            .unwrap()
            .search("explorer", 10)
            .unwrap();

        let mut found: Vec<_> =
            hits.iter().map(|h| (h.file_name.as_str(), h.line_number)).collect();
        found.sort();
        assert_eq!(found, vec![("sea.txt", 3), ("sky.txt", 2)]);
    }

    #[test]
    fn leading_wildcard_finds_suffixes() {
        let (index, _tmp) = fixture();
        let hits = LineSearch::new(&index).unwrap().search("*fish", 10).unwrap();

        let mut lines: Vec<_> = hits.iter().map(|h| h.line_number).collect();
        lines.sort();
        assert_eq!(lines, vec![1, 3]);
        assert!(hits.iter().all(|h| h.file_name == "sea.txt"));
    }

    #[test]
    fn no_stemming_means_no_hits() {
        let (index, _tmp) = fixture();
        let hits = LineSearch::new(&index).unwrap().search("entity", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn range_search() {
        let (index, _tmp) = fixture();
        let hits = LineSearch::new(&index)
            .unwrap()
            .lines_up_to(2, 10)
            .unwrap();

        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| h.line_number <= 2));
    }

    #[test]
    fn limit_is_respected() {
        let (index, _tmp) = fixture();
        let search = LineSearch::new(&index).unwrap();
        assert_eq!(search.lines_up_to(3, 1).unwrap().len(), 1);
        assert!(search.lines_up_to(3, 0).unwrap().is_empty());
    }

    #[test]
    fn huge_limit_returns_every_hit() {
        let (index, _tmp) = fixture();
        let search = LineSearch::new(&index).unwrap();
        assert_eq!(search.lines_up_to(3, usize::MAX).unwrap().len(), 6);
        assert_eq!(search.search("explorer", usize::MAX).unwrap().len(), 2);
    }

    #[test]
    fn index_directory_uses_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("stories");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("sky.txt"), SKY).unwrap();

        let index = SearchIndex::open_in_ram(schema()).unwrap();
        build_index(&index, tmp.path()).unwrap();

        let hits = LineSearch::new(&index).unwrap().search("nobody", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_name, "sky.txt");
    }

    #[test]
    fn index_file_uses_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("stories");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("sky.txt"), SKY).unwrap();

        let index = SearchIndex::open_in_ram(schema()).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();
        let count = LineIndexer::new(&index, &writer)
            .unwrap()
            .index_file(&nested.join("sky.txt"))
            .unwrap();
        writer.commit().unwrap();

        assert_eq!(count, 3);
        let hits = LineSearch::new(&index).unwrap().search("nobody", 10).unwrap();
        assert_eq!(hits[0].file_name, "sky.txt");
        assert_eq!(hits[0].line_number, 3);
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SearchIndex::open_in_ram(schema()).unwrap();
        let writer = index.writer(15_000_000).unwrap();

        let count = LineIndexer::new(&index, &writer)
            .unwrap()
            .index_file(&tmp.path().join("missing.txt"))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn demo_queries_cover_range_and_wildcard() {
        let demo = demo_queries();
        assert!(demo.contains(&LineQuery::Keyword("*fish".into())));
        assert!(demo.contains(&LineQuery::UpToLine(2)));
    }

    #[test]
    fn hit_display() {
        let hit = LineHit {
            score: 1.0,
            file_name: "sky.txt".into(),
            line_number: 2,
            contents: "An explorer looked up.".into(),
        };
        assert_eq!(hit.to_string(), "sky.txt:2: An explorer looked up.");
    }
}
