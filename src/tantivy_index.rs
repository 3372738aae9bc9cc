use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    Searcher,
    TantivyDocument,
    schema::*,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the analyzer registered on every index.
pub const STANDARD_ANALYZER: &str = "standard";

/// Writer heap size used by the indexers in this crate.
pub const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// Text options for a tokenized field analyzed with [`STANDARD_ANALYZER`].
pub fn analyzed_text(stored: bool) -> TextOptions {
    let opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(STANDARD_ANALYZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    if stored { opts.set_stored() } else { opts }
}

/// Wraps a tantivy index with its reader and schema.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

/// Split on non-alphanumeric characters, drop very long tokens, lowercase.
/// No stemming: `entity` does not match `entities`.
fn register_tokenizers(index: &Index) {
    let standard = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(255))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(STANDARD_ANALYZER, standard);
}

impl SearchIndex {
    /// Open or create a search index at the given directory.
    pub fn open(dir: &Path, schema: Schema) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        Self::from_index(index)
    }

    /// Create an empty index at `dir`, discarding any index files already
    /// there.
    pub fn recreate(dir: &Path, schema: Schema) -> Result<Self> {
        if dir.exists() {
            debug!(dir = %dir.display(), "removing existing index files");
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;

        let index = Index::create_in_dir(dir, schema)?;
        Self::from_index(index)
    }

    /// Create an in-memory search index.
    pub fn open_in_ram(schema: Schema) -> Result<Self> {
        let index = Index::create_in_ram(schema);
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let schema = index.schema();
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Resolve a field handle by name.
    pub fn field(&self, name: &str) -> Result<Field> {
        self.schema.get_field(name).map_err(|_| Error::NotFound {
            kind: "field",
            name: name.to_string(),
        })
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// A searcher over everything committed so far.
    pub fn searcher(&self) -> Result<Searcher> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    /// Number of documents visible to a fresh searcher.
    pub fn num_docs(&self) -> Result<u64> {
        Ok(self.searcher()?.num_docs())
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

pub fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

pub fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use tantivy::{collector::TopDocs, doc, query::QueryParser};

    use super::*;

    fn test_schema() -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field("id", STRING | STORED);
        builder.add_text_field("body", analyzed_text(true));
        builder.build()
    }

    fn add(idx: &SearchIndex, writer: &IndexWriter, id: &str, body: &str) {
        let f_id = idx.field("id").unwrap();
        let f_body = idx.field("body").unwrap();
        writer
            .add_document(doc!(f_id => id, f_body => body))
            .unwrap();
    }

    fn count(idx: &SearchIndex, query: &str) -> usize {
        let body = idx.field("body").unwrap();
        let parser = QueryParser::for_index(idx.index(), vec![body]);
        let query = parser.parse_query(query).unwrap();
        idx.searcher()
            .unwrap()
            .search(&query, &TopDocs::with_limit(100))
            .unwrap()
            .len()
    }

    #[test]
    fn create_and_search_in_ram() {
        let idx = SearchIndex::open_in_ram(test_schema()).unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        add(&idx, &writer, "a", "The Explorer sailed north");
        add(&idx, &writer, "b", "A quiet harbour");
        writer.commit().unwrap();

        assert_eq!(idx.num_docs().unwrap(), 2);
        assert_eq!(count(&idx, "explorer"), 1);
        assert_eq!(count(&idx, "EXPLORER"), 1);
    }

    #[test]
    fn no_stemming() {
        let idx = SearchIndex::open_in_ram(test_schema()).unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        add(&idx, &writer, "a", "strange entities drifted past");
        writer.commit().unwrap();

        assert_eq!(count(&idx, "entities"), 1);
        assert_eq!(count(&idx, "entity"), 0);
    }

    #[test]
    fn unknown_field_is_not_found() {
        let idx = SearchIndex::open_in_ram(test_schema()).unwrap();
        let err = idx.field("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "field", .. }));
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let idx = SearchIndex::open(&dir, test_schema()).unwrap();
            let mut writer = idx.writer(15_000_000).unwrap();
            add(&idx, &writer, "a", "persistent data");
            writer.commit().unwrap();
        }

        {
            let idx = SearchIndex::open(&dir, test_schema()).unwrap();
            assert_eq!(count(&idx, "persistent"), 1);
        }
    }

    #[test]
    fn recreate_discards_existing_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let idx = SearchIndex::open(&dir, test_schema()).unwrap();
            let mut writer = idx.writer(15_000_000).unwrap();
            add(&idx, &writer, "a", "stale data");
            writer.commit().unwrap();
        }

        let idx = SearchIndex::recreate(&dir, test_schema()).unwrap();
        assert_eq!(idx.num_docs().unwrap(), 0);
        assert_eq!(count(&idx, "stale"), 0);
    }
}
