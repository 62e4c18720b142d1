//! BM25 Search Client (C3)
//!
//! Lemmatizes the query, then runs a Tantivy full-text search against a
//! per-collection lexical index. Tantivy's default BM25 scorer hardcodes
//! k1=1.2/b=0.75, matching the Lucene-standard tuning this component is
//! specified against, so no custom scorer is needed here.

use std::collections::HashMap;
use std::path::Path;

use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, TantivyDocument,
};

use crate::lemmatizer::Lemmatizer;
use crate::RagError;

const TOKENIZER_NAME: &str = "french_lexical";

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub point_id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

/// A single per-collection lexical index (C3's storage seam).
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    point_id_field: Field,
    text_field: Field,
    title_field: Field,
}

impl LexicalIndex {
    /// Opens an already-populated index at `path`. Ingestion (creating or
    /// writing to the index) is out of scope here.
    pub fn open(path: &Path) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER_NAME)
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let point_id_field = schema_builder.add_text_field("point_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let schema = schema_builder.build();

        let dir = tantivy::directory::MmapDirectory::open(path)
            .map_err(|e| RagError::Index(e.to_string()))?;
        let index =
            Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?;

        index
            .tokenizers()
            .register(TOKENIZER_NAME, Self::build_tokenizer());

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            point_id_field,
            text_field,
            title_field,
        })
    }

    /// In-memory index, used by tests and as a fallback when no on-disk
    /// index path is configured.
    pub fn create_in_ram() -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER_NAME)
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let point_id_field = schema_builder.add_text_field("point_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index
            .tokenizers()
            .register(TOKENIZER_NAME, Self::build_tokenizer());

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            point_id_field,
            text_field,
            title_field,
        })
    }

    fn build_tokenizer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .filter(Stemmer::new(Language::French))
            .build()
    }

    #[cfg(test)]
    fn index_for_test(
        &self,
        point_id: &str,
        title: &str,
        text: &str,
    ) -> Result<(), RagError> {
        let mut writer = self
            .index
            .writer(15_000_000)
            .map_err(|e| RagError::Index(e.to_string()))?;
        let mut doc = TantivyDocument::default();
        doc.add_text(self.point_id_field, point_id);
        doc.add_text(self.title_field, title);
        doc.add_text(self.text_field, text);
        writer
            .add_document(doc)
            .map_err(|e| RagError::Index(e.to_string()))?;
        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;
        self.reader.reload().map_err(|e| RagError::Index(e.to_string()))?;
        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

/// The lexical search seam (C3).
pub struct LexicalSearchClient {
    lemmatizer: Lemmatizer,
}

impl LexicalSearchClient {
    pub fn new(lemmatizer: Lemmatizer) -> Self {
        Self { lemmatizer }
    }

    /// Lemmatizes `query`, then runs BM25 search over `index`, returning
    /// up to `top_k` ranked hits in descending score order.
    #[tracing::instrument(skip(self, index, query))]
    pub fn search(
        &self,
        index: &LexicalIndex,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<LexicalHit>, RagError> {
        let top_k = top_k.clamp(1, 64);
        let normalized = self.lemmatizer.lemmatize_or_fallback(query);

        let searcher = index.reader.searcher();
        let query_parser = QueryParser::for_index(
            &index.index,
            vec![index.text_field, index.title_field],
        );

        let parsed = query_parser
            .parse_query(&normalized)
            .map_err(|e| RagError::Search(e.to_string()))?;

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(top_k))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RagError::Search(e.to_string()))?;

            let point_id = doc
                .get_first(index.point_id_field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .unwrap_or("")
                .to_string();

            let mut payload = HashMap::new();
            if let Some(OwnedValue::Str(text)) = doc.get_first(index.text_field) {
                payload.insert("text".to_string(), text.to_string());
            }
            if let Some(OwnedValue::Str(title)) = doc.get_first(index.title_field) {
                payload.insert("title".to_string(), title.to_string());
            }

            hits.push(LexicalHit {
                point_id,
                score,
                payload,
            });
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_and_searches_french_text() {
        let index = LexicalIndex::create_in_ram().unwrap();
        index
            .index_for_test("p1", "Taux d'intérêt", "Le taux d'intérêt du prêt sur gage est de 10%")
            .unwrap();
        index
            .index_for_test("p2", "Demande", "Demander un prêt sur gage en ligne facilement")
            .unwrap();
        assert_eq!(index.doc_count(), 2);

        let lemmatizer = Lemmatizer::load().unwrap();
        let client = LexicalSearchClient::new(lemmatizer);
        let results = client.search(&index, "taux d'intérêt", 5).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].point_id, "p1");
    }

    #[test]
    fn clamps_top_k_to_at_least_one() {
        let index = LexicalIndex::create_in_ram().unwrap();
        let lemmatizer = Lemmatizer::load().unwrap();
        let client = LexicalSearchClient::new(lemmatizer);
        let results = client.search(&index, "anything", 0).unwrap();
        assert!(results.is_empty());
    }
}
