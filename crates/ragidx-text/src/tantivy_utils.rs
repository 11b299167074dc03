use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::Index;

use ragidx_core::{Error, Result};

pub const ID_FIELD: &str = "id";
pub const TEXT_FIELD: &str = "text";
pub const TOKENIZER: &str = "ragidx_words";

/// `id` is the raw chunk id (exact-match, stored); `text` is analyzed only.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    schema_builder.add_text_field(TEXT_FIELD, TextOptions::default().set_indexing_options(text_field_indexing));
    schema_builder.build()
}

/// Case-insensitive word splitting on non-alphanumeric boundaries. No stop words,
/// so short queries like "the" still match.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build();
    index.tokenizers().register(TOKENIZER, tokenizer);
}

pub(crate) fn fields(index: &Index) -> Result<(Field, Field)> {
    let schema = index.schema();
    let id = schema.get_field(ID_FIELD).map_err(|e| Error::Corrupt(format!("lexical schema: {e}")))?;
    let text = schema.get_field(TEXT_FIELD).map_err(|e| Error::Corrupt(format!("lexical schema: {e}")))?;
    Ok((id, text))
}
