mod embedding;
mod index;
mod loader;
mod packet;
mod retriever;
mod router;

pub use embedding::cosine;
pub use index::{
    ModuleInfo, SchemaIndex, SchemaIndexBuilder, column_embed_text, embed_text_fingerprint,
    table_embed_text,
};
pub use loader::load_schema_index;
pub use packet::render_compact_ddl;
pub use retriever::{RetrievalConfig, SchemaRetriever};
pub use router::{ModuleScore, expand_glossary, route_modules};
