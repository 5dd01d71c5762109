pub mod chunker;
pub mod loader;
pub mod parser;

pub use chunker::{Chunk, TextChunker};
pub use loader::DocumentLoader;
pub use parser::{DocumentParser, PageContent, ParsedDocument};
