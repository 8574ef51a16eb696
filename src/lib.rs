pub mod conventions;
pub mod error;
pub mod io;
pub mod models;
pub mod phonology;
pub mod stages;

pub use conventions::{
    run_conventions, ConventionLayers, ConventionPipeline, ConventionReport, Transformer,
};
pub use error::{ReconciliationError, Result};
pub use io::{
    convert_batch, parse_document_file, parse_document_json, BatchConfig, DocumentOutcome,
    DocumentStatus, GraphDocument, HumanTranscript,
};
pub use models::{Graph, Schema, SourceDocument, SourceEvent, TierMapping};
pub use phonology::{
    best_pronunciation, recover_syllables, Dictionary, FlatLexicon, LexiconFormat, PhonemeTable,
    SyllableTagger, TaggerConfig,
};
pub use stages::{assemble, assemble_events, AssemblyConfig, AssemblyStats, Conversion};
