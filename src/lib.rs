// Prospect Unification - Core Library
// Normalizes legacy customer/prospect exports into canonical records and
// streams filtered campaign exports. Used by the CLI and the integration tests.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod fields;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod rules;
pub mod schema;
pub mod source;

// Re-export commonly used types
pub use config::{LogFormat, UnifyConfig};
pub use db::{setup_database, SqliteStore};
pub use entities::{
    Address, AddressType, CanonicalEntity, Company, CompanyRegistry, Customer, EntityKind,
    Invoice, Location, MailPackage, PersonName, Prospect, ProspectDetails, Record,
};
pub use error::{ErrorKind, Result, UnificationError};
pub use export::{
    header_row, write_csv, ExportRequest, ExportRows, Exporter, EXPORT_HEADER,
    EXPORT_HEADER_VERSION,
};
pub use identity::{compose_key, external_id};
pub use ingest::{ImportOptions, ImportSummary, Importer};
pub use parser::{
    detect_format, EntityTarget, InvalidDatePolicy, ParseOptions, Parser, SourceFormat,
};
pub use rules::{
    CompiledFilter, Exclusion, FilterRequest, FilterRule, FilterRuleEngine, RuleGroup,
    RulePolicy, RuleRegistry, INCLUDE_ACTIVE_CUSTOMERS_ONLY, INCLUDE_PROSPECTS_AND_CUSTOMERS,
    INCLUDE_PROSPECTS_ONLY,
};
pub use source::{
    BatchRef, CompanyDirectory, MemoryStore, ProspectRecord, RecordSink, RecordSource,
    Selection, UpsertOutcome,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
