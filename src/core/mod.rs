//! Core module - linking pipeline, reports and description generation

pub mod catalog;
pub mod config;
pub mod describe;
pub mod identifier;
pub mod links;
pub mod report;
pub mod resolver;
pub mod sheets;

pub use catalog::{CatalogGenerator, PreparedObject};
pub use config::{Config, ConfigError, SourceSpec};
pub use describe::{ChatClient, DescribeError, Describer};
pub use identifier::{IdentifierPattern, ParsedKey, PatternError};
pub use links::{aggregate, LinkReport, LinkedGroup, Miss, MissReason, SourceRow};
pub use report::ReportError;
pub use resolver::{DirectoryResolver, FileRecord, ResolveError};
pub use sheets::{MetadataRecord, MetadataTable};
