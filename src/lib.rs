pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod index;
pub mod query;
pub mod server;
pub mod syntax;
pub mod workspace;

pub use error::{ExtractError, ParseError};
pub use extract::{extract, extract_source, ModuleResult, NamedLocation};
pub use index::{IndexCommand, ProjectIndex, ReloadOutcome};
pub use syntax::{parse, SourceLocation, Span};
