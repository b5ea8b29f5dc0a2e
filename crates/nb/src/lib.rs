//! Meta crate that re-exports the NodeBrain building blocks with sensible
//! defaults. Downstream users can depend on this crate and opt into
//! specific layers via feature flags while keeping access to the
//! underlying crates when deeper integration is required.

#[cfg(feature = "common")]
pub use nb_common as common;

#[cfg(feature = "parse")]
pub use nb_parse as parse;

#[cfg(feature = "eval")]
pub use nb_eval as eval;

#[cfg(feature = "common")]
pub use nb_common::{NbError, NbErrorKind, SourceLocation, Value};

#[cfg(feature = "parse")]
pub use nb_parse::{parse_statement, Statement};

#[cfg(feature = "eval")]
pub use nb_eval::{
    Action, ActionId, ActionStatus, CellId, CellKind, CommandSink, Engine, EngineConfig,
    EngineHost, Graph, LogLevel,
};
