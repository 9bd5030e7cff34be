pub mod analysis;
pub mod annotate;
pub mod apply;
pub mod backend;
pub mod backup;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod io;
pub mod lock;
pub mod paths;
pub mod plan;
pub mod scan;
pub mod sequencer;
pub mod tool;

pub use error::{PipelineError, Result};
