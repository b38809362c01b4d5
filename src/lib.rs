//! # runvault: ML run metadata in SQLite, archived
//!
//! **Version**: 0.1.0
//!
//! runvault records one machine-learning training run as two append-only
//! SQLite rows (a plain summary and a detail row carrying serialized
//! hyperparameters, cross-validation results and the fitted model), flushes
//! the database to disk atomically, and seals it into a compressed archive.
//!
//! ## Components
//!
//! - [`ml`]: synthetic datasets, random forest, grid search
//! - [`experiment`]: run records and the SQLite [`experiment::MetadataStore`]
//! - [`codec`]: versioned blob encoding for parameters, scores and models
//! - [`archive`]: flush, compress, remove, restore
//! - [`pipeline`]: the linear driver tying them together
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use runvault::config::PipelineConfig;
//! use runvault::pipeline::Pipeline;
//!
//! let report = Pipeline::new(PipelineConfig::default())?.run()?;
//! println!("run {} archived at {}", report.run_id, report.archive_path.display());
//! # Ok::<(), runvault::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod experiment;
pub mod ml;
pub mod pipeline;

pub use error::{Error, Result};
