//! Core library for the asset-mapper command line application.
//!
//! Device and user records collected from a directory export, an inventory
//! API, and locally imported files are consolidated into one per-IP table
//! with department, head, and contact enrichment. IO adapters live under
//! [`io`], the shared data shapes inside [`model`], the normalisation and
//! enrichment stages in [`normalize`], [`directory`], [`department`] and
//! [`mail`], the pipeline itself in [`consolidate`], derived views in
//! [`summary`], sheet layout in [`flatten`], and run orchestration under
//! [`sync`].

pub mod config;
pub mod consolidate;
pub mod department;
pub mod directory;
pub mod error;
pub mod flatten;
pub mod io;
pub mod logging;
pub mod mail;
pub mod model;
pub mod normalize;
pub mod summary;
pub mod sync;

pub use config::{AppConfig, DepartmentMapping, PipelineConfig};
pub use consolidate::Consolidator;
pub use error::{Result, ToolError};
