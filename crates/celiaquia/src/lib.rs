//! Expediente pipeline for the provincial Celiaquía benefit.
//!
//! The flow runs `(planilla, principal provincial)` through the import
//! pipeline into legajos, then each legajo through technical review,
//! the SINTYS cross-match, quota allocation and payment rolls, ending
//! in the padrón export. Storage binds through the traits in
//! [`workflows::expediente::repository`]; an in-memory engine ships in
//! [`workflows::expediente::memoria`].

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

pub use error::CoreError;
