//! Import pipeline: identifier normalization, spreadsheet reading,
//! family resolution, citizen registry and the orchestrator that ties
//! them into one atomic import per expediente.

pub mod familia;
pub mod normalizador;
pub mod planilla;
pub mod registro;
pub mod servicio;

pub use familia::{FamiliaError, FilaFamiliar, ResolucionFamiliar};
pub use planilla::{MaxFilas, Planilla, PlanillaError, VistaPrevia};
pub use registro::CiudadanoInvalido;
pub use servicio::{ImportError, ImportResultado, ImportadorService, ReprocesoResultado};
