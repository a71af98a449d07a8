//! Expediente core: data model, state machines, quota bookkeeping,
//! cross-match, payments and the padrón export.

pub mod cruce;
pub mod cupo;
pub mod domain;
pub mod estado;
pub mod historial;
pub mod memoria;
pub mod padron;
pub mod pago;
pub mod repository;
pub mod revision;
pub mod validador;

pub use cruce::{CruceError, CruceResumen, CruceService};
pub use cupo::{CupoError, CupoService};
pub use domain::{
    Actor, ArchivoRef, AsignacionTecnico, Ciudadano, CiudadanoId, ComentarioHistorial,
    CupoMovimiento, EstadoCupo, EstadoExpediente, EstadoLegajo, EstadoNomina, EstadoPago,
    EstadoRenaper, Expediente, ExpedienteId, HistorialEstado, HistorialValidacionTecnica, Legajo,
    LegajoId, PagoExpediente, PagoId, PagoNomina, PermisoDenegado, Provincia, ProvinciaCupo,
    ProvinciaId, RegistroErroneo, RegistroErroneoReprocesado, ResultadoSintys, RevisionTecnico,
    RolActor, RolLegajo, Sexo, SlotArchivo, TipoComentario, TipoDocumento, TipoMovimiento,
    TransicionInvalida, VinculoFamiliar,
};
pub use estado::{EstadoError, EstadoService};
pub use historial::HistorialService;
pub use memoria::{MemoriaSnapshot, MemoriaStore};
pub use padron::{PadronError, PadronExporter};
pub use pago::{PagoCreado, PagoError, PagoResumen, PagoService};
pub use repository::{
    CiudadanoStore, CupoStore, CupoView, ExpedienteStore, HistorialStore, LegajoView,
    NuevoCiudadano, NuevoExpediente, NuevoLegajo, NuevoPago, NuevoRegistroErroneo, PagoStore,
    RepositoryError, Store,
};
pub use revision::{ArchivoNuevo, RevisionError, RevisionService};
