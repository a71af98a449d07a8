use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    ArchivoRef, AsignacionTecnico, Ciudadano, CiudadanoId, ComentarioHistorial, CupoMovimiento,
    EstadoCupo, EstadoLegajo, EstadoPago, Expediente, ExpedienteId, HistorialEstado,
    HistorialValidacionTecnica, Legajo, LegajoId, PagoExpediente, PagoId, PagoNomina, ProvinciaCupo,
    ProvinciaId, RegistroErroneo, RegistroErroneoReprocesado, RevisionTecnico, RolLegajo,
    TipoComentario, TipoDocumento, VinculoFamiliar,
};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Attributes needed to open an expediente; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NuevoExpediente {
    pub provincia: ProvinciaId,
    pub numero: Option<String>,
    pub observaciones: Option<String>,
    pub planilla: Option<ArchivoRef>,
    pub actor: String,
}

/// Attributes needed to register a citizen; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NuevoCiudadano {
    pub tipo_documento: TipoDocumento,
    pub documento: String,
    pub cuit: Option<String>,
    pub apellido: String,
    pub nombre: String,
    pub fecha_nacimiento: NaiveDate,
    pub sexo: super::domain::Sexo,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub codigo_postal: Option<String>,
    pub municipio: Option<String>,
    pub localidad: Option<String>,
}

/// Attributes needed to materialize a legajo; the store assigns the id
/// and stamps the initial field values.
#[derive(Debug, Clone)]
pub struct NuevoLegajo {
    pub expediente: ExpedienteId,
    pub provincia: ProvinciaId,
    pub ciudadano: CiudadanoId,
    pub rol: RolLegajo,
    pub actor: String,
}

#[derive(Debug, Clone)]
pub struct NuevoRegistroErroneo {
    pub expediente: ExpedienteId,
    pub fila: usize,
    pub datos: BTreeMap<String, String>,
    pub motivo: String,
}

#[derive(Debug, Clone)]
pub struct NuevoPago {
    pub provincia: ProvinciaId,
    pub periodo: String,
    pub estado: EstadoPago,
    pub archivo_envio: Option<ArchivoRef>,
    pub total_candidatos: u32,
    pub actor: String,
}

/// Citizen registry seam: get-or-create semantics keyed by
/// (tipo_documento, documento).
pub trait CiudadanoStore: Send + Sync {
    fn ciudadano(&self, id: &CiudadanoId) -> Result<Option<Ciudadano>, RepositoryError>;
    fn ciudadano_por_documento(
        &self,
        tipo: TipoDocumento,
        documento: &str,
    ) -> Result<Option<Ciudadano>, RepositoryError>;
    fn crear_ciudadano(&self, nuevo: NuevoCiudadano) -> Result<Ciudadano, RepositoryError>;
}

/// Storage seam for expedientes, legajos and their satellite records.
pub trait ExpedienteStore: Send + Sync {
    fn crear_expediente(&self, nuevo: NuevoExpediente) -> Result<Expediente, RepositoryError>;
    fn expediente(&self, id: &ExpedienteId) -> Result<Option<Expediente>, RepositoryError>;
    fn actualizar_expediente(&self, expediente: &Expediente) -> Result<(), RepositoryError>;

    /// Atomic batch insert; either every legajo lands or none does.
    fn insertar_legajos(&self, nuevos: Vec<NuevoLegajo>) -> Result<Vec<Legajo>, RepositoryError>;
    fn legajo(&self, id: &LegajoId) -> Result<Option<Legajo>, RepositoryError>;
    fn actualizar_legajo(&self, legajo: &Legajo) -> Result<(), RepositoryError>;
    fn legajos_de(&self, expediente: &ExpedienteId) -> Result<Vec<Legajo>, RepositoryError>;
    fn legajos_por_provincia(
        &self,
        provincia: &ProvinciaId,
    ) -> Result<Vec<Legajo>, RepositoryError>;
    /// Legajo of the given citizen currently occupying a slot in the
    /// provincia (estado_cupo = DENTRO), suspended or not.
    fn ocupante_de_cupo(
        &self,
        provincia: &ProvinciaId,
        ciudadano: &CiudadanoId,
    ) -> Result<Option<Legajo>, RepositoryError>;

    fn insertar_vinculos(&self, vinculos: Vec<VinculoFamiliar>) -> Result<(), RepositoryError>;
    fn vinculos_de(&self, expediente: &ExpedienteId)
        -> Result<Vec<VinculoFamiliar>, RepositoryError>;

    fn registrar_erroneo(
        &self,
        nuevo: NuevoRegistroErroneo,
    ) -> Result<RegistroErroneo, RepositoryError>;
    fn registro_erroneo(&self, id: u64) -> Result<Option<RegistroErroneo>, RepositoryError>;
    fn registros_erroneos(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Vec<RegistroErroneo>, RepositoryError>;
    fn actualizar_registro_erroneo(&self, registro: &RegistroErroneo)
        -> Result<(), RepositoryError>;
    /// Conflict when the attempt number was already recorded.
    fn registrar_reproceso(
        &self,
        reproceso: RegistroErroneoReprocesado,
    ) -> Result<(), RepositoryError>;
    fn reprocesos_de(
        &self,
        registro: u64,
    ) -> Result<Vec<RegistroErroneoReprocesado>, RepositoryError>;

    /// Creates the assignment and deactivates any previous active one in
    /// the same operation.
    fn asignar_tecnico(
        &self,
        expediente: &ExpedienteId,
        tecnico: &str,
    ) -> Result<AsignacionTecnico, RepositoryError>;
    fn asignacion_activa(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Option<AsignacionTecnico>, RepositoryError>;
}

/// Storage seam for payment batches and their nómina rows.
pub trait PagoStore: Send + Sync {
    fn crear_pago(&self, nuevo: NuevoPago) -> Result<PagoExpediente, RepositoryError>;
    fn pago(&self, id: &PagoId) -> Result<Option<PagoExpediente>, RepositoryError>;
    fn actualizar_pago(&self, pago: &PagoExpediente) -> Result<(), RepositoryError>;
    /// Idempotent insert keyed by (pago, legajo); returns true only on
    /// first insertion.
    fn insertar_nomina(&self, nomina: PagoNomina) -> Result<bool, RepositoryError>;
    fn nominas_de(&self, pago: &PagoId) -> Result<Vec<PagoNomina>, RepositoryError>;
}

/// Quota storage seam. `con_cupo` runs the closure while holding the
/// provincia row lock and, on success, commits the mutated row together
/// with the returned ledger movement. Lock order is (ProvinciaCupo,
/// Legajo): legajo reads/writes are allowed inside the closure, never
/// the other way around.
pub trait CupoStore: Send + Sync {
    fn configurar_cupo(&self, cupo: ProvinciaCupo) -> Result<(), RepositoryError>;
    fn cupo(&self, provincia: &ProvinciaId) -> Result<Option<ProvinciaCupo>, RepositoryError>;
    fn con_cupo(
        &self,
        provincia: &ProvinciaId,
        f: &mut dyn FnMut(&mut ProvinciaCupo) -> Result<Option<CupoMovimiento>, RepositoryError>,
    ) -> Result<Option<CupoMovimiento>, RepositoryError>;
    fn registrar_movimiento(&self, movimiento: CupoMovimiento) -> Result<(), RepositoryError>;
    fn movimientos(&self, provincia: &ProvinciaId) -> Result<Vec<CupoMovimiento>, RepositoryError>;
    fn movimientos_de_legajo(
        &self,
        legajo: &LegajoId,
    ) -> Result<Vec<CupoMovimiento>, RepositoryError>;
}

/// Append-only sink for state-change records and comments. Deletions
/// are not part of the contract.
pub trait HistorialStore: Send + Sync {
    fn registrar_estado(&self, registro: HistorialEstado) -> Result<(), RepositoryError>;
    fn historial_estados(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Vec<HistorialEstado>, RepositoryError>;

    fn registrar_validacion(
        &self,
        registro: HistorialValidacionTecnica,
    ) -> Result<(), RepositoryError>;
    fn historial_validaciones(
        &self,
        legajo: &LegajoId,
    ) -> Result<Vec<HistorialValidacionTecnica>, RepositoryError>;

    fn registrar_comentario(&self, comentario: ComentarioHistorial) -> Result<(), RepositoryError>;
    /// Comments for a legajo, optionally filtered by tipo, ordered by
    /// timestamp descending, paginated.
    fn comentarios(
        &self,
        legajo: &LegajoId,
        tipo: Option<TipoComentario>,
        pagina: usize,
        por_pagina: usize,
    ) -> Result<Vec<ComentarioHistorial>, RepositoryError>;
}

/// Everything the pipeline services need from a backing store.
pub trait Store:
    CiudadanoStore + ExpedienteStore + PagoStore + CupoStore + HistorialStore
{
}

impl<T> Store for T where
    T: CiudadanoStore + ExpedienteStore + PagoStore + CupoStore + HistorialStore
{
}

/// Sanitized representation of a legajo for operator output.
#[derive(Debug, Clone, Serialize)]
pub struct LegajoView {
    pub id: LegajoId,
    pub expediente: ExpedienteId,
    pub documento: String,
    pub nombre_completo: String,
    pub rol: &'static str,
    pub estado: &'static str,
    pub revision_tecnico: &'static str,
    pub resultado_sintys: &'static str,
    pub estado_cupo: &'static str,
    pub es_titular_activo: bool,
    pub archivos_ok: bool,
}

impl LegajoView {
    pub fn desde(legajo: &Legajo, ciudadano: &Ciudadano) -> Self {
        Self {
            id: legajo.id.clone(),
            expediente: legajo.expediente.clone(),
            documento: ciudadano.documento.clone(),
            nombre_completo: ciudadano.nombre_completo(),
            rol: legajo.rol.label(),
            estado: legajo.estado.label(),
            revision_tecnico: legajo.revision_tecnico.label(),
            resultado_sintys: legajo.resultado_sintys.label(),
            estado_cupo: legajo.estado_cupo.label(),
            es_titular_activo: legajo.es_titular_activo,
            archivos_ok: legajo.archivos_ok(),
        }
    }
}

/// Counters an operator sees after a quota operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CupoView {
    pub provincia: ProvinciaId,
    pub total_asignado: u32,
    pub usados: u32,
    pub disponibles: u32,
}

impl From<&ProvinciaCupo> for CupoView {
    fn from(cupo: &ProvinciaCupo) -> Self {
        Self {
            provincia: cupo.provincia.clone(),
            total_asignado: cupo.total_asignado,
            usados: cupo.usados,
            disponibles: cupo.disponibles(),
        }
    }
}

pub(crate) fn legajo_titular_activo(legajo: &Legajo) -> bool {
    legajo.estado_cupo == EstadoCupo::Dentro
        && legajo.es_titular_activo
        && legajo.revision_tecnico == RevisionTecnico::Aprobado
}

pub(crate) fn legajo_excluido_de_padron(estado: EstadoLegajo) -> bool {
    matches!(
        estado,
        EstadoLegajo::DocumentoPendiente | EstadoLegajo::Rechazado | EstadoLegajo::Excluido
    )
}
