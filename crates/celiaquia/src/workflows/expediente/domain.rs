use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier wrapper for expedientes (one per import batch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpedienteId(pub String);

/// Identifier wrapper for legajos (ExpedienteCiudadano rows).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegajoId(pub String);

/// Identifier wrapper for citizens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CiudadanoId(pub String);

/// Identifier wrapper for payment expedientes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagoId(pub String);

/// Natural key of a provincia (lower-case short name, e.g. "chaco").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvinciaId(pub String);

macro_rules! display_id {
    ($($id:ident),+) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(ExpedienteId, LegajoId, CiudadanoId, PagoId, ProvinciaId);

/// Administrative region owning a quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provincia {
    pub id: ProvinciaId,
    pub nombre: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipoDocumento {
    Dni,
    LibretaEnrolamiento,
    LibretaCivica,
    CedulaIdentidad,
}

impl TipoDocumento {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dni => "DNI",
            Self::LibretaEnrolamiento => "LE",
            Self::LibretaCivica => "LC",
            Self::CedulaIdentidad => "CI",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "" | "DNI" => Some(Self::Dni),
            "LE" => Some(Self::LibretaEnrolamiento),
            "LC" => Some(Self::LibretaCivica),
            "CI" => Some(Self::CedulaIdentidad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sexo {
    Femenino,
    Masculino,
    X,
}

impl Sexo {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Femenino => "F",
            Self::Masculino => "M",
            Self::X => "X",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "F" | "FEMENINO" => Some(Self::Femenino),
            "M" | "MASCULINO" => Some(Self::Masculino),
            "X" => Some(Self::X),
            _ => None,
        }
    }
}

/// Citizen record keyed by (tipo_documento, documento); created on first
/// import and never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ciudadano {
    pub id: CiudadanoId,
    pub tipo_documento: TipoDocumento,
    pub documento: String,
    pub cuit: Option<String>,
    pub apellido: String,
    pub nombre: String,
    pub fecha_nacimiento: NaiveDate,
    pub sexo: Sexo,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub codigo_postal: Option<String>,
    pub municipio: Option<String>,
    pub localidad: Option<String>,
    pub creado_en: DateTime<Utc>,
}

impl Ciudadano {
    pub fn nombre_completo(&self) -> String {
        format!("{}, {}", self.apellido, self.nombre)
    }
}

/// Opaque handle to a stored file; binding to a concrete object store is
/// a collaborator concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivoRef {
    pub nombre: String,
    pub clave: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoExpediente {
    Creado,
    Procesado,
    EnEspera,
    ConfirmacionDeEnvio,
    Asignado,
    Cerrado,
}

impl EstadoExpediente {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Creado => "CREADO",
            Self::Procesado => "PROCESADO",
            Self::EnEspera => "EN_ESPERA",
            Self::ConfirmacionDeEnvio => "CONFIRMACION_DE_ENVIO",
            Self::Asignado => "ASIGNADO",
            Self::Cerrado => "CERRADO",
        }
    }
}

/// One expediente per import batch, owned by a provincia principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expediente {
    pub id: ExpedienteId,
    pub provincia: ProvinciaId,
    pub numero: Option<String>,
    pub observaciones: Option<String>,
    pub estado: EstadoExpediente,
    pub planilla: Option<ArchivoRef>,
    pub creado_en: DateTime<Utc>,
    pub actualizado_en: DateTime<Utc>,
    pub modificado_por: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoLegajo {
    DocumentoPendiente,
    EnRevision,
    Aprobado,
    Rechazado,
    Excluido,
}

impl EstadoLegajo {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DocumentoPendiente => "DOCUMENTO_PENDIENTE",
            Self::EnRevision => "EN_REVISION",
            Self::Aprobado => "APROBADO",
            Self::Rechazado => "RECHAZADO",
            Self::Excluido => "EXCLUIDO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionTecnico {
    Pendiente,
    Aprobado,
    Rechazado,
    Subsanar,
    Subsanado,
}

impl RevisionTecnico {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pendiente => "PENDIENTE",
            Self::Aprobado => "APROBADO",
            Self::Rechazado => "RECHAZADO",
            Self::Subsanar => "SUBSANAR",
            Self::Subsanado => "SUBSANADO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultadoSintys {
    SinCruce,
    Match,
    NoMatch,
}

impl ResultadoSintys {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SinCruce => "SIN_CRUCE",
            Self::Match => "MATCH",
            Self::NoMatch => "NO_MATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoCupo {
    NoEval,
    Dentro,
    Fuera,
}

impl EstadoCupo {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoEval => "NO_EVAL",
            Self::Dentro => "DENTRO",
            Self::Fuera => "FUERA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolLegajo {
    Beneficiario,
    Responsable,
    BeneficiarioYResponsable,
}

impl RolLegajo {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Beneficiario => "beneficiario",
            Self::Responsable => "responsable",
            Self::BeneficiarioYResponsable => "beneficiario_y_responsable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoRenaper {
    SinValidar,
    Validado,
    Observado,
}

impl EstadoRenaper {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SinValidar => "SIN_VALIDAR",
            Self::Validado => "VALIDADO",
            Self::Observado => "OBSERVADO",
        }
    }
}

/// Archive slots carried by every legajo. Which ones are required
/// depends on the legajo's rol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotArchivo {
    Archivo1,
    Archivo2,
    Archivo3,
}

impl SlotArchivo {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Archivo1 => "archivo1",
            Self::Archivo2 => "archivo2",
            Self::Archivo3 => "archivo3",
        }
    }
}

/// Slots that must be populated for `archivos_ok` per rol: responsables
/// attach the medical certificate and the ANSES negative only; rows that
/// are themselves beneficiaries also attach the identity document (for a
/// minor without ANSES lookup, archivo3 holds the DNI photo instead).
pub const fn slots_requeridos(rol: RolLegajo) -> &'static [SlotArchivo] {
    match rol {
        RolLegajo::Responsable => &[SlotArchivo::Archivo2, SlotArchivo::Archivo3],
        RolLegajo::Beneficiario | RolLegajo::BeneficiarioYResponsable => &[
            SlotArchivo::Archivo1,
            SlotArchivo::Archivo2,
            SlotArchivo::Archivo3,
        ],
    }
}

/// The central record: one citizen inside one expediente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legajo {
    pub id: LegajoId,
    pub expediente: ExpedienteId,
    pub provincia: ProvinciaId,
    pub ciudadano: CiudadanoId,
    pub rol: RolLegajo,
    pub estado: EstadoLegajo,
    pub archivo1: Option<ArchivoRef>,
    pub archivo2: Option<ArchivoRef>,
    pub archivo3: Option<ArchivoRef>,
    pub revision_tecnico: RevisionTecnico,
    pub subsanacion_motivo: Option<String>,
    pub subsanacion_solicitada_en: Option<DateTime<Utc>>,
    pub subsanacion_respondida_en: Option<DateTime<Utc>>,
    pub resultado_sintys: ResultadoSintys,
    pub observacion_cruce: Option<String>,
    pub estado_cupo: EstadoCupo,
    pub es_titular_activo: bool,
    pub estado_renaper: EstadoRenaper,
    pub subsanacion_renaper_comentario: Option<String>,
    pub archivo_renaper: Option<ArchivoRef>,
    pub creado_en: DateTime<Utc>,
    pub actualizado_en: DateTime<Utc>,
    pub modificado_por: String,
}

impl Legajo {
    pub fn archivo(&self, slot: SlotArchivo) -> Option<&ArchivoRef> {
        match slot {
            SlotArchivo::Archivo1 => self.archivo1.as_ref(),
            SlotArchivo::Archivo2 => self.archivo2.as_ref(),
            SlotArchivo::Archivo3 => self.archivo3.as_ref(),
        }
    }

    pub fn set_archivo(&mut self, slot: SlotArchivo, archivo: ArchivoRef) {
        match slot {
            SlotArchivo::Archivo1 => self.archivo1 = Some(archivo),
            SlotArchivo::Archivo2 => self.archivo2 = Some(archivo),
            SlotArchivo::Archivo3 => self.archivo3 = Some(archivo),
        }
    }

    /// True iff every slot required for this legajo's rol is populated.
    pub fn archivos_ok(&self) -> bool {
        slots_requeridos(self.rol)
            .iter()
            .all(|slot| self.archivo(*slot).is_some())
    }
}

/// Directed parent→child link between two citizens, derived during
/// import and scoped by expediente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VinculoFamiliar {
    pub expediente: ExpedienteId,
    pub responsable: CiudadanoId,
    pub beneficiario: CiudadanoId,
    pub vinculo: String,
}

/// Exactly one active assignment per expediente at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsignacionTecnico {
    pub expediente: ExpedienteId,
    pub tecnico: String,
    pub activa: bool,
    pub creado_en: DateTime<Utc>,
}

/// Per-provincia slot bookkeeping. Invariant: `usados <= total_asignado`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinciaCupo {
    pub provincia: ProvinciaId,
    pub total_asignado: u32,
    pub usados: u32,
}

impl ProvinciaCupo {
    pub fn disponibles(&self) -> u32 {
        self.total_asignado.saturating_sub(self.usados)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipoMovimiento {
    Alta,
    Reactivacion,
    Baja,
    Ajuste,
    Suspendido,
}

impl TipoMovimiento {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Alta => "ALTA",
            Self::Reactivacion => "REACTIVACION",
            Self::Baja => "BAJA",
            Self::Ajuste => "AJUSTE",
            Self::Suspendido => "SUSPENDIDO",
        }
    }
}

/// Append-only ledger entry for quota movements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CupoMovimiento {
    pub provincia: ProvinciaId,
    pub expediente: Option<ExpedienteId>,
    pub legajo: Option<LegajoId>,
    pub tipo: TipoMovimiento,
    pub delta: i8,
    pub motivo: String,
    pub actor: String,
    pub registrado_en: DateTime<Utc>,
}

/// State-transition record for an expediente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorialEstado {
    pub expediente: ExpedienteId,
    pub estado_anterior: EstadoExpediente,
    pub estado_nuevo: EstadoExpediente,
    pub usuario: String,
    pub registrado_en: DateTime<Utc>,
}

/// Per-transition record of the technical review state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorialValidacionTecnica {
    pub legajo: LegajoId,
    pub anterior: RevisionTecnico,
    pub nuevo: RevisionTecnico,
    pub motivo: Option<String>,
    pub actor: String,
    pub registrado_en: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipoComentario {
    ValidacionTecnica,
    SubsanacionMotivo,
    SubsanacionRespuesta,
    CruceSintys,
    Renaper,
    Pago,
    Observacion,
}

impl TipoComentario {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ValidacionTecnica => "validacion_tecnica",
            Self::SubsanacionMotivo => "subsanacion_motivo",
            Self::SubsanacionRespuesta => "subsanacion_respuesta",
            Self::CruceSintys => "cruce_sintys",
            Self::Renaper => "renaper",
            Self::Pago => "pago",
            Self::Observacion => "observacion",
        }
    }
}

/// Append-only comment attached to a legajo, with the legajo state at
/// the time of writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComentarioHistorial {
    pub legajo: LegajoId,
    pub tipo: TipoComentario,
    pub texto: String,
    pub archivo: Option<ArchivoRef>,
    pub actor: String,
    pub estado_legajo: EstadoLegajo,
    pub registrado_en: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoPago {
    Borrador,
    Enviado,
    Procesado,
}

impl EstadoPago {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Borrador => "BORRADOR",
            Self::Enviado => "ENVIADO",
            Self::Procesado => "PROCESADO",
        }
    }
}

/// Payment batch for a provincia and a YYYY-MM period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagoExpediente {
    pub id: PagoId,
    pub provincia: ProvinciaId,
    pub periodo: String,
    pub estado: EstadoPago,
    pub archivo_envio: Option<ArchivoRef>,
    pub archivo_respuesta: Option<ArchivoRef>,
    pub total_candidatos: u32,
    pub total_validados: u32,
    pub total_excluidos: u32,
    pub actor: String,
    pub creado_en: DateTime<Utc>,
    pub actualizado_en: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstadoNomina {
    Validado,
    Excluido,
}

impl EstadoNomina {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validado => "VALIDADO",
            Self::Excluido => "EXCLUIDO",
        }
    }
}

/// One row per legajo included in a payment send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagoNomina {
    pub pago: PagoId,
    pub legajo: LegajoId,
    pub estado: EstadoNomina,
    pub registrado_en: DateTime<Utc>,
}

/// Row the importer could not convert into a legajo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistroErroneo {
    pub id: u64,
    pub expediente: ExpedienteId,
    pub fila: usize,
    pub datos: BTreeMap<String, String>,
    pub motivo: String,
    pub resuelto: bool,
    pub registrado_en: DateTime<Utc>,
}

/// One record per reprocess attempt, unique per attempt number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistroErroneoReprocesado {
    pub registro: u64,
    pub intento: u32,
    pub exitoso: bool,
    pub detalle: String,
    pub registrado_en: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolActor {
    Provincia,
    Tecnico,
    Coordinador,
    Sistema,
}

impl RolActor {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Provincia => "provincia",
            Self::Tecnico => "tecnico",
            Self::Coordinador => "coordinador",
            Self::Sistema => "sistema",
        }
    }
}

/// Already-authenticated principal with role tags; the core performs no
/// authentication of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub usuario: String,
    pub rol: RolActor,
    pub provincia: Option<ProvinciaId>,
}

impl Actor {
    pub fn nuevo(usuario: impl Into<String>, rol: RolActor) -> Self {
        Self {
            usuario: usuario.into(),
            rol,
            provincia: None,
        }
    }

    pub fn de_provincia(usuario: impl Into<String>, provincia: ProvinciaId) -> Self {
        Self {
            usuario: usuario.into(),
            rol: RolActor::Provincia,
            provincia: Some(provincia),
        }
    }

    pub fn exigir(&self, permitidos: &[RolActor]) -> Result<(), PermisoDenegado> {
        if self.rol == RolActor::Sistema || permitidos.contains(&self.rol) {
            Ok(())
        } else {
            Err(PermisoDenegado {
                usuario: self.usuario.clone(),
                rol: self.rol,
                requeridos: permitidos.to_vec(),
            })
        }
    }
}

/// Raised when the caller lacks a required role; no state change occurs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("user {usuario} with role {rol:?} lacks one of the required roles")]
pub struct PermisoDenegado {
    pub usuario: String,
    pub rol: RolActor,
    pub requeridos: Vec<RolActor>,
}

/// Raised by the state machines when a transition is requested from a
/// state that does not allow it; no state change occurs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{entidad}: illegal transition {de} -> {a}")]
pub struct TransicionInvalida {
    pub entidad: &'static str,
    pub de: String,
    pub a: String,
}
