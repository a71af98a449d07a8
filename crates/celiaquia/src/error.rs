//! Top-level error surface. Every service error collapses into one of
//! the disjoint kinds operators see; the CLI maps them to exit codes.

use std::fmt;

use crate::workflows::expediente::cruce::CruceError;
use crate::workflows::expediente::cupo::CupoError;
use crate::workflows::expediente::domain::{PermisoDenegado, ProvinciaId, TransicionInvalida};
use crate::workflows::expediente::estado::EstadoError;
use crate::workflows::expediente::padron::PadronError;
use crate::workflows::expediente::pago::PagoError;
use crate::workflows::expediente::repository::RepositoryError;
use crate::workflows::expediente::revision::RevisionError;
use crate::workflows::expediente::validador::ValidacionArchivo;
use crate::workflows::importador::familia::FamiliaError;
use crate::workflows::importador::planilla::PlanillaError;
use crate::workflows::importador::registro::CiudadanoInvalido;
use crate::workflows::importador::servicio::ImportError;

#[derive(Debug)]
pub enum CoreError {
    InvalidSpreadsheet(PlanillaError),
    InvalidCitizenRow(CiudadanoInvalido),
    FamilyValidation(FamiliaError),
    PermissionDenied(PermisoDenegado),
    IllegalTransition(TransicionInvalida),
    CupoNoConfigurado(ProvinciaId),
    InvalidFile(ValidacionArchivo),
    Validation(String),
    Conflict(String),
    Timeout(String),
    Io(std::io::Error),
    Storage(RepositoryError),
}

impl CoreError {
    /// Operator exit codes: 2 validation, 3 quota misconfiguration,
    /// 4 I/O failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::CupoNoConfigurado(_) => 3,
            CoreError::Io(_) | CoreError::Timeout(_) => 4,
            CoreError::Storage(RepositoryError::Unavailable(_)) => 4,
            _ => 2,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidSpreadsheet(_) => "invalid_spreadsheet",
            CoreError::InvalidCitizenRow(_) => "invalid_citizen_row",
            CoreError::FamilyValidation(_) => "family_validation",
            CoreError::PermissionDenied(_) => "permission_denied",
            CoreError::IllegalTransition(_) => "illegal_transition",
            CoreError::CupoNoConfigurado(_) => "cupo_no_configurado",
            CoreError::InvalidFile(_) => "invalid_file",
            CoreError::Validation(_) => "validation",
            CoreError::Conflict(_) => "conflict",
            CoreError::Timeout(_) => "timeout",
            CoreError::Io(_) => "io",
            CoreError::Storage(_) => "storage",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidSpreadsheet(err) => write!(f, "invalid spreadsheet: {err}"),
            CoreError::InvalidCitizenRow(err) => write!(f, "invalid citizen row: {err}"),
            CoreError::FamilyValidation(err) => write!(f, "family validation failed: {err}"),
            CoreError::PermissionDenied(err) => write!(f, "permission denied: {err}"),
            CoreError::IllegalTransition(err) => write!(f, "illegal transition: {err}"),
            CoreError::CupoNoConfigurado(provincia) => {
                write!(f, "provincia {provincia} has no quota configured")
            }
            CoreError::InvalidFile(err) => write!(f, "invalid file: {err}"),
            CoreError::Validation(detalle) => write!(f, "validation failed: {detalle}"),
            CoreError::Conflict(detalle) => write!(f, "conflict: {detalle}"),
            CoreError::Timeout(detalle) => write!(f, "timeout: {detalle}"),
            CoreError::Io(err) => write!(f, "io error: {err}"),
            CoreError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::InvalidSpreadsheet(err) => Some(err),
            CoreError::InvalidCitizenRow(err) => Some(err),
            CoreError::FamilyValidation(err) => Some(err),
            CoreError::PermissionDenied(err) => Some(err),
            CoreError::IllegalTransition(err) => Some(err),
            CoreError::InvalidFile(err) => Some(err),
            CoreError::Io(err) => Some(err),
            CoreError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PlanillaError> for CoreError {
    fn from(value: PlanillaError) -> Self {
        match value {
            PlanillaError::Timeout(presupuesto) => {
                Self::Timeout(format!("spreadsheet read exceeded {presupuesto:?}"))
            }
            otro => Self::InvalidSpreadsheet(otro),
        }
    }
}

impl From<CiudadanoInvalido> for CoreError {
    fn from(value: CiudadanoInvalido) -> Self {
        Self::InvalidCitizenRow(value)
    }
}

impl From<FamiliaError> for CoreError {
    fn from(value: FamiliaError) -> Self {
        Self::FamilyValidation(value)
    }
}

impl From<PermisoDenegado> for CoreError {
    fn from(value: PermisoDenegado) -> Self {
        Self::PermissionDenied(value)
    }
}

impl From<TransicionInvalida> for CoreError {
    fn from(value: TransicionInvalida) -> Self {
        Self::IllegalTransition(value)
    }
}

impl From<ValidacionArchivo> for CoreError {
    fn from(value: ValidacionArchivo) -> Self {
        Self::InvalidFile(value)
    }
}

impl From<RepositoryError> for CoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => Self::Conflict("record already exists".to_string()),
            otro => Self::Storage(otro),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ImportError> for CoreError {
    fn from(value: ImportError) -> Self {
        match value {
            ImportError::Planilla(err) => err.into(),
            ImportError::Familia(err) => err.into(),
            ImportError::Archivo(err) => err.into(),
            ImportError::Permiso(err) => err.into(),
            ImportError::Estado(err) => err.into(),
            ImportError::Repositorio(err) => err.into(),
            otro @ (ImportError::ExpedienteNoEncontrado
            | ImportError::RegistroNoEncontrado(_)
            | ImportError::RegistroYaResuelto(_)) => Self::Validation(otro.to_string()),
        }
    }
}

impl From<EstadoError> for CoreError {
    fn from(value: EstadoError) -> Self {
        match value {
            EstadoError::Transicion(err) => err.into(),
            EstadoError::Permiso(err) => err.into(),
            EstadoError::Repositorio(err) => err.into(),
            otro => Self::Validation(otro.to_string()),
        }
    }
}

impl From<RevisionError> for CoreError {
    fn from(value: RevisionError) -> Self {
        match value {
            RevisionError::Transicion(err) => err.into(),
            RevisionError::Archivo(err) => err.into(),
            RevisionError::Permiso(err) => err.into(),
            RevisionError::Cupo(err) => err.into(),
            RevisionError::Repositorio(err) => err.into(),
            otro => Self::Validation(otro.to_string()),
        }
    }
}

impl From<CupoError> for CoreError {
    fn from(value: CupoError) -> Self {
        match value {
            CupoError::NoConfigurado(provincia) => Self::CupoNoConfigurado(provincia),
            CupoError::Permiso(err) => err.into(),
            CupoError::Repositorio(err) => err.into(),
            otro => Self::Validation(otro.to_string()),
        }
    }
}

impl From<CruceError> for CoreError {
    fn from(value: CruceError) -> Self {
        match value {
            CruceError::Planilla(err) => err.into(),
            CruceError::Archivo(err) => err.into(),
            CruceError::Permiso(err) => err.into(),
            CruceError::Repositorio(err) => err.into(),
            otro => Self::Validation(otro.to_string()),
        }
    }
}

impl From<PagoError> for CoreError {
    fn from(value: PagoError) -> Self {
        match value {
            PagoError::Transicion(err) => err.into(),
            PagoError::Planilla(err) => err.into(),
            PagoError::Archivo(err) => err.into(),
            PagoError::Cupo(err) => err.into(),
            PagoError::Permiso(err) => err.into(),
            PagoError::Repositorio(err) => err.into(),
            PagoError::Xlsx(err) => Self::Io(std::io::Error::other(err.to_string())),
            otro => Self::Validation(otro.to_string()),
        }
    }
}

impl From<PadronError> for CoreError {
    fn from(value: PadronError) -> Self {
        match value {
            PadronError::Permiso(err) => err.into(),
            PadronError::Repositorio(err) => err.into(),
            PadronError::Xlsx(err) => Self::Io(std::io::Error::other(err.to_string())),
        }
    }
}
