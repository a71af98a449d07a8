//! Citizen registry: validation of raw row data plus get-or-create
//! semantics keyed by (tipo_documento, documento).

use chrono::NaiveDate;

use super::normalizador::{normalizar_cuit, normalizar_dni};
use crate::workflows::expediente::domain::{Ciudadano, Sexo, TipoDocumento};
use crate::workflows::expediente::repository::{CiudadanoStore, NuevoCiudadano, RepositoryError};

/// Raw citizen block of one import row, prior to validation.
#[derive(Debug, Clone, Default)]
pub struct FilaCiudadano {
    pub fila: usize,
    pub tipo_documento: String,
    pub documento: String,
    pub apellido: String,
    pub nombre: String,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub sexo: String,
    pub cuit: Option<String>,
    pub telefono: String,
    pub email: String,
    pub codigo_postal: String,
    pub municipio: String,
    pub localidad: String,
}

/// Row-level rejection; the row is excluded and the import continues.
#[derive(Debug, Clone, thiserror::Error)]
#[error("row {fila}, field '{campo}': {detalle}")]
pub struct CiudadanoInvalido {
    pub fila: usize,
    pub campo: &'static str,
    pub detalle: String,
}

const DOCUMENTO_MIN: usize = 7;
const DOCUMENTO_MAX: usize = 11;

fn opcional(valor: &str) -> Option<String> {
    let limpio = valor.trim();
    if limpio.is_empty() {
        None
    } else {
        Some(limpio.to_string())
    }
}

/// Validate a raw row into the attributes of a citizen.
pub fn validar(fila: &FilaCiudadano, hoy: NaiveDate) -> Result<NuevoCiudadano, CiudadanoInvalido> {
    let documento = normalizar_dni(&fila.documento);
    if documento.len() < DOCUMENTO_MIN || documento.len() > DOCUMENTO_MAX {
        return Err(CiudadanoInvalido {
            fila: fila.fila,
            campo: "documento",
            detalle: format!(
                "expected {DOCUMENTO_MIN}-{DOCUMENTO_MAX} digits, got '{}'",
                fila.documento
            ),
        });
    }

    let tipo_documento =
        TipoDocumento::parse(&fila.tipo_documento).ok_or_else(|| CiudadanoInvalido {
            fila: fila.fila,
            campo: "tipo_documento",
            detalle: format!("unknown document type '{}'", fila.tipo_documento),
        })?;

    if fila.apellido.trim().is_empty() {
        return Err(CiudadanoInvalido {
            fila: fila.fila,
            campo: "apellido",
            detalle: "empty surname".to_string(),
        });
    }
    if fila.nombre.trim().is_empty() {
        return Err(CiudadanoInvalido {
            fila: fila.fila,
            campo: "nombre",
            detalle: "empty name".to_string(),
        });
    }

    let fecha_nacimiento = fila.fecha_nacimiento.ok_or_else(|| CiudadanoInvalido {
        fila: fila.fila,
        campo: "fecha_nacimiento",
        detalle: "missing or unparseable birth date".to_string(),
    })?;
    if fecha_nacimiento > hoy {
        return Err(CiudadanoInvalido {
            fila: fila.fila,
            campo: "fecha_nacimiento",
            detalle: format!("birth date {fecha_nacimiento} is in the future"),
        });
    }

    let sexo = Sexo::parse(&fila.sexo).ok_or_else(|| CiudadanoInvalido {
        fila: fila.fila,
        campo: "sexo",
        detalle: format!("invalid sex value '{}'", fila.sexo),
    })?;

    let cuit = match fila.cuit.as_deref() {
        None => None,
        Some(crudo) if crudo.trim().is_empty() => None,
        Some(crudo) => {
            let normalizado = normalizar_cuit(crudo);
            if normalizado.is_empty() {
                return Err(CiudadanoInvalido {
                    fila: fila.fila,
                    campo: "cuit",
                    detalle: format!("CUIT '{crudo}' does not have 11 digits"),
                });
            }
            Some(normalizado)
        }
    };

    Ok(NuevoCiudadano {
        tipo_documento,
        documento,
        cuit,
        apellido: fila.apellido.trim().to_string(),
        nombre: fila.nombre.trim().to_string(),
        fecha_nacimiento,
        sexo,
        telefono: opcional(&fila.telefono),
        email: opcional(&fila.email),
        codigo_postal: opcional(&fila.codigo_postal),
        municipio: opcional(&fila.municipio),
        localidad: opcional(&fila.localidad),
    })
}

/// Return the existing citizen for (tipo_documento, documento) or
/// create one; reused across imports.
pub fn get_or_create<S: CiudadanoStore>(
    store: &S,
    nuevo: NuevoCiudadano,
) -> Result<Ciudadano, RepositoryError> {
    if let Some(existente) =
        store.ciudadano_por_documento(nuevo.tipo_documento, &nuevo.documento)?
    {
        return Ok(existente);
    }
    match store.crear_ciudadano(nuevo.clone()) {
        Ok(ciudadano) => Ok(ciudadano),
        // Lost a creation race: the row now exists, fetch it.
        Err(RepositoryError::Conflict) => store
            .ciudadano_por_documento(nuevo.tipo_documento, &nuevo.documento)?
            .ok_or(RepositoryError::NotFound),
        Err(otro) => Err(otro),
    }
}
