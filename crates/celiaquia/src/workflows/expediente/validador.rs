//! File and document validators shared by the import and subsanación
//! paths.

use super::domain::SlotArchivo;
use crate::workflows::importador::normalizador::{normalizar_cuit, normalizar_dni};

pub const TAMANO_MAXIMO: u64 = 5 * 1024 * 1024;

const EXTENSIONES_PLANILLA: &[&str] = &["xlsx"];
const EXTENSIONES_RESPUESTA: &[&str] = &["xlsx", "csv"];
const EXTENSIONES_ARCHIVO: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// What a file is being uploaded as; each purpose has its own
/// extension whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropositoArchivo {
    PlanillaImportacion,
    RespuestaCruce,
    ArchivoLegajo(SlotArchivo),
    RespuestaRenaper,
}

impl PropositoArchivo {
    fn extensiones(self) -> &'static [&'static str] {
        match self {
            Self::PlanillaImportacion => EXTENSIONES_PLANILLA,
            Self::RespuestaCruce => EXTENSIONES_RESPUESTA,
            Self::ArchivoLegajo(_) | Self::RespuestaRenaper => EXTENSIONES_ARCHIVO,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidacionArchivo {
    #[error("file '{nombre}' has extension '{extension}', expected one of {permitidas:?}")]
    ExtensionInvalida {
        nombre: String,
        extension: String,
        permitidas: &'static [&'static str],
    },
    #[error("file '{nombre}' weighs {tamano} bytes, above the {maximo} byte cap")]
    DemasiadoGrande {
        nombre: String,
        tamano: u64,
        maximo: u64,
    },
}

pub fn validar_archivo(
    nombre: &str,
    tamano: u64,
    proposito: PropositoArchivo,
) -> Result<(), ValidacionArchivo> {
    let extension = nombre
        .rsplit('.')
        .next()
        .filter(|ext| *ext != nombre)
        .unwrap_or("")
        .to_ascii_lowercase();
    let permitidas = proposito.extensiones();
    if !permitidas.contains(&extension.as_str()) {
        return Err(ValidacionArchivo::ExtensionInvalida {
            nombre: nombre.to_string(),
            extension,
            permitidas,
        });
    }
    if tamano > TAMANO_MAXIMO {
        return Err(ValidacionArchivo::DemasiadoGrande {
            nombre: nombre.to_string(),
            tamano,
            maximo: TAMANO_MAXIMO,
        });
    }
    Ok(())
}

/// 7 to 11 digits after normalization.
pub fn documento_valido(documento: &str) -> bool {
    let digitos = normalizar_dni(documento);
    (7..=11).contains(&digitos.len())
}

/// Exactly 11 digits when present; empty input counts as absent.
pub fn cuit_valido(cuit: &str) -> bool {
    cuit.trim().is_empty() || !normalizar_cuit(cuit).is_empty()
}
