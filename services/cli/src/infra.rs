use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use celiaquia::workflows::expediente::{Actor, MemoriaSnapshot, MemoriaStore, ProvinciaId, RolActor};
use celiaquia::CoreError;

const ARCHIVO_ESTADO: &str = "estado.json";

/// Load the snapshot-backed store from the data dir, or start empty.
pub(crate) fn cargar_store(data_dir: &Path) -> Result<Arc<MemoriaStore>, CoreError> {
    let ruta = data_dir.join(ARCHIVO_ESTADO);
    if !ruta.exists() {
        return Ok(Arc::new(MemoriaStore::nuevo()));
    }
    let bytes = fs::read(&ruta)?;
    let snapshot: MemoriaSnapshot = serde_json::from_slice(&bytes)
        .map_err(|err| CoreError::Io(std::io::Error::other(err.to_string())))?;
    Ok(Arc::new(MemoriaStore::desde_snapshot(snapshot)))
}

pub(crate) fn guardar_store(data_dir: &Path, store: &MemoriaStore) -> Result<(), CoreError> {
    fs::create_dir_all(data_dir)?;
    let bytes = serde_json::to_vec_pretty(&store.snapshot())
        .map_err(|err| CoreError::Io(std::io::Error::other(err.to_string())))?;
    fs::write(data_dir.join(ARCHIVO_ESTADO), bytes)?;
    Ok(())
}

/// Read an input file, returning its bytes plus the bare filename the
/// reader uses as a format hint.
pub(crate) fn leer_archivo(ruta: &Path) -> Result<(Vec<u8>, String), CoreError> {
    let bytes = fs::read(ruta)?;
    let nombre = ruta
        .file_name()
        .map(|nombre| nombre.to_string_lossy().to_string())
        .unwrap_or_else(|| "archivo".to_string());
    Ok((bytes, nombre))
}

/// Persist a generated spreadsheet under the media root, mirroring the
/// opaque storage key.
pub(crate) fn escribir_media(
    media_root: &Path,
    clave: &str,
    bytes: &[u8],
) -> Result<PathBuf, CoreError> {
    let destino = media_root.join(clave);
    if let Some(padre) = destino.parent() {
        fs::create_dir_all(padre)?;
    }
    fs::write(&destino, bytes)?;
    Ok(destino)
}

pub(crate) fn construir_actor(
    usuario: &str,
    rol: RolActor,
    provincia: Option<&str>,
) -> Actor {
    Actor {
        usuario: usuario.to_string(),
        rol,
        provincia: provincia.map(|p| ProvinciaId(p.to_string())),
    }
}
