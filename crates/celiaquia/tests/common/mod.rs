#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use celiaquia::workflows::expediente::{
    Actor, ExpedienteId, MemoriaStore, NuevoExpediente, ProvinciaId, RolActor,
};
use celiaquia::workflows::expediente::repository::ExpedienteStore;
use celiaquia::workflows::importador::ImportadorService;
use rust_xlsxwriter::Workbook;

pub const PRESUPUESTO: Duration = Duration::from_secs(5);

pub fn provincia() -> ProvinciaId {
    ProvinciaId("chaco".to_string())
}

pub fn actor_provincia() -> Actor {
    Actor::de_provincia("chaco-user", provincia())
}

pub fn tecnico() -> Actor {
    Actor::nuevo("tecnico-1", RolActor::Tecnico)
}

pub fn coordinador() -> Actor {
    Actor::nuevo("coord", RolActor::Coordinador)
}

/// Build an XLSX blob with one header row plus data rows, the shape the
/// provinces upload.
pub fn planilla_xlsx(encabezados: &[&str], filas: &[&[&str]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let hoja = workbook.add_worksheet();
    for (columna, encabezado) in encabezados.iter().enumerate() {
        hoja.write_string(0, columna as u16, *encabezado)
            .expect("write header");
    }
    for (indice, fila) in filas.iter().enumerate() {
        for (columna, valor) in fila.iter().enumerate() {
            hoja.write_string(indice as u32 + 1, columna as u16, *valor)
                .expect("write cell");
        }
    }
    workbook.save_to_buffer().expect("serialize workbook")
}

pub const ENCABEZADOS_IMPORT: &[&str] = &[
    "apellido",
    "nombre",
    "documento",
    "fecha_nacimiento",
    "tipo_documento",
    "sexo",
    "APELLIDO_RESPONSABLE",
    "NOMBRE_RESPONSABLE",
    "Cuit_Responsable",
    "FECHA_DE_NACIMIENTO_RESPONSABLE",
    "SEXO_RESPONSABLE",
];

pub fn preparar_import() -> (
    Arc<MemoriaStore>,
    ImportadorService<MemoriaStore>,
    ExpedienteId,
) {
    let store = Arc::new(MemoriaStore::nuevo());
    let expediente = store
        .crear_expediente(NuevoExpediente {
            provincia: provincia(),
            numero: Some("EXP-2025-001".to_string()),
            observaciones: None,
            planilla: None,
            actor: "chaco-user".to_string(),
        })
        .expect("expediente created");
    let servicio = ImportadorService::nuevo(Arc::clone(&store), PRESUPUESTO, 500);
    (store, servicio, expediente.id)
}
