//! Final beneficiary padrón export with a stable column order.

use std::sync::Arc;

use rust_xlsxwriter::{Workbook, XlsxError};
use tracing::info;

use super::domain::{Actor, Ciudadano, PermisoDenegado, ProvinciaId, RolActor, RolLegajo};
use super::repository::{
    legajo_excluido_de_padron, CiudadanoStore, ExpedienteStore, RepositoryError,
};

pub const HOJA_PADRON: &str = "padron_final";
pub const COLUMNAS_PADRON: [&str; 15] = [
    "TipoRegistro",
    "Apellido",
    "Nombre",
    "Documento",
    "CUIL_CUIT",
    "FechaNacimiento",
    "Sexo",
    "Provincia",
    "Municipio",
    "Localidad",
    "ExpedienteID",
    "EstadoLegajo",
    "RolLegajo",
    "ResponsableDocumento",
    "ResponsableNombre",
];

#[derive(Debug, thiserror::Error)]
pub enum PadronError {
    #[error("workbook build failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

pub struct PadronExporter<S> {
    store: Arc<S>,
}

impl<S: ExpedienteStore + CiudadanoStore> PadronExporter<S> {
    pub fn nuevo(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Emit the padrón for one provincia. Legajos in
    /// DOCUMENTO_PENDIENTE, RECHAZADO or EXCLUIDO never appear.
    pub fn exportar(
        &self,
        provincia: &ProvinciaId,
        actor: &Actor,
    ) -> Result<Vec<u8>, PadronError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador, RolActor::Provincia])?;

        let mut legajos = self.store.legajos_por_provincia(provincia)?;
        legajos.retain(|legajo| !legajo_excluido_de_padron(legajo.estado));
        legajos.sort_by(|a, b| (&a.expediente.0, &a.id.0).cmp(&(&b.expediente.0, &b.id.0)));

        let mut workbook = Workbook::new();
        let hoja = workbook.add_worksheet();
        hoja.set_name(HOJA_PADRON)?;
        for (columna, encabezado) in COLUMNAS_PADRON.iter().enumerate() {
            hoja.write_string(0, columna as u16, *encabezado)?;
        }

        let mut fila = 1u32;
        for legajo in &legajos {
            let ciudadano = self
                .store
                .ciudadano(&legajo.ciudadano)?
                .ok_or(RepositoryError::NotFound)?;

            let tipo_registro = match legajo.rol {
                RolLegajo::Responsable => "Responsable",
                RolLegajo::Beneficiario | RolLegajo::BeneficiarioYResponsable => "Beneficiario",
            };

            let responsable = if tipo_registro == "Beneficiario" {
                self.responsable_de(legajo)?
            } else {
                None
            };
            let (responsable_documento, responsable_nombre) = match &responsable {
                Some(responsable) => (
                    responsable.documento.clone(),
                    responsable.nombre_completo(),
                ),
                None => (String::new(), String::new()),
            };

            let valores = [
                tipo_registro.to_string(),
                ciudadano.apellido.clone(),
                ciudadano.nombre.clone(),
                ciudadano.documento.clone(),
                ciudadano.cuit.clone().unwrap_or_default(),
                ciudadano.fecha_nacimiento.format("%d/%m/%Y").to_string(),
                ciudadano.sexo.label().to_string(),
                provincia.0.clone(),
                ciudadano.municipio.clone().unwrap_or_default(),
                ciudadano.localidad.clone().unwrap_or_default(),
                legajo.expediente.0.clone(),
                legajo.estado.label().to_string(),
                legajo.rol.label().to_string(),
                responsable_documento,
                responsable_nombre,
            ];
            for (columna, valor) in valores.iter().enumerate() {
                hoja.write_string(fila, columna as u16, valor.as_str())?;
            }
            fila += 1;
        }

        info!(provincia = %provincia, filas = fila - 1, "padrón exported");
        Ok(workbook.save_to_buffer()?)
    }

    /// Parent responsible through the family edges of the legajo's
    /// expediente, when one resolves.
    fn responsable_de(
        &self,
        legajo: &super::domain::Legajo,
    ) -> Result<Option<Ciudadano>, RepositoryError> {
        let vinculos = self.store.vinculos_de(&legajo.expediente)?;
        let Some(vinculo) = vinculos
            .iter()
            .find(|vinculo| vinculo.beneficiario == legajo.ciudadano)
        else {
            return Ok(None);
        };
        self.store.ciudadano(&vinculo.responsable)
    }
}
