//! SINTYS cross-match: classify every approved legajo of an expediente
//! against an external identifier list. Quota state is never touched
//! here; the result feeds the allocator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::domain::{
    Actor, ExpedienteId, PermisoDenegado, ResultadoSintys, RevisionTecnico, RolActor,
};
use super::historial::HistorialService;
use super::repository::{
    CiudadanoStore, ExpedienteStore, HistorialStore, RepositoryError,
};
use super::validador::{validar_archivo, PropositoArchivo, ValidacionArchivo};
use crate::workflows::importador::normalizador::{conjunto_identificadores, normalizar_dni};
use crate::workflows::importador::planilla::{self, PlanillaError};

pub const OBSERVACION_SIN_COINCIDENCIA: &str = "Sin coincidencia en el cruce SINTYS";
const COLUMNAS_IDENTIFICADOR: &[&str] = &["dni", "documento", "cuit"];

#[derive(Debug, thiserror::Error)]
pub enum CruceError {
    #[error("expediente not found")]
    ExpedienteNoEncontrado,
    #[error("the reply file has none of the identifier columns dni/documento/cuit")]
    SinColumnaIdentificador,
    #[error(transparent)]
    Planilla(#[from] PlanillaError),
    #[error(transparent)]
    Archivo(#[from] ValidacionArchivo),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CruceResumen {
    pub expediente: ExpedienteId,
    pub evaluados: usize,
    pub coincidencias: usize,
    pub sin_coincidencia: usize,
}

pub struct CruceService<S> {
    store: Arc<S>,
    historial: HistorialService<S>,
    presupuesto: Duration,
}

impl<S: ExpedienteStore + CiudadanoStore + HistorialStore> CruceService<S> {
    pub fn nuevo(store: Arc<S>, presupuesto: Duration) -> Self {
        Self {
            historial: HistorialService::nuevo(Arc::clone(&store)),
            store,
            presupuesto,
        }
    }

    /// Read the external identifier list from an XLSX/CSV reply file.
    pub fn leer_identificadores(
        &self,
        bytes: &[u8],
        nombre: &str,
    ) -> Result<HashSet<String>, CruceError> {
        validar_archivo(nombre, bytes.len() as u64, PropositoArchivo::RespuestaCruce)?;
        let planilla = planilla::leer_planilla(bytes, nombre, self.presupuesto)?;
        let columna = planilla
            .columna_entre(COLUMNAS_IDENTIFICADOR)
            .ok_or(CruceError::SinColumnaIdentificador)?;

        let mut ids = HashSet::new();
        for fila in &planilla.filas {
            let crudo = fila.valor(columna);
            let normalizado = normalizar_dni(crudo);
            if normalizado.is_empty() {
                continue;
            }
            if normalizado.len() == 11 {
                let embebido = crate::workflows::importador::normalizador::dni_desde_cuit(&normalizado);
                if !embebido.is_empty() {
                    ids.insert(embebido);
                }
            }
            ids.insert(normalizado);
        }
        Ok(ids)
    }

    /// Classify each approved legajo as MATCH or NO_MATCH.
    pub fn procesar(
        &self,
        expediente_id: &ExpedienteId,
        bytes: &[u8],
        nombre: &str,
        actor: &Actor,
    ) -> Result<CruceResumen, CruceError> {
        actor.exigir(&[RolActor::Tecnico])?;
        self.store
            .expediente(expediente_id)?
            .ok_or(CruceError::ExpedienteNoEncontrado)?;
        let externos = self.leer_identificadores(bytes, nombre)?;

        let mut resumen = CruceResumen {
            expediente: expediente_id.clone(),
            evaluados: 0,
            coincidencias: 0,
            sin_coincidencia: 0,
        };

        for legajo in self.store.legajos_de(expediente_id)? {
            if legajo.revision_tecnico != RevisionTecnico::Aprobado {
                continue;
            }
            let ciudadano = self
                .store
                .ciudadano(&legajo.ciudadano)?
                .ok_or(RepositoryError::NotFound)?;
            let propios =
                conjunto_identificadores(&ciudadano.documento, ciudadano.cuit.as_deref());

            resumen.evaluados += 1;
            let antes = legajo.clone();
            let mut despues = legajo;
            if propios.iter().any(|id| externos.contains(id)) {
                despues.resultado_sintys = ResultadoSintys::Match;
                resumen.coincidencias += 1;
            } else {
                despues.resultado_sintys = ResultadoSintys::NoMatch;
                despues.observacion_cruce = Some(OBSERVACION_SIN_COINCIDENCIA.to_string());
                resumen.sin_coincidencia += 1;
            }
            despues.modificado_por = actor.usuario.clone();
            self.store.actualizar_legajo(&despues)?;
            self.historial.registrar_cambio_legajo(&antes, &despues, actor)?;
        }

        info!(
            expediente = %expediente_id,
            evaluados = resumen.evaluados,
            coincidencias = resumen.coincidencias,
            "cross-match processed"
        );
        Ok(resumen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expediente::domain::{
        ProvinciaId, RolLegajo, Sexo, TipoComentario, TipoDocumento,
    };
    use crate::workflows::expediente::memoria::MemoriaStore;
    use crate::workflows::expediente::repository::{
        HistorialStore, NuevoCiudadano, NuevoExpediente, NuevoLegajo,
    };

    const PRESUPUESTO: Duration = Duration::from_secs(5);

    fn preparar(
        documentos: &[(&str, Option<&str>)],
    ) -> (
        CruceService<MemoriaStore>,
        Arc<MemoriaStore>,
        ExpedienteId,
        Vec<crate::workflows::expediente::domain::LegajoId>,
    ) {
        let store = Arc::new(MemoriaStore::nuevo());
        let expediente = store
            .crear_expediente(NuevoExpediente {
                provincia: ProvinciaId("chaco".to_string()),
                numero: None,
                observaciones: None,
                planilla: None,
                actor: "chaco-user".to_string(),
            })
            .expect("expediente");

        let mut ids = Vec::new();
        for (documento, cuit) in documentos {
            let ciudadano = store
                .crear_ciudadano(NuevoCiudadano {
                    tipo_documento: TipoDocumento::Dni,
                    documento: documento.to_string(),
                    cuit: cuit.map(|c| c.to_string()),
                    apellido: "Pérez".to_string(),
                    nombre: "Ana".to_string(),
                    fecha_nacimiento: chrono::NaiveDate::from_ymd_opt(1990, 1, 1)
                        .expect("valid date"),
                    sexo: Sexo::Femenino,
                    telefono: None,
                    email: None,
                    codigo_postal: None,
                    municipio: None,
                    localidad: None,
                })
                .expect("ciudadano");
            let mut legajo = store
                .insertar_legajos(vec![NuevoLegajo {
                    expediente: expediente.id.clone(),
                    provincia: ProvinciaId("chaco".to_string()),
                    ciudadano: ciudadano.id,
                    rol: RolLegajo::Beneficiario,
                    actor: "importer".to_string(),
                }])
                .expect("legajo")
                .remove(0);
            legajo.revision_tecnico = RevisionTecnico::Aprobado;
            store.actualizar_legajo(&legajo).expect("update");
            ids.push(legajo.id);
        }

        (
            CruceService::nuevo(Arc::clone(&store), PRESUPUESTO),
            store,
            expediente.id,
            ids,
        )
    }

    #[test]
    fn matches_by_dni_and_by_cuit_alias() {
        let (servicio, store, expediente, ids) = preparar(&[
            ("40111222", None),
            ("40333444", Some("20-40333444-5")),
            ("40555666", None),
        ]);
        let actor = Actor::nuevo("tecnico-1", RolActor::Tecnico);

        // First matched by plain DNI, second only through its CUIT.
        let csv = "dni\n40.111.222\n20403334445\n";
        let resumen = servicio
            .procesar(&expediente, csv.as_bytes(), "sintys.csv", &actor)
            .expect("cross-match");
        assert_eq!(resumen.evaluados, 3);
        assert_eq!(resumen.coincidencias, 2);
        assert_eq!(resumen.sin_coincidencia, 1);

        let primero = store.legajo(&ids[0]).expect("q").expect("row");
        assert_eq!(primero.resultado_sintys, ResultadoSintys::Match);
        let tercero = store.legajo(&ids[2]).expect("q").expect("row");
        assert_eq!(tercero.resultado_sintys, ResultadoSintys::NoMatch);
        assert_eq!(
            tercero.observacion_cruce.as_deref(),
            Some(OBSERVACION_SIN_COINCIDENCIA)
        );

        let comentarios = store
            .comentarios(&ids[2], Some(TipoComentario::CruceSintys), 1, 10)
            .expect("comments");
        assert_eq!(comentarios.len(), 1);
    }

    #[test]
    fn unapproved_legajos_are_not_evaluated() {
        let (servicio, store, expediente, ids) = preparar(&[("40111222", None)]);
        let mut legajo = store.legajo(&ids[0]).expect("q").expect("row");
        legajo.revision_tecnico = RevisionTecnico::Pendiente;
        store.actualizar_legajo(&legajo).expect("update");

        let actor = Actor::nuevo("tecnico-1", RolActor::Tecnico);
        let resumen = servicio
            .procesar(&expediente, b"dni\n40111222\n", "sintys.csv", &actor)
            .expect("cross-match");
        assert_eq!(resumen.evaluados, 0);

        let legajo = store.legajo(&ids[0]).expect("q").expect("row");
        assert_eq!(legajo.resultado_sintys, ResultadoSintys::SinCruce);
    }

    #[test]
    fn reply_without_identifier_column_is_rejected() {
        let (servicio, _store, expediente, _ids) = preparar(&[("40111222", None)]);
        let actor = Actor::nuevo("tecnico-1", RolActor::Tecnico);
        let error = servicio
            .procesar(&expediente, b"apellido\nPerez\n", "sintys.csv", &actor)
            .expect_err("missing column");
        assert!(matches!(error, CruceError::SinColumnaIdentificador));
    }
}
