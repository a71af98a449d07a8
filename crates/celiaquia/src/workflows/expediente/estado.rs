//! Expediente state machine. Transitions happen only through named
//! operations, each writing a `HistorialEstado` record.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::{
    Actor, AsignacionTecnico, EstadoExpediente, EstadoLegajo, Expediente, ExpedienteId,
    HistorialEstado, PermisoDenegado, RolActor, TransicionInvalida,
};
use super::repository::{ExpedienteStore, HistorialStore, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum EstadoError {
    #[error(transparent)]
    Transicion(#[from] TransicionInvalida),
    #[error("expediente not found")]
    NoEncontrado,
    #[error("{0} legajos still missing required archives")]
    ArchivosIncompletos(usize),
    #[error("{0} unresolved erroneous rows block the send")]
    ErroneosPendientes(usize),
    #[error("{0} legajos are not in a terminal review state")]
    LegajosAbiertos(usize),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

fn permitida(de: EstadoExpediente, a: EstadoExpediente) -> bool {
    use EstadoExpediente::*;
    matches!(
        (de, a),
        (Creado, Procesado)
            | (Procesado, EnEspera)
            | (EnEspera, ConfirmacionDeEnvio)
            | (ConfirmacionDeEnvio, Asignado)
            | (Asignado, Cerrado)
    )
}

pub struct EstadoService<S> {
    store: Arc<S>,
}

impl<S> Clone for EstadoService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ExpedienteStore + HistorialStore> EstadoService<S> {
    pub fn nuevo(store: Arc<S>) -> Self {
        Self { store }
    }

    fn cargar(&self, id: &ExpedienteId) -> Result<Expediente, EstadoError> {
        self.store.expediente(id)?.ok_or(EstadoError::NoEncontrado)
    }

    fn transicionar(
        &self,
        expediente: &mut Expediente,
        nuevo: EstadoExpediente,
        actor: &Actor,
    ) -> Result<(), EstadoError> {
        if !permitida(expediente.estado, nuevo) {
            return Err(TransicionInvalida {
                entidad: "expediente",
                de: expediente.estado.label().to_string(),
                a: nuevo.label().to_string(),
            }
            .into());
        }
        self.store.registrar_estado(HistorialEstado {
            expediente: expediente.id.clone(),
            estado_anterior: expediente.estado,
            estado_nuevo: nuevo,
            usuario: actor.usuario.clone(),
            registrado_en: Utc::now(),
        })?;
        expediente.estado = nuevo;
        expediente.modificado_por = actor.usuario.clone();
        self.store.actualizar_expediente(expediente)?;
        info!(
            expediente = %expediente.id,
            estado = nuevo.label(),
            "expediente transitioned"
        );
        Ok(())
    }

    /// CREADO → PROCESADO, recorded by the importer after a successful
    /// materialization.
    pub fn procesar(&self, id: &ExpedienteId, actor: &Actor) -> Result<Expediente, EstadoError> {
        let mut expediente = self.cargar(id)?;
        self.transicionar(&mut expediente, EstadoExpediente::Procesado, actor)?;
        Ok(expediente)
    }

    /// PROCESADO → EN_ESPERA.
    pub fn poner_en_espera(
        &self,
        id: &ExpedienteId,
        actor: &Actor,
    ) -> Result<Expediente, EstadoError> {
        let mut expediente = self.cargar(id)?;
        self.transicionar(&mut expediente, EstadoExpediente::EnEspera, actor)?;
        Ok(expediente)
    }

    /// EN_ESPERA → CONFIRMACION_DE_ENVIO, gated on complete archives
    /// and no unresolved erroneous rows.
    pub fn confirmar_envio(
        &self,
        id: &ExpedienteId,
        actor: &Actor,
    ) -> Result<Expediente, EstadoError> {
        actor.exigir(&[RolActor::Provincia])?;
        let mut expediente = self.cargar(id)?;
        if expediente.estado != EstadoExpediente::EnEspera {
            return Err(TransicionInvalida {
                entidad: "expediente",
                de: expediente.estado.label().to_string(),
                a: EstadoExpediente::ConfirmacionDeEnvio.label().to_string(),
            }
            .into());
        }

        let incompletos = self
            .store
            .legajos_de(id)?
            .iter()
            .filter(|legajo| !legajo.archivos_ok())
            .count();
        if incompletos > 0 {
            return Err(EstadoError::ArchivosIncompletos(incompletos));
        }

        let pendientes = self
            .store
            .registros_erroneos(id)?
            .iter()
            .filter(|registro| !registro.resuelto)
            .count();
        if pendientes > 0 {
            return Err(EstadoError::ErroneosPendientes(pendientes));
        }

        self.transicionar(&mut expediente, EstadoExpediente::ConfirmacionDeEnvio, actor)?;
        Ok(expediente)
    }

    /// Creates-or-replaces the active assignment; the first assignment
    /// moves the expediente to ASIGNADO and opens every legajo for
    /// review.
    pub fn asignar_tecnico(
        &self,
        id: &ExpedienteId,
        tecnico: &str,
        actor: &Actor,
    ) -> Result<AsignacionTecnico, EstadoError> {
        actor.exigir(&[RolActor::Coordinador])?;
        let mut expediente = self.cargar(id)?;
        match expediente.estado {
            EstadoExpediente::ConfirmacionDeEnvio => {
                self.transicionar(&mut expediente, EstadoExpediente::Asignado, actor)?;
                for legajo in self.store.legajos_de(id)? {
                    if legajo.estado == EstadoLegajo::DocumentoPendiente {
                        let mut abierto = legajo.clone();
                        abierto.estado = EstadoLegajo::EnRevision;
                        abierto.modificado_por = actor.usuario.clone();
                        self.store.actualizar_legajo(&abierto)?;
                    }
                }
            }
            EstadoExpediente::Asignado => {}
            otro => {
                return Err(TransicionInvalida {
                    entidad: "expediente",
                    de: otro.label().to_string(),
                    a: EstadoExpediente::Asignado.label().to_string(),
                }
                .into());
            }
        }
        let asignacion = self.store.asignar_tecnico(id, tecnico)?;
        Ok(asignacion)
    }

    /// ASIGNADO → CERRADO once every legajo reached a terminal state.
    pub fn cerrar(&self, id: &ExpedienteId, actor: &Actor) -> Result<Expediente, EstadoError> {
        actor.exigir(&[RolActor::Coordinador, RolActor::Tecnico])?;
        let mut expediente = self.cargar(id)?;
        let abiertos = self
            .store
            .legajos_de(id)?
            .iter()
            .filter(|legajo| {
                !matches!(
                    legajo.estado,
                    EstadoLegajo::Aprobado | EstadoLegajo::Rechazado | EstadoLegajo::Excluido
                )
            })
            .count();
        if abiertos > 0 {
            return Err(EstadoError::LegajosAbiertos(abiertos));
        }
        self.transicionar(&mut expediente, EstadoExpediente::Cerrado, actor)?;
        Ok(expediente)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expediente::domain::ProvinciaId;
    use crate::workflows::expediente::memoria::MemoriaStore;
    use crate::workflows::expediente::repository::{HistorialStore, NuevoExpediente};

    fn servicio() -> (EstadoService<MemoriaStore>, Arc<MemoriaStore>, ExpedienteId) {
        let store = Arc::new(MemoriaStore::nuevo());
        let expediente = store
            .crear_expediente(NuevoExpediente {
                provincia: ProvinciaId("chaco".to_string()),
                numero: None,
                observaciones: None,
                planilla: None,
                actor: "chaco-user".to_string(),
            })
            .expect("expediente created");
        (
            EstadoService::nuevo(Arc::clone(&store)),
            store,
            expediente.id,
        )
    }

    #[test]
    fn transitions_follow_the_pipeline_order() {
        let (servicio, store, id) = servicio();
        let actor = Actor::nuevo("importer", RolActor::Sistema);

        servicio.procesar(&id, &actor).expect("procesar");
        servicio.poner_en_espera(&id, &actor).expect("en espera");

        let historial = store.historial_estados(&id).expect("history");
        assert_eq!(historial.len(), 2);
        assert_eq!(historial[0].estado_anterior, EstadoExpediente::Creado);
        assert_eq!(historial[1].estado_nuevo, EstadoExpediente::EnEspera);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let (servicio, _store, id) = servicio();
        let actor = Actor::nuevo("importer", RolActor::Sistema);

        let error = servicio
            .poner_en_espera(&id, &actor)
            .expect_err("CREADO cannot jump to EN_ESPERA");
        assert!(matches!(error, EstadoError::Transicion(_)));
    }

    #[test]
    fn confirmar_envio_requires_provincia_role() {
        let (servicio, _store, id) = servicio();
        let tecnico = Actor::nuevo("tecnico-1", RolActor::Tecnico);
        let error = servicio
            .confirmar_envio(&id, &tecnico)
            .expect_err("role rejected");
        assert!(matches!(error, EstadoError::Permiso(_)));
    }

    #[test]
    fn asignar_tecnico_replaces_previous_assignment() {
        let (servicio, store, id) = servicio();
        let sistema = Actor::nuevo("importer", RolActor::Sistema);
        servicio.procesar(&id, &sistema).expect("procesar");
        servicio.poner_en_espera(&id, &sistema).expect("en espera");

        let provincia = Actor::nuevo("chaco-user", RolActor::Provincia);
        servicio
            .confirmar_envio(&id, &provincia)
            .expect("confirmed with no legajos");

        let coordinador = Actor::nuevo("coord", RolActor::Coordinador);
        servicio
            .asignar_tecnico(&id, "tecnico-a", &coordinador)
            .expect("first assignment");
        let segunda = servicio
            .asignar_tecnico(&id, "tecnico-b", &coordinador)
            .expect("replacement");
        assert!(segunda.activa);

        let activa = store
            .asignacion_activa(&id)
            .expect("query")
            .expect("one active");
        assert_eq!(activa.tecnico, "tecnico-b");
    }
}
