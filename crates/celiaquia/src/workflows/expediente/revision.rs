//! Technical review state machine per legajo.
//!
//! ```text
//! PENDIENTE ─aprobar──→ APROBADO
//! PENDIENTE ─rechazar─→ RECHAZADO      (gives the slot back)
//! PENDIENTE ─subsanar─→ SUBSANAR
//! SUBSANAR  ─responder→ SUBSANADO      (actor = provincia)
//! SUBSANADO ─aprobar──→ APROBADO
//! SUBSANADO ─rechazar─→ RECHAZADO
//! ```
//!
//! APROBADO and RECHAZADO are terminal within a cycle; a new subsanar
//! reopens.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::cupo::{CupoError, CupoService};
use super::domain::{
    Actor, ArchivoRef, EstadoCupo, EstadoLegajo, EstadoRenaper, HistorialValidacionTecnica, Legajo,
    LegajoId, PermisoDenegado, RevisionTecnico, RolActor, SlotArchivo, TipoComentario,
    TransicionInvalida,
};
use super::historial::HistorialService;
use super::repository::{
    CupoStore, ExpedienteStore, HistorialStore, RepositoryError,
};
use super::validador::{validar_archivo, PropositoArchivo, ValidacionArchivo};

pub const MOTIVO_MAXIMO: usize = 500;

/// File handed in through the subsanación answer or a direct upload.
#[derive(Debug, Clone)]
pub struct ArchivoNuevo {
    pub slot: SlotArchivo,
    pub nombre: String,
    pub tamano: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("legajo {0} not found")]
    NoEncontrado(LegajoId),
    #[error(transparent)]
    Transicion(#[from] TransicionInvalida),
    #[error("subsanar requires a non-empty motive")]
    MotivoRequerido,
    #[error("motive has {largo} characters, the cap is {maximo}")]
    MotivoExcesivo { largo: usize, maximo: usize },
    #[error("responder requires at least one updated archive among the required slots")]
    ArchivosFaltantes,
    #[error(transparent)]
    Archivo(#[from] ValidacionArchivo),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Cupo(#[from] CupoError),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

pub struct RevisionService<S> {
    store: Arc<S>,
    cupo: CupoService<S>,
    historial: HistorialService<S>,
}

impl<S> Clone for RevisionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cupo: self.cupo.clone(),
            historial: self.historial.clone(),
        }
    }
}

impl<S: ExpedienteStore + CupoStore + HistorialStore> RevisionService<S> {
    pub fn nuevo(store: Arc<S>) -> Self {
        Self {
            cupo: CupoService::nuevo(Arc::clone(&store)),
            historial: HistorialService::nuevo(Arc::clone(&store)),
            store,
        }
    }

    fn cargar(&self, id: &LegajoId) -> Result<Legajo, RevisionError> {
        self.store
            .legajo(id)?
            .ok_or_else(|| RevisionError::NoEncontrado(id.clone()))
    }

    fn exigir_desde(
        legajo: &Legajo,
        permitidos: &[RevisionTecnico],
        destino: RevisionTecnico,
    ) -> Result<(), RevisionError> {
        if permitidos.contains(&legajo.revision_tecnico) {
            Ok(())
        } else {
            Err(TransicionInvalida {
                entidad: "revision_tecnico",
                de: legajo.revision_tecnico.label().to_string(),
                a: destino.label().to_string(),
            }
            .into())
        }
    }

    fn registrar(
        &self,
        antes: &Legajo,
        despues: &Legajo,
        motivo: Option<String>,
        actor: &Actor,
    ) -> Result<(), RevisionError> {
        self.store.registrar_validacion(HistorialValidacionTecnica {
            legajo: despues.id.clone(),
            anterior: antes.revision_tecnico,
            nuevo: despues.revision_tecnico,
            motivo,
            actor: actor.usuario.clone(),
            registrado_en: Utc::now(),
        })?;
        self.historial.registrar_cambio_legajo(antes, despues, actor)?;
        Ok(())
    }

    pub fn aprobar(&self, id: &LegajoId, actor: &Actor) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Tecnico])?;
        let antes = self.cargar(id)?;
        Self::exigir_desde(
            &antes,
            &[RevisionTecnico::Pendiente, RevisionTecnico::Subsanado],
            RevisionTecnico::Aprobado,
        )?;

        let mut despues = antes.clone();
        despues.revision_tecnico = RevisionTecnico::Aprobado;
        despues.estado = EstadoLegajo::Aprobado;
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.registrar(&antes, &despues, None, actor)?;
        Ok(despues)
    }

    /// Rejection releases the slot; a missing quota row downgrades to a
    /// status-only cleanup with a warning.
    pub fn rechazar(
        &self,
        id: &LegajoId,
        motivo: &str,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Tecnico])?;
        let antes = self.cargar(id)?;
        Self::exigir_desde(
            &antes,
            &[RevisionTecnico::Pendiente, RevisionTecnico::Subsanado],
            RevisionTecnico::Rechazado,
        )?;

        let mut despues = antes.clone();
        despues.revision_tecnico = RevisionTecnico::Rechazado;
        despues.estado = EstadoLegajo::Rechazado;
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.registrar(&antes, &despues, Some(motivo.to_string()), actor)?;

        match self.cupo.liberar_slot(id, actor, motivo) {
            Ok(()) => {}
            Err(CupoError::NoConfigurado(provincia)) => {
                warn!(
                    legajo = %id,
                    provincia = %provincia,
                    "no quota row, rejection recorded with status-only cleanup"
                );
                let mut limpio = self.cargar(id)?;
                limpio.estado_cupo = EstadoCupo::NoEval;
                limpio.es_titular_activo = false;
                self.store.actualizar_legajo(&limpio)?;
            }
            Err(otro) => return Err(otro.into()),
        }

        self.cargar(id)
    }

    /// Ask the provincia for more documentation. Reopens APROBADO and
    /// RECHAZADO legajos.
    pub fn subsanar(
        &self,
        id: &LegajoId,
        motivo: &str,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Tecnico])?;
        let motivo = motivo.trim();
        if motivo.is_empty() {
            return Err(RevisionError::MotivoRequerido);
        }
        if motivo.chars().count() > MOTIVO_MAXIMO {
            return Err(RevisionError::MotivoExcesivo {
                largo: motivo.chars().count(),
                maximo: MOTIVO_MAXIMO,
            });
        }

        let antes = self.cargar(id)?;
        Self::exigir_desde(
            &antes,
            &[
                RevisionTecnico::Pendiente,
                RevisionTecnico::Aprobado,
                RevisionTecnico::Rechazado,
            ],
            RevisionTecnico::Subsanar,
        )?;

        let mut despues = antes.clone();
        despues.revision_tecnico = RevisionTecnico::Subsanar;
        despues.estado = EstadoLegajo::EnRevision;
        despues.subsanacion_motivo = Some(motivo.to_string());
        despues.subsanacion_solicitada_en = Some(Utc::now());
        despues.subsanacion_respondida_en = None;
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.registrar(&antes, &despues, Some(motivo.to_string()), actor)?;
        Ok(despues)
    }

    /// Provincia answer to a subsanación: at least one refreshed
    /// archive among the slots required for the legajo's rol.
    pub fn responder(
        &self,
        id: &LegajoId,
        archivos: Vec<ArchivoNuevo>,
        comentario: Option<String>,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Provincia])?;
        let antes = self.cargar(id)?;
        Self::exigir_desde(&antes, &[RevisionTecnico::Subsanar], RevisionTecnico::Subsanado)?;

        let requeridos = super::domain::slots_requeridos(antes.rol);
        if !archivos
            .iter()
            .any(|archivo| requeridos.contains(&archivo.slot))
        {
            return Err(RevisionError::ArchivosFaltantes);
        }

        let mut despues = antes.clone();
        for archivo in archivos {
            validar_archivo(
                &archivo.nombre,
                archivo.tamano,
                PropositoArchivo::ArchivoLegajo(archivo.slot),
            )?;
            despues.set_archivo(
                archivo.slot,
                ArchivoRef {
                    clave: format!(
                        "legajos/subsanacion_respuesta/{}_{}",
                        despues.id, archivo.nombre
                    ),
                    nombre: archivo.nombre,
                },
            );
        }

        despues.revision_tecnico = RevisionTecnico::Subsanado;
        despues.subsanacion_respondida_en = Some(Utc::now());
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.registrar(&antes, &despues, None, actor)?;
        self.historial.comentar(
            &despues,
            TipoComentario::SubsanacionRespuesta,
            comentario.unwrap_or_else(|| "Documentación actualizada".to_string()),
            None,
            actor,
        )?;
        Ok(despues)
    }

    /// Direct archive upload outside a subsanación cycle, used while
    /// the expediente gathers documentation.
    pub fn cargar_archivo(
        &self,
        id: &LegajoId,
        archivo: ArchivoNuevo,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Provincia, RolActor::Tecnico])?;
        validar_archivo(
            &archivo.nombre,
            archivo.tamano,
            PropositoArchivo::ArchivoLegajo(archivo.slot),
        )?;
        let mut legajo = self.cargar(id)?;
        legajo.set_archivo(
            archivo.slot,
            ArchivoRef {
                clave: format!("legajos/{}_{}", legajo.id, archivo.nombre),
                nombre: archivo.nombre,
            },
        );
        legajo.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&legajo)?;
        Ok(legajo)
    }

    /// Record the RENAPER validation sub-state with its comment and
    /// optional answer attachment.
    pub fn marcar_renaper(
        &self,
        id: &LegajoId,
        estado: EstadoRenaper,
        comentario: Option<String>,
        archivo: Option<(String, u64)>,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Tecnico])?;
        let antes = self.cargar(id)?;
        let mut despues = antes.clone();
        despues.estado_renaper = estado;
        if let Some(comentario) = comentario {
            despues.subsanacion_renaper_comentario = Some(comentario);
        }
        if let Some((nombre, tamano)) = archivo {
            validar_archivo(&nombre, tamano, PropositoArchivo::RespuestaRenaper)?;
            despues.archivo_renaper = Some(ArchivoRef {
                clave: format!("legajos/subsanacion_renaper/{}_{}", despues.id, nombre),
                nombre,
            });
        }
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.historial.registrar_cambio_legajo(&antes, &despues, actor)?;
        Ok(despues)
    }

    /// Administrative exclusion: terminal state, slot given back.
    pub fn excluir(
        &self,
        id: &LegajoId,
        motivo: &str,
        actor: &Actor,
    ) -> Result<Legajo, RevisionError> {
        actor.exigir(&[RolActor::Coordinador])?;
        let antes = self.cargar(id)?;
        let mut despues = antes.clone();
        despues.estado = EstadoLegajo::Excluido;
        despues.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(&despues)?;
        self.historial.comentar(
            &despues,
            TipoComentario::Observacion,
            format!("Legajo excluido: {motivo}"),
            None,
            actor,
        )?;
        match self.cupo.liberar_slot(id, actor, motivo) {
            Ok(()) | Err(CupoError::NoConfigurado(_)) => {}
            Err(otro) => return Err(otro.into()),
        }
        self.cargar(id)
    }
}
