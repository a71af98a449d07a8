//! Quota allocator. Every mutation happens inside the provincia row
//! lock and lands one `CupoMovimiento` when the counters change.
//!
//! Lock order is (ProvinciaCupo, Legajo): the legajo row is re-read and
//! written inside the `con_cupo` closure, never before taking it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    Actor, CupoMovimiento, EstadoCupo, Legajo, LegajoId, PermisoDenegado, ProvinciaCupo,
    ProvinciaId, ResultadoSintys, RevisionTecnico, RolActor, TipoMovimiento,
};
use super::repository::{CupoStore, CupoView, ExpedienteStore, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum CupoError {
    #[error("provincia {0} has no quota configured")]
    NoConfigurado(ProvinciaId),
    #[error("legajo {0} not found")]
    LegajoNoEncontrado(LegajoId),
    #[error("legajo {legajo}: {detalle}")]
    EstadoInvalido { legajo: LegajoId, detalle: String },
    #[error("new total {nuevo} is below the {usados} slots currently in use")]
    TotalInsuficiente { nuevo: u32, usados: u32 },
    #[error("provincia {0} already has a quota row")]
    YaConfigurado(ProvinciaId),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

pub struct CupoService<S> {
    store: Arc<S>,
}

impl<S> Clone for CupoService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CupoStore + ExpedienteStore> CupoService<S> {
    pub fn nuevo(store: Arc<S>) -> Self {
        Self { store }
    }

    fn cargar_legajo(&self, id: &LegajoId) -> Result<Legajo, CupoError> {
        self.store
            .legajo(id)?
            .ok_or_else(|| CupoError::LegajoNoEncontrado(id.clone()))
    }

    fn exigir_cupo(&self, provincia: &ProvinciaId) -> Result<(), CupoError> {
        if self.store.cupo(provincia)?.is_none() {
            return Err(CupoError::NoConfigurado(provincia.clone()));
        }
        Ok(())
    }

    fn movimiento(
        legajo: &Legajo,
        tipo: TipoMovimiento,
        delta: i8,
        motivo: &str,
        actor: &Actor,
    ) -> CupoMovimiento {
        CupoMovimiento {
            provincia: legajo.provincia.clone(),
            expediente: Some(legajo.expediente.clone()),
            legajo: Some(legajo.id.clone()),
            tipo,
            delta,
            motivo: motivo.to_string(),
            actor: actor.usuario.clone(),
            registrado_en: Utc::now(),
        }
    }

    fn marcar(
        &self,
        legajo: &mut Legajo,
        estado: EstadoCupo,
        activo: bool,
        actor: &Actor,
    ) -> Result<(), RepositoryError> {
        legajo.estado_cupo = estado;
        legajo.es_titular_activo = activo;
        legajo.modificado_por = actor.usuario.clone();
        self.store.actualizar_legajo(legajo)
    }

    /// Try to occupy one slot for an approved, matched legajo. Returns
    /// false (with the legajo parked in FUERA or NO_EVAL) when the
    /// guards reject it; calling it again on a holder is a no-op.
    pub fn reservar_slot(
        &self,
        legajo_id: &LegajoId,
        actor: &Actor,
        motivo: &str,
    ) -> Result<bool, CupoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        let mut legajo = self.cargar_legajo(legajo_id)?;

        if legajo.revision_tecnico != RevisionTecnico::Aprobado
            || legajo.resultado_sintys != ResultadoSintys::Match
        {
            if legajo.estado_cupo == EstadoCupo::Dentro {
                // A holder that lost eligibility gives the slot back.
                self.liberar_slot(legajo_id, actor, motivo)?;
            } else {
                self.marcar(&mut legajo, EstadoCupo::NoEval, false, actor)?;
            }
            return Ok(false);
        }

        if legajo.estado_cupo == EstadoCupo::Dentro && !legajo.es_titular_activo {
            return Err(CupoError::EstadoInvalido {
                legajo: legajo.id.clone(),
                detalle: "suspended holder, use reactivar".to_string(),
            });
        }

        self.exigir_cupo(&legajo.provincia)?;

        let mut asignado = false;
        let id = legajo.id.clone();
        let provincia = legajo.provincia.clone();
        self.store.con_cupo(&provincia, &mut |cupo| {
            let mut actual = self
                .store
                .legajo(&id)?
                .ok_or(RepositoryError::NotFound)?;

            if actual.estado_cupo == EstadoCupo::Dentro && actual.es_titular_activo {
                asignado = true;
                return Ok(None);
            }

            if let Some(otro) = self.store.ocupante_de_cupo(&actual.provincia, &actual.ciudadano)? {
                if otro.id != actual.id {
                    self.marcar(&mut actual, EstadoCupo::Fuera, false, actor)?;
                    asignado = false;
                    return Ok(None);
                }
            }

            if cupo.disponibles() == 0 {
                self.marcar(&mut actual, EstadoCupo::Fuera, false, actor)?;
                asignado = false;
                return Ok(None);
            }

            cupo.usados += 1;
            self.marcar(&mut actual, EstadoCupo::Dentro, true, actor)?;
            asignado = true;
            Ok(Some(Self::movimiento(
                &actual,
                TipoMovimiento::Alta,
                1,
                motivo,
                actor,
            )))
        })?;

        if asignado {
            info!(legajo = %legajo_id, provincia = %provincia, "slot reserved");
        }
        Ok(asignado)
    }

    /// Release the slot of a holder; anything else collapses to the
    /// idempotent cleanup `(NO_EVAL, false)`.
    pub fn liberar_slot(
        &self,
        legajo_id: &LegajoId,
        actor: &Actor,
        motivo: &str,
    ) -> Result<(), CupoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        let mut legajo = self.cargar_legajo(legajo_id)?;

        if legajo.estado_cupo != EstadoCupo::Dentro {
            if legajo.estado_cupo != EstadoCupo::NoEval || legajo.es_titular_activo {
                self.marcar(&mut legajo, EstadoCupo::NoEval, false, actor)?;
            }
            return Ok(());
        }

        self.exigir_cupo(&legajo.provincia)?;
        let id = legajo.id.clone();
        let provincia = legajo.provincia.clone();
        self.store.con_cupo(&provincia, &mut |cupo| {
            let mut actual = self
                .store
                .legajo(&id)?
                .ok_or(RepositoryError::NotFound)?;
            if actual.estado_cupo != EstadoCupo::Dentro {
                return Ok(None);
            }
            cupo.usados = cupo.usados.saturating_sub(1);
            self.marcar(&mut actual, EstadoCupo::NoEval, false, actor)?;
            Ok(Some(Self::movimiento(
                &actual,
                TipoMovimiento::Baja,
                -1,
                motivo,
                actor,
            )))
        })?;
        info!(legajo = %legajo_id, provincia = %provincia, "slot released");
        Ok(())
    }

    /// Suspend a holder without freeing the slot.
    pub fn suspender_slot(
        &self,
        legajo_id: &LegajoId,
        actor: &Actor,
        motivo: &str,
    ) -> Result<(), CupoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        let legajo = self.cargar_legajo(legajo_id)?;
        if legajo.estado_cupo != EstadoCupo::Dentro || !legajo.es_titular_activo {
            return Err(CupoError::EstadoInvalido {
                legajo: legajo.id.clone(),
                detalle: format!(
                    "suspender requires an active holder, found ({}, {})",
                    legajo.estado_cupo.label(),
                    legajo.es_titular_activo
                ),
            });
        }

        self.exigir_cupo(&legajo.provincia)?;
        let id = legajo.id.clone();
        self.store.con_cupo(&legajo.provincia, &mut |_cupo| {
            let mut actual = self
                .store
                .legajo(&id)?
                .ok_or(RepositoryError::NotFound)?;
            if actual.estado_cupo != EstadoCupo::Dentro || !actual.es_titular_activo {
                return Ok(None);
            }
            self.marcar(&mut actual, EstadoCupo::Dentro, false, actor)?;
            Ok(Some(Self::movimiento(
                &actual,
                TipoMovimiento::Suspendido,
                0,
                motivo,
                actor,
            )))
        })?;
        warn!(legajo = %legajo_id, motivo, "holder suspended");
        Ok(())
    }

    /// Reactivate a suspended holder; the slot never left `usados`.
    pub fn reactivar_slot(
        &self,
        legajo_id: &LegajoId,
        actor: &Actor,
        motivo: &str,
    ) -> Result<(), CupoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        let legajo = self.cargar_legajo(legajo_id)?;
        if legajo.estado_cupo != EstadoCupo::Dentro || legajo.es_titular_activo {
            return Err(CupoError::EstadoInvalido {
                legajo: legajo.id.clone(),
                detalle: format!(
                    "reactivar requires a suspended holder, found ({}, {})",
                    legajo.estado_cupo.label(),
                    legajo.es_titular_activo
                ),
            });
        }

        self.exigir_cupo(&legajo.provincia)?;
        let id = legajo.id.clone();
        self.store.con_cupo(&legajo.provincia, &mut |_cupo| {
            let mut actual = self
                .store
                .legajo(&id)?
                .ok_or(RepositoryError::NotFound)?;
            if actual.estado_cupo != EstadoCupo::Dentro || actual.es_titular_activo {
                return Ok(None);
            }
            self.marcar(&mut actual, EstadoCupo::Dentro, true, actor)?;
            Ok(Some(Self::movimiento(
                &actual,
                TipoMovimiento::Reactivacion,
                0,
                motivo,
                actor,
            )))
        })?;
        info!(legajo = %legajo_id, "holder reactivated");
        Ok(())
    }

    /// Create the quota row for a provincia.
    pub fn inicializar(
        &self,
        provincia: &ProvinciaId,
        total_asignado: u32,
        actor: &Actor,
    ) -> Result<CupoView, CupoError> {
        actor.exigir(&[RolActor::Coordinador])?;
        if self.store.cupo(provincia)?.is_some() {
            return Err(CupoError::YaConfigurado(provincia.clone()));
        }
        let cupo = ProvinciaCupo {
            provincia: provincia.clone(),
            total_asignado,
            usados: 0,
        };
        self.store.configurar_cupo(cupo.clone())?;
        Ok(CupoView::from(&cupo))
    }

    /// Change `total_asignado`; never below the slots in use. Emits an
    /// AJUSTE movement with delta 0.
    pub fn ajustar_total(
        &self,
        provincia: &ProvinciaId,
        nuevo_total: u32,
        actor: &Actor,
        motivo: &str,
    ) -> Result<CupoView, CupoError> {
        actor.exigir(&[RolActor::Coordinador])?;
        self.exigir_cupo(provincia)?;

        let mut rechazo: Option<CupoError> = None;
        self.store.con_cupo(provincia, &mut |cupo| {
            if nuevo_total < cupo.usados {
                rechazo = Some(CupoError::TotalInsuficiente {
                    nuevo: nuevo_total,
                    usados: cupo.usados,
                });
                return Ok(None);
            }
            cupo.total_asignado = nuevo_total;
            Ok(Some(CupoMovimiento {
                provincia: cupo.provincia.clone(),
                expediente: None,
                legajo: None,
                tipo: TipoMovimiento::Ajuste,
                delta: 0,
                motivo: motivo.to_string(),
                actor: actor.usuario.clone(),
                registrado_en: Utc::now(),
            }))
        })?;
        if let Some(error) = rechazo {
            return Err(error);
        }

        let cupo = self
            .store
            .cupo(provincia)?
            .ok_or_else(|| CupoError::NoConfigurado(provincia.clone()))?;
        Ok(CupoView::from(&cupo))
    }

    pub fn estado(&self, provincia: &ProvinciaId) -> Result<CupoView, CupoError> {
        let cupo = self
            .store
            .cupo(provincia)?
            .ok_or_else(|| CupoError::NoConfigurado(provincia.clone()))?;
        Ok(CupoView::from(&cupo))
    }
}
