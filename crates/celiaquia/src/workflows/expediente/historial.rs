//! Append-only history: state transitions and typed comments.
//!
//! Field changes become comments through an explicit diff of the prior
//! and current legajo, never through implicit save hooks.

use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    Actor, ArchivoRef, ComentarioHistorial, Legajo, LegajoId, TipoComentario,
};
use super::repository::{HistorialStore, RepositoryError};

pub struct HistorialService<S> {
    store: Arc<S>,
}

impl<S> Clone for HistorialService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: HistorialStore> HistorialService<S> {
    pub fn nuevo(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append one typed comment with the legajo state snapshot.
    pub fn comentar(
        &self,
        legajo: &Legajo,
        tipo: TipoComentario,
        texto: impl Into<String>,
        archivo: Option<ArchivoRef>,
        actor: &Actor,
    ) -> Result<(), RepositoryError> {
        self.store.registrar_comentario(ComentarioHistorial {
            legajo: legajo.id.clone(),
            tipo,
            texto: texto.into(),
            archivo,
            actor: actor.usuario.clone(),
            estado_legajo: legajo.estado,
            registrado_en: Utc::now(),
        })
    }

    /// Compare the tracked fields of a legajo before and after an
    /// update and append one comment per field that changed to a
    /// non-empty value.
    pub fn registrar_cambio_legajo(
        &self,
        antes: &Legajo,
        despues: &Legajo,
        actor: &Actor,
    ) -> Result<(), RepositoryError> {
        if antes.revision_tecnico != despues.revision_tecnico {
            self.comentar(
                despues,
                TipoComentario::ValidacionTecnica,
                format!(
                    "Revisión técnica: {} → {}",
                    antes.revision_tecnico.label(),
                    despues.revision_tecnico.label()
                ),
                None,
                actor,
            )?;
        }

        if cambio_no_vacio(&antes.subsanacion_motivo, &despues.subsanacion_motivo) {
            self.comentar(
                despues,
                TipoComentario::SubsanacionMotivo,
                despues.subsanacion_motivo.clone().unwrap_or_default(),
                None,
                actor,
            )?;
        }

        if cambio_no_vacio(
            &antes.subsanacion_renaper_comentario,
            &despues.subsanacion_renaper_comentario,
        ) {
            self.comentar(
                despues,
                TipoComentario::Renaper,
                despues
                    .subsanacion_renaper_comentario
                    .clone()
                    .unwrap_or_default(),
                despues.archivo_renaper.clone(),
                actor,
            )?;
        }

        if cambio_no_vacio(&antes.observacion_cruce, &despues.observacion_cruce) {
            self.comentar(
                despues,
                TipoComentario::CruceSintys,
                despues.observacion_cruce.clone().unwrap_or_default(),
                None,
                actor,
            )?;
        }

        Ok(())
    }

    pub fn comentarios(
        &self,
        legajo: &LegajoId,
        tipo: Option<TipoComentario>,
        pagina: usize,
        por_pagina: usize,
    ) -> Result<Vec<ComentarioHistorial>, RepositoryError> {
        self.store.comentarios(legajo, tipo, pagina, por_pagina)
    }
}

fn cambio_no_vacio(antes: &Option<String>, despues: &Option<String>) -> bool {
    match despues {
        Some(valor) if !valor.trim().is_empty() => antes.as_deref() != Some(valor.as_str()),
        _ => false,
    }
}
