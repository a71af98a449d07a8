//! In-memory store used by the CLI and the test suites.
//!
//! A relational binding implements the same traits; this engine keeps
//! every table behind its own mutex and honors the (ProvinciaCupo,
//! Legajo) lock order by storing each cupo row in its own entry lock,
//! independent of the legajo table lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{
    AsignacionTecnico, Ciudadano, CiudadanoId, ComentarioHistorial, CupoMovimiento, EstadoCupo,
    EstadoLegajo, EstadoRenaper, Expediente, ExpedienteId, HistorialEstado,
    HistorialValidacionTecnica, Legajo, LegajoId, PagoExpediente, PagoId, PagoNomina,
    ProvinciaCupo, ProvinciaId, RegistroErroneo, RegistroErroneoReprocesado, ResultadoSintys,
    RevisionTecnico, TipoComentario, TipoDocumento, VinculoFamiliar,
};
use super::repository::{
    CiudadanoStore, CupoStore, ExpedienteStore, HistorialStore, NuevoCiudadano, NuevoExpediente,
    NuevoLegajo, NuevoPago, NuevoRegistroErroneo, PagoStore, RepositoryError,
};

#[derive(Default)]
pub struct MemoriaStore {
    expedientes: Mutex<HashMap<ExpedienteId, Expediente>>,
    ciudadanos: Mutex<HashMap<CiudadanoId, Ciudadano>>,
    documentos: Mutex<HashMap<(TipoDocumento, String), CiudadanoId>>,
    legajos: Mutex<HashMap<LegajoId, Legajo>>,
    vinculos: Mutex<Vec<VinculoFamiliar>>,
    erroneos: Mutex<BTreeMap<u64, RegistroErroneo>>,
    reprocesos: Mutex<Vec<RegistroErroneoReprocesado>>,
    asignaciones: Mutex<Vec<AsignacionTecnico>>,
    cupos: Mutex<HashMap<ProvinciaId, Arc<Mutex<ProvinciaCupo>>>>,
    movimientos: Mutex<Vec<CupoMovimiento>>,
    pagos: Mutex<HashMap<PagoId, PagoExpediente>>,
    nominas: Mutex<Vec<PagoNomina>>,
    estados: Mutex<Vec<HistorialEstado>>,
    validaciones: Mutex<Vec<HistorialValidacionTecnica>>,
    comentarios: Mutex<Vec<ComentarioHistorial>>,
    seq_expediente: AtomicU64,
    seq_ciudadano: AtomicU64,
    seq_legajo: AtomicU64,
    seq_pago: AtomicU64,
    seq_erroneo: AtomicU64,
}

/// Serializable image of the whole store, used by the CLI to persist
/// state between invocations.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoriaSnapshot {
    pub expedientes: Vec<Expediente>,
    pub ciudadanos: Vec<Ciudadano>,
    pub legajos: Vec<Legajo>,
    pub vinculos: Vec<VinculoFamiliar>,
    pub erroneos: Vec<RegistroErroneo>,
    pub reprocesos: Vec<RegistroErroneoReprocesado>,
    pub asignaciones: Vec<AsignacionTecnico>,
    pub cupos: Vec<ProvinciaCupo>,
    pub movimientos: Vec<CupoMovimiento>,
    pub pagos: Vec<PagoExpediente>,
    pub nominas: Vec<PagoNomina>,
    pub estados: Vec<HistorialEstado>,
    pub validaciones: Vec<HistorialValidacionTecnica>,
    pub comentarios: Vec<ComentarioHistorial>,
    pub secuencias: [u64; 5],
}

impl MemoriaStore {
    pub fn nuevo() -> Self {
        Self::default()
    }

    pub fn desde_snapshot(snapshot: MemoriaSnapshot) -> Self {
        let store = Self::default();
        {
            let mut documentos = store.documentos.lock().expect("store mutex poisoned");
            let mut ciudadanos = store.ciudadanos.lock().expect("store mutex poisoned");
            for ciudadano in snapshot.ciudadanos {
                documentos.insert(
                    (ciudadano.tipo_documento, ciudadano.documento.clone()),
                    ciudadano.id.clone(),
                );
                ciudadanos.insert(ciudadano.id.clone(), ciudadano);
            }
        }
        *store.expedientes.lock().expect("store mutex poisoned") = snapshot
            .expedientes
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        *store.legajos.lock().expect("store mutex poisoned") = snapshot
            .legajos
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();
        *store.vinculos.lock().expect("store mutex poisoned") = snapshot.vinculos;
        *store.erroneos.lock().expect("store mutex poisoned") = snapshot
            .erroneos
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        *store.reprocesos.lock().expect("store mutex poisoned") = snapshot.reprocesos;
        *store.asignaciones.lock().expect("store mutex poisoned") = snapshot.asignaciones;
        *store.cupos.lock().expect("store mutex poisoned") = snapshot
            .cupos
            .into_iter()
            .map(|c| (c.provincia.clone(), Arc::new(Mutex::new(c))))
            .collect();
        *store.movimientos.lock().expect("store mutex poisoned") = snapshot.movimientos;
        *store.pagos.lock().expect("store mutex poisoned") = snapshot
            .pagos
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        *store.nominas.lock().expect("store mutex poisoned") = snapshot.nominas;
        *store.estados.lock().expect("store mutex poisoned") = snapshot.estados;
        *store.validaciones.lock().expect("store mutex poisoned") = snapshot.validaciones;
        *store.comentarios.lock().expect("store mutex poisoned") = snapshot.comentarios;
        store.seq_expediente.store(snapshot.secuencias[0], Ordering::Relaxed);
        store.seq_ciudadano.store(snapshot.secuencias[1], Ordering::Relaxed);
        store.seq_legajo.store(snapshot.secuencias[2], Ordering::Relaxed);
        store.seq_pago.store(snapshot.secuencias[3], Ordering::Relaxed);
        store.seq_erroneo.store(snapshot.secuencias[4], Ordering::Relaxed);
        store
    }

    pub fn snapshot(&self) -> MemoriaSnapshot {
        let mut expedientes: Vec<_> = self
            .expedientes
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect();
        expedientes.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let mut ciudadanos: Vec<_> = self
            .ciudadanos
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect();
        ciudadanos.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let mut legajos: Vec<_> = self
            .legajos
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect();
        legajos.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        let mut cupos: Vec<_> = self
            .cupos
            .lock()
            .expect("store mutex poisoned")
            .values()
            .map(|entry| entry.lock().expect("cupo mutex poisoned").clone())
            .collect();
        cupos.sort_by(|a, b| a.provincia.cmp(&b.provincia));
        let mut pagos: Vec<_> = self
            .pagos
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect();
        pagos.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        MemoriaSnapshot {
            expedientes,
            ciudadanos,
            legajos,
            vinculos: self.vinculos.lock().expect("store mutex poisoned").clone(),
            erroneos: self
                .erroneos
                .lock()
                .expect("store mutex poisoned")
                .values()
                .cloned()
                .collect(),
            reprocesos: self.reprocesos.lock().expect("store mutex poisoned").clone(),
            asignaciones: self
                .asignaciones
                .lock()
                .expect("store mutex poisoned")
                .clone(),
            cupos,
            movimientos: self
                .movimientos
                .lock()
                .expect("store mutex poisoned")
                .clone(),
            pagos,
            nominas: self.nominas.lock().expect("store mutex poisoned").clone(),
            estados: self.estados.lock().expect("store mutex poisoned").clone(),
            validaciones: self
                .validaciones
                .lock()
                .expect("store mutex poisoned")
                .clone(),
            comentarios: self
                .comentarios
                .lock()
                .expect("store mutex poisoned")
                .clone(),
            secuencias: [
                self.seq_expediente.load(Ordering::Relaxed),
                self.seq_ciudadano.load(Ordering::Relaxed),
                self.seq_legajo.load(Ordering::Relaxed),
                self.seq_pago.load(Ordering::Relaxed),
                self.seq_erroneo.load(Ordering::Relaxed),
            ],
        }
    }

    fn siguiente(seq: &AtomicU64, prefijo: &str) -> String {
        let id = seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefijo}-{id:06}")
    }
}

impl CiudadanoStore for MemoriaStore {
    fn ciudadano(&self, id: &CiudadanoId) -> Result<Option<Ciudadano>, RepositoryError> {
        let guard = self.ciudadanos.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn ciudadano_por_documento(
        &self,
        tipo: TipoDocumento,
        documento: &str,
    ) -> Result<Option<Ciudadano>, RepositoryError> {
        let documentos = self.documentos.lock().expect("store mutex poisoned");
        let Some(id) = documentos.get(&(tipo, documento.to_string())) else {
            return Ok(None);
        };
        let ciudadanos = self.ciudadanos.lock().expect("store mutex poisoned");
        Ok(ciudadanos.get(id).cloned())
    }

    fn crear_ciudadano(&self, nuevo: NuevoCiudadano) -> Result<Ciudadano, RepositoryError> {
        let mut documentos = self.documentos.lock().expect("store mutex poisoned");
        let clave = (nuevo.tipo_documento, nuevo.documento.clone());
        if documentos.contains_key(&clave) {
            return Err(RepositoryError::Conflict);
        }
        let ciudadano = Ciudadano {
            id: CiudadanoId(Self::siguiente(&self.seq_ciudadano, "ciu")),
            tipo_documento: nuevo.tipo_documento,
            documento: nuevo.documento,
            cuit: nuevo.cuit,
            apellido: nuevo.apellido,
            nombre: nuevo.nombre,
            fecha_nacimiento: nuevo.fecha_nacimiento,
            sexo: nuevo.sexo,
            telefono: nuevo.telefono,
            email: nuevo.email,
            codigo_postal: nuevo.codigo_postal,
            municipio: nuevo.municipio,
            localidad: nuevo.localidad,
            creado_en: Utc::now(),
        };
        documentos.insert(clave, ciudadano.id.clone());
        self.ciudadanos
            .lock()
            .expect("store mutex poisoned")
            .insert(ciudadano.id.clone(), ciudadano.clone());
        Ok(ciudadano)
    }
}

impl ExpedienteStore for MemoriaStore {
    fn crear_expediente(&self, nuevo: NuevoExpediente) -> Result<Expediente, RepositoryError> {
        let ahora = Utc::now();
        let expediente = Expediente {
            id: ExpedienteId(Self::siguiente(&self.seq_expediente, "exp")),
            provincia: nuevo.provincia,
            numero: nuevo.numero,
            observaciones: nuevo.observaciones,
            estado: super::domain::EstadoExpediente::Creado,
            planilla: nuevo.planilla,
            creado_en: ahora,
            actualizado_en: ahora,
            modificado_por: nuevo.actor,
        };
        self.expedientes
            .lock()
            .expect("store mutex poisoned")
            .insert(expediente.id.clone(), expediente.clone());
        Ok(expediente)
    }

    fn expediente(&self, id: &ExpedienteId) -> Result<Option<Expediente>, RepositoryError> {
        let guard = self.expedientes.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn actualizar_expediente(&self, expediente: &Expediente) -> Result<(), RepositoryError> {
        let mut guard = self.expedientes.lock().expect("store mutex poisoned");
        if !guard.contains_key(&expediente.id) {
            return Err(RepositoryError::NotFound);
        }
        let mut actualizado = expediente.clone();
        actualizado.actualizado_en = Utc::now();
        guard.insert(expediente.id.clone(), actualizado);
        Ok(())
    }

    fn insertar_legajos(&self, nuevos: Vec<NuevoLegajo>) -> Result<Vec<Legajo>, RepositoryError> {
        let ahora = Utc::now();
        let legajos: Vec<Legajo> = nuevos
            .into_iter()
            .map(|nuevo| Legajo {
                id: LegajoId(Self::siguiente(&self.seq_legajo, "leg")),
                expediente: nuevo.expediente,
                provincia: nuevo.provincia,
                ciudadano: nuevo.ciudadano,
                rol: nuevo.rol,
                estado: EstadoLegajo::DocumentoPendiente,
                archivo1: None,
                archivo2: None,
                archivo3: None,
                revision_tecnico: RevisionTecnico::Pendiente,
                subsanacion_motivo: None,
                subsanacion_solicitada_en: None,
                subsanacion_respondida_en: None,
                resultado_sintys: ResultadoSintys::SinCruce,
                observacion_cruce: None,
                estado_cupo: EstadoCupo::NoEval,
                es_titular_activo: false,
                estado_renaper: EstadoRenaper::SinValidar,
                subsanacion_renaper_comentario: None,
                archivo_renaper: None,
                creado_en: ahora,
                actualizado_en: ahora,
                modificado_por: nuevo.actor,
            })
            .collect();

        let mut guard = self.legajos.lock().expect("store mutex poisoned");
        for legajo in &legajos {
            guard.insert(legajo.id.clone(), legajo.clone());
        }
        Ok(legajos)
    }

    fn legajo(&self, id: &LegajoId) -> Result<Option<Legajo>, RepositoryError> {
        let guard = self.legajos.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn actualizar_legajo(&self, legajo: &Legajo) -> Result<(), RepositoryError> {
        let mut guard = self.legajos.lock().expect("store mutex poisoned");
        if !guard.contains_key(&legajo.id) {
            return Err(RepositoryError::NotFound);
        }
        let mut actualizado = legajo.clone();
        actualizado.actualizado_en = Utc::now();
        guard.insert(legajo.id.clone(), actualizado);
        Ok(())
    }

    fn legajos_de(&self, expediente: &ExpedienteId) -> Result<Vec<Legajo>, RepositoryError> {
        let guard = self.legajos.lock().expect("store mutex poisoned");
        let mut legajos: Vec<_> = guard
            .values()
            .filter(|legajo| &legajo.expediente == expediente)
            .cloned()
            .collect();
        legajos.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(legajos)
    }

    fn legajos_por_provincia(
        &self,
        provincia: &ProvinciaId,
    ) -> Result<Vec<Legajo>, RepositoryError> {
        let guard = self.legajos.lock().expect("store mutex poisoned");
        let mut legajos: Vec<_> = guard
            .values()
            .filter(|legajo| &legajo.provincia == provincia)
            .cloned()
            .collect();
        legajos.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(legajos)
    }

    fn ocupante_de_cupo(
        &self,
        provincia: &ProvinciaId,
        ciudadano: &CiudadanoId,
    ) -> Result<Option<Legajo>, RepositoryError> {
        let guard = self.legajos.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .find(|legajo| {
                &legajo.provincia == provincia
                    && &legajo.ciudadano == ciudadano
                    && legajo.estado_cupo == EstadoCupo::Dentro
            })
            .cloned())
    }

    fn insertar_vinculos(&self, vinculos: Vec<VinculoFamiliar>) -> Result<(), RepositoryError> {
        self.vinculos
            .lock()
            .expect("store mutex poisoned")
            .extend(vinculos);
        Ok(())
    }

    fn vinculos_de(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Vec<VinculoFamiliar>, RepositoryError> {
        let guard = self.vinculos.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|vinculo| &vinculo.expediente == expediente)
            .cloned()
            .collect())
    }

    fn registrar_erroneo(
        &self,
        nuevo: NuevoRegistroErroneo,
    ) -> Result<RegistroErroneo, RepositoryError> {
        let registro = RegistroErroneo {
            id: self.seq_erroneo.fetch_add(1, Ordering::Relaxed) + 1,
            expediente: nuevo.expediente,
            fila: nuevo.fila,
            datos: nuevo.datos,
            motivo: nuevo.motivo,
            resuelto: false,
            registrado_en: Utc::now(),
        };
        self.erroneos
            .lock()
            .expect("store mutex poisoned")
            .insert(registro.id, registro.clone());
        Ok(registro)
    }

    fn registro_erroneo(&self, id: u64) -> Result<Option<RegistroErroneo>, RepositoryError> {
        let guard = self.erroneos.lock().expect("store mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn registros_erroneos(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Vec<RegistroErroneo>, RepositoryError> {
        let guard = self.erroneos.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|registro| &registro.expediente == expediente)
            .cloned()
            .collect())
    }

    fn actualizar_registro_erroneo(
        &self,
        registro: &RegistroErroneo,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.erroneos.lock().expect("store mutex poisoned");
        if !guard.contains_key(&registro.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(registro.id, registro.clone());
        Ok(())
    }

    fn registrar_reproceso(
        &self,
        reproceso: RegistroErroneoReprocesado,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.reprocesos.lock().expect("store mutex poisoned");
        if guard
            .iter()
            .any(|r| r.registro == reproceso.registro && r.intento == reproceso.intento)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(reproceso);
        Ok(())
    }

    fn reprocesos_de(
        &self,
        registro: u64,
    ) -> Result<Vec<RegistroErroneoReprocesado>, RepositoryError> {
        let guard = self.reprocesos.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|r| r.registro == registro)
            .cloned()
            .collect())
    }

    fn asignar_tecnico(
        &self,
        expediente: &ExpedienteId,
        tecnico: &str,
    ) -> Result<AsignacionTecnico, RepositoryError> {
        let mut guard = self.asignaciones.lock().expect("store mutex poisoned");
        for asignacion in guard.iter_mut() {
            if &asignacion.expediente == expediente {
                asignacion.activa = false;
            }
        }
        let asignacion = AsignacionTecnico {
            expediente: expediente.clone(),
            tecnico: tecnico.to_string(),
            activa: true,
            creado_en: Utc::now(),
        };
        guard.push(asignacion.clone());
        Ok(asignacion)
    }

    fn asignacion_activa(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Option<AsignacionTecnico>, RepositoryError> {
        let guard = self.asignaciones.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .find(|asignacion| &asignacion.expediente == expediente && asignacion.activa)
            .cloned())
    }
}

impl PagoStore for MemoriaStore {
    fn crear_pago(&self, nuevo: NuevoPago) -> Result<PagoExpediente, RepositoryError> {
        let ahora = Utc::now();
        let pago = PagoExpediente {
            id: PagoId(Self::siguiente(&self.seq_pago, "pago")),
            provincia: nuevo.provincia,
            periodo: nuevo.periodo,
            estado: nuevo.estado,
            archivo_envio: nuevo.archivo_envio,
            archivo_respuesta: None,
            total_candidatos: nuevo.total_candidatos,
            total_validados: 0,
            total_excluidos: 0,
            actor: nuevo.actor,
            creado_en: ahora,
            actualizado_en: ahora,
        };
        self.pagos
            .lock()
            .expect("store mutex poisoned")
            .insert(pago.id.clone(), pago.clone());
        Ok(pago)
    }

    fn pago(&self, id: &PagoId) -> Result<Option<PagoExpediente>, RepositoryError> {
        let guard = self.pagos.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn actualizar_pago(&self, pago: &PagoExpediente) -> Result<(), RepositoryError> {
        let mut guard = self.pagos.lock().expect("store mutex poisoned");
        if !guard.contains_key(&pago.id) {
            return Err(RepositoryError::NotFound);
        }
        let mut actualizado = pago.clone();
        actualizado.actualizado_en = Utc::now();
        guard.insert(pago.id.clone(), actualizado);
        Ok(())
    }

    fn insertar_nomina(&self, nomina: PagoNomina) -> Result<bool, RepositoryError> {
        let mut guard = self.nominas.lock().expect("store mutex poisoned");
        if guard
            .iter()
            .any(|n| n.pago == nomina.pago && n.legajo == nomina.legajo)
        {
            return Ok(false);
        }
        guard.push(nomina);
        Ok(true)
    }

    fn nominas_de(&self, pago: &PagoId) -> Result<Vec<PagoNomina>, RepositoryError> {
        let guard = self.nominas.lock().expect("store mutex poisoned");
        Ok(guard.iter().filter(|n| &n.pago == pago).cloned().collect())
    }
}

impl CupoStore for MemoriaStore {
    fn configurar_cupo(&self, cupo: ProvinciaCupo) -> Result<(), RepositoryError> {
        let mut guard = self.cupos.lock().expect("store mutex poisoned");
        match guard.get(&cupo.provincia) {
            Some(entry) => {
                *entry.lock().expect("cupo mutex poisoned") = cupo;
            }
            None => {
                guard.insert(cupo.provincia.clone(), Arc::new(Mutex::new(cupo)));
            }
        }
        Ok(())
    }

    fn cupo(&self, provincia: &ProvinciaId) -> Result<Option<ProvinciaCupo>, RepositoryError> {
        let guard = self.cupos.lock().expect("store mutex poisoned");
        Ok(guard
            .get(provincia)
            .map(|entry| entry.lock().expect("cupo mutex poisoned").clone()))
    }

    fn con_cupo(
        &self,
        provincia: &ProvinciaId,
        f: &mut dyn FnMut(&mut ProvinciaCupo) -> Result<Option<CupoMovimiento>, RepositoryError>,
    ) -> Result<Option<CupoMovimiento>, RepositoryError> {
        let entry = {
            let guard = self.cupos.lock().expect("store mutex poisoned");
            guard.get(provincia).cloned()
        }
        .ok_or(RepositoryError::NotFound)?;

        let mut fila = entry.lock().expect("cupo mutex poisoned");
        let mut copia = fila.clone();
        let movimiento = f(&mut copia)?;
        *fila = copia;
        if let Some(movimiento) = movimiento.clone() {
            self.movimientos
                .lock()
                .expect("store mutex poisoned")
                .push(movimiento);
        }
        Ok(movimiento)
    }

    fn registrar_movimiento(&self, movimiento: CupoMovimiento) -> Result<(), RepositoryError> {
        self.movimientos
            .lock()
            .expect("store mutex poisoned")
            .push(movimiento);
        Ok(())
    }

    fn movimientos(&self, provincia: &ProvinciaId) -> Result<Vec<CupoMovimiento>, RepositoryError> {
        let guard = self.movimientos.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|m| &m.provincia == provincia)
            .cloned()
            .collect())
    }

    fn movimientos_de_legajo(
        &self,
        legajo: &LegajoId,
    ) -> Result<Vec<CupoMovimiento>, RepositoryError> {
        let guard = self.movimientos.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|m| m.legajo.as_ref() == Some(legajo))
            .cloned()
            .collect())
    }
}

impl HistorialStore for MemoriaStore {
    fn registrar_estado(&self, registro: HistorialEstado) -> Result<(), RepositoryError> {
        self.estados
            .lock()
            .expect("store mutex poisoned")
            .push(registro);
        Ok(())
    }

    fn historial_estados(
        &self,
        expediente: &ExpedienteId,
    ) -> Result<Vec<HistorialEstado>, RepositoryError> {
        let guard = self.estados.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|registro| &registro.expediente == expediente)
            .cloned()
            .collect())
    }

    fn registrar_validacion(
        &self,
        registro: HistorialValidacionTecnica,
    ) -> Result<(), RepositoryError> {
        self.validaciones
            .lock()
            .expect("store mutex poisoned")
            .push(registro);
        Ok(())
    }

    fn historial_validaciones(
        &self,
        legajo: &LegajoId,
    ) -> Result<Vec<HistorialValidacionTecnica>, RepositoryError> {
        let guard = self.validaciones.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|registro| &registro.legajo == legajo)
            .cloned()
            .collect())
    }

    fn registrar_comentario(&self, comentario: ComentarioHistorial) -> Result<(), RepositoryError> {
        self.comentarios
            .lock()
            .expect("store mutex poisoned")
            .push(comentario);
        Ok(())
    }

    fn comentarios(
        &self,
        legajo: &LegajoId,
        tipo: Option<TipoComentario>,
        pagina: usize,
        por_pagina: usize,
    ) -> Result<Vec<ComentarioHistorial>, RepositoryError> {
        let guard = self.comentarios.lock().expect("store mutex poisoned");
        let mut filtrados: Vec<_> = guard
            .iter()
            .filter(|comentario| {
                &comentario.legajo == legajo
                    && tipo.map(|t| comentario.tipo == t).unwrap_or(true)
            })
            .cloned()
            .collect();
        filtrados.sort_by(|a, b| b.registrado_en.cmp(&a.registrado_en));

        let pagina = pagina.max(1);
        Ok(filtrados
            .into_iter()
            .skip((pagina - 1) * por_pagina)
            .take(por_pagina)
            .collect())
    }
}
