//! Payment roll builder: snapshot the active holders into an XLSX
//! send file, then reconcile the reply and suspend absent holders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::Serialize;
use tracing::{info, warn};

use super::cupo::{CupoError, CupoService};
use super::domain::{
    Actor, ArchivoRef, EstadoNomina, EstadoPago, Legajo, PagoId, PagoNomina, PermisoDenegado,
    ProvinciaId, RolActor, TransicionInvalida,
};
use super::historial::HistorialService;
use super::repository::{legajo_titular_activo, NuevoPago, RepositoryError, Store};
use super::validador::{validar_archivo, PropositoArchivo, ValidacionArchivo};
use crate::workflows::importador::normalizador::normalizar_dni;
use crate::workflows::importador::planilla::{self, PlanillaError};

pub const MOTIVO_SUSPENSION_PAGO: &str = "No está en el cruce Sintys para el pago";
pub const HOJA_NOMINA: &str = "nomina_pago";
const COLUMNAS_NOMINA: &[&str] = &["dni", "cuit", "nombre", "apellido", "expediente"];
const COLUMNAS_DOCUMENTO: &[&str] = &["dni", "documento"];

#[derive(Debug, thiserror::Error)]
pub enum PagoError {
    #[error("payment batch not found")]
    PagoNoEncontrado,
    #[error("period '{0}' is not YYYY-MM")]
    PeriodoInvalido(String),
    #[error(transparent)]
    Transicion(#[from] TransicionInvalida),
    #[error("the reply file has no dni/documento column")]
    SinColumnaDocumento,
    #[error("the reply file carries no usable identifiers")]
    RespuestaVacia,
    #[error(transparent)]
    Planilla(#[from] PlanillaError),
    #[error(transparent)]
    Archivo(#[from] ValidacionArchivo),
    #[error("workbook build failed: {0}")]
    Xlsx(#[from] XlsxError),
    #[error(transparent)]
    Cupo(#[from] CupoError),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

#[derive(Debug, Clone, Serialize)]
pub struct PagoCreado {
    pub pago: PagoId,
    pub periodo: String,
    pub total_candidatos: u32,
    pub archivo: ArchivoRef,
    #[serde(skip)]
    pub contenido: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagoResumen {
    pub pago: PagoId,
    pub estado: &'static str,
    pub total_candidatos: u32,
    pub total_validados: u32,
    pub total_excluidos: u32,
}

pub struct PagoService<S> {
    store: Arc<S>,
    cupo: CupoService<S>,
    historial: HistorialService<S>,
    presupuesto: Duration,
}

impl<S: Store> PagoService<S> {
    pub fn nuevo(store: Arc<S>, presupuesto: Duration) -> Self {
        Self {
            cupo: CupoService::nuevo(Arc::clone(&store)),
            historial: HistorialService::nuevo(Arc::clone(&store)),
            store,
            presupuesto,
        }
    }

    fn titulares_activos(&self, provincia: &ProvinciaId) -> Result<Vec<Legajo>, PagoError> {
        Ok(self
            .store
            .legajos_por_provincia(provincia)?
            .into_iter()
            .filter(|legajo| {
                legajo_titular_activo(legajo)
                    && legajo.resultado_sintys
                        == super::domain::ResultadoSintys::Match
            })
            .collect())
    }

    /// Snapshot the active holders of a provincia into a payment batch
    /// plus its send spreadsheet.
    pub fn crear_expediente_pago(
        &self,
        provincia: &ProvinciaId,
        periodo: &str,
        actor: &Actor,
    ) -> Result<PagoCreado, PagoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        validar_periodo(periodo)?;

        let titulares = self.titulares_activos(provincia)?;

        let mut workbook = Workbook::new();
        let hoja = workbook.add_worksheet();
        hoja.set_name(HOJA_NOMINA)?;
        for (columna, encabezado) in COLUMNAS_NOMINA.iter().enumerate() {
            hoja.write_string(0, columna as u16, *encabezado)?;
        }
        for (indice, legajo) in titulares.iter().enumerate() {
            let ciudadano = self
                .store
                .ciudadano(&legajo.ciudadano)?
                .ok_or(RepositoryError::NotFound)?;
            let fila = indice as u32 + 1;
            hoja.write_string(fila, 0, normalizar_dni(&ciudadano.documento))?;
            hoja.write_string(
                fila,
                1,
                ciudadano
                    .cuit
                    .as_deref()
                    .map(normalizar_dni)
                    .unwrap_or_default(),
            )?;
            hoja.write_string(fila, 2, ciudadano.nombre.as_str())?;
            hoja.write_string(fila, 3, ciudadano.apellido.as_str())?;
            hoja.write_string(fila, 4, legajo.expediente.0.as_str())?;
        }
        let contenido = workbook.save_to_buffer()?;

        let archivo = ArchivoRef {
            nombre: format!("{provincia}_{periodo}.xlsx"),
            clave: format!("pago/{provincia}_{periodo}.xlsx"),
        };
        let pago = self.store.crear_pago(NuevoPago {
            provincia: provincia.clone(),
            periodo: periodo.to_string(),
            estado: EstadoPago::Enviado,
            archivo_envio: Some(archivo.clone()),
            total_candidatos: titulares.len() as u32,
            actor: actor.usuario.clone(),
        })?;

        info!(
            pago = %pago.id,
            provincia = %provincia,
            candidatos = titulares.len(),
            "payment batch created"
        );
        Ok(PagoCreado {
            pago: pago.id,
            periodo: periodo.to_string(),
            total_candidatos: titulares.len() as u32,
            archivo,
            contenido,
        })
    }

    /// Reconcile the reply: validated holders land in the nómina, the
    /// rest are suspended with the fixed motive.
    pub fn procesar_respuesta(
        &self,
        pago_id: &PagoId,
        bytes: &[u8],
        nombre: &str,
        actor: &Actor,
    ) -> Result<PagoResumen, PagoError> {
        actor.exigir(&[RolActor::Tecnico, RolActor::Coordinador])?;
        let mut pago = self
            .store
            .pago(pago_id)?
            .ok_or(PagoError::PagoNoEncontrado)?;
        if !matches!(pago.estado, EstadoPago::Enviado | EstadoPago::Procesado) {
            return Err(TransicionInvalida {
                entidad: "pago",
                de: pago.estado.label().to_string(),
                a: EstadoPago::Procesado.label().to_string(),
            }
            .into());
        }

        validar_archivo(nombre, bytes.len() as u64, PropositoArchivo::RespuestaCruce)?;
        let planilla = planilla::leer_planilla(bytes, nombre, self.presupuesto)?;
        let columna = planilla
            .columna_entre(COLUMNAS_DOCUMENTO)
            .ok_or(PagoError::SinColumnaDocumento)?;
        let mut respuesta = std::collections::HashSet::new();
        for fila in &planilla.filas {
            let id = normalizar_dni(fila.valor(columna));
            if !id.is_empty() {
                respuesta.insert(id);
            }
        }
        if respuesta.is_empty() {
            return Err(PagoError::RespuestaVacia);
        }

        for legajo in self.titulares_activos(&pago.provincia)? {
            let ciudadano = self
                .store
                .ciudadano(&legajo.ciudadano)?
                .ok_or(RepositoryError::NotFound)?;
            if respuesta.contains(&normalizar_dni(&ciudadano.documento)) {
                let inserto = self.store.insertar_nomina(PagoNomina {
                    pago: pago.id.clone(),
                    legajo: legajo.id.clone(),
                    estado: EstadoNomina::Validado,
                    registrado_en: Utc::now(),
                })?;
                if inserto {
                    pago.total_validados += 1;
                }
            } else {
                match self
                    .cupo
                    .suspender_slot(&legajo.id, actor, MOTIVO_SUSPENSION_PAGO)
                {
                    Ok(()) => {}
                    Err(CupoError::NoConfigurado(provincia)) => {
                        warn!(
                            legajo = %legajo.id,
                            provincia = %provincia,
                            "no quota row, suspension recorded as status only"
                        );
                        let mut limpio = self
                            .store
                            .legajo(&legajo.id)?
                            .ok_or(RepositoryError::NotFound)?;
                        limpio.es_titular_activo = false;
                        self.store.actualizar_legajo(&limpio)?;
                    }
                    Err(otro) => return Err(otro.into()),
                }
                let antes = self
                    .store
                    .legajo(&legajo.id)?
                    .ok_or(RepositoryError::NotFound)?;
                let mut observado = antes.clone();
                observado.observacion_cruce = Some(MOTIVO_SUSPENSION_PAGO.to_string());
                observado.modificado_por = actor.usuario.clone();
                self.store.actualizar_legajo(&observado)?;
                self.historial
                    .registrar_cambio_legajo(&antes, &observado, actor)?;
                self.store.insertar_nomina(PagoNomina {
                    pago: pago.id.clone(),
                    legajo: legajo.id.clone(),
                    estado: EstadoNomina::Excluido,
                    registrado_en: Utc::now(),
                })?;
                pago.total_excluidos += 1;
            }
        }

        pago.archivo_respuesta = Some(ArchivoRef {
            nombre: nombre.to_string(),
            clave: format!("pago/respuestas/{}_{nombre}", pago.id),
        });
        pago.estado = EstadoPago::Procesado;
        self.store.actualizar_pago(&pago)?;

        info!(
            pago = %pago.id,
            validados = pago.total_validados,
            excluidos = pago.total_excluidos,
            "payment reply reconciled"
        );
        Ok(PagoResumen {
            pago: pago.id.clone(),
            estado: pago.estado.label(),
            total_candidatos: pago.total_candidatos,
            total_validados: pago.total_validados,
            total_excluidos: pago.total_excluidos,
        })
    }
}

fn validar_periodo(periodo: &str) -> Result<(), PagoError> {
    let completo = format!("{periodo}-01");
    NaiveDate::parse_from_str(&completo, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| PagoError::PeriodoInvalido(periodo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expediente::cupo::CupoService;
    use crate::workflows::expediente::domain::{
        EstadoCupo, ResultadoSintys, RevisionTecnico, RolLegajo, Sexo, TipoDocumento,
    };
    use crate::workflows::expediente::memoria::MemoriaStore;
    use crate::workflows::expediente::repository::{
        CiudadanoStore, ExpedienteStore, NuevoCiudadano, NuevoExpediente, NuevoLegajo, PagoStore,
    };

    const PRESUPUESTO: Duration = Duration::from_secs(5);

    fn tecnico() -> Actor {
        Actor::nuevo("tecnico-1", RolActor::Tecnico)
    }

    fn preparar(documentos: &[&str]) -> (PagoService<MemoriaStore>, Arc<MemoriaStore>, ProvinciaId) {
        let store = Arc::new(MemoriaStore::nuevo());
        let provincia = ProvinciaId("chaco".to_string());
        let expediente = store
            .crear_expediente(NuevoExpediente {
                provincia: provincia.clone(),
                numero: None,
                observaciones: None,
                planilla: None,
                actor: "chaco-user".to_string(),
            })
            .expect("expediente");

        let cupo = CupoService::nuevo(Arc::clone(&store));
        cupo.inicializar(
            &provincia,
            documentos.len() as u32,
            &Actor::nuevo("coord", RolActor::Coordinador),
        )
        .expect("quota");

        for documento in documentos {
            let ciudadano = store
                .crear_ciudadano(NuevoCiudadano {
                    tipo_documento: TipoDocumento::Dni,
                    documento: documento.to_string(),
                    cuit: None,
                    apellido: format!("Apellido{documento}"),
                    nombre: format!("Nombre{documento}"),
                    fecha_nacimiento: chrono::NaiveDate::from_ymd_opt(1990, 1, 1)
                        .expect("valid date"),
                    sexo: Sexo::X,
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
                    provincia: provincia.clone(),
                    ciudadano: ciudadano.id,
                    rol: RolLegajo::Beneficiario,
                    actor: "importer".to_string(),
                }])
                .expect("legajo")
                .remove(0);
            legajo.revision_tecnico = RevisionTecnico::Aprobado;
            legajo.resultado_sintys = ResultadoSintys::Match;
            store.actualizar_legajo(&legajo).expect("update");
            cupo.reservar_slot(&legajo.id, &tecnico(), "alta")
                .expect("reserved");
        }

        (
            PagoService::nuevo(Arc::clone(&store), PRESUPUESTO),
            store,
            provincia,
        )
    }

    #[test]
    fn crear_pago_snapshots_the_active_holders() {
        let (servicio, _store, provincia) = preparar(&["1110000", "2220000"]);
        let creado = servicio
            .crear_expediente_pago(&provincia, "2025-06", &tecnico())
            .expect("batch created");
        assert_eq!(creado.total_candidatos, 2);
        assert_eq!(creado.archivo.clave, "pago/chaco_2025-06.xlsx");
        assert!(!creado.contenido.is_empty());
    }

    #[test]
    fn malformed_period_is_rejected() {
        let (servicio, _store, provincia) = preparar(&["1110000"]);
        let error = servicio
            .crear_expediente_pago(&provincia, "junio-2025", &tecnico())
            .expect_err("period rejected");
        assert!(matches!(error, PagoError::PeriodoInvalido(_)));
    }

    #[test]
    fn reply_validates_present_and_suspends_absent_holders() {
        let (servicio, store, provincia) = preparar(&["1110000", "2220000"]);
        let creado = servicio
            .crear_expediente_pago(&provincia, "2025-06", &tecnico())
            .expect("batch created");

        let resumen = servicio
            .procesar_respuesta(&creado.pago, b"dni\n1110000\n", "respuesta.csv", &tecnico())
            .expect("reconciled");
        assert_eq!(resumen.total_validados, 1);
        assert_eq!(resumen.total_excluidos, 1);
        assert_eq!(resumen.estado, "PROCESADO");

        let legajos = store.legajos_por_provincia(&provincia).expect("rows");
        let suspendido = legajos
            .iter()
            .find(|l| !l.es_titular_activo)
            .expect("one suspended");
        assert_eq!(suspendido.estado_cupo, EstadoCupo::Dentro);
        assert_eq!(
            suspendido.observacion_cruce.as_deref(),
            Some(MOTIVO_SUSPENSION_PAGO)
        );

        let nominas = store.nominas_de(&creado.pago).expect("nominas");
        assert_eq!(nominas.len(), 2);
        assert!(nominas
            .iter()
            .any(|n| n.estado == EstadoNomina::Validado));
        assert!(nominas
            .iter()
            .any(|n| n.estado == EstadoNomina::Excluido));
    }

    #[test]
    fn reprocessing_the_same_reply_is_idempotent_for_validated_rows() {
        let (servicio, _store, provincia) = preparar(&["1110000"]);
        let creado = servicio
            .crear_expediente_pago(&provincia, "2025-06", &tecnico())
            .expect("batch created");

        servicio
            .procesar_respuesta(&creado.pago, b"dni\n1110000\n", "respuesta.csv", &tecnico())
            .expect("first pass");
        let resumen = servicio
            .procesar_respuesta(&creado.pago, b"dni\n1110000\n", "respuesta.csv", &tecnico())
            .expect("second pass");
        assert_eq!(resumen.total_validados, 1);
    }

    #[test]
    fn empty_reply_is_rejected() {
        let (servicio, _store, provincia) = preparar(&["1110000"]);
        let creado = servicio
            .crear_expediente_pago(&provincia, "2025-06", &tecnico())
            .expect("batch created");
        let error = servicio
            .procesar_respuesta(&creado.pago, b"dni\n\n", "respuesta.csv", &tecnico())
            .expect_err("no identifiers");
        assert!(matches!(error, PagoError::RespuestaVacia));
    }
}
