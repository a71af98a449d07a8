//! Import orchestrator: drives the reader, the family resolver and the
//! citizen registry, then materializes legajos in one unit of work.
//!
//! Validation happens entirely before the first write, so a hard error
//! leaves the expediente in CREADO with nothing persisted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::familia::{self, BloqueResponsable, FamiliaError, FilaFamiliar, PersonaFila};
use super::planilla::{self, PlanillaError};
use super::registro::{self, CiudadanoInvalido, FilaCiudadano};
use crate::workflows::expediente::domain::{
    Actor, ArchivoRef, CiudadanoId, EstadoExpediente, LegajoId, PermisoDenegado, RolActor,
    RolLegajo, Sexo, TransicionInvalida, VinculoFamiliar,
};
use crate::workflows::expediente::estado::{EstadoError, EstadoService};
use crate::workflows::expediente::repository::{
    CiudadanoStore, ExpedienteStore, HistorialStore, NuevoLegajo, NuevoRegistroErroneo,
    RepositoryError,
};
use crate::workflows::expediente::validador::{
    validar_archivo, PropositoArchivo, ValidacionArchivo,
};

pub const ENCABEZADOS_OBLIGATORIOS: &[&str] = &[
    "apellido",
    "nombre",
    "documento",
    "fecha_nacimiento",
    "tipo_documento",
    "sexo",
];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("expediente not found")]
    ExpedienteNoEncontrado,
    #[error("erroneous row {0} not found")]
    RegistroNoEncontrado(u64),
    #[error("erroneous row {0} is already resolved")]
    RegistroYaResuelto(u64),
    #[error(transparent)]
    Planilla(#[from] PlanillaError),
    #[error(transparent)]
    Familia(#[from] FamiliaError),
    #[error(transparent)]
    Archivo(#[from] ValidacionArchivo),
    #[error(transparent)]
    Permiso(#[from] PermisoDenegado),
    #[error(transparent)]
    Estado(#[from] EstadoError),
    #[error(transparent)]
    Repositorio(#[from] RepositoryError),
}

/// Per-row rejection detail surfaced to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFila {
    pub fila: usize,
    pub campo: Option<&'static str>,
    pub detalle: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResultado {
    pub expediente: String,
    pub validos: usize,
    pub excluidos: usize,
    pub errores: Vec<ErrorFila>,
    pub advertencias: Vec<String>,
    pub legajos: Vec<LegajoId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReprocesoResultado {
    pub registro: u64,
    pub intento: u32,
    pub exitoso: bool,
    pub detalle: String,
    pub legajo: Option<LegajoId>,
}

pub struct ImportadorService<S> {
    store: Arc<S>,
    estado: EstadoService<S>,
    presupuesto: Duration,
    tamano_lote: usize,
}

struct FilaPendiente {
    fila: FilaFamiliar,
    datos: BTreeMap<String, String>,
}

impl<S: CiudadanoStore + ExpedienteStore + HistorialStore> ImportadorService<S> {
    pub fn nuevo(store: Arc<S>, presupuesto: Duration, tamano_lote: usize) -> Self {
        Self {
            estado: EstadoService::nuevo(Arc::clone(&store)),
            store,
            presupuesto,
            tamano_lote: tamano_lote.max(1),
        }
    }

    /// Parse, classify and materialize one spreadsheet into legajos.
    pub fn importar(
        &self,
        expediente_id: &crate::workflows::expediente::domain::ExpedienteId,
        bytes: &[u8],
        nombre: &str,
        actor: &Actor,
    ) -> Result<ImportResultado, ImportError> {
        actor.exigir(&[RolActor::Provincia])?;
        validar_archivo(nombre, bytes.len() as u64, PropositoArchivo::PlanillaImportacion)?;

        let mut expediente = self
            .store
            .expediente(expediente_id)?
            .ok_or(ImportError::ExpedienteNoEncontrado)?;
        if expediente.estado != EstadoExpediente::Creado {
            return Err(EstadoError::Transicion(TransicionInvalida {
                entidad: "expediente",
                de: expediente.estado.label().to_string(),
                a: EstadoExpediente::Procesado.label().to_string(),
            })
            .into());
        }

        let planilla = planilla::leer_planilla(bytes, nombre, self.presupuesto)?;
        let faltantes: Vec<String> = ENCABEZADOS_OBLIGATORIOS
            .iter()
            .filter(|encabezado| !planilla.tiene_columna(encabezado))
            .map(|encabezado| encabezado.to_string())
            .collect();
        if !faltantes.is_empty() {
            return Err(PlanillaError::ColumnasFaltantes(faltantes).into());
        }

        let hoy = Utc::now().date_naive();
        let mut errores: Vec<ErrorFila> = Vec::new();
        let mut exclusiones: Vec<NuevoRegistroErroneo> = Vec::new();
        let mut pendientes: Vec<FilaPendiente> = Vec::new();

        // Structural exclusions first; everything else reaches the
        // family resolver.
        for fila in &planilla.filas {
            match fila_a_familiar(fila) {
                Ok(familiar) => pendientes.push(FilaPendiente {
                    fila: familiar,
                    datos: fila.valores.clone(),
                }),
                Err(motivo) => {
                    errores.push(ErrorFila {
                        fila: fila.numero,
                        campo: Some("documento"),
                        detalle: motivo.clone(),
                    });
                    exclusiones.push(NuevoRegistroErroneo {
                        expediente: expediente.id.clone(),
                        fila: fila.numero,
                        datos: fila.valores.clone(),
                        motivo,
                    });
                }
            }
        }

        let filas: Vec<FilaFamiliar> = pendientes.iter().map(|p| p.fila.clone()).collect();
        let resolucion = familia::resolver(&filas, hoy)?;
        let mut advertencias = resolucion.advertencias.clone();

        // Per-row citizen validation; failures exclude the row without
        // aborting the batch.
        let mut validos: Vec<(usize, RolLegajo, crate::workflows::expediente::repository::NuevoCiudadano)> =
            Vec::new();
        let mut documentos_excluidos: Vec<String> = Vec::new();
        for miembro in &resolucion.miembros {
            let pendiente = pendientes
                .iter()
                .find(|p| p.fila.numero == miembro.fila)
                .ok_or(RepositoryError::NotFound)?;
            let fila_ciudadano = fila_a_ciudadano(&pendiente.fila, &pendiente.datos);
            match registro::validar(&fila_ciudadano, hoy) {
                Ok(nuevo) => validos.push((miembro.fila, miembro.rol, nuevo)),
                Err(CiudadanoInvalido { fila, campo, detalle }) => {
                    documentos_excluidos
                        .push(super::normalizador::normalizar_dni(&pendiente.fila.beneficiario.documento));
                    errores.push(ErrorFila {
                        fila,
                        campo: Some(campo),
                        detalle: detalle.clone(),
                    });
                    exclusiones.push(NuevoRegistroErroneo {
                        expediente: expediente.id.clone(),
                        fila,
                        datos: pendiente.datos.clone(),
                        motivo: format!("{campo}: {detalle}"),
                    });
                }
            }
        }

        // Commit phase: citizens, legajos in batches, edges, exclusions
        // and the expediente transition.
        let mut documento_a_ciudadano: BTreeMap<String, CiudadanoId> = BTreeMap::new();
        let mut nuevos_legajos: Vec<NuevoLegajo> = Vec::new();
        for (_, rol, nuevo) in &validos {
            let ciudadano = registro::get_or_create(self.store.as_ref(), nuevo.clone())?;
            documento_a_ciudadano.insert(ciudadano.documento.clone(), ciudadano.id.clone());
            if let Some(cuit) = &ciudadano.cuit {
                documento_a_ciudadano.insert(cuit.clone(), ciudadano.id.clone());
            }
            nuevos_legajos.push(NuevoLegajo {
                expediente: expediente.id.clone(),
                provincia: expediente.provincia.clone(),
                ciudadano: ciudadano.id.clone(),
                rol: *rol,
                actor: actor.usuario.clone(),
            });
        }

        let mut clave_a_ciudadano: BTreeMap<String, CiudadanoId> = documento_a_ciudadano.clone();
        for externo in &resolucion.responsables_externos {
            let Some(fecha_nacimiento) = externo.fecha_nacimiento else {
                advertencias.push(format!(
                    "fila {}: responsable {} sin fecha de nacimiento, no se registra",
                    externo.fila_origen, externo.clave
                ));
                continue;
            };
            let ciudadano = registro::get_or_create(
                self.store.as_ref(),
                crate::workflows::expediente::repository::NuevoCiudadano {
                    tipo_documento: crate::workflows::expediente::domain::TipoDocumento::Dni,
                    documento: externo.documento.clone(),
                    cuit: externo.cuit.clone(),
                    apellido: externo.apellido.clone(),
                    nombre: externo.nombre.clone(),
                    fecha_nacimiento,
                    sexo: externo.sexo.unwrap_or(Sexo::X),
                    telefono: None,
                    email: None,
                    codigo_postal: None,
                    municipio: None,
                    localidad: None,
                },
            )?;
            clave_a_ciudadano.insert(externo.clave.clone(), ciudadano.id.clone());
            if let Some(cuit) = &ciudadano.cuit {
                clave_a_ciudadano.insert(cuit.clone(), ciudadano.id.clone());
            }
            clave_a_ciudadano.insert(ciudadano.documento.clone(), ciudadano.id.clone());
        }

        let mut legajos = Vec::new();
        for lote in nuevos_legajos.chunks(self.tamano_lote) {
            legajos.extend(self.store.insertar_legajos(lote.to_vec())?);
        }

        let mut vinculos = Vec::new();
        for arista in &resolucion.aristas {
            if documentos_excluidos.contains(&arista.beneficiario_documento) {
                advertencias.push(format!(
                    "fila {}: vínculo descartado, el beneficiario fue excluido",
                    arista.fila
                ));
                continue;
            }
            let responsable = clave_a_ciudadano.get(&arista.responsable_clave);
            let beneficiario = documento_a_ciudadano.get(&arista.beneficiario_documento);
            match (responsable, beneficiario) {
                (Some(responsable), Some(beneficiario)) => vinculos.push(VinculoFamiliar {
                    expediente: expediente.id.clone(),
                    responsable: responsable.clone(),
                    beneficiario: beneficiario.clone(),
                    vinculo: arista.vinculo.clone(),
                }),
                _ => advertencias.push(format!(
                    "fila {}: vínculo descartado, falta uno de los extremos",
                    arista.fila
                )),
            }
        }
        self.store.insertar_vinculos(vinculos)?;

        let excluidos = exclusiones.len();
        for exclusion in exclusiones {
            self.store.registrar_erroneo(exclusion)?;
        }

        expediente.planilla = Some(ArchivoRef {
            nombre: nombre.to_string(),
            clave: format!("expedientes/{}/{nombre}", expediente.id),
        });
        expediente.modificado_por = actor.usuario.clone();
        self.store.actualizar_expediente(&expediente)?;
        self.estado.procesar(&expediente.id, actor)?;
        self.estado.poner_en_espera(&expediente.id, actor)?;

        if !advertencias.is_empty() {
            warn!(
                expediente = %expediente.id,
                advertencias = advertencias.len(),
                "import finished with warnings"
            );
        }
        info!(
            expediente = %expediente.id,
            validos = legajos.len(),
            excluidos,
            "import materialized"
        );

        Ok(ImportResultado {
            expediente: expediente.id.to_string(),
            validos: legajos.len(),
            excluidos,
            errores,
            advertencias,
            legajos: legajos.into_iter().map(|legajo| legajo.id).collect(),
        })
    }

    /// Retry one erroneous row; every attempt is recorded with a unique
    /// attempt number.
    pub fn reprocesar(
        &self,
        registro_id: u64,
        actor: &Actor,
    ) -> Result<ReprocesoResultado, ImportError> {
        actor.exigir(&[RolActor::Provincia, RolActor::Tecnico])?;
        let mut registro = self
            .store
            .registro_erroneo(registro_id)?
            .ok_or(ImportError::RegistroNoEncontrado(registro_id))?;
        if registro.resuelto {
            return Err(ImportError::RegistroYaResuelto(registro_id));
        }
        let expediente = self
            .store
            .expediente(&registro.expediente)?
            .ok_or(ImportError::ExpedienteNoEncontrado)?;

        let intento = self.store.reprocesos_de(registro_id)?.len() as u32 + 1;
        let hoy = Utc::now().date_naive();
        let fila_ciudadano = fila_cruda_a_ciudadano(registro.fila, &registro.datos);

        let (exitoso, detalle, legajo) = match registro::validar(&fila_ciudadano, hoy) {
            Ok(nuevo) => {
                let ciudadano = registro::get_or_create(self.store.as_ref(), nuevo)?;
                let legajos = self.store.insertar_legajos(vec![NuevoLegajo {
                    expediente: expediente.id.clone(),
                    provincia: expediente.provincia.clone(),
                    ciudadano: ciudadano.id,
                    rol: RolLegajo::Beneficiario,
                    actor: actor.usuario.clone(),
                }])?;
                registro.resuelto = true;
                self.store.actualizar_registro_erroneo(&registro)?;
                (
                    true,
                    "fila convertida en legajo".to_string(),
                    legajos.into_iter().next().map(|legajo| legajo.id),
                )
            }
            Err(error) => (false, error.to_string(), None),
        };

        self.store.registrar_reproceso(
            crate::workflows::expediente::domain::RegistroErroneoReprocesado {
                registro: registro_id,
                intento,
                exitoso,
                detalle: detalle.clone(),
                registrado_en: Utc::now(),
            },
        )?;

        Ok(ReprocesoResultado {
            registro: registro_id,
            intento,
            exitoso,
            detalle,
            legajo,
        })
    }
}

fn fila_a_familiar(fila: &planilla::Fila) -> Result<FilaFamiliar, String> {
    let documento = fila.valor("documento");
    if super::normalizador::normalizar_dni(documento).is_empty() {
        return Err("documento vacío o sin dígitos".to_string());
    }

    let beneficiario = PersonaFila {
        fila: fila.numero,
        apellido: fila.valor("apellido").to_string(),
        nombre: fila.valor("nombre").to_string(),
        documento: documento.to_string(),
        cuit: valor_opcional(fila, "cuit"),
        fecha_nacimiento: fila.fecha("fecha_nacimiento"),
        sexo: Sexo::parse(fila.valor("sexo")),
    };

    let cuit_responsable = fila.valor("cuit_responsable");
    let responsable = if cuit_responsable.trim().is_empty() {
        None
    } else {
        Some(BloqueResponsable {
            apellido: fila.valor("apellido_responsable").to_string(),
            nombre: fila.valor("nombre_responsable").to_string(),
            cuit: cuit_responsable.to_string(),
            fecha_nacimiento: fila.fecha("fecha_de_nacimiento_responsable"),
            sexo: Sexo::parse(fila.valor("sexo_responsable")),
            vinculo: valor_opcional(fila, "vinculo").unwrap_or_else(|| "responsable".to_string()),
        })
    };

    Ok(FilaFamiliar {
        numero: fila.numero,
        beneficiario,
        responsable,
    })
}

fn valor_opcional(fila: &planilla::Fila, columna: &str) -> Option<String> {
    let valor = fila.valor(columna).trim();
    if valor.is_empty() {
        None
    } else {
        Some(valor.to_string())
    }
}

fn fila_a_ciudadano(fila: &FilaFamiliar, datos: &BTreeMap<String, String>) -> FilaCiudadano {
    FilaCiudadano {
        fila: fila.numero,
        tipo_documento: datos.get("tipo_documento").cloned().unwrap_or_default(),
        documento: fila.beneficiario.documento.clone(),
        apellido: fila.beneficiario.apellido.clone(),
        nombre: fila.beneficiario.nombre.clone(),
        fecha_nacimiento: fila.beneficiario.fecha_nacimiento,
        sexo: datos.get("sexo").cloned().unwrap_or_default(),
        cuit: fila.beneficiario.cuit.clone(),
        telefono: datos.get("telefono").cloned().unwrap_or_default(),
        email: datos.get("email").cloned().unwrap_or_default(),
        codigo_postal: datos.get("codigo_postal").cloned().unwrap_or_default(),
        municipio: datos.get("municipio").cloned().unwrap_or_default(),
        localidad: datos.get("localidad").cloned().unwrap_or_default(),
    }
}

fn fila_cruda_a_ciudadano(numero: usize, datos: &BTreeMap<String, String>) -> FilaCiudadano {
    let valor = |columna: &str| datos.get(columna).cloned().unwrap_or_default();
    FilaCiudadano {
        fila: numero,
        tipo_documento: valor("tipo_documento"),
        documento: valor("documento"),
        apellido: valor("apellido"),
        nombre: valor("nombre"),
        fecha_nacimiento: planilla::parse_fecha(&valor("fecha_nacimiento")),
        sexo: valor("sexo"),
        cuit: datos.get("cuit").cloned().filter(|v| !v.trim().is_empty()),
        telefono: valor("telefono"),
        email: valor("email"),
        codigo_postal: valor("codigo_postal"),
        municipio: valor("municipio"),
        localidad: valor("localidad"),
    }
}
