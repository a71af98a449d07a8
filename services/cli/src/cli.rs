use std::path::PathBuf;
use std::sync::Arc;

use celiaquia::config::AppConfig;
use celiaquia::workflows::expediente::repository::{CiudadanoStore, ExpedienteStore};
use celiaquia::workflows::expediente::{
    ArchivoNuevo, CruceService, CupoService, EstadoRenaper, EstadoService, ExpedienteId,
    LegajoId, LegajoView, MemoriaStore, NuevoExpediente, PadronExporter, PagoId, PagoService,
    ProvinciaId, RevisionService, RolActor, SlotArchivo,
};
use celiaquia::workflows::importador::planilla::{vista_previa, MaxFilas};
use celiaquia::workflows::importador::ImportadorService;
use celiaquia::{telemetry, CoreError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::error;

use crate::infra;

#[derive(Parser, Debug)]
#[command(
    name = "celiaquia",
    about = "Operate the Celiaquía expediente pipeline from the command line",
    version
)]
struct Cli {
    /// Acting user recorded on every state change
    #[arg(long, global = true, default_value = "operador")]
    usuario: String,
    /// Role tag of the acting principal
    #[arg(long, global = true, value_enum, default_value = "sistema")]
    rol: RolArg,
    /// Provincia scope for provincia-role principals
    #[arg(long, global = true)]
    provincia_actor: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RolArg {
    Provincia,
    Tecnico,
    Coordinador,
    Sistema,
}

impl From<RolArg> for RolActor {
    fn from(value: RolArg) -> Self {
        match value {
            RolArg::Provincia => RolActor::Provincia,
            RolArg::Tecnico => RolActor::Tecnico,
            RolArg::Coordinador => RolActor::Coordinador,
            RolArg::Sistema => RolActor::Sistema,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the quota row for a provincia
    CupoInit(CupoInitArgs),
    /// Adjust the assigned total of a provincia's quota
    CupoAjustar(CupoAjustarArgs),
    /// Create an expediente and import a provincial spreadsheet into it
    Import(ImportArgs),
    /// Inspect a spreadsheet without materializing anything
    Preview(PreviewArgs),
    /// Technical review operations over one legajo
    Review {
        #[command(subcommand)]
        command: ReviewCommand,
    },
    /// Classify approved legajos against a SINTYS reply file
    CrossMatch(CruceArgs),
    /// Reserve a quota slot for an eligible legajo
    Reservar(SlotArgs),
    /// Release the slot of a holder
    Liberar(SlotArgs),
    /// Suspend a holder without freeing the slot
    Suspender(SlotArgs),
    /// Reactivate a suspended holder
    Reactivar(SlotArgs),
    /// Snapshot the active holders into a payment batch
    PagoCrear(PagoCrearArgs),
    /// Reconcile a payment reply file
    PagoProcesar(PagoProcesarArgs),
    /// Export the final beneficiary padrón
    Padron(PadronArgs),
    /// Confirm the send of an expediente (EN_ESPERA gate)
    Confirmar(ExpedienteArgs),
    /// Assign or replace the reviewing técnico
    Asignar(AsignarArgs),
    /// Close an expediente once every legajo is terminal
    Cerrar(ExpedienteArgs),
    /// Record the RENAPER validation sub-state of a legajo
    Renaper(RenaperArgs),
    /// Attach an archive to a legajo slot
    Archivo(ArchivoArgs),
    /// Retry one erroneous import row
    Reproceso(ReprocesoArgs),
}

#[derive(Args, Debug)]
struct CupoInitArgs {
    provincia: String,
    total: u32,
}

#[derive(Args, Debug)]
struct CupoAjustarArgs {
    provincia: String,
    total: u32,
    #[arg(long, default_value = "Ajuste de cupo")]
    motivo: String,
}

#[derive(Args, Debug)]
struct ImportArgs {
    provincia: String,
    archivo: PathBuf,
    /// Optional administrative number for the new expediente
    #[arg(long)]
    numero: Option<String>,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    archivo: PathBuf,
    /// Row cap: a number, or one of all/todos/none for unlimited
    #[arg(long, default_value = "10")]
    max_rows: String,
}

#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// Approve a pending or answered legajo
    Aprobar { legajo: String },
    /// Reject a legajo, giving its slot back
    Rechazar {
        legajo: String,
        #[arg(long)]
        motivo: String,
    },
    /// Open a subsanación cycle with a motive
    Subsanar {
        legajo: String,
        #[arg(long)]
        motivo: String,
    },
    /// Answer a subsanación with refreshed archives
    Responder {
        legajo: String,
        /// Slot number (1-3) the file lands in
        #[arg(long)]
        slot: u8,
        archivo: PathBuf,
        #[arg(long)]
        comentario: Option<String>,
    },
    /// Administrative exclusion of a legajo
    Excluir {
        legajo: String,
        #[arg(long)]
        motivo: String,
    },
}

#[derive(Args, Debug)]
struct RenaperArgs {
    legajo: String,
    /// Resulting sub-state
    #[arg(long, value_enum)]
    estado: RenaperArg,
    #[arg(long)]
    comentario: Option<String>,
    /// Optional answer attachment
    #[arg(long)]
    archivo: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RenaperArg {
    SinValidar,
    Validado,
    Observado,
}

impl From<RenaperArg> for EstadoRenaper {
    fn from(value: RenaperArg) -> Self {
        match value {
            RenaperArg::SinValidar => EstadoRenaper::SinValidar,
            RenaperArg::Validado => EstadoRenaper::Validado,
            RenaperArg::Observado => EstadoRenaper::Observado,
        }
    }
}

#[derive(Args, Debug)]
struct CruceArgs {
    expediente: String,
    archivo: PathBuf,
}

#[derive(Args, Debug)]
struct SlotArgs {
    legajo: String,
    #[arg(long, default_value = "Operación de cupo")]
    motivo: String,
}

#[derive(Args, Debug)]
struct PagoCrearArgs {
    provincia: String,
    /// Billing period as YYYY-MM
    periodo: String,
}

#[derive(Args, Debug)]
struct PagoProcesarArgs {
    pago: String,
    archivo: PathBuf,
}

#[derive(Args, Debug)]
struct PadronArgs {
    provincia: String,
    /// Output path; defaults to the media root
    #[arg(long)]
    salida: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExpedienteArgs {
    expediente: String,
}

#[derive(Args, Debug)]
struct AsignarArgs {
    expediente: String,
    tecnico: String,
}

#[derive(Args, Debug)]
struct ArchivoArgs {
    legajo: String,
    /// Slot number (1-3)
    #[arg(long)]
    slot: u8,
    archivo: PathBuf,
}

#[derive(Args, Debug)]
struct ReprocesoArgs {
    registro: u64,
}

fn slot_desde(numero: u8) -> Result<SlotArchivo, CoreError> {
    match numero {
        1 => Ok(SlotArchivo::Archivo1),
        2 => Ok(SlotArchivo::Archivo2),
        3 => Ok(SlotArchivo::Archivo3),
        otro => Err(CoreError::Validation(format!(
            "slot {otro} does not exist, expected 1-3"
        ))),
    }
}

pub(crate) fn run() -> i32 {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", json!({ "error": "config", "detail": err.to_string() }));
            return 2;
        }
    };
    if let Err(err) = telemetry::init(&config.telemetry) {
        eprintln!("{}", json!({ "error": "telemetry", "detail": err.to_string() }));
        return 2;
    }

    match ejecutar(cli, &config) {
        Ok(salida) => {
            println!("{salida}");
            0
        }
        Err(err) => {
            error!(%err, "command failed");
            eprintln!(
                "{}",
                json!({ "error": err.kind(), "detail": err.to_string() })
            );
            err.exit_code()
        }
    }
}

fn ejecutar(cli: Cli, config: &AppConfig) -> Result<Value, CoreError> {
    let actor = infra::construir_actor(
        &cli.usuario,
        cli.rol.into(),
        cli.provincia_actor.as_deref(),
    );
    let store = infra::cargar_store(&config.media.data_dir)?;

    let salida = despachar(cli.command, Arc::clone(&store), config, &actor)?;
    infra::guardar_store(&config.media.data_dir, &store)?;
    Ok(salida)
}

fn despachar(
    command: Command,
    store: Arc<MemoriaStore>,
    config: &AppConfig,
    actor: &celiaquia::workflows::expediente::Actor,
) -> Result<Value, CoreError> {
    match command {
        Command::CupoInit(args) => {
            let cupos = CupoService::nuevo(store);
            let vista = cupos.inicializar(&ProvinciaId(args.provincia), args.total, actor)?;
            Ok(serde_json::to_value(vista).unwrap_or_default())
        }
        Command::CupoAjustar(args) => {
            let cupos = CupoService::nuevo(store);
            let vista = cupos.ajustar_total(
                &ProvinciaId(args.provincia),
                args.total,
                actor,
                &args.motivo,
            )?;
            Ok(serde_json::to_value(vista).unwrap_or_default())
        }
        Command::Import(args) => {
            let (bytes, nombre) = infra::leer_archivo(&args.archivo)?;
            let expediente = store.crear_expediente(NuevoExpediente {
                provincia: ProvinciaId(args.provincia),
                numero: args.numero,
                observaciones: None,
                planilla: None,
                actor: actor.usuario.clone(),
            })?;
            let importador = ImportadorService::nuevo(
                store,
                config.import.presupuesto_io,
                config.import.tamano_lote,
            );
            let resultado = importador.importar(&expediente.id, &bytes, &nombre, actor)?;
            Ok(serde_json::to_value(resultado).unwrap_or_default())
        }
        Command::Preview(args) => {
            let (bytes, nombre) = infra::leer_archivo(&args.archivo)?;
            let max_filas = MaxFilas::parse(&args.max_rows).ok_or_else(|| {
                CoreError::Validation(format!("max_rows '{}' is not valid", args.max_rows))
            })?;
            let vista = vista_previa(&bytes, &nombre, max_filas, config.import.presupuesto_io)
                .map_err(CoreError::from)?;
            Ok(serde_json::to_value(vista).unwrap_or_default())
        }
        Command::Review { command } => {
            let revision = RevisionService::nuevo(Arc::clone(&store));
            let legajo = match command {
                ReviewCommand::Aprobar { legajo } => {
                    revision.aprobar(&LegajoId(legajo), actor)?
                }
                ReviewCommand::Rechazar { legajo, motivo } => {
                    revision.rechazar(&LegajoId(legajo), &motivo, actor)?
                }
                ReviewCommand::Subsanar { legajo, motivo } => {
                    revision.subsanar(&LegajoId(legajo), &motivo, actor)?
                }
                ReviewCommand::Responder {
                    legajo,
                    slot,
                    archivo,
                    comentario,
                } => {
                    let (bytes, nombre) = infra::leer_archivo(&archivo)?;
                    revision.responder(
                        &LegajoId(legajo),
                        vec![ArchivoNuevo {
                            slot: slot_desde(slot)?,
                            nombre,
                            tamano: bytes.len() as u64,
                        }],
                        comentario,
                        actor,
                    )?
                }
                ReviewCommand::Excluir { legajo, motivo } => {
                    revision.excluir(&LegajoId(legajo), &motivo, actor)?
                }
            };
            let ciudadano = store
                .ciudadano(&legajo.ciudadano)?
                .ok_or(CoreError::Storage(
                    celiaquia::workflows::expediente::RepositoryError::NotFound,
                ))?;
            Ok(serde_json::to_value(LegajoView::desde(&legajo, &ciudadano)).unwrap_or_default())
        }
        Command::CrossMatch(args) => {
            let (bytes, nombre) = infra::leer_archivo(&args.archivo)?;
            let cruce = CruceService::nuevo(store, config.import.presupuesto_io);
            let resumen =
                cruce.procesar(&ExpedienteId(args.expediente), &bytes, &nombre, actor)?;
            Ok(serde_json::to_value(resumen).unwrap_or_default())
        }
        Command::Reservar(args) => {
            let cupos = CupoService::nuevo(store);
            let asignado = cupos.reservar_slot(&LegajoId(args.legajo.clone()), actor, &args.motivo)?;
            Ok(json!({ "legajo": args.legajo, "asignado": asignado }))
        }
        Command::Liberar(args) => {
            let cupos = CupoService::nuevo(store);
            cupos.liberar_slot(&LegajoId(args.legajo.clone()), actor, &args.motivo)?;
            Ok(json!({ "legajo": args.legajo, "liberado": true }))
        }
        Command::Suspender(args) => {
            let cupos = CupoService::nuevo(store);
            cupos.suspender_slot(&LegajoId(args.legajo.clone()), actor, &args.motivo)?;
            Ok(json!({ "legajo": args.legajo, "suspendido": true }))
        }
        Command::Reactivar(args) => {
            let cupos = CupoService::nuevo(store);
            cupos.reactivar_slot(&LegajoId(args.legajo.clone()), actor, &args.motivo)?;
            Ok(json!({ "legajo": args.legajo, "reactivado": true }))
        }
        Command::PagoCrear(args) => {
            let pagos = PagoService::nuevo(store, config.import.presupuesto_io);
            let creado =
                pagos.crear_expediente_pago(&ProvinciaId(args.provincia), &args.periodo, actor)?;
            let destino =
                infra::escribir_media(&config.media.root, &creado.archivo.clave, &creado.contenido)?;
            Ok(json!({
                "pago": creado.pago.0,
                "periodo": creado.periodo,
                "total_candidatos": creado.total_candidatos,
                "archivo": destino,
            }))
        }
        Command::PagoProcesar(args) => {
            let (bytes, nombre) = infra::leer_archivo(&args.archivo)?;
            let pagos = PagoService::nuevo(store, config.import.presupuesto_io);
            let resumen =
                pagos.procesar_respuesta(&PagoId(args.pago), &bytes, &nombre, actor)?;
            Ok(serde_json::to_value(resumen).unwrap_or_default())
        }
        Command::Padron(args) => {
            let exporter = PadronExporter::nuevo(store);
            let provincia = ProvinciaId(args.provincia);
            let bytes = exporter.exportar(&provincia, actor)?;
            let destino = match args.salida {
                Some(salida) => {
                    std::fs::write(&salida, &bytes)?;
                    salida
                }
                None => infra::escribir_media(
                    &config.media.root,
                    &format!("padron/{provincia}_padron_final.xlsx"),
                    &bytes,
                )?,
            };
            Ok(json!({ "provincia": provincia.0, "archivo": destino }))
        }
        Command::Confirmar(args) => {
            let estados = EstadoService::nuevo(store);
            let expediente = estados.confirmar_envio(&ExpedienteId(args.expediente), actor)?;
            Ok(json!({
                "expediente": expediente.id.0,
                "estado": expediente.estado.label(),
            }))
        }
        Command::Asignar(args) => {
            let estados = EstadoService::nuevo(store);
            let asignacion =
                estados.asignar_tecnico(&ExpedienteId(args.expediente), &args.tecnico, actor)?;
            Ok(json!({
                "expediente": asignacion.expediente.0,
                "tecnico": asignacion.tecnico,
                "activa": asignacion.activa,
            }))
        }
        Command::Cerrar(args) => {
            let estados = EstadoService::nuevo(store);
            let expediente = estados.cerrar(&ExpedienteId(args.expediente), actor)?;
            Ok(json!({
                "expediente": expediente.id.0,
                "estado": expediente.estado.label(),
            }))
        }
        Command::Renaper(args) => {
            let revision = RevisionService::nuevo(store);
            let archivo = match args.archivo {
                Some(ruta) => {
                    let (bytes, nombre) = infra::leer_archivo(&ruta)?;
                    Some((nombre, bytes.len() as u64))
                }
                None => None,
            };
            let legajo = revision.marcar_renaper(
                &LegajoId(args.legajo),
                args.estado.into(),
                args.comentario,
                archivo,
                actor,
            )?;
            Ok(json!({
                "legajo": legajo.id.0,
                "estado_renaper": legajo.estado_renaper.label(),
            }))
        }
        Command::Archivo(args) => {
            let (bytes, nombre) = infra::leer_archivo(&args.archivo)?;
            let revision = RevisionService::nuevo(store);
            let legajo = revision.cargar_archivo(
                &LegajoId(args.legajo),
                ArchivoNuevo {
                    slot: slot_desde(args.slot)?,
                    nombre,
                    tamano: bytes.len() as u64,
                },
                actor,
            )?;
            Ok(json!({
                "legajo": legajo.id.0,
                "archivos_ok": legajo.archivos_ok(),
            }))
        }
        Command::Reproceso(args) => {
            let importador = ImportadorService::nuevo(
                store,
                config.import.presupuesto_io,
                config.import.tamano_lote,
            );
            let resultado = importador.reprocesar(args.registro, actor)?;
            Ok(serde_json::to_value(resultado).unwrap_or_default())
        }
    }
}
