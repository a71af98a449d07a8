mod common;

use std::sync::Arc;

use celiaquia::workflows::expediente::pago::MOTIVO_SUSPENSION_PAGO;
use celiaquia::workflows::expediente::repository::{CiudadanoStore, CupoStore, ExpedienteStore, PagoStore};
use celiaquia::workflows::expediente::{
    ArchivoNuevo, CruceService, CupoService, EstadoCupo, EstadoExpediente, EstadoLegajo,
    EstadoNomina, EstadoService, PadronExporter, PagoService, ResultadoSintys, RevisionService,
    SlotArchivo,
};
use celiaquia::workflows::importador::planilla;
use common::{
    actor_provincia, coordinador, planilla_xlsx, preparar_import, provincia, tecnico,
    ENCABEZADOS_IMPORT, PRESUPUESTO,
};

#[test]
fn import_review_cross_match_payment_and_padron_end_to_end() {
    let (store, importador, expediente) = preparar_import();

    // Two adult beneficiaries, no responsible block.
    let planilla_import = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[
            &[
                "García", "Matías", "30011100", "01/01/1994", "DNI", "M", "", "", "", "", "",
            ],
            &[
                "Pérez", "Ana", "30022200", "15/07/1992", "DNI", "F", "", "", "", "", "",
            ],
        ],
    );
    let resultado = importador
        .importar(&expediente, &planilla_import, "padron.xlsx", &actor_provincia())
        .expect("import succeeds");
    assert_eq!(resultado.validos, 2);

    let cupo = CupoService::nuevo(Arc::clone(&store));
    cupo.inicializar(&provincia(), 2, &coordinador())
        .expect("quota configured");

    // The provincia completes the documentation for every legajo.
    let revision = RevisionService::nuevo(Arc::clone(&store));
    for legajo in store.legajos_de(&expediente).expect("legajos") {
        for (slot, nombre) in [
            (SlotArchivo::Archivo1, "dni.pdf"),
            (SlotArchivo::Archivo2, "biopsia.pdf"),
            (SlotArchivo::Archivo3, "negativa_anses.pdf"),
        ] {
            revision
                .cargar_archivo(
                    &legajo.id,
                    ArchivoNuevo {
                        slot,
                        nombre: nombre.to_string(),
                        tamano: 1024,
                    },
                    &actor_provincia(),
                )
                .expect("archive stored");
        }
    }

    let estado = EstadoService::nuevo(Arc::clone(&store));
    estado
        .confirmar_envio(&expediente, &actor_provincia())
        .expect("send confirmed");
    estado
        .asignar_tecnico(&expediente, "tecnico-1", &coordinador())
        .expect("assigned");

    for legajo in store.legajos_de(&expediente).expect("legajos") {
        assert_eq!(legajo.estado, EstadoLegajo::EnRevision);
        revision.aprobar(&legajo.id, &tecnico()).expect("approved");
    }

    // SINTYS returns both documents.
    let cruce = CruceService::nuevo(Arc::clone(&store), PRESUPUESTO);
    let resumen = cruce
        .procesar(
            &expediente,
            b"dni\n30011100\n30022200\n",
            "sintys.csv",
            &tecnico(),
        )
        .expect("cross-match");
    assert_eq!(resumen.coincidencias, 2);

    for legajo in store.legajos_de(&expediente).expect("legajos") {
        assert_eq!(legajo.resultado_sintys, ResultadoSintys::Match);
        assert!(cupo
            .reservar_slot(&legajo.id, &tecnico(), "alta inicial")
            .expect("slot reserved"));
    }
    assert_eq!(
        store.cupo(&provincia()).expect("q").expect("row").usados,
        2
    );

    // Payment: the reply only confirms the first holder.
    let pagos = PagoService::nuevo(Arc::clone(&store), PRESUPUESTO);
    let creado = pagos
        .crear_expediente_pago(&provincia(), "2025-06", &tecnico())
        .expect("payment batch");
    assert_eq!(creado.total_candidatos, 2);
    assert_eq!(creado.archivo.clave, "pago/chaco_2025-06.xlsx");

    let resumen = pagos
        .procesar_respuesta(&creado.pago, b"dni\n30011100\n", "respuesta.csv", &tecnico())
        .expect("reconciled");
    assert_eq!(resumen.total_validados, 1);
    assert_eq!(resumen.total_excluidos, 1);
    assert_eq!(resumen.estado, "PROCESADO");

    let legajos = store.legajos_de(&expediente).expect("legajos");
    let ana = legajos
        .iter()
        .find(|legajo| {
            let ciudadano = store
                .ciudadano(&legajo.ciudadano)
                .expect("q")
                .expect("row");
            ciudadano.documento == "30022200"
        })
        .expect("row");
    assert_eq!(ana.estado_cupo, EstadoCupo::Dentro);
    assert!(!ana.es_titular_activo);
    assert_eq!(ana.observacion_cruce.as_deref(), Some(MOTIVO_SUSPENSION_PAGO));

    // Suspension keeps the slot: usados still counts both.
    assert_eq!(
        store.cupo(&provincia()).expect("q").expect("row").usados,
        2
    );

    let nominas = store.nominas_de(&creado.pago).expect("nominas");
    assert_eq!(
        nominas
            .iter()
            .filter(|nomina| nomina.estado == EstadoNomina::Validado)
            .count(),
        1
    );

    // The send file round-trips through the reader.
    let envio = planilla::leer_planilla(&creado.contenido, "nomina.xlsx", PRESUPUESTO)
        .expect("send file parses");
    assert_eq!(
        envio.encabezados,
        vec!["dni", "cuit", "nombre", "apellido", "expediente"]
    );
    assert_eq!(envio.filas.len(), 2);

    // Padrón excludes nothing here: both legajos are APROBADO.
    let exporter = PadronExporter::nuevo(Arc::clone(&store));
    let padron = exporter
        .exportar(&provincia(), &tecnico())
        .expect("padrón");
    let leido = planilla::leer_planilla(&padron, "padron_final.xlsx", PRESUPUESTO)
        .expect("padrón parses");
    assert_eq!(leido.filas.len(), 2);
    assert!(leido
        .filas
        .iter()
        .all(|fila| fila.valor("estadolegajo") == "APROBADO"));

    let expediente = store.expediente(&expediente).expect("q").expect("row");
    assert_eq!(expediente.estado, EstadoExpediente::Asignado);
}

#[test]
fn rechazo_gives_the_slot_back_in_the_full_flow() {
    let (store, importador, expediente) = preparar_import();
    let planilla_import = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[&[
            "García", "Matías", "30011100", "01/01/1994", "DNI", "M", "", "", "", "", "",
        ]],
    );
    importador
        .importar(&expediente, &planilla_import, "padron.xlsx", &actor_provincia())
        .expect("import succeeds");

    let cupo = CupoService::nuevo(Arc::clone(&store));
    cupo.inicializar(&provincia(), 1, &coordinador())
        .expect("quota configured");

    let revision = RevisionService::nuevo(Arc::clone(&store));
    let legajo = store.legajos_de(&expediente).expect("legajos").remove(0);
    revision.aprobar(&legajo.id, &tecnico()).expect("approved");

    let cruce = CruceService::nuevo(Arc::clone(&store), PRESUPUESTO);
    cruce
        .procesar(&expediente, b"dni\n30011100\n", "sintys.csv", &tecnico())
        .expect("cross-match");
    assert!(cupo
        .reservar_slot(&legajo.id, &tecnico(), "alta")
        .expect("reserved"));

    // A reopened review that ends in rejection must free the slot.
    revision
        .subsanar(&legajo.id, "Documentación observada", &tecnico())
        .expect("subsanar");
    revision
        .responder(
            &legajo.id,
            vec![ArchivoNuevo {
                slot: SlotArchivo::Archivo2,
                nombre: "biopsia.pdf".to_string(),
                tamano: 512,
            }],
            None,
            &actor_provincia(),
        )
        .expect("responder");
    revision
        .rechazar(&legajo.id, "La biopsia no corresponde", &tecnico())
        .expect("rejected");

    let legajo = store.legajo(&legajo.id).expect("q").expect("row");
    assert_eq!(legajo.estado, EstadoLegajo::Rechazado);
    assert_eq!(legajo.estado_cupo, EstadoCupo::NoEval);
    assert_eq!(
        store.cupo(&provincia()).expect("q").expect("row").usados,
        0
    );
}
