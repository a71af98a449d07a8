mod common;

use celiaquia::workflows::expediente::repository::{CiudadanoStore, ExpedienteStore};
use celiaquia::workflows::expediente::{
    EstadoExpediente, EstadoLegajo, RolLegajo, TipoDocumento,
};
use celiaquia::workflows::importador::planilla::{vista_previa, MaxFilas};
use celiaquia::workflows::importador::{FamiliaError, ImportError};
use common::{
    actor_provincia, planilla_xlsx, preparar_import, ENCABEZADOS_IMPORT, PRESUPUESTO,
};

#[test]
fn caso_a_self_responsible_creates_one_dual_role_legajo() {
    let (store, servicio, expediente) = preparar_import();
    let planilla = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[&[
            "García",
            "Matías",
            "20407321384",
            "01/01/1999",
            "DNI",
            "M",
            "García",
            "Matías",
            "20407321384",
            "01/01/1999",
            "M",
        ]],
    );

    let resultado = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect("import succeeds");

    assert_eq!(resultado.validos, 1);
    assert_eq!(resultado.excluidos, 0);

    let legajos = store.legajos_de(&expediente).expect("legajos");
    assert_eq!(legajos.len(), 1);
    assert_eq!(legajos[0].rol, RolLegajo::BeneficiarioYResponsable);
    assert_eq!(legajos[0].estado, EstadoLegajo::DocumentoPendiente);

    assert!(store.vinculos_de(&expediente).expect("edges").is_empty());

    let expediente = store
        .expediente(&expediente)
        .expect("query")
        .expect("row");
    assert_eq!(expediente.estado, EstadoExpediente::EnEspera);
}

#[test]
fn caso_b_external_responsible_gets_edge_but_no_legajo() {
    let (store, servicio, expediente) = preparar_import();
    let planilla = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[&[
            "Pérez",
            "Nicolás",
            "55123456",
            "2016-03-15",
            "DNI",
            "M",
            "García",
            "Matías",
            "20407321384",
            "1999-01-01",
            "M",
        ]],
    );

    let resultado = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect("import succeeds");
    assert_eq!(resultado.validos, 1);

    let legajos = store.legajos_de(&expediente).expect("legajos");
    assert_eq!(legajos.len(), 1);
    assert_eq!(legajos[0].rol, RolLegajo::Beneficiario);

    let vinculos = store.vinculos_de(&expediente).expect("edges");
    assert_eq!(vinculos.len(), 1);

    let responsable = store
        .ciudadano(&vinculos[0].responsable)
        .expect("query")
        .expect("citizen exists despite having no legajo");
    assert_eq!(responsable.apellido, "García");
    assert_eq!(responsable.documento, "40732138");

    let beneficiario = store
        .ciudadano(&vinculos[0].beneficiario)
        .expect("query")
        .expect("row");
    assert_eq!(beneficiario.documento, "55123456");
}

#[test]
fn caso_c_shared_responsible_appears_exactly_once() {
    let (store, servicio, expediente) = preparar_import();
    let matias: &[&str] = &[
        "García",
        "Matías",
        "20407321384",
        "01/01/1999",
        "DNI",
        "M",
        "García",
        "Matías",
        "20407321384",
        "01/01/1999",
        "M",
    ];
    let juan: &[&str] = &[
        "López",
        "Juan",
        "55111222",
        "01/05/2015",
        "DNI",
        "M",
        "García",
        "Matías",
        "20407321384",
        "01/01/1999",
        "M",
    ];
    let maria: &[&str] = &[
        "Rodríguez",
        "María",
        "55333444",
        "20/09/2017",
        "DNI",
        "F",
        "García",
        "Matías",
        "20407321384",
        "01/01/1999",
        "M",
    ];
    let planilla = planilla_xlsx(ENCABEZADOS_IMPORT, &[matias, juan, maria]);

    let resultado = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect("import succeeds");
    assert_eq!(resultado.validos, 3);

    let legajos = store.legajos_de(&expediente).expect("legajos");
    assert_eq!(legajos.len(), 3);

    // Matías holds exactly one citizen record and one legajo.
    let matias_ciudadano = store
        .ciudadano_por_documento(TipoDocumento::Dni, "20407321384")
        .expect("query")
        .expect("row");
    let de_matias: Vec<_> = legajos
        .iter()
        .filter(|legajo| legajo.ciudadano == matias_ciudadano.id)
        .collect();
    assert_eq!(de_matias.len(), 1);
    assert_eq!(de_matias[0].rol, RolLegajo::BeneficiarioYResponsable);

    let vinculos = store.vinculos_de(&expediente).expect("edges");
    assert_eq!(vinculos.len(), 2);
    assert!(vinculos
        .iter()
        .all(|vinculo| vinculo.responsable == matias_ciudadano.id));
}

#[test]
fn error_1_younger_responsible_rejects_everything() {
    let (store, servicio, expediente) = preparar_import();
    let planilla = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[&[
            "Suárez",
            "Laura",
            "30111222",
            "01/01/1994",
            "DNI",
            "F",
            "Suárez",
            "Pedro",
            "20444555666",
            "01/01/2004",
            "M",
        ]],
    );

    let error = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect_err("import rejected");
    assert!(matches!(
        error,
        ImportError::Familia(FamiliaError::ResponsableMasJoven { .. })
    ));

    assert!(store.legajos_de(&expediente).expect("legajos").is_empty());
    let expediente = store
        .expediente(&expediente)
        .expect("query")
        .expect("row");
    assert_eq!(expediente.estado, EstadoExpediente::Creado);
}

#[test]
fn error_3_duplicate_document_rejects_everything() {
    let (store, servicio, expediente) = preparar_import();
    let fila: &[&str] = &[
        "García", "Matías", "30111222", "01/01/1994", "DNI", "M", "", "", "", "", "",
    ];
    let planilla = planilla_xlsx(ENCABEZADOS_IMPORT, &[fila, fila]);

    let error = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect_err("import rejected");
    assert!(matches!(
        error,
        ImportError::Familia(FamiliaError::BeneficiarioDuplicado { .. })
    ));
    assert!(store.legajos_de(&expediente).expect("legajos").is_empty());
}

#[test]
fn invalid_rows_are_excluded_and_the_counts_balance() {
    let (store, servicio, expediente) = preparar_import();
    let valida: &[&str] = &[
        "García", "Matías", "30111222", "01/01/1994", "DNI", "M", "", "", "", "", "",
    ];
    let sexo_invalido: &[&str] = &[
        "Paz", "Rocío", "30333444", "01/01/1995", "DNI", "ZZZ", "", "", "", "", "",
    ];
    let sin_documento: &[&str] = &[
        "Sosa", "Iván", "", "01/01/1992", "DNI", "M", "", "", "", "", "",
    ];
    let planilla = planilla_xlsx(ENCABEZADOS_IMPORT, &[valida, sexo_invalido, sin_documento]);

    let resultado = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect("import succeeds with exclusions");

    assert_eq!(resultado.validos, 1);
    assert_eq!(resultado.excluidos, 2);
    assert_eq!(resultado.errores.len(), 2);

    // |RegistroErroneo| + |Legajos| == non-blank rows.
    let legajos = store.legajos_de(&expediente).expect("legajos");
    let erroneos = store.registros_erroneos(&expediente).expect("erroneous");
    assert_eq!(legajos.len() + erroneos.len(), 3);
    assert!(erroneos.iter().all(|registro| !registro.resuelto));
}

#[test]
fn reprocesar_converts_a_fixed_row_and_numbers_attempts() {
    let (store, servicio, expediente) = preparar_import();
    let sexo_invalido: &[&str] = &[
        "Paz", "Rocío", "30333444", "01/01/1995", "DNI", "ZZZ", "", "", "", "", "",
    ];
    let planilla = planilla_xlsx(ENCABEZADOS_IMPORT, &[sexo_invalido]);
    servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect("import records the exclusion");

    let registro = store
        .registros_erroneos(&expediente)
        .expect("erroneous")
        .remove(0);

    // First attempt still fails: the stored row has not changed.
    let intento = servicio
        .reprocesar(registro.id, &actor_provincia())
        .expect("attempt recorded");
    assert!(!intento.exitoso);
    assert_eq!(intento.intento, 1);

    // Fix the stored payload, then retry.
    let mut corregido = store
        .registro_erroneo(registro.id)
        .expect("query")
        .expect("row");
    corregido
        .datos
        .insert("sexo".to_string(), "F".to_string());
    store
        .actualizar_registro_erroneo(&corregido)
        .expect("update");

    let intento = servicio
        .reprocesar(registro.id, &actor_provincia())
        .expect("attempt recorded");
    assert!(intento.exitoso);
    assert_eq!(intento.intento, 2);
    assert!(intento.legajo.is_some());

    let error = servicio
        .reprocesar(registro.id, &actor_provincia())
        .expect_err("resolved rows cannot be reprocessed again");
    assert!(matches!(error, ImportError::RegistroYaResuelto(_)));
}

#[test]
fn csv_uploads_are_rejected_for_imports() {
    let (_store, servicio, expediente) = preparar_import();
    let error = servicio
        .importar(
            &expediente,
            b"apellido;nombre\nGarcia;Matias\n",
            "padron.csv",
            &actor_provincia(),
        )
        .expect_err("extension rejected");
    assert!(matches!(error, ImportError::Archivo(_)));
}

#[test]
fn missing_mandatory_headers_abort_the_import() {
    let (_store, servicio, expediente) = preparar_import();
    let planilla = planilla_xlsx(&["apellido", "nombre"], &[&["García", "Matías"]]);
    let error = servicio
        .importar(&expediente, &planilla, "padron.xlsx", &actor_provincia())
        .expect_err("headers rejected");
    assert!(matches!(error, ImportError::Planilla(_)));
}

#[test]
fn preview_reports_totals_without_materializing() {
    let planilla = planilla_xlsx(
        ENCABEZADOS_IMPORT,
        &[
            &[
                "García", "Matías", "30111222", "01/01/1994", "DNI", "M", "", "", "", "", "",
            ],
            &[
                "Paz", "Rocío", "30333444", "01/01/1995", "DNI", "F", "", "", "", "", "",
            ],
        ],
    );

    let vista = vista_previa(&planilla, "padron.xlsx", MaxFilas::Limite(1), PRESUPUESTO)
        .expect("preview");
    assert_eq!(vista.total_filas, 2);
    assert_eq!(vista.filas_mostradas, 1);
    assert!(vista.encabezados.contains(&"cuit_responsable".to_string()));

    let vista = vista_previa(&planilla, "padron.xlsx", MaxFilas::Todas, PRESUPUESTO)
        .expect("preview");
    assert_eq!(vista.filas_mostradas, 2);
}
