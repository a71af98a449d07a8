//! Family graph derivation from import rows.
//!
//! Responsibles are deduplicated by document with first occurrence
//! winning; every edge points responsable → beneficiario and the graph
//! restricted to one expediente must stay acyclic.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use super::normalizador::{conjunto_identificadores, dni_desde_cuit, normalizar_dni};
use crate::workflows::expediente::domain::{RolLegajo, Sexo};

/// Beneficiary block of one import row, already normalized.
#[derive(Debug, Clone)]
pub struct PersonaFila {
    pub fila: usize,
    pub apellido: String,
    pub nombre: String,
    pub documento: String,
    pub cuit: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub sexo: Option<Sexo>,
}

/// Optional responsible block of one import row.
#[derive(Debug, Clone)]
pub struct BloqueResponsable {
    pub apellido: String,
    pub nombre: String,
    pub cuit: String,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub sexo: Option<Sexo>,
    pub vinculo: String,
}

/// One import row as the resolver sees it.
#[derive(Debug, Clone)]
pub struct FilaFamiliar {
    pub numero: usize,
    pub beneficiario: PersonaFila,
    pub responsable: Option<BloqueResponsable>,
}

/// Row with its final rol after classification.
#[derive(Debug, Clone)]
pub struct MiembroResuelto {
    pub fila: usize,
    pub rol: RolLegajo,
    pub persona: PersonaFila,
}

/// Person present only in responsible blocks: becomes a citizen and an
/// edge endpoint but never a legajo of this import.
#[derive(Debug, Clone)]
pub struct ResponsableExterno {
    pub clave: String,
    pub apellido: String,
    pub nombre: String,
    pub documento: String,
    pub cuit: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub sexo: Option<Sexo>,
    pub fila_origen: usize,
}

/// Directed responsable → beneficiario edge, keyed by documents until
/// citizens are materialized.
#[derive(Debug, Clone)]
pub struct AristaFamiliar {
    pub responsable_clave: String,
    pub beneficiario_documento: String,
    pub vinculo: String,
    pub fila: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResolucionFamiliar {
    pub miembros: Vec<MiembroResuelto>,
    pub responsables_externos: Vec<ResponsableExterno>,
    pub aristas: Vec<AristaFamiliar>,
    pub advertencias: Vec<String>,
}

/// Hard errors reject the whole import.
#[derive(Debug, thiserror::Error)]
pub enum FamiliaError {
    #[error("row {fila}: document {documento} appears more than once as beneficiary")]
    BeneficiarioDuplicado { fila: usize, documento: String },
    #[error(
        "row {fila}: responsible born {responsable} is younger than the beneficiary born {beneficiario}"
    )]
    ResponsableMasJoven {
        fila: usize,
        responsable: NaiveDate,
        beneficiario: NaiveDate,
    },
    #[error("responsibility cycle involving document {documento}")]
    CicloDetectado { documento: String },
}

const MAYORIA_DE_EDAD: i32 = 18;

fn edad(nacimiento: NaiveDate, hoy: NaiveDate) -> i32 {
    hoy.years_since(nacimiento).map(|a| a as i32).unwrap_or(-1)
}

fn intersectan(a: &[String], b: &[String]) -> bool {
    a.iter().any(|id| b.contains(id))
}

/// Derive edges and per-row roles from the normalized rows.
pub fn resolver(filas: &[FilaFamiliar], hoy: NaiveDate) -> Result<ResolucionFamiliar, FamiliaError> {
    let mut resolucion = ResolucionFamiliar::default();

    // Duplicate beneficiary documents reject the import outright.
    let mut vistos: HashMap<String, usize> = HashMap::new();
    for fila in filas {
        let documento = normalizar_dni(&fila.beneficiario.documento);
        if let Some(_anterior) = vistos.insert(documento.clone(), fila.numero) {
            return Err(FamiliaError::BeneficiarioDuplicado {
                fila: fila.numero,
                documento,
            });
        }
    }

    let ids_beneficiarios: Vec<Vec<String>> = filas
        .iter()
        .map(|fila| {
            conjunto_identificadores(
                &fila.beneficiario.documento,
                fila.beneficiario.cuit.as_deref(),
            )
        })
        .collect();

    // Responsible dedup by primary key, first occurrence wins.
    let mut responsables_vistos: HashMap<String, (usize, BloqueResponsable)> = HashMap::new();
    // Edges between row indexes, for the cycle check.
    let mut aristas_internas: Vec<(usize, usize)> = Vec::new();
    let mut referenciados: HashSet<usize> = HashSet::new();

    for (indice, fila) in filas.iter().enumerate() {
        let Some(bloque) = &fila.responsable else {
            continue;
        };
        let ids_resp = conjunto_identificadores(&bloque.cuit, None);
        if ids_resp.is_empty() {
            resolucion.advertencias.push(format!(
                "fila {}: bloque responsable sin documento utilizable, se ignora",
                fila.numero
            ));
            continue;
        }

        let clave = ids_resp[0].clone();
        if let Some((fila_primera, primero)) = responsables_vistos.get(&clave) {
            if primero.apellido != bloque.apellido
                || primero.nombre != bloque.nombre
                || primero.fecha_nacimiento != bloque.fecha_nacimiento
            {
                resolucion.advertencias.push(format!(
                    "fila {}: datos del responsable {} difieren de la fila {}, se conserva la primera aparición",
                    fila.numero, clave, fila_primera
                ));
            }
        } else {
            responsables_vistos.insert(clave.clone(), (fila.numero, bloque.clone()));
        }

        // Self-responsibility: same person, no edge.
        if intersectan(&ids_resp, &ids_beneficiarios[indice]) {
            referenciados.insert(indice);
            continue;
        }

        // Age ordering and adulthood checks only apply to real pairs.
        if let (Some(nac_resp), Some(nac_benef)) = (
            bloque.fecha_nacimiento,
            fila.beneficiario.fecha_nacimiento,
        ) {
            if nac_resp > nac_benef {
                return Err(FamiliaError::ResponsableMasJoven {
                    fila: fila.numero,
                    responsable: nac_resp,
                    beneficiario: nac_benef,
                });
            }
        }
        if let Some(nac_resp) = bloque.fecha_nacimiento {
            if edad(nac_resp, hoy) < MAYORIA_DE_EDAD {
                resolucion.advertencias.push(format!(
                    "fila {}: responsable menor de {} años",
                    fila.numero, MAYORIA_DE_EDAD
                ));
            }
        }

        let interno = ids_beneficiarios
            .iter()
            .position(|ids| intersectan(ids, &ids_resp));
        if let Some(objetivo) = interno {
            referenciados.insert(objetivo);
            aristas_internas.push((objetivo, indice));
        }

        resolucion.aristas.push(AristaFamiliar {
            responsable_clave: clave,
            beneficiario_documento: normalizar_dni(&fila.beneficiario.documento),
            vinculo: bloque.vinculo.clone(),
            fila: fila.numero,
        });
    }

    verificar_aciclico(filas, &aristas_internas)?;

    // Classification: referenced rows are beneficiario_y_responsable.
    for (indice, fila) in filas.iter().enumerate() {
        let rol = if referenciados.contains(&indice) {
            RolLegajo::BeneficiarioYResponsable
        } else {
            RolLegajo::Beneficiario
        };

        if rol == RolLegajo::Beneficiario && fila.responsable.is_none() {
            if let Some(nacimiento) = fila.beneficiario.fecha_nacimiento {
                if edad(nacimiento, hoy) < MAYORIA_DE_EDAD {
                    resolucion.advertencias.push(format!(
                        "fila {}: beneficiario menor de {} años sin responsable",
                        fila.numero, MAYORIA_DE_EDAD
                    ));
                }
            }
        }

        resolucion.miembros.push(MiembroResuelto {
            fila: fila.numero,
            rol,
            persona: fila.beneficiario.clone(),
        });
    }

    // Responsible-only persons: citizens plus edges, never legajos.
    let claves_internas: HashSet<String> = ids_beneficiarios.iter().flatten().cloned().collect();
    let mut externos: Vec<_> = responsables_vistos
        .into_iter()
        .filter(|(clave, _)| !claves_internas.contains(clave))
        .collect();
    externos.sort_by_key(|(_, (fila, _))| *fila);
    for (clave, (fila_origen, bloque)) in externos {
        let cuit_normalizado = super::normalizador::normalizar_cuit(&bloque.cuit);
        let documento = if cuit_normalizado.is_empty() {
            normalizar_dni(&bloque.cuit)
        } else {
            dni_desde_cuit(&cuit_normalizado)
        };
        resolucion.responsables_externos.push(ResponsableExterno {
            clave,
            apellido: bloque.apellido,
            nombre: bloque.nombre,
            documento,
            cuit: if cuit_normalizado.is_empty() {
                None
            } else {
                Some(cuit_normalizado)
            },
            fecha_nacimiento: bloque.fecha_nacimiento,
            sexo: bloque.sexo,
            fila_origen,
        });
    }

    Ok(resolucion)
}

/// Depth-bounded DFS over the responsable → beneficiario edges between
/// rows of the same file.
fn verificar_aciclico(
    filas: &[FilaFamiliar],
    aristas: &[(usize, usize)],
) -> Result<(), FamiliaError> {
    let mut adyacencia: HashMap<usize, Vec<usize>> = HashMap::new();
    for (desde, hasta) in aristas {
        adyacencia.entry(*desde).or_default().push(*hasta);
    }

    let limite = filas.len();
    for inicio in adyacencia.keys().copied() {
        let mut pila = vec![(inicio, 0usize)];
        let mut camino: HashSet<usize> = HashSet::new();
        camino.insert(inicio);
        while let Some((nodo, profundidad)) = pila.pop() {
            if profundidad > limite {
                break;
            }
            for siguiente in adyacencia.get(&nodo).into_iter().flatten() {
                if *siguiente == inicio {
                    return Err(FamiliaError::CicloDetectado {
                        documento: normalizar_dni(&filas[inicio].beneficiario.documento),
                    });
                }
                if camino.insert(*siguiente) {
                    pila.push((*siguiente, profundidad + 1));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hoy() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
    }

    fn persona(fila: usize, documento: &str, nacimiento: (i32, u32, u32)) -> PersonaFila {
        PersonaFila {
            fila,
            apellido: format!("Apellido{fila}"),
            nombre: format!("Nombre{fila}"),
            documento: documento.to_string(),
            cuit: None,
            fecha_nacimiento: NaiveDate::from_ymd_opt(nacimiento.0, nacimiento.1, nacimiento.2),
            sexo: Some(Sexo::X),
        }
    }

    fn bloque(cuit: &str, nacimiento: Option<(i32, u32, u32)>) -> BloqueResponsable {
        BloqueResponsable {
            apellido: "García".to_string(),
            nombre: "Matías".to_string(),
            cuit: cuit.to_string(),
            fecha_nacimiento: nacimiento
                .and_then(|(a, m, d)| NaiveDate::from_ymd_opt(a, m, d)),
            sexo: Some(Sexo::Masculino),
            vinculo: "responsable".to_string(),
        }
    }

    #[test]
    fn self_responsibility_yields_dual_role_and_no_edges() {
        let filas = vec![FilaFamiliar {
            numero: 1,
            beneficiario: persona(1, "20407321384", (1999, 1, 1)),
            responsable: Some(bloque("20407321384", Some((1999, 1, 1)))),
        }];
        let resolucion = resolver(&filas, hoy()).expect("resolves");
        assert_eq!(resolucion.miembros.len(), 1);
        assert_eq!(
            resolucion.miembros[0].rol,
            RolLegajo::BeneficiarioYResponsable
        );
        assert!(resolucion.aristas.is_empty());
        assert!(resolucion.responsables_externos.is_empty());
    }

    #[test]
    fn external_responsible_creates_edge_without_member() {
        let filas = vec![FilaFamiliar {
            numero: 1,
            beneficiario: persona(1, "55123456", (2016, 3, 15)),
            responsable: Some(bloque("20-40732138-4", Some((1999, 1, 1)))),
        }];
        let resolucion = resolver(&filas, hoy()).expect("resolves");
        assert_eq!(resolucion.miembros.len(), 1);
        assert_eq!(resolucion.miembros[0].rol, RolLegajo::Beneficiario);
        assert_eq!(resolucion.aristas.len(), 1);
        assert_eq!(resolucion.responsables_externos.len(), 1);
        assert_eq!(resolucion.responsables_externos[0].documento, "40732138");
    }

    #[test]
    fn shared_responsible_produces_two_edges_and_one_external() {
        let filas = vec![
            FilaFamiliar {
                numero: 1,
                beneficiario: persona(1, "20407321384", (1999, 1, 1)),
                responsable: Some(bloque("20407321384", Some((1999, 1, 1)))),
            },
            FilaFamiliar {
                numero: 2,
                beneficiario: persona(2, "55123456", (2016, 3, 15)),
                responsable: Some(bloque("20407321384", Some((1999, 1, 1)))),
            },
            FilaFamiliar {
                numero: 3,
                beneficiario: persona(3, "55988777", (2018, 7, 2)),
                responsable: Some(bloque("20407321384", Some((1999, 1, 1)))),
            },
        ];
        let resolucion = resolver(&filas, hoy()).expect("resolves");
        assert_eq!(resolucion.miembros.len(), 3);
        assert_eq!(
            resolucion.miembros[0].rol,
            RolLegajo::BeneficiarioYResponsable
        );
        assert_eq!(resolucion.aristas.len(), 2);
        assert!(resolucion.responsables_externos.is_empty());
    }

    #[test]
    fn younger_responsible_rejects_the_import() {
        let filas = vec![FilaFamiliar {
            numero: 1,
            beneficiario: persona(1, "30111222", (1994, 5, 1)),
            responsable: Some(bloque("20444555666", Some((2004, 5, 1)))),
        }];
        let error = resolver(&filas, hoy()).expect_err("rejected");
        assert!(matches!(error, FamiliaError::ResponsableMasJoven { .. }));
    }

    #[test]
    fn duplicate_beneficiary_document_rejects_the_import() {
        let filas = vec![
            FilaFamiliar {
                numero: 1,
                beneficiario: persona(1, "30111222", (1994, 5, 1)),
                responsable: None,
            },
            FilaFamiliar {
                numero: 2,
                beneficiario: persona(2, "30.111.222", (1994, 5, 1)),
                responsable: None,
            },
        ];
        let error = resolver(&filas, hoy()).expect_err("rejected");
        assert!(matches!(error, FamiliaError::BeneficiarioDuplicado { .. }));
    }

    #[test]
    fn mutual_responsibility_is_a_cycle() {
        let filas = vec![
            FilaFamiliar {
                numero: 1,
                beneficiario: persona(1, "30111222", (1994, 5, 1)),
                responsable: Some(bloque("30222333", Some((1993, 5, 1)))),
            },
            FilaFamiliar {
                numero: 2,
                beneficiario: persona(2, "30222333", (1993, 5, 1)),
                responsable: Some(bloque("30111222", Some((1993, 5, 1)))),
            },
        ];
        let error = resolver(&filas, hoy()).expect_err("rejected");
        assert!(matches!(error, FamiliaError::CicloDetectado { .. }));
    }

    #[test]
    fn minor_responsible_and_unaccompanied_minor_raise_warnings() {
        let filas = vec![
            FilaFamiliar {
                numero: 1,
                beneficiario: persona(1, "55123456", (2016, 3, 15)),
                responsable: Some(bloque("45111222", Some((2010, 1, 1)))),
            },
            FilaFamiliar {
                numero: 2,
                beneficiario: persona(2, "55988777", (2018, 7, 2)),
                responsable: None,
            },
        ];
        let resolucion = resolver(&filas, hoy()).expect("resolves with warnings");
        assert_eq!(resolucion.advertencias.len(), 2);
        assert!(resolucion.advertencias[0].contains("responsable menor"));
        assert!(resolucion.advertencias[1].contains("sin responsable"));
    }

    #[test]
    fn conflicting_duplicate_responsible_keeps_first_and_warns() {
        let mut segundo = bloque("20407321384", Some((1999, 1, 1)));
        segundo.apellido = "Gomez".to_string();
        let filas = vec![
            FilaFamiliar {
                numero: 1,
                beneficiario: persona(1, "55123456", (2016, 3, 15)),
                responsable: Some(bloque("20407321384", Some((1999, 1, 1)))),
            },
            FilaFamiliar {
                numero: 2,
                beneficiario: persona(2, "55988777", (2018, 7, 2)),
                responsable: Some(segundo),
            },
        ];
        let resolucion = resolver(&filas, hoy()).expect("resolves");
        assert_eq!(resolucion.responsables_externos.len(), 1);
        assert_eq!(resolucion.responsables_externos[0].apellido, "García");
        assert!(resolucion
            .advertencias
            .iter()
            .any(|advertencia| advertencia.contains("difieren")));
    }
}
