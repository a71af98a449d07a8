//! Spreadsheet reading with header normalization.
//!
//! Accepts a binary blob plus a filename hint: XLSX first (by extension
//! or magic bytes), then CSV with delimiter auto-detection, defaulting
//! to semicolon. Every cell lands as a string; Excel date cells are
//! rendered as ISO dates so downstream parsing stays uniform.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::{Duration, Instant};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use serde::Serialize;

/// Reading error with row/column context where available.
#[derive(Debug, thiserror::Error)]
pub enum PlanillaError {
    #[error("the file is empty")]
    Vacia,
    #[error("no header row found")]
    SinEncabezados,
    #[error("missing required columns: {0:?}")]
    ColumnasFaltantes(Vec<String>),
    #[error("row {fila}, column '{columna}': {detalle}")]
    Fila {
        fila: usize,
        columna: String,
        detalle: String,
    },
    #[error("cannot decode file content: {0}")]
    Codificacion(String),
    #[error("unreadable workbook: {0}")]
    Xlsx(#[from] calamine::Error),
    #[error("unreadable CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("read exceeded the {0:?} budget")]
    Timeout(Duration),
}

/// One data row; values are keyed by normalized header.
#[derive(Debug, Clone, Serialize)]
pub struct Fila {
    pub numero: usize,
    pub valores: BTreeMap<String, String>,
}

impl Fila {
    pub fn valor(&self, columna: &str) -> &str {
        self.valores.get(columna).map(String::as_str).unwrap_or("")
    }

    pub fn fecha(&self, columna: &str) -> Option<NaiveDate> {
        parse_fecha(self.valor(columna))
    }

    pub fn esta_vacia(&self) -> bool {
        self.valores.values().all(|valor| valor.trim().is_empty())
    }
}

/// Typed frame produced by the reader.
#[derive(Debug, Clone)]
pub struct Planilla {
    pub encabezados: Vec<String>,
    pub filas: Vec<Fila>,
}

impl Planilla {
    pub fn tiene_columna(&self, columna: &str) -> bool {
        self.encabezados.iter().any(|e| e == columna)
    }

    /// First header of the candidates present in the frame, if any.
    pub fn columna_entre<'a>(&self, candidatas: &[&'a str]) -> Option<&'a str> {
        candidatas
            .iter()
            .copied()
            .find(|candidata| self.tiene_columna(candidata))
    }
}

/// Row cap for preview output. `0`, `all`, `todos` and `none` mean
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFilas {
    Todas,
    Limite(usize),
}

impl MaxFilas {
    pub fn parse(valor: &str) -> Option<Self> {
        match valor.trim().to_ascii_lowercase().as_str() {
            "all" | "todos" | "none" => Some(Self::Todas),
            otro => match otro.parse::<usize>() {
                Ok(0) => Some(Self::Todas),
                Ok(n) => Some(Self::Limite(n)),
                Err(_) => None,
            },
        }
    }
}

/// Preview payload for operator inspection before a real import.
#[derive(Debug, Clone, Serialize)]
pub struct VistaPrevia {
    pub encabezados: Vec<String>,
    pub filas: Vec<BTreeMap<String, String>>,
    pub total_filas: usize,
    pub filas_mostradas: usize,
}

/// Normalize a header: lower-case, spaces to underscores, strip
/// non-alphanumerics, collapse repeats, non-empty fallback "columna".
pub fn normalizar_encabezado(encabezado: &str) -> String {
    let sin_tildes: String = encabezado
        .trim()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'Á' | 'À' | 'Ä' => 'a',
            'é' | 'è' | 'ë' | 'É' | 'È' | 'Ë' => 'e',
            'í' | 'ì' | 'ï' | 'Í' | 'Ì' | 'Ï' => 'i',
            'ó' | 'ò' | 'ö' | 'Ó' | 'Ò' | 'Ö' => 'o',
            'ú' | 'ù' | 'ü' | 'Ú' | 'Ù' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            _ => c,
        })
        .collect();

    let mut limpio = String::with_capacity(sin_tildes.len());
    for c in sin_tildes.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            limpio.push(c);
        } else if c == ' ' || c == '_' || c == '-' {
            limpio.push('_');
        }
    }

    let mut colapsado = String::with_capacity(limpio.len());
    let mut anterior_guion = false;
    for c in limpio.chars() {
        if c == '_' {
            if !anterior_guion && !colapsado.is_empty() {
                colapsado.push('_');
            }
            anterior_guion = true;
        } else {
            colapsado.push(c);
            anterior_guion = false;
        }
    }
    let colapsado = colapsado.trim_matches('_').to_string();

    if colapsado.is_empty() {
        "columna".to_string()
    } else {
        colapsado
    }
}

/// Parse a civil date as dd/mm/YYYY, YYYY-MM-DD or dd-mm-YYYY.
pub fn parse_fecha(valor: &str) -> Option<NaiveDate> {
    let limpio = valor.trim();
    if limpio.is_empty() {
        return None;
    }
    for formato in ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"] {
        if let Ok(fecha) = NaiveDate::parse_from_str(limpio, formato) {
            return Some(fecha);
        }
    }
    None
}

/// Read a spreadsheet blob into a typed frame within the time budget.
pub fn leer_planilla(
    bytes: &[u8],
    nombre: &str,
    presupuesto: Duration,
) -> Result<Planilla, PlanillaError> {
    if bytes.is_empty() {
        return Err(PlanillaError::Vacia);
    }
    let inicio = Instant::now();
    let planilla = if parece_excel(bytes, nombre) {
        leer_xlsx(bytes, inicio, presupuesto)?
    } else {
        leer_csv(bytes, inicio, presupuesto)?
    };
    if inicio.elapsed() > presupuesto {
        return Err(PlanillaError::Timeout(presupuesto));
    }
    Ok(planilla)
}

/// Preview honoring the row cap; `total_filas` always reflects the full
/// frame.
pub fn vista_previa(
    bytes: &[u8],
    nombre: &str,
    max_filas: MaxFilas,
    presupuesto: Duration,
) -> Result<VistaPrevia, PlanillaError> {
    let planilla = leer_planilla(bytes, nombre, presupuesto)?;
    let total_filas = planilla.filas.len();
    let filas: Vec<_> = match max_filas {
        MaxFilas::Todas => planilla.filas.iter().map(|f| f.valores.clone()).collect(),
        MaxFilas::Limite(n) => planilla
            .filas
            .iter()
            .take(n)
            .map(|f| f.valores.clone())
            .collect(),
    };
    Ok(VistaPrevia {
        encabezados: planilla.encabezados,
        filas_mostradas: filas.len(),
        filas,
        total_filas,
    })
}

fn parece_excel(bytes: &[u8], nombre: &str) -> bool {
    let extension = nombre.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    if matches!(extension.as_str(), "xlsx" | "xlsm" | "xls" | "xlsb") {
        return true;
    }
    // ZIP container (xlsx) or the legacy OLE2 header (xls).
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xd0, 0xcf, 0x11, 0xe0])
}

fn leer_xlsx(
    bytes: &[u8],
    inicio: Instant,
    presupuesto: Duration,
) -> Result<Planilla, PlanillaError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let hojas = workbook.sheet_names().to_owned();
    let hoja = hojas.first().ok_or(PlanillaError::SinEncabezados)?;
    let rango = workbook.worksheet_range(hoja)?;

    let mut filas_crudas = rango.rows();
    let encabezados = filas_crudas
        .next()
        .map(|fila| {
            fila.iter()
                .map(|celda| normalizar_encabezado(&celda_a_texto(celda)))
                .collect::<Vec<_>>()
        })
        .ok_or(PlanillaError::SinEncabezados)?;
    if encabezados.iter().all(|e| e == "columna") {
        return Err(PlanillaError::SinEncabezados);
    }

    let mut filas = Vec::new();
    for (indice, cruda) in filas_crudas.enumerate() {
        if indice % 256 == 0 && inicio.elapsed() > presupuesto {
            return Err(PlanillaError::Timeout(presupuesto));
        }
        let mut valores = BTreeMap::new();
        for (columna, encabezado) in encabezados.iter().enumerate() {
            let valor = cruda
                .get(columna)
                .map(celda_a_texto)
                .unwrap_or_default();
            valores.insert(encabezado.clone(), valor);
        }
        let fila = Fila {
            numero: indice + 1,
            valores,
        };
        if !fila.esta_vacia() {
            filas.push(fila);
        }
    }
    Ok(Planilla { encabezados, filas })
}

fn celda_a_texto(celda: &Data) -> String {
    match celda {
        Data::Empty => String::new(),
        Data::String(texto) => texto.trim().to_string(),
        Data::Bool(valor) => valor.to_string(),
        Data::Int(valor) => valor.to_string(),
        Data::Float(valor) => {
            if valor.fract() == 0.0 && valor.abs() < 1e15 {
                format!("{}", *valor as i64)
            } else {
                valor.to_string()
            }
        }
        Data::DateTime(valor) => valor
            .as_datetime()
            .map(|dt| dt.date().format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(texto) => texto.clone(),
        Data::DurationIso(texto) => texto.clone(),
        Data::Error(_) => String::new(),
    }
}

fn leer_csv(
    bytes: &[u8],
    inicio: Instant,
    presupuesto: Duration,
) -> Result<Planilla, PlanillaError> {
    let contenido = decodificar(bytes)?;
    let contenido = contenido.trim_start_matches('\u{feff}');
    let delimitador = detectar_delimitador(contenido);

    let mut lector = csv::ReaderBuilder::new()
        .delimiter(delimitador)
        .trim(csv::Trim::All)
        .flexible(true)
        .has_headers(false)
        .from_reader(contenido.as_bytes());

    let mut registros = lector.records();
    let encabezados = registros
        .next()
        .transpose()?
        .map(|registro| {
            registro
                .iter()
                .map(normalizar_encabezado)
                .collect::<Vec<_>>()
        })
        .ok_or(PlanillaError::SinEncabezados)?;

    let mut filas = Vec::new();
    for (indice, registro) in registros.enumerate() {
        if indice % 256 == 0 && inicio.elapsed() > presupuesto {
            return Err(PlanillaError::Timeout(presupuesto));
        }
        let registro = registro?;
        let mut valores = BTreeMap::new();
        for (columna, encabezado) in encabezados.iter().enumerate() {
            let valor = registro.get(columna).unwrap_or("").trim().to_string();
            valores.insert(encabezado.clone(), valor);
        }
        let fila = Fila {
            numero: indice + 1,
            valores,
        };
        if !fila.esta_vacia() {
            filas.push(fila);
        }
    }
    Ok(Planilla { encabezados, filas })
}

fn decodificar(bytes: &[u8]) -> Result<String, PlanillaError> {
    match std::str::from_utf8(bytes) {
        Ok(texto) => Ok(texto.to_string()),
        Err(_) => {
            let (texto, _, con_errores) = encoding_rs::WINDOWS_1252.decode(bytes);
            if con_errores {
                Err(PlanillaError::Codificacion(
                    "neither UTF-8 nor Windows-1252".to_string(),
                ))
            } else {
                Ok(texto.to_string())
            }
        }
    }
}

fn detectar_delimitador(contenido: &str) -> u8 {
    let primera_linea = contenido.lines().next().unwrap_or("");
    let candidatos = [b';', b',', b'\t', b'|'];
    let mut mejor = b';';
    let mut mejor_cuenta = 0;
    for &candidato in &candidatos {
        let cuenta = primera_linea
            .bytes()
            .filter(|byte| *byte == candidato)
            .count();
        if cuenta > mejor_cuenta {
            mejor_cuenta = cuenta;
            mejor = candidato;
        }
    }
    mejor
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESUPUESTO: Duration = Duration::from_secs(5);

    #[test]
    fn normalizar_encabezado_applies_all_rules() {
        assert_eq!(normalizar_encabezado("APELLIDO  RESPONSABLE"), "apellido_responsable");
        assert_eq!(normalizar_encabezado("Cuit_Responsable"), "cuit_responsable");
        assert_eq!(
            normalizar_encabezado("FECHA DE NACIMIENTO (dd/mm/aaaa)"),
            "fecha_de_nacimiento_ddmmaaaa"
        );
        assert_eq!(normalizar_encabezado("Año"), "ano");
        assert_eq!(normalizar_encabezado("  "), "columna");
        assert_eq!(normalizar_encabezado("__doc__"), "doc");
    }

    #[test]
    fn parse_fecha_accepts_both_civil_formats() {
        let esperado = NaiveDate::from_ymd_opt(1999, 1, 1).expect("valid date");
        assert_eq!(parse_fecha("01/01/1999"), Some(esperado));
        assert_eq!(parse_fecha("1999-01-01"), Some(esperado));
        assert_eq!(parse_fecha("01-01-1999"), Some(esperado));
        assert_eq!(parse_fecha("not-a-date"), None);
        assert_eq!(parse_fecha(""), None);
    }

    #[test]
    fn csv_with_semicolons_and_bom_is_read() {
        let csv = "\u{feff}APELLIDO;NOMBRE;DOCUMENTO\nGarcía;Matías;40732138\n";
        let planilla = leer_planilla(csv.as_bytes(), "padron.csv", PRESUPUESTO).expect("parse");
        assert_eq!(planilla.encabezados, vec!["apellido", "nombre", "documento"]);
        assert_eq!(planilla.filas.len(), 1);
        assert_eq!(planilla.filas[0].valor("documento"), "40732138");
    }

    #[test]
    fn csv_with_commas_is_auto_detected() {
        let csv = "dni,cuit\n111,20-111-3\n";
        let planilla = leer_planilla(csv.as_bytes(), "cruce.csv", PRESUPUESTO).expect("parse");
        assert_eq!(planilla.filas[0].valor("dni"), "111");
    }

    #[test]
    fn csv_in_windows_1252_is_decoded() {
        // "García" with a latin-1 í byte.
        let bytes: &[u8] = b"apellido;nombre\nGarc\xeda;Mat\xedas\n";
        let planilla = leer_planilla(bytes, "legacy.csv", PRESUPUESTO).expect("parse");
        assert_eq!(planilla.filas[0].valor("apellido"), "García");
    }

    #[test]
    fn blank_rows_are_skipped() {
        let csv = "a;b\n1;2\n;\n3;4\n";
        let planilla = leer_planilla(csv.as_bytes(), "x.csv", PRESUPUESTO).expect("parse");
        assert_eq!(planilla.filas.len(), 2);
    }

    #[test]
    fn empty_blob_is_rejected() {
        let error = leer_planilla(b"", "vacio.csv", PRESUPUESTO).expect_err("empty rejected");
        assert!(matches!(error, PlanillaError::Vacia));
    }

    #[test]
    fn preview_honors_row_caps() {
        let csv = "a;b\n1;2\n3;4\n5;6\n";
        let vista = vista_previa(
            csv.as_bytes(),
            "x.csv",
            MaxFilas::Limite(2),
            PRESUPUESTO,
        )
        .expect("preview");
        assert_eq!(vista.total_filas, 3);
        assert_eq!(vista.filas_mostradas, 2);

        let vista =
            vista_previa(csv.as_bytes(), "x.csv", MaxFilas::Todas, PRESUPUESTO).expect("preview");
        assert_eq!(vista.filas_mostradas, 3);
    }

    #[test]
    fn max_filas_parses_the_unlimited_spellings() {
        assert_eq!(MaxFilas::parse("all"), Some(MaxFilas::Todas));
        assert_eq!(MaxFilas::parse("TODOS"), Some(MaxFilas::Todas));
        assert_eq!(MaxFilas::parse("none"), Some(MaxFilas::Todas));
        assert_eq!(MaxFilas::parse("0"), Some(MaxFilas::Todas));
        assert_eq!(MaxFilas::parse("25"), Some(MaxFilas::Limite(25)));
        assert_eq!(MaxFilas::parse("-3"), None);
    }

    #[test]
    fn zero_budget_times_out() {
        let csv = "a;b\n1;2\n";
        let error = leer_planilla(csv.as_bytes(), "x.csv", Duration::ZERO)
            .expect_err("budget exhausted");
        assert!(matches!(error, PlanillaError::Timeout(_)));
    }
}
