use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::model::{BiasRecord, MarkRecord, RecordStore, ScoreRecord};
use crate::error::DataError;

/// Knobs applied while ingesting.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Replace each bias record's `totalMarkers` with the sum of its markers.
    pub recompute_totals: bool,
}

const MARK_EXTENSIONS: [&str; 4] = ["parquet", "pq", "json", "csv"];
const TABLE_EXTENSIONS: [&str; 2] = ["json", "csv"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a full session from a directory holding `marks.*`, `scores.*` and
/// `bias.*`. Only the marks file is required.
pub fn load_dir(dir: &Path, options: LoadOptions) -> Result<RecordStore> {
    let marks_path = find_collection(dir, "marks", &MARK_EXTENSIONS).ok_or_else(|| {
        DataError::MissingCollection {
            collection: "marks",
            tried: MARK_EXTENSIONS.join(", "),
            dir: dir.to_path_buf(),
        }
    })?;
    let marks = load_marks(&marks_path)?;

    let scores = match find_collection(dir, "scores", &TABLE_EXTENSIONS) {
        Some(path) => load_scores(&path)?,
        None => {
            debug!("no scores file in {}", dir.display());
            Vec::new()
        }
    };

    let bias = match find_collection(dir, "bias", &TABLE_EXTENSIONS) {
        Some(path) => load_bias(&path, options)?,
        None => {
            debug!("no bias file in {}", dir.display());
            Vec::new()
        }
    };

    info!(
        "loaded {} marks, {} scores, {} bias records from {}",
        marks.len(),
        scores.len(),
        bias.len(),
        dir.display()
    );
    Ok(RecordStore::new(marks, scores, bias))
}

/// Load mark records.
///
/// Supported formats:
/// * `.parquet` – flat columns named like the JSON fields (recommended for large exports)
/// * `.json`    – `[{ "year": 2023, "grade": 4, "schoolName": ..., "mark2": 5, ... }, ...]`
/// * `.csv`     – one record per row with the same header names
pub fn load_marks(path: &Path) -> Result<Vec<MarkRecord>> {
    let records: Vec<MarkRecord> = match extension(path).as_str() {
        "parquet" | "pq" => load_marks_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!(DataError::UnsupportedExtension {
            collection: "marks",
            extension: other.to_string(),
        }),
    }
    .with_context(|| format!("loading marks from {}", path.display()))?;
    debug!("{} mark records from {}", records.len(), path.display());
    Ok(records)
}

/// Load score distributions from `.json`, or `.csv` whose `scores` column
/// holds `band:percent` pairs separated by `;` (`"10:5;20:10;30:85"`).
pub fn load_scores(path: &Path) -> Result<Vec<ScoreRecord>> {
    let records: Vec<ScoreRecord> = match extension(path).as_str() {
        "json" => load_json(path),
        "csv" => load_scores_csv(path),
        other => bail!(DataError::UnsupportedExtension {
            collection: "scores",
            extension: other.to_string(),
        }),
    }
    .with_context(|| format!("loading scores from {}", path.display()))?;
    debug!("{} score records from {}", records.len(), path.display());
    Ok(records)
}

/// Load bias records from `.json`, or `.csv` whose `markers` column holds
/// `label:count` pairs separated by `;` (`"РУ 4:1;МА 5:1"`).
pub fn load_bias(path: &Path, options: LoadOptions) -> Result<Vec<BiasRecord>> {
    let mut records: Vec<BiasRecord> = match extension(path).as_str() {
        "json" => load_json(path),
        "csv" => load_bias_csv(path),
        other => bail!(DataError::UnsupportedExtension {
            collection: "bias",
            extension: other.to_string(),
        }),
    }
    .with_context(|| format!("loading bias records from {}", path.display()))?;

    reconcile_totals(&mut records, options.recompute_totals);
    debug!("{} bias records from {}", records.len(), path.display());
    Ok(records)
}

/// Compare `totalMarkers` with the markers sum; optionally overwrite it.
/// Returns the number of records that disagreed.
pub fn reconcile_totals(records: &mut [BiasRecord], recompute: bool) -> usize {
    let mut mismatched = 0;
    for record in records.iter_mut() {
        let sum = record.markers_sum();
        if sum == record.total_markers {
            continue;
        }
        mismatched += 1;
        warn!(
            "{} ({}, {}): totalMarkers {} but markers sum to {}",
            record.school_name, record.login, record.year, record.total_markers, sum
        );
        if recompute {
            record.total_markers = sum;
        }
    }
    mismatched
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn find_collection(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented array, as written by `JSON.stringify` or `df.to_json(orient='records')`.
fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    serde_json::from_str(&text).context("parsing JSON")
}

// ---------------------------------------------------------------------------
// CSV loaders
// ---------------------------------------------------------------------------

fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    reader
        .deserialize()
        .enumerate()
        .map(|(row_no, result)| result.with_context(|| format!("CSV row {row_no}")))
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreCsvRow {
    year: i32,
    grade: u32,
    subject: String,
    municipality: String,
    login: String,
    school_name: String,
    participants: u32,
    #[serde(default)]
    scores: String,
}

fn load_scores_csv(path: &Path) -> Result<Vec<ScoreRecord>> {
    let rows: Vec<ScoreCsvRow> = load_csv(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(row_no, r)| {
            Ok(ScoreRecord {
                scores: parse_pairs(&r.scores, row_no, "scores")?,
                year: r.year,
                grade: r.grade,
                subject: r.subject,
                municipality: r.municipality,
                login: r.login,
                school_name: r.school_name,
                participants: r.participants,
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BiasCsvRow {
    year: i32,
    login: String,
    municipality: String,
    school_name: String,
    total_markers: u32,
    #[serde(default)]
    markers: String,
}

fn load_bias_csv(path: &Path) -> Result<Vec<BiasRecord>> {
    let rows: Vec<BiasCsvRow> = load_csv(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(row_no, r)| {
            Ok(BiasRecord {
                markers: parse_pairs(&r.markers, row_no, "markers")?,
                year: r.year,
                login: r.login,
                municipality: r.municipality,
                school_name: r.school_name,
                total_markers: r.total_markers,
            })
        })
        .collect()
}

/// Parse `"k:v;k:v"`. Empty tokens are skipped; the last `:` splits key from value.
fn parse_pairs<K, V>(s: &str, row: usize, column: &'static str) -> Result<BTreeMap<K, V>>
where
    K: FromStr + Ord,
    V: FromStr,
{
    let mut out = BTreeMap::new();
    for token in s.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        let malformed = || DataError::MalformedPair {
            row,
            column,
            token: token.to_string(),
        };
        let (key, value) = token.rsplit_once(':').ok_or_else(malformed)?;
        let key = key.trim().parse::<K>().map_err(|_| malformed())?;
        let value = value.trim().parse::<V>().map_err(|_| malformed())?;
        out.insert(key, value);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

const MARK_COLUMNS: [&str; 11] = [
    "year",
    "grade",
    "subject",
    "municipality",
    "login",
    "schoolName",
    "participants",
    "mark2",
    "mark3",
    "mark4",
    "mark5",
];

/// Load mark records from a Parquet file with one flat column per field.
///
/// Integer columns may be Int32 or Int64, mark columns Float64/Float32 or
/// integer, text columns Utf8 or LargeUtf8. Written by Pandas or Polars alike.
fn load_marks_parquet(path: &Path) -> Result<Vec<MarkRecord>> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let mut cols: Vec<&ArrayRef> = Vec::with_capacity(MARK_COLUMNS.len());
        for name in MARK_COLUMNS {
            let idx = schema
                .index_of(name)
                .map_err(|_| DataError::MissingColumn(name.to_string()))?;
            cols.push(batch.column(idx));
        }

        for row in 0..batch.num_rows() {
            let offset = records.len();
            let at = |i: usize| (cols[i], MARK_COLUMNS[i], row);
            records.push(MarkRecord {
                year: to_i32(int_at(at(0))?, offset, MARK_COLUMNS[0])?,
                grade: to_u32(int_at(at(1))?, offset, MARK_COLUMNS[1])?,
                subject: str_at(at(2))?,
                municipality: str_at(at(3))?,
                login: str_at(at(4))?,
                school_name: str_at(at(5))?,
                participants: to_u32(int_at(at(6))?, offset, MARK_COLUMNS[6])?,
                mark2: float_at(at(7))?,
                mark3: float_at(at(8))?,
                mark4: float_at(at(9))?,
                mark5: float_at(at(10))?,
            });
        }
    }

    Ok(records)
}

// -- Parquet / Arrow helpers --

fn non_null(col: &ArrayRef, name: &str, row: usize) -> Result<()> {
    if col.is_null(row) {
        bail!("row {row}: null value in '{name}'");
    }
    Ok(())
}

fn wrong_type(col: &ArrayRef, name: &str, expected: &'static str) -> DataError {
    DataError::ColumnType {
        column: name.to_string(),
        found: format!("{:?}", col.data_type()),
        expected,
    }
}

fn int_at((col, name, row): (&ArrayRef, &str, usize)) -> Result<i64> {
    non_null(col, name, row)?;
    match col.data_type() {
        DataType::Int32 => Ok(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Ok(col.as_primitive::<Int64Type>().value(row)),
        _ => Err(wrong_type(col, name, "Int32 or Int64").into()),
    }
}

fn float_at((col, name, row): (&ArrayRef, &str, usize)) -> Result<f64> {
    non_null(col, name, row)?;
    match col.data_type() {
        DataType::Float64 => Ok(col.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => Ok(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Int32 => Ok(col.as_primitive::<Int32Type>().value(row) as f64),
        DataType::Int64 => Ok(col.as_primitive::<Int64Type>().value(row) as f64),
        _ => Err(wrong_type(col, name, "a numeric type").into()),
    }
}

fn str_at((col, name, row): (&ArrayRef, &str, usize)) -> Result<String> {
    non_null(col, name, row)?;
    match col.data_type() {
        DataType::Utf8 => Ok(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        _ => Err(wrong_type(col, name, "Utf8").into()),
    }
}

fn to_i32(v: i64, row: usize, column: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| {
        DataError::OutOfRange {
            row,
            column: column.to_string(),
        }
        .into()
    })
}

fn to_u32(v: i64, row: usize, column: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| {
        DataError::OutOfRange {
            row,
            column: column.to_string(),
        }
        .into()
    })
}

// ---------------------------------------------------------------------------
// Writers (sample data export)
// ---------------------------------------------------------------------------

/// Write mark records as a flat Parquet file readable by [`load_marks`].
pub fn write_marks_parquet(path: &Path, marks: &[MarkRecord]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("grade", DataType::Int64, false),
        Field::new("subject", DataType::Utf8, false),
        Field::new("municipality", DataType::Utf8, false),
        Field::new("login", DataType::Utf8, false),
        Field::new("schoolName", DataType::Utf8, false),
        Field::new("participants", DataType::Int64, false),
        Field::new("mark2", DataType::Float64, false),
        Field::new("mark3", DataType::Float64, false),
        Field::new("mark4", DataType::Float64, false),
        Field::new("mark5", DataType::Float64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(marks.iter().map(|m| m.year).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(
            marks.iter().map(|m| m.grade as i64).collect::<Vec<_>>(),
        )),
        text_column(marks, |m| m.subject.as_str()),
        text_column(marks, |m| m.municipality.as_str()),
        text_column(marks, |m| m.login.as_str()),
        text_column(marks, |m| m.school_name.as_str()),
        Arc::new(Int64Array::from(
            marks.iter().map(|m| m.participants as i64).collect::<Vec<_>>(),
        )),
        float_column(marks, |m| m.mark2),
        float_column(marks, |m| m.mark3),
        float_column(marks, |m| m.mark4),
        float_column(marks, |m| m.mark5),
    ];

    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;
    let file = File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn text_column(marks: &[MarkRecord], f: impl Fn(&MarkRecord) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(marks.iter().map(f).collect::<Vec<_>>()))
}

fn float_column(marks: &[MarkRecord], f: impl Fn(&MarkRecord) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from(marks.iter().map(f).collect::<Vec<_>>()))
}

/// Write any record collection as a records-oriented JSON array.
pub fn write_json<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), records)
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::generator::generate_mock;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    const MARKS_CSV: &str = "\
year,grade,subject,municipality,login,schoolName,participants,mark2,mark3,mark4,mark5
2023,4,Математика,г. Дербент,edu1,ОО №1,40,10,30,40,20
2022,5,Русский язык,г. Дербент,edu2,ОО №2,25,0,50,25,25
";

    #[test]
    fn marks_csv_loads_with_camel_case_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "marks.csv", MARKS_CSV);
        let marks = load_marks(&path).unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].school_name, "ОО №1");
        assert_eq!(marks[1].participants, 25);
        assert_eq!(marks[0].mark4, 40.0);
    }

    #[test]
    fn scores_csv_parses_band_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "scores.csv",
            "year,grade,subject,municipality,login,schoolName,participants,scores\n\
             2023,4,Математика,г. Дербент,edu1,ОО №1,40,10:5;20:10; 30:85\n",
        );
        let scores = load_scores(&path).unwrap();
        assert_eq!(scores[0].scores.len(), 3);
        assert_eq!(scores[0].scores[&30], 85.0);
    }

    #[test]
    fn bias_csv_parses_marker_labels_with_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bias.csv",
            "year,login,municipality,schoolName,totalMarkers,markers\n\
             2023,edu1,г. Дербент,ОО №1,2,РУ 4:1;МА 5:1\n\
             2023,edu2,г. Дербент,ОО №2,0,\n",
        );
        let bias = load_bias(&path, LoadOptions::default()).unwrap();
        assert_eq!(bias[0].markers["РУ 4"], 1);
        assert!(bias[1].markers.is_empty());
    }

    #[test]
    fn malformed_pair_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bias.csv",
            "year,login,municipality,schoolName,totalMarkers,markers\n\
             2023,edu1,г. Дербент,ОО №1,2,РУ 4\n",
        );
        let err = load_bias(&path, LoadOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("malformed pair"));
    }

    #[test]
    fn totals_are_recomputed_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"[{"year":2023,"login":"edu1","municipality":"А","schoolName":"ОО №1",
            "totalMarkers":5,"markers":{"РУ 4":1,"МА 5":1}}]"#;
        let path = write(dir.path(), "bias.json", body);

        let trusted = load_bias(&path, LoadOptions::default()).unwrap();
        assert_eq!(trusted[0].total_markers, 5);

        let recomputed = load_bias(&path, LoadOptions { recompute_totals: true }).unwrap();
        assert_eq!(recomputed[0].total_markers, 2);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "marks.xlsx", "");
        let err = load_marks(&path).unwrap_err();
        assert!(format!("{err:#}").contains(".xlsx"));
    }

    #[test]
    fn dir_requires_marks_but_not_scores_or_bias() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dir(dir.path(), LoadOptions::default()).is_err());

        write(dir.path(), "marks.csv", MARKS_CSV);
        let store = load_dir(dir.path(), LoadOptions::default()).unwrap();
        assert_eq!(store.marks.len(), 2);
        assert!(store.scores.is_empty());
        assert!(store.bias.is_empty());
        assert_eq!(store.options.years, vec![2023, 2022]);
    }

    #[test]
    fn parquet_and_json_exports_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let mock = generate_mock();
        write_marks_parquet(&dir.path().join("marks.parquet"), &mock.marks).unwrap();
        write_json(&dir.path().join("scores.json"), &mock.scores).unwrap();
        write_json(&dir.path().join("bias.json"), &mock.bias).unwrap();

        let store = load_dir(dir.path(), LoadOptions::default()).unwrap();
        assert_eq!(store.marks, mock.marks);
        assert_eq!(store.scores, mock.scores);
        assert_eq!(store.bias, mock.bias);
    }
}
