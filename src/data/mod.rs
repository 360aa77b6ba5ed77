//! Tabular data intake
//!
//! Parses an uploaded CSV with polars, keeps a preview of the raw upload,
//! down-samples oversized uploads and builds the numeric matrix the
//! explainers consume.

use ndarray::{Array2, ArrayView1, Axis};
use polars::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::{debug, info, warn};

use crate::error::{Result, ShapLensError};

/// Category levels per column, in code order
pub type CategoryLevels = BTreeMap<String, Vec<String>>;

/// Rows kept in the preview table
pub const PREVIEW_ROWS: usize = 5;

/// Rows used for CSV schema inference
const INFER_SCHEMA_ROWS: usize = 1000;

/// Uploaded dataset after sampling
#[derive(Debug, Clone)]
pub struct SampleDataset {
    frame: DataFrame,
    preview: DataFrame,
    original_rows: usize,
    indices: Vec<usize>,
    feature_names: Vec<String>,
    matrix: Array2<f64>,
}

impl SampleDataset {
    /// Parse CSV bytes and cap the row count at `max_rows`
    pub fn from_csv(bytes: &[u8], max_rows: usize, seed: u64) -> Result<Self> {
        Self::from_csv_with_levels(bytes, max_rows, seed, None)
    }

    /// Parse CSV bytes, encoding string columns with the model's levels
    ///
    /// A string column listed in `levels` takes its codes from the position
    /// of each value in that list, so the same value encodes the same way in
    /// every upload. Values outside the list become NaN. Columns not listed
    /// fall back to sorted levels of the upload itself.
    pub fn from_csv_with_levels(
        bytes: &[u8],
        max_rows: usize,
        seed: u64,
        levels: Option<&CategoryLevels>,
    ) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ShapLensError::DataError("uploaded file is empty".to_string()));
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;

        Self::from_frame(drop_empty_rows(df)?, max_rows, seed, levels)
    }

    /// Build from an already parsed frame
    pub fn from_frame(
        df: DataFrame,
        max_rows: usize,
        seed: u64,
        levels: Option<&CategoryLevels>,
    ) -> Result<Self> {
        let original_rows = df.height();
        if original_rows == 0 || df.width() == 0 {
            return Err(ShapLensError::DataError(
                "uploaded file has no data rows".to_string(),
            ));
        }

        let preview = df.head(Some(PREVIEW_ROWS));
        let feature_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        // Encode on the full upload so string levels do not depend on the sample
        let full = numeric_matrix(&df, levels)?;

        let indices = sample_indices(original_rows, max_rows, seed);
        let (frame, matrix) = if indices.len() == original_rows {
            (df, full)
        } else {
            let idx = IdxCa::from_vec(
                "idx".into(),
                indices.iter().map(|&i| i as IdxSize).collect(),
            );
            (df.take(&idx)?, full.select(Axis(0), &indices))
        };

        info!(
            original_rows,
            explained_rows = indices.len(),
            features = feature_names.len(),
            "Dataset prepared"
        );

        Ok(Self {
            frame,
            preview,
            original_rows,
            indices,
            feature_names,
            matrix,
        })
    }

    /// Sampled rows as uploaded
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// First rows of the full upload, before sampling
    pub fn preview(&self) -> &DataFrame {
        &self.preview
    }

    /// Preview as display strings: `(headers, rows)`
    pub fn preview_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        frame_to_strings(&self.preview)
    }

    pub fn original_rows(&self) -> usize {
        self.original_rows
    }

    /// Rows retained for explanation
    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn was_sampled(&self) -> bool {
        self.n_rows() < self.original_rows
    }

    /// Original row index of every retained row
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Numeric view, `rows x features`
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.n_rows()).then(|| self.matrix.row(index))
    }

    /// Column positions of `names` in this dataset, in the given order
    pub fn column_positions(&self, names: &[String]) -> Result<Vec<usize>> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.feature_names.contains(n))
            .map(|n| n.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ShapLensError::DataError(format!(
                "dataset lacks model input columns: {}",
                missing.join(", ")
            )));
        }
        Ok(names
            .iter()
            .filter_map(|n| self.feature_names.iter().position(|f| f == n))
            .collect())
    }
}

/// Uniform sample without replacement, sorted; identity when under the cap
fn sample_indices(n: usize, cap: usize, seed: u64) -> Vec<usize> {
    if n <= cap {
        return (0..n).collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, n, cap).into_vec();
    indices.sort_unstable();
    debug!(n, cap, "Down-sampled rows");
    indices
}

/// Blank lines parse as rows with every field null; they carry no data
fn drop_empty_rows(df: DataFrame) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df);
    }
    let before = df.height();
    let df = df
        .lazy()
        .filter(any_horizontal([all().is_not_null()])?)
        .collect()?;
    if df.height() < before {
        debug!(dropped = before - df.height(), "Dropped empty rows");
    }
    Ok(df)
}

fn numeric_matrix(df: &DataFrame, levels: Option<&CategoryLevels>) -> Result<Array2<f64>> {
    let (n_rows, n_cols) = (df.height(), df.width());
    let mut matrix = Array2::from_elem((n_rows, n_cols), f64::NAN);

    for (j, column) in df.get_columns().iter().enumerate() {
        let series = column.as_materialized_series();
        let known = levels
            .and_then(|l| l.get(series.name().as_str()))
            .map(|v| v.as_slice());
        let values = column_values(series, known)?;
        for (i, v) in values.into_iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }
    Ok(matrix)
}

fn column_values(series: &Series, known: Option<&[String]>) -> Result<Vec<f64>> {
    match series.dtype() {
        DataType::String => {
            let ca = series.str()?;
            let codes: BTreeMap<&str, f64> = match known {
                Some(levels) => levels
                    .iter()
                    .enumerate()
                    .map(|(code, level)| (level.as_str(), code as f64))
                    .collect(),
                None => ca
                    .into_iter()
                    .flatten()
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .enumerate()
                    .map(|(code, level)| (level, code as f64))
                    .collect(),
            };
            let values: Vec<f64> = ca
                .into_iter()
                .map(|v| v.and_then(|s| codes.get(s).copied()).unwrap_or(f64::NAN))
                .collect();
            if known.is_some() {
                let unknown = ca
                    .into_iter()
                    .flatten()
                    .filter(|s| !codes.contains_key(s))
                    .count();
                if unknown > 0 {
                    warn!(column = %series.name(), unknown, "Values outside the model's category levels");
                }
            }
            Ok(values)
        }
        dtype => {
            let cast = series.cast(&DataType::Float64).map_err(|e| {
                ShapLensError::DataError(format!(
                    "column '{}' of type {} is not usable as a feature: {}",
                    series.name(),
                    dtype,
                    e
                ))
            })?;
            Ok(cast
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect())
        }
    }
}

fn frame_to_strings(df: &DataFrame) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let rows = (0..df.height())
        .map(|i| {
            df.get_columns()
                .iter()
                .map(|column| match column.as_materialized_series().get(i) {
                    Ok(AnyValue::Null) | Err(_) => String::new(),
                    Ok(AnyValue::String(s)) => s.to_string(),
                    Ok(value) => value.to_string(),
                })
                .collect()
        })
        .collect();

    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(rows: usize) -> String {
        let mut out = String::from("id,amount,segment,active\n");
        for i in 0..rows {
            let segment = ["retail", "business", "student"][i % 3];
            out.push_str(&format!("{},{}.5,{},{}\n", i, i * 2, segment, i % 2 == 0));
        }
        out
    }

    #[test]
    fn test_small_upload_kept_whole() {
        let ds = SampleDataset::from_csv(csv(10).as_bytes(), 1000, 42).unwrap();
        assert_eq!(ds.n_rows(), 10);
        assert_eq!(ds.original_rows(), 10);
        assert!(!ds.was_sampled());
        assert_eq!(ds.indices(), (0..10).collect::<Vec<_>>().as_slice());
        assert_eq!(ds.feature_names(), &["id", "amount", "segment", "active"]);
    }

    #[test]
    fn test_downsample_to_cap_without_duplicates() {
        let ds = SampleDataset::from_csv(csv(5000).as_bytes(), 1000, 42).unwrap();
        assert_eq!(ds.n_rows(), 1000);
        assert_eq!(ds.frame().height(), 1000);
        assert!(ds.was_sampled());

        let mut seen = ds.indices().to_vec();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
        assert!(ds.indices().iter().all(|&i| i < 5000));

        // `id` equals the original row index, so every row is one of the originals
        for (row, &orig) in ds.indices().iter().enumerate() {
            assert_eq!(ds.matrix()[[row, 0]], orig as f64);
            assert_eq!(ds.matrix()[[row, 1]], orig as f64 * 2.0 + 0.5);
        }
    }

    #[test]
    fn test_downsample_is_deterministic() {
        let a = SampleDataset::from_csv(csv(600).as_bytes(), 100, 42).unwrap();
        let b = SampleDataset::from_csv(csv(600).as_bytes(), 100, 42).unwrap();
        assert_eq!(a.indices(), b.indices());
    }

    #[test]
    fn test_preview_is_taken_before_sampling() {
        let ds = SampleDataset::from_csv(csv(500).as_bytes(), 50, 42).unwrap();
        let (headers, rows) = ds.preview_table();
        assert_eq!(headers.len(), 4);
        assert_eq!(rows.len(), PREVIEW_ROWS);
        assert_eq!(rows[0][0], "0");
        assert_eq!(rows[1][2], "business");
    }

    #[test]
    fn test_string_and_bool_encoding() {
        let ds = SampleDataset::from_csv(csv(3).as_bytes(), 1000, 42).unwrap();
        // sorted levels: business=0, retail=1, student=2
        assert_eq!(ds.matrix()[[0, 2]], 1.0);
        assert_eq!(ds.matrix()[[1, 2]], 0.0);
        assert_eq!(ds.matrix()[[2, 2]], 2.0);
        assert_eq!(ds.matrix()[[0, 3]], 1.0);
        assert_eq!(ds.matrix()[[1, 3]], 0.0);
    }

    #[test]
    fn test_nulls_become_nan() {
        let ds = SampleDataset::from_csv(b"a,b\n1.0,x\n,y\n3.0,\n", 1000, 42).unwrap();
        assert_eq!(ds.n_rows(), 3);
        assert!(ds.matrix()[[1, 0]].is_nan());
        assert_eq!(ds.matrix()[[1, 1]], 1.0);
        assert_eq!(ds.matrix()[[2, 0]], 3.0);
        assert!(ds.matrix()[[2, 1]].is_nan());
    }

    #[test]
    fn test_blank_lines_are_not_rows() {
        let ds = SampleDataset::from_csv(b"a,b\n1,2\n3,4\n\n\n", 1000, 42).unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.original_rows(), 2);
        assert!(ds.matrix().iter().all(|v| !v.is_nan()));

        let ds = SampleDataset::from_csv(b"a,b\n1,2\n\n3,4\n", 1000, 42).unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.matrix()[[1, 0]], 3.0);
    }

    #[test]
    fn test_model_levels_fix_codes_across_uploads() {
        let mut levels = CategoryLevels::new();
        levels.insert(
            "plan".to_string(),
            vec!["basic".to_string(), "plus".to_string(), "premium".to_string()],
        );

        let first = b"age,plan\n40,plus\n30,basic\n";
        let second = b"age,plan\n40,plus\n50,premium\n";
        let a = SampleDataset::from_csv_with_levels(first, 1000, 42, Some(&levels)).unwrap();
        let b = SampleDataset::from_csv_with_levels(second, 1000, 42, Some(&levels)).unwrap();
        assert_eq!(a.row(0), b.row(0));
        assert_eq!(a.matrix()[[0, 1]], 1.0);
        assert_eq!(b.matrix()[[1, 1]], 2.0);

        // Without model levels the codes follow each upload's own levels
        let a = SampleDataset::from_csv(first, 1000, 42).unwrap();
        let b = SampleDataset::from_csv(second, 1000, 42).unwrap();
        assert_eq!(a.matrix()[[0, 1]], 1.0);
        assert_eq!(b.matrix()[[0, 1]], 0.0);
    }

    #[test]
    fn test_unknown_level_becomes_nan() {
        let mut levels = CategoryLevels::new();
        levels.insert("plan".to_string(), vec!["basic".to_string(), "plus".to_string()]);
        let ds = SampleDataset::from_csv_with_levels(
            b"age,plan\n40,enterprise\n30,basic\n",
            1000,
            42,
            Some(&levels),
        )
        .unwrap();
        assert!(ds.matrix()[[0, 1]].is_nan());
        assert_eq!(ds.matrix()[[1, 1]], 0.0);
    }

    #[test]
    fn test_empty_upload_rejected() {
        assert!(matches!(
            SampleDataset::from_csv(b"", 1000, 42),
            Err(ShapLensError::DataError(_))
        ));
        assert!(matches!(
            SampleDataset::from_csv(b"a,b\n", 1000, 42),
            Err(ShapLensError::DataError(_))
        ));
    }

    #[test]
    fn test_column_positions() {
        let ds = SampleDataset::from_csv(csv(3).as_bytes(), 1000, 42).unwrap();
        let pos = ds
            .column_positions(&["segment".to_string(), "id".to_string()])
            .unwrap();
        assert_eq!(pos, vec![2, 0]);
        assert!(ds.column_positions(&["missing".to_string()]).is_err());
    }
}
