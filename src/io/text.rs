// src/io/text.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The XMC-repository sparse/dense text formats: a `"rows cols"` header
//! line followed by one line per row. Sparse rows are whitespace-separated
//! `idx:value` tokens, 0-based and bound-checked against `cols`; `#`
//! comments and blank lines are skipped. The same generic reader/writer
//! pair serves label-incidence files (`value` must be `1`) and feature
//! files (general floats) separately — there is no combined per-example
//! line format. Prediction dumps use a stricter sibling pair with no
//! comment/blank-line skipping and an exact per-row column count, matching
//! `original_source/src/io/prediction.cpp`'s `save_sparse_predictions`.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use ndarray::Array2;

use crate::data::{Dataset, FeatureMatrix, MultiLabelIncidence, SparseRow};
use crate::error::{DismecError, Result};
use crate::types::{LabelId, Real};

struct Header {
    rows: usize,
    cols: usize,
}

fn parse_header(line: &str) -> Result<Header> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(DismecError::parse(
            "sparse text header",
            format!("expected 'rows cols', got {} field(s)", fields.len()),
        ));
    }
    let rows: usize = fields[0].parse().map_err(|e| DismecError::parse("sparse text header", format!("{e}")))?;
    let cols: usize = fields[1].parse().map_err(|e| DismecError::parse("sparse text header", format!("{e}")))?;
    if rows == 0 || cols == 0 {
        return Err(DismecError::parse("sparse text header", "rows and cols must be positive"));
    }
    Ok(Header { rows, cols })
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn parse_sparse_line(line: &str, num_cols: usize) -> Result<SparseRow> {
    let mut entries = Vec::new();
    for token in line.split_whitespace() {
        let (idx, val) = token
            .split_once(':')
            .ok_or_else(|| DismecError::parse("sparse text row", format!("malformed token {token}")))?;
        let idx: usize = idx.parse().map_err(|e| DismecError::parse("sparse text row", format!("{e}")))?;
        let val: Real = val.parse().map_err(|e| DismecError::parse("sparse text row", format!("{e}")))?;
        if idx >= num_cols {
            return Err(DismecError::shape(format!("index {idx} out of range [0, {num_cols})")));
        }
        entries.push((idx, val));
    }
    entries.sort_by_key(|&(idx, _)| idx);
    Ok(entries)
}

/// Reads the generic sparse-matrix body (skipping comments/blank lines),
/// checking the header's row count against what was actually found.
fn read_sparse_matrix(path: impl AsRef<Path>) -> Result<(Header, Vec<SparseRow>)> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| DismecError::parse("sparse text", "empty file"))??;
    let header = parse_header(&header_line)?;

    let mut rows = Vec::with_capacity(header.rows);
    for line in lines {
        let line = line?;
        if is_skippable(&line) {
            continue;
        }
        rows.push(parse_sparse_line(&line, header.cols)?);
    }

    if rows.len() != header.rows {
        return Err(DismecError::parse(
            "sparse text",
            format!("header promised {} rows, found {}", header.rows, rows.len()),
        ));
    }

    Ok((header, rows))
}

/// Reads a label-incidence file: `"examples labels"` header, then one
/// sparse row per example with entries `label:1`.
pub fn read_sparse_labels(path: impl AsRef<Path>) -> Result<MultiLabelIncidence> {
    let (header, rows) = read_sparse_matrix(path)?;

    let mut label_instances: Vec<Vec<usize>> = vec![Vec::new(); header.cols];
    for (example, row) in rows.iter().enumerate() {
        for &(label, value) in row {
            if value != 1.0 {
                return Err(DismecError::parse("sparse labels", format!("incidence value must be 1, got {value}")));
            }
            label_instances[label].push(example);
        }
    }
    Ok(MultiLabelIncidence::new(label_instances))
}

/// Writes a dataset's label incidence back out in the same format,
/// transposed from the label-indexed in-memory representation to the
/// file's per-example rows.
pub fn write_sparse_labels(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{} {}", dataset.num_examples(), dataset.num_labels())?;

    let mut labels_per_example: Vec<Vec<usize>> = vec![Vec::new(); dataset.num_examples()];
    for label in 0..dataset.num_labels() {
        for &example in dataset.get_label_instances(LabelId::new(label)) {
            labels_per_example[example].push(label);
        }
    }

    for labels in &labels_per_example {
        let line = labels.iter().map(|l| format!("{l}:1")).collect::<Vec<_>>().join(" ");
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Reads a sparse feature matrix: `"examples features"` header, then one
/// sparse row per example with general float values.
pub fn read_sparse_features(path: impl AsRef<Path>) -> Result<FeatureMatrix> {
    let (header, rows) = read_sparse_matrix(path)?;
    Ok(FeatureMatrix::Sparse {
        rows,
        num_cols: header.cols,
    })
}

pub fn write_sparse_features(path: impl AsRef<Path>, features: &FeatureMatrix) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{} {}", features.num_rows(), features.num_cols())?;

    match features {
        FeatureMatrix::Sparse { rows, .. } => {
            for row in rows {
                let line = row.iter().map(|&(idx, val)| format!("{idx}:{val}")).collect::<Vec<_>>().join(" ");
                writeln!(file, "{line}")?;
            }
        }
        FeatureMatrix::Dense(m) => {
            for row in m.rows() {
                let line = row
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| v != 0.0)
                    .map(|(idx, v)| format!("{idx}:{v}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(file, "{line}")?;
            }
        }
    }
    Ok(())
}

/// Reads a plain whitespace-separated dense matrix: a `rows cols` header
/// line followed by one line of `cols` values per row.
pub fn read_dense_text(path: impl AsRef<Path>) -> Result<Array2<Real>> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| DismecError::parse("dense text", "empty file"))??;
    let header = parse_header(&header_line)?;

    let mut data = Vec::with_capacity(header.rows * header.cols);
    for line in lines {
        let line = line?;
        for token in line.split_whitespace() {
            let v: Real = token.parse().map_err(|e| DismecError::parse("dense text row", format!("{e}")))?;
            data.push(v);
        }
    }

    Array2::from_shape_vec((header.rows, header.cols), data).map_err(|e| DismecError::shape(e.to_string()))
}

pub fn write_dense_text(path: impl AsRef<Path>, matrix: &Array2<Real>) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{} {}", matrix.nrows(), matrix.ncols())?;
    for row in matrix.rows() {
        let line = row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Reads a sparse prediction dump: `"rows cols"` header (`cols` = entries
/// per row, i.e. top-K), then exactly `rows` lines of exactly `cols`
/// `idx:value` tokens. Unlike the generic sparse-matrix reader, this does
/// not skip comments or blank lines and enforces an exact column count per
/// row, matching `original_source`'s `read_sparse_prediction`.
pub fn read_sparse_prediction(path: impl AsRef<Path>) -> Result<Vec<Vec<(usize, Real)>>> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| DismecError::parse("sparse prediction", "empty file"))??;
    let fields: Vec<&str> = header_line.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(DismecError::parse(
            "sparse prediction header",
            format!("expected 'rows cols', got {} field(s)", fields.len()),
        ));
    }
    let rows: usize = fields[0]
        .parse()
        .map_err(|e| DismecError::parse("sparse prediction header", format!("{e}")))?;
    let cols: usize = fields[1]
        .parse()
        .map_err(|e| DismecError::parse("sparse prediction header", format!("{e}")))?;
    if rows == 0 || cols == 0 {
        return Err(DismecError::parse("sparse prediction header", "rows and cols must be positive"));
    }

    let mut out = Vec::with_capacity(rows);
    for line in lines {
        let line = line?;
        let mut entries = Vec::with_capacity(cols);
        for token in line.split_whitespace() {
            let (idx, val) = token
                .split_once(':')
                .ok_or_else(|| DismecError::parse("sparse prediction row", format!("malformed token {token}")))?;
            let idx: usize = idx.parse().map_err(|e| DismecError::parse("sparse prediction row", format!("{e}")))?;
            let val: Real = val.parse().map_err(|e| DismecError::parse("sparse prediction row", format!("{e}")))?;
            entries.push((idx, val));
        }
        if entries.len() != cols {
            return Err(DismecError::parse(
                "sparse prediction row",
                format!("expected {cols} entries, got {}", entries.len()),
            ));
        }
        out.push(entries);
    }

    if out.len() != rows {
        return Err(DismecError::parse(
            "sparse prediction",
            format!("header promised {rows} rows, found {}", out.len()),
        ));
    }
    Ok(out)
}

/// Writes a sparse prediction dump. Every row must carry the same number
/// of entries (the file format has a single `cols` field for the whole
/// matrix); rows of unequal length are a caller error.
pub fn write_sparse_prediction(path: impl AsRef<Path>, predictions: &[Vec<(usize, Real)>]) -> Result<()> {
    let rows = predictions.len();
    let cols = predictions.first().map_or(0, |r| r.len());
    for row in predictions {
        if row.len() != cols {
            return Err(DismecError::shape("all prediction rows must carry the same number of entries"));
        }
    }

    let mut file = File::create(path)?;
    writeln!(file, "{rows} {cols}")?;
    for row in predictions {
        let line = row.iter().map(|&(idx, val)| format!("{idx}:{val}")).collect::<Vec<_>>().join(" ");
        writeln!(file, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_the_spec_sparse_matrix_scenario() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "3 3\n1:1\n0:1\n0:1 2:1").unwrap();

        let incidence = read_sparse_labels(file.path()).unwrap();
        assert_eq!(incidence.num_labels(), 3);
        let dataset = Dataset::new(FeatureMatrix::Dense(Array2::zeros((3, 3))), incidence).unwrap();
        assert_eq!(dataset.get_label_instances(LabelId::new(0)), &[1, 2]);
        assert_eq!(dataset.get_label_instances(LabelId::new(1)), &[0]);
        assert_eq!(dataset.get_label_instances(LabelId::new(2)), &[2]);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "2 2\n# a comment\n0:1\n\n1:1\n").unwrap();
        let incidence = read_sparse_labels(file.path()).unwrap();
        assert_eq!(incidence.num_labels(), 2);
    }

    #[test]
    fn rejects_non_positive_header_counts() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "0 3\n").unwrap();
        assert!(read_sparse_labels(file.path()).is_err());
    }

    #[test]
    fn rejects_non_binary_label_values() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "1 2\n0:0.5\n").unwrap();
        assert!(read_sparse_labels(file.path()).is_err());
    }

    #[test]
    fn round_trips_sparse_labels() {
        let features = FeatureMatrix::Dense(Array2::zeros((2, 3)));
        let labels = MultiLabelIncidence::new(vec![vec![0], vec![1], vec![]]);
        let dataset = Dataset::new(features, labels).unwrap();

        let file = NamedTempFile::new().unwrap();
        write_sparse_labels(file.path(), &dataset).unwrap();
        let loaded = read_sparse_labels(file.path()).unwrap();
        assert_eq!(loaded.num_labels(), 3);

        let dataset2 = Dataset::new(FeatureMatrix::Dense(Array2::zeros((2, 3))), loaded).unwrap();
        assert_eq!(dataset2.get_label_instances(LabelId::new(0)), &[0]);
        assert_eq!(dataset2.get_label_instances(LabelId::new(1)), &[1]);
    }

    #[test]
    fn round_trips_sparse_features() {
        let features = FeatureMatrix::Sparse {
            rows: vec![vec![(0, 1.0), (2, 3.0)], vec![(1, 2.0)]],
            num_cols: 3,
        };
        let file = NamedTempFile::new().unwrap();
        write_sparse_features(file.path(), &features).unwrap();
        let loaded = read_sparse_features(file.path()).unwrap();
        assert_eq!(loaded.num_rows(), 2);
        assert_eq!(loaded.num_cols(), 3);
        assert_eq!(loaded.dot_row(0, &[1.0, 1.0, 1.0]), 4.0);
    }

    #[test]
    fn round_trips_dense_text() {
        let matrix = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let file = NamedTempFile::new().unwrap();
        write_dense_text(file.path(), &matrix).unwrap();
        let loaded = read_dense_text(file.path()).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn header_tolerates_trailing_whitespace_and_crlf() {
        let header = "3 4 \r";
        let parsed = parse_header(header).unwrap();
        assert_eq!(parsed.rows, 3);
        assert_eq!(parsed.cols, 4);
    }

    #[test]
    fn parses_the_spec_sparse_prediction_scenario() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "2 3\n0:0.5 2:1.5 1:0.9\n1:1.5 31:0.9 2:0.4\n").unwrap();

        let predictions = read_sparse_prediction(file.path()).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0], vec![(0, 0.5), (2, 1.5), (1, 0.9)]);
        assert_eq!(predictions[1], vec![(1, 1.5), (31, 0.9), (2, 0.4)]);
    }

    #[test]
    fn sparse_prediction_rejects_wrong_column_count() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "1 3\n0:0.5 1:0.9\n").unwrap();
        assert!(read_sparse_prediction(file.path()).is_err());
    }

    #[test]
    fn sparse_prediction_does_not_skip_blank_lines() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "2 1\n0:0.5\n\n").unwrap();
        assert!(read_sparse_prediction(file.path()).is_err());
    }

    #[test]
    fn round_trips_sparse_prediction() {
        let predictions = vec![vec![(0, 0.5), (2, 1.5), (1, 0.9)], vec![(1, 1.5), (31, 0.9), (2, 0.4)]];
        let file = NamedTempFile::new().unwrap();
        write_sparse_prediction(file.path(), &predictions).unwrap();

        let bytes = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(bytes, "2 3\n0:0.5 2:1.5 1:0.9\n1:1.5 31:0.9 2:0.4\n");

        let loaded = read_sparse_prediction(file.path()).unwrap();
        assert_eq!(loaded, predictions);
    }
}
