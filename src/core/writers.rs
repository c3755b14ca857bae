//! Dataset writers.
//!
//! A dataset directory holds four files:
//! - `metadata.txt`: one line per row kind, `<width>,<col>,<col>...`
//! - `sequences_<name>.txt`: one line per row, identifying its source frame
//! - `data_X.bin` / `data_Y.bin`: rows as little-endian `f32`
//!
//! Writes are staged in temporary files next to their targets and renamed into
//! place only once every file has been staged. Payloads are renamed before the
//! metadata that describes them.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::ExportConfig;
use crate::processors::features::FeatureTable;

use super::loaders::{read_metadata, ClipDocument, ClipFormat, DatasetMetadata, LoaderError};

/// Label written in the third column of every sequences line.
const SEQUENCE_KIND: &str = "Standard";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create the export directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to create a staging file or copy existing content into it.
    #[error("failed to stage '{path}': {source}")]
    Stage {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to write data to a file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to move a staged file into place.
    #[error("failed to persist '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Existing metadata records different row widths than the new rows.
    #[error("{kind} rows are {found} floats wide but '{path}' records {recorded}")]
    RowWidthMismatch {
        path: String,
        kind: &'static str,
        recorded: usize,
        found: usize,
    },

    /// Existing payload does not hold a whole number of rows.
    #[error("'{path}' is {bytes} bytes, not a multiple of the {row_bytes}-byte row size")]
    CorruptPayload {
        path: String,
        bytes: u64,
        row_bytes: usize,
    },

    /// Existing input and output payloads hold different numbers of rows.
    #[error("existing payloads are misaligned: {input_rows} input rows, {output_rows} output rows")]
    MisalignedPayloads { input_rows: usize, output_rows: usize },

    /// Existing metadata could not be parsed.
    #[error("existing metadata is unreadable: {0}")]
    Metadata(#[source] LoaderError),

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Clip could not be encoded.
    #[error("failed to encode clip '{path}': {reason}")]
    Encode { path: String, reason: String },

    /// Row data is not a whole number of rows.
    #[error("{len} floats do not split into rows of {width}")]
    RaggedRows { len: usize, width: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub directory: PathBuf,
    pub sequence_id: i64,
    /// Rows added by this export.
    pub rows_written: usize,
    /// Rows in the payloads after this export.
    pub total_rows: usize,
    pub input_width: usize,
    pub output_width: usize,
    /// Whether rows were appended to an existing dataset.
    pub appended: bool,
}

/// Writes feature tables into a dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    export: ExportConfig,
}

impl DatasetWriter {
    pub fn new(export: ExportConfig) -> Self {
        Self { export }
    }

    pub fn export(&self) -> &ExportConfig {
        &self.export
    }

    /// Write `table` into the export directory.
    ///
    /// With `overwrite` the dataset is replaced by this table. Otherwise rows
    /// are appended after checking that the existing metadata records the
    /// same row widths and that the existing payloads hold whole rows.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The export directory cannot be created
    /// - Appending would mix row widths, an existing payload is truncated or
    ///   the existing payloads hold different row counts
    /// - Any file cannot be staged, written or moved into place
    ///
    /// Files are only replaced after all four have been staged, so a failure
    /// before that point leaves the previous dataset as it was. The payloads
    /// are moved into place first and the metadata last.
    pub fn write(&self, table: &FeatureTable) -> Result<ExportSummary> {
        let dir = &self.export.directory;
        ensure_dir(dir)?;

        let metadata_path = self.export.metadata_path();
        let sequences_path = self.export.sequences_path();
        let x_path = self.export.data_x_path();
        let y_path = self.export.data_y_path();

        let input_width = table.input_width();
        let output_width = table.output_width();

        let append = !self.export.overwrite;
        let existing_rows = if append {
            self.check_append(&metadata_path, input_width, output_width)?;
            let x_rows = payload_rows(&x_path, input_width)?;
            let y_rows = payload_rows(&y_path, output_width)?;
            if x_rows != y_rows {
                return Err(WriteError::MisalignedPayloads {
                    input_rows: x_rows,
                    output_rows: y_rows,
                });
            }
            x_rows
        } else {
            0
        };

        let mut metadata = Stage::create(dir, &metadata_path, false)?;
        metadata.write_line(&metadata_line(input_width, &table.layout.input_columns))?;
        metadata.write_line(&metadata_line(output_width, &table.layout.output_columns))?;

        let mut sequences = Stage::create(dir, &sequences_path, append)?;
        for frame in &table.frames {
            sequences.write_line(&format!(
                "{} {} {} {} {}",
                table.info.sequence_id,
                frame.frame,
                SEQUENCE_KIND,
                table.info.source_name,
                table.info.dataset_id
            ))?;
        }

        let mut data_x = Stage::create(dir, &x_path, append)?;
        let mut data_y = Stage::create(dir, &y_path, append)?;
        for frame in &table.frames {
            data_x.write_floats(&frame.input)?;
            data_y.write_floats(&frame.output)?;
        }

        for stage in [data_x, data_y, sequences, metadata] {
            stage.persist()?;
        }

        let summary = ExportSummary {
            directory: dir.clone(),
            sequence_id: table.info.sequence_id,
            rows_written: table.len(),
            total_rows: existing_rows + table.len(),
            input_width,
            output_width,
            appended: append && existing_rows > 0,
        };
        log::debug!(
            "Wrote {} rows to {} ({} total)",
            summary.rows_written,
            dir.display(),
            summary.total_rows
        );
        Ok(summary)
    }

    fn check_append(&self, metadata_path: &Path, input_width: usize, output_width: usize) -> Result<()> {
        if !metadata_path.exists() {
            return Ok(());
        }
        let recorded: DatasetMetadata = read_metadata(metadata_path).map_err(WriteError::Metadata)?;
        let path = metadata_path.display().to_string();
        if recorded.input_width != input_width {
            return Err(WriteError::RowWidthMismatch {
                path,
                kind: "input",
                recorded: recorded.input_width,
                found: input_width,
            });
        }
        if recorded.output_width != output_width {
            return Err(WriteError::RowWidthMismatch {
                path,
                kind: "output",
                recorded: recorded.output_width,
                found: output_width,
            });
        }
        Ok(())
    }
}

/// A temporary file that replaces `target` when persisted.
struct Stage {
    target: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl Stage {
    /// Stage `target` inside `dir`, seeded with its current content when
    /// `keep_existing` is set and the file exists.
    fn create(dir: &Path, target: &Path, keep_existing: bool) -> Result<Self> {
        let stage_err = |source| WriteError::Stage {
            path: target.display().to_string(),
            source,
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(stage_err)?;
        if keep_existing && target.exists() {
            let mut existing = File::open(target).map_err(stage_err)?;
            io::copy(&mut existing, temp.as_file_mut()).map_err(stage_err)?;
        }

        Ok(Self {
            target: target.to_path_buf(),
            writer: BufWriter::new(temp),
        })
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line).map_err(|e| self.write_err(e))
    }

    fn write_floats(&mut self, values: &[f32]) -> Result<()> {
        for v in values {
            if let Err(e) = self.writer.write_all(&v.to_le_bytes()) {
                return Err(self.write_err(e));
            }
        }
        Ok(())
    }

    fn write_err(&self, source: io::Error) -> WriteError {
        WriteError::WriteFile {
            path: self.target.display().to_string(),
            source,
        }
    }

    fn persist(self) -> Result<()> {
        let path = self.target.display().to_string();
        let temp = self.writer.into_inner().map_err(|e| WriteError::WriteFile {
            path: path.clone(),
            source: e.into_error(),
        })?;
        temp.persist(&self.target).map_err(|e| WriteError::Persist {
            path,
            source: e.error,
        })?;
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
            path: dir.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn metadata_line(width: usize, columns: &[String]) -> String {
    let mut line = width.to_string();
    for column in columns {
        line.push(',');
        line.push_str(column);
    }
    line
}

/// Whole rows in an existing payload, 0 if it does not exist.
fn payload_rows(path: &Path, width: usize) -> Result<usize> {
    let bytes = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(WriteError::Stage {
                path: path.display().to_string(),
                source: e,
            })
        }
    };
    let row_bytes = width * std::mem::size_of::<f32>();
    if row_bytes == 0 || bytes % row_bytes as u64 != 0 {
        return Err(WriteError::CorruptPayload {
            path: path.display().to_string(),
            bytes,
            row_bytes,
        });
    }
    Ok((bytes / row_bytes as u64) as usize)
}

/// Write flat row data to CSV, one record per row, with `columns` as header.
///
/// # Errors
///
/// Fails if `data` is not a whole number of `columns.len()`-wide rows or the
/// file cannot be written.
pub fn write_rows_csv(path: &Path, columns: &[String], data: &[f32]) -> Result<usize> {
    let width = columns.len();
    if width == 0 || data.len() % width != 0 {
        return Err(WriteError::RaggedRows {
            len: data.len(),
            width,
        });
    }
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let path_str = path.display().to_string();
    let mut csv_writer = csv::Writer::from_path(path).map_err(|e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    })?;

    csv_writer
        .write_record(columns)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    let mut rows = 0;
    for row in data.chunks_exact(width) {
        csv_writer
            .write_record(row.iter().map(|v| format!("{:.6}", v)))
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
        rows += 1;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(rows)
}

/// Save a clip document as JSON or YAML, chosen by the file extension.
pub fn write_clip(path: &Path, clip: &ClipDocument) -> Result<()> {
    let path_str = path.display().to_string();
    let encoded = match ClipFormat::from_path(path) {
        Some(ClipFormat::Json) => serde_json::to_string_pretty(clip).map_err(|e| e.to_string()),
        Some(ClipFormat::Yaml) => serde_yaml::to_string(clip).map_err(|e| e.to_string()),
        None => Err("extension must be .json, .yaml or .yml".to_string()),
    }
    .map_err(|reason| WriteError::Encode {
        path: path_str.clone(),
        reason,
    })?;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, encoded).map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::animation::{SequenceInfo, Skeleton};
    use crate::config::WindowConfig;
    use crate::processors::features::{FeatureLayout, FrameFeatures};
    use tempfile::tempdir;

    fn table(num_bones: usize, frames: &[usize]) -> FeatureTable {
        let names: Vec<String> = (0..num_bones).map(|i| format!("b{i}")).collect();
        let parents = (0..num_bones).map(|i| i.checked_sub(1)).collect();
        let skeleton = Skeleton::new(names, parents).unwrap();
        let layout = FeatureLayout::new(&WindowConfig::default(), &skeleton);

        let info = SequenceInfo {
            sequence_id: 7,
            source_name: "walk_01".to_string(),
            dataset_id: "mocap".to_string(),
        };
        let (input_width, output_width) = (layout.input_width(), layout.output_width());
        let mut table = FeatureTable::new(info, layout);
        for &f in frames {
            table.frames.push(FrameFeatures {
                frame: f,
                input: vec![f as f32; input_width],
                output: vec![-(f as f32); output_width],
            });
        }
        table
    }

    fn export(dir: &Path, overwrite: bool) -> ExportConfig {
        ExportConfig {
            directory: dir.to_path_buf(),
            dataset_name: "test".to_string(),
            overwrite,
        }
    }

    #[test]
    fn test_write_creates_dataset() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("dataset");
        let writer = DatasetWriter::new(export(&out, true));

        let summary = writer.write(&table(2, &[60, 61, 62])).unwrap();
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.input_width, 91 + 24);
        assert_eq!(summary.output_width, 3 + 42 + 24);
        assert!(!summary.appended);

        let metadata = fs::read_to_string(out.join("metadata.txt")).unwrap();
        let lines: Vec<&str> = metadata.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("115,root_pos_x_0,"));
        assert!(lines[1].starts_with("69,delta_x,delta_y,delta_angle,out_root_pos_x_7,"));

        let sequences = fs::read_to_string(out.join("sequences_test.txt")).unwrap();
        assert_eq!(sequences.lines().next(), Some("7 60 Standard walk_01 mocap"));

        let x = fs::read(out.join("data_X.bin")).unwrap();
        assert_eq!(x.len(), 3 * 115 * 4);
        assert_eq!(&x[..4], &60.0f32.to_le_bytes());
        let y = fs::read(out.join("data_Y.bin")).unwrap();
        assert_eq!(y.len(), 3 * 69 * 4);
        assert_eq!(&y[y.len() - 4..], &(-62.0f32).to_le_bytes());
    }

    #[test]
    fn test_append_and_overwrite() {
        let dir = tempdir().unwrap();
        DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[60, 61]))
            .unwrap();

        let summary = DatasetWriter::new(export(dir.path(), false))
            .write(&table(1, &[60, 61, 62]))
            .unwrap();
        assert!(summary.appended);
        assert_eq!(summary.total_rows, 5);
        let x = fs::read(dir.path().join("data_X.bin")).unwrap();
        assert_eq!(x.len(), 5 * 103 * 4);
        let sequences = fs::read_to_string(dir.path().join("sequences_test.txt")).unwrap();
        assert_eq!(sequences.lines().count(), 5);

        let summary = DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[80]))
            .unwrap();
        assert_eq!(summary.total_rows, 1);
        let x = fs::read(dir.path().join("data_X.bin")).unwrap();
        assert_eq!(x.len(), 103 * 4);
    }

    #[test]
    fn test_append_refuses_misaligned_payloads() {
        let dir = tempdir().unwrap();
        DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[60, 61, 62]))
            .unwrap();

        // Drop the last output row.
        let y_path = dir.path().join("data_Y.bin");
        let y = fs::read(&y_path).unwrap();
        fs::write(&y_path, &y[..2 * 57 * 4]).unwrap();
        let x_before = fs::read(dir.path().join("data_X.bin")).unwrap();

        let err = DatasetWriter::new(export(dir.path(), false))
            .write(&table(1, &[70, 71]))
            .unwrap_err();
        assert!(matches!(
            err,
            WriteError::MisalignedPayloads {
                input_rows: 3,
                output_rows: 2
            }
        ));
        assert_eq!(fs::read(dir.path().join("data_X.bin")).unwrap(), x_before);
        let sequences = fs::read_to_string(dir.path().join("sequences_test.txt")).unwrap();
        assert_eq!(sequences.lines().count(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_persist_keeps_old_metadata() {
        let dir = tempdir().unwrap();
        DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[60]))
            .unwrap();

        // A directory in place of data_Y.bin makes its rename fail.
        let y_path = dir.path().join("data_Y.bin");
        fs::remove_file(&y_path).unwrap();
        fs::create_dir(&y_path).unwrap();
        fs::write(y_path.join("blocker"), b"x").unwrap();

        let err = DatasetWriter::new(export(dir.path(), true))
            .write(&table(2, &[60]))
            .unwrap_err();
        assert!(matches!(err, WriteError::Persist { .. }));

        let metadata = read_metadata(&dir.path().join("metadata.txt")).unwrap();
        assert_eq!(metadata.input_width, 103);
        assert_eq!(metadata.output_width, 57);
    }

    #[test]
    fn test_append_refuses_width_change() {
        let dir = tempdir().unwrap();
        DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[60]))
            .unwrap();
        let before = fs::read(dir.path().join("data_X.bin")).unwrap();

        let err = DatasetWriter::new(export(dir.path(), false))
            .write(&table(2, &[60]))
            .unwrap_err();
        match err {
            WriteError::RowWidthMismatch {
                kind,
                recorded,
                found,
                ..
            } => {
                assert_eq!(kind, "input");
                assert_eq!(recorded, 103);
                assert_eq!(found, 115);
            }
            other => panic!("Expected RowWidthMismatch, got {other:?}"),
        }

        // Nothing was touched.
        assert_eq!(fs::read(dir.path().join("data_X.bin")).unwrap(), before);
    }

    #[test]
    fn test_append_refuses_truncated_payload() {
        let dir = tempdir().unwrap();
        DatasetWriter::new(export(dir.path(), true))
            .write(&table(1, &[60]))
            .unwrap();
        let y_path = dir.path().join("data_Y.bin");
        let mut y = fs::read(&y_path).unwrap();
        y.truncate(y.len() - 2);
        fs::write(&y_path, &y).unwrap();

        let err = DatasetWriter::new(export(dir.path(), false))
            .write(&table(1, &[61]))
            .unwrap_err();
        assert!(matches!(err, WriteError::CorruptPayload { .. }));
    }

    #[test]
    fn test_write_rows_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let columns = vec!["a".to_string(), "b".to_string()];

        let rows = write_rows_csv(&path, &columns, &[1.0, 2.0, 3.0, 4.5]).unwrap();
        assert_eq!(rows, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["a,b", "1.000000,2.000000", "3.000000,4.500000"]);

        let err = write_rows_csv(&path, &columns, &[1.0]).unwrap_err();
        assert!(matches!(err, WriteError::RaggedRows { len: 1, width: 2 }));
    }
}
