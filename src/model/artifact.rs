//! Model artifact inspection.
//!
//! Reads the first bytes of the model file to tell a serialized ONNX graph
//! apart from the usual deployment mistakes: a missing file, an empty file, or
//! a model still packaged inside a zip archive. Zipped exports can be unpacked
//! with `extract_model`.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::utils::error::{NoduleScanError, Result};

/// Number of header bytes captured in a report
const HEADER_LEN: usize = 32;

/// Zip local file header magic
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Entry holding the graph in zipped model exports
pub const ZIPPED_MODEL_ENTRY: &str = "__MODEL_PROTO.onnx";

/// What the header bytes look like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Starts with protobuf field 1 as a varint (`ModelProto.ir_version`)
    Protobuf,
    /// A zip archive; the graph has to be extracted first
    ZipArchive,
    Empty,
    Unknown,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Protobuf => "ONNX protobuf",
            ArtifactKind::ZipArchive => "zip archive",
            ArtifactKind::Empty => "empty file",
            ArtifactKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub header_hex: String,
    pub header_ascii: String,
    pub kind: ArtifactKind,
}

impl ArtifactReport {
    fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: false,
            size_bytes: 0,
            header_hex: String::new(),
            header_ascii: String::new(),
            kind: ArtifactKind::Empty,
        }
    }
}

impl fmt::Display for ArtifactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model path:   {}", self.path.display())?;
        writeln!(f, "File exists:  {}", self.exists)?;
        if self.exists {
            writeln!(f, "Size:         {}", crate::utils::format_bytes(self.size_bytes))?;
            writeln!(f, "Header (hex): {}", self.header_hex)?;
            writeln!(f, "Header (txt): {}", self.header_ascii)?;
            writeln!(f, "Looks like:   {}", self.kind)?;
        }
        Ok(())
    }
}

/// Classify a file header
pub fn classify_header(header: &[u8]) -> ArtifactKind {
    if header.is_empty() {
        ArtifactKind::Empty
    } else if header.starts_with(&ZIP_MAGIC) {
        ArtifactKind::ZipArchive
    } else if header[0] == 0x08 {
        ArtifactKind::Protobuf
    } else {
        ArtifactKind::Unknown
    }
}

/// Inspect a model artifact on disk
pub fn inspect(path: &Path) -> Result<ArtifactReport> {
    if !path.exists() {
        return Ok(ArtifactReport::missing(path));
    }

    let mut file = File::open(path)?;
    let size_bytes = file.metadata()?.len();

    let mut header = Vec::with_capacity(HEADER_LEN);
    file.by_ref().take(HEADER_LEN as u64).read_to_end(&mut header)?;

    let header_hex = header.iter().map(|b| format!("{:02x}", b)).collect();
    let header_ascii = header
        .iter()
        .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '.' })
        .collect();

    Ok(ArtifactReport {
        path: path.to_path_buf(),
        exists: true,
        size_bytes,
        header_hex,
        header_ascii,
        kind: classify_header(&header),
    })
}

/// Reject artifacts that can never load, before handing the file to the runtime.
///
/// `Unknown` headers pass through: protobuf does not mandate field order, so
/// the runtime gets the final word.
pub fn ensure_loadable(report: &ArtifactReport) -> Result<()> {
    if !report.exists {
        return Err(NoduleScanError::model_load(&report.path, "file not found"));
    }
    match report.kind {
        ArtifactKind::Empty => Err(NoduleScanError::model_load(&report.path, "file is empty")),
        ArtifactKind::ZipArchive => Err(NoduleScanError::model_load(
            &report.path,
            "file is a zip archive; run `nodulescan extract-model` on it first",
        )),
        ArtifactKind::Protobuf | ArtifactKind::Unknown => Ok(()),
    }
}

/// Extract `entry` from a zipped model export into `output`.
///
/// Archive and entry problems are `ModelLoad` errors, filesystem failures are
/// `Io`. Returns the report of the extracted file.
pub fn extract_model(archive_path: &Path, entry: &str, output: &Path) -> Result<ArtifactReport> {
    if archive_path == output {
        return Err(NoduleScanError::Config(
            "extraction output must differ from the archive path".into(),
        ));
    }

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| NoduleScanError::model_load(archive_path, e))?;
    let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

    let mut zipped = archive.by_name(entry).map_err(|e| match e {
        ZipError::FileNotFound => NoduleScanError::model_load(
            archive_path,
            format!("archive has no entry '{}' (entries: {:?})", entry, entries),
        ),
        other => NoduleScanError::model_load(archive_path, other),
    })?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut out = File::create(output)?;
    let written = std::io::copy(&mut zipped, &mut out)?;
    drop(out);

    let report = inspect(output)?;
    if report.kind != ArtifactKind::Protobuf {
        warn!(
            output = %output.display(),
            kind = %report.kind,
            "Extracted entry does not look like an ONNX graph"
        );
    }
    info!(
        archive = %archive_path.display(),
        entry,
        output = %output.display(),
        bytes = written,
        "Model extracted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn graph_bytes() -> Vec<u8> {
        let mut bytes = vec![0x08, 0x07, 0x12, 0x07];
        bytes.extend_from_slice(b"pytorch");
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[test]
    fn test_classify_header() {
        assert_eq!(classify_header(&[]), ArtifactKind::Empty);
        assert_eq!(classify_header(&[0x08, 0x07, 0x12]), ArtifactKind::Protobuf);
        assert_eq!(classify_header(b"PK\x03\x04rest"), ArtifactKind::ZipArchive);
        assert_eq!(classify_header(b"hello"), ArtifactKind::Unknown);
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = inspect(&dir.path().join("absent.onnx")).unwrap();
        assert!(!report.exists);

        let err = ensure_loadable(&report).unwrap_err();
        assert!(matches!(err, NoduleScanError::ModelLoad { .. }));
    }

    #[test]
    fn test_inspect_protobuf_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let bytes = graph_bytes();
        std::fs::write(&path, &bytes).unwrap();

        let report = inspect(&path).unwrap();
        assert!(report.exists);
        assert_eq!(report.size_bytes, bytes.len() as u64);
        assert_eq!(report.kind, ArtifactKind::Protobuf);
        assert_eq!(report.header_hex.len(), HEADER_LEN * 2);
        assert!(report.header_hex.starts_with("08071207"));
        assert!(report.header_ascii.contains("pytorch"));
        assert!(ensure_loadable(&report).is_ok());
    }

    #[test]
    fn test_zip_and_empty_are_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let zipped = dir.path().join("model.zip.onnx");
        std::fs::write(&zipped, b"PK\x03\x04__MODEL_PROTO.onnx").unwrap();
        let report = inspect(&zipped).unwrap();
        assert_eq!(report.kind, ArtifactKind::ZipArchive);
        assert!(ensure_loadable(&report).is_err());

        let empty = dir.path().join("empty.onnx");
        std::fs::write(&empty, b"").unwrap();
        let report = inspect(&empty).unwrap();
        assert_eq!(report.kind, ArtifactKind::Empty);
        assert!(ensure_loadable(&report).is_err());
    }

    #[test]
    fn test_extract_zipped_model() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("exported.onnx");
        let graph = graph_bytes();
        write_zip(
            &archive,
            &[("metadata.json", &b"{}"[..]), (ZIPPED_MODEL_ENTRY, graph.as_slice())],
        );
        assert_eq!(inspect(&archive).unwrap().kind, ArtifactKind::ZipArchive);

        let output = dir.path().join("models/nodule_classifier.onnx");
        let report = extract_model(&archive, ZIPPED_MODEL_ENTRY, &output).unwrap();

        assert_eq!(report.kind, ArtifactKind::Protobuf);
        assert_eq!(report.size_bytes, graph.len() as u64);
        assert_eq!(std::fs::read(&output).unwrap(), graph);
        assert!(ensure_loadable(&report).is_ok());
    }

    #[test]
    fn test_extract_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("exported.zip");
        write_zip(&archive, &[("weights.bin", &b"\x00\x01"[..])]);

        let err = extract_model(&archive, ZIPPED_MODEL_ENTRY, &dir.path().join("out.onnx"))
            .unwrap_err();
        match err {
            NoduleScanError::ModelLoad { reason, .. } => {
                assert!(reason.contains(ZIPPED_MODEL_ENTRY));
                assert!(reason.contains("weights.bin"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!dir.path().join("out.onnx").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip_and_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.onnx");

        let plain = dir.path().join("model.onnx");
        std::fs::write(&plain, graph_bytes()).unwrap();
        let err = extract_model(&plain, ZIPPED_MODEL_ENTRY, &output).unwrap_err();
        assert!(matches!(err, NoduleScanError::ModelLoad { .. }));

        let err = extract_model(&dir.path().join("absent.zip"), ZIPPED_MODEL_ENTRY, &output)
            .unwrap_err();
        assert!(matches!(err, NoduleScanError::Io(_)));
    }

    #[test]
    fn test_extract_refuses_to_overwrite_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("exported.onnx");
        write_zip(&archive, &[(ZIPPED_MODEL_ENTRY, graph_bytes().as_slice())]);

        let err = extract_model(&archive, ZIPPED_MODEL_ENTRY, &archive).unwrap_err();
        assert!(matches!(err, NoduleScanError::Config(_)));
        assert_eq!(inspect(&archive).unwrap().kind, ArtifactKind::ZipArchive);
    }
}
