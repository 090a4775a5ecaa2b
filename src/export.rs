use chrono::{DateTime, Utc};
use log::info;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ScopeError;

pub const CSV_HEADER: [&str; 2] = ["Time (s)", "Voltage (V)"];

/// Write a time/voltage series as a two-column CSV file.
///
/// Parent directories are created as needed and an existing file is
/// replaced. Floats are written in their shortest round-trip form, so the
/// same series always produces the same bytes.
pub fn to_csv(path: &Path, time: &[f64], voltage: &[f64]) -> Result<(), ScopeError> {
    check_lengths(time, voltage)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ScopeError::Io {
            source,
            context: format!("Could not create directory {}", parent.display()),
        })?;
    }

    let file = fs::File::create(path).map_err(|source| ScopeError::Io {
        source,
        context: format!("Could not create CSV file {}", path.display()),
    })?;

    write_csv(BufWriter::new(file), time, voltage)?;
    info!("Results saved to {} ({} rows)", path.display(), time.len());
    Ok(())
}

/// Write the CSV header and rows to any writer
pub fn write_csv<W: Write>(writer: W, time: &[f64], voltage: &[f64]) -> Result<(), ScopeError> {
    check_lengths(time, voltage)?;

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    writer.write_record(CSV_HEADER)?;
    for (t, v) in time.iter().zip(voltage) {
        writer.write_record([t.to_string(), v.to_string()])?;
    }
    writer.flush().map_err(|source| ScopeError::Io {
        source,
        context: "Flushing CSV output".to_string(),
    })?;
    Ok(())
}

/// Insert a `_YYYYmmdd_HHMMSS` suffix before the file extension
pub fn timestamped_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "measurement".to_string());
    let mut name = format!("{stem}_{}", at.format("%Y%m%d_%H%M%S"));
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

fn check_lengths(time: &[f64], voltage: &[f64]) -> Result<(), ScopeError> {
    if time.len() != voltage.len() {
        return Err(ScopeError::InvalidValue(format!(
            "Time and voltage series differ in length ({} vs {})",
            time.len(),
            voltage.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_csv_layout() {
        let mut out = Vec::new();
        write_csv(&mut out, &[0.0, 0.025, 0.05], &[0.5, -1.0, 1e-7]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Time (s),Voltage (V)");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "0,0.5");
        assert_eq!(lines[2], "0.025,-1");
    }

    #[test]
    fn test_export_creates_parents_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run").join("out.csv");
        let time = crate::types::linspace(0.0, 0.05, 500);
        let voltage: Vec<f64> = time.iter().map(|t| (t * 1000.0).sin()).collect();

        to_csv(&path, &time, &voltage).unwrap();
        let first = fs::read(&path).unwrap();
        to_csv(&path, &time, &voltage).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap().lines().count(), 501);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert!(matches!(
            to_csv(&path, &[0.0, 1.0], &[0.0]),
            Err(ScopeError::InvalidValue(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // A regular file cannot act as a directory
        let path = blocker.join("out.csv");
        assert!(matches!(
            to_csv(&path, &[0.0], &[0.0]),
            Err(ScopeError::Io { .. })
        ));
    }

    #[test]
    fn test_timestamped_path() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let path = timestamped_path(Path::new("data/measurement_results.csv"), at);
        assert_eq!(
            path,
            PathBuf::from("data/measurement_results_20240305_140709.csv")
        );
    }
}
