use crate::error::FrameParseError;
use crate::frame_reader::FrameReader;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions recognised as serial captures when scanning a directory
pub const CAPTURE_EXTENSIONS: [&str; 3] = ["txt", "log", "ecg"];

fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            CAPTURE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Resolve the capture files behind `input`: the file itself, or every capture under a
/// directory sorted by path.
pub fn collect_capture_files(input: &Path) -> io::Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && is_capture_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Open `input` as one continuous byte stream. `-` reads stdin.
pub fn open_capture(input: &Path) -> io::Result<Box<dyn Read>> {
    if input == Path::new("-") {
        return Ok(Box::new(io::stdin()));
    }

    let files = collect_capture_files(input)?;
    if files.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no capture files under {}", input.display()),
        ));
    }

    let mut stream: Box<dyn Read> = Box::new(io::empty());
    for path in files {
        log::info!("Loading capture: {}", path.display());
        let file = File::open(&path)?;
        stream = Box::new(stream.chain(BufReader::new(file)));
    }
    Ok(stream)
}

/// Line counts for one capture file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CaptureStats {
    pub frames: usize,
    /// Discarded lines keyed by reason
    pub rejected: BTreeMap<&'static str, usize>,
    /// Bytes after the last newline
    pub trailing_bytes: usize,
}

impl CaptureStats {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

fn rejection_reason(error: &FrameParseError) -> &'static str {
    match error {
        FrameParseError::EmptyLine => "empty line",
        FrameParseError::NotAscii => "non-ascii",
        FrameParseError::FieldCount { .. } => "field count",
        FrameParseError::EmptyField { .. } => "empty field",
        FrameParseError::InvalidField { .. } => "invalid field",
    }
}

/// Count well-formed and rejected lines in a byte stream.
pub fn scan_capture<R: Read>(mut source: R) -> io::Result<CaptureStats> {
    let mut reader = FrameReader::new();
    let mut stats = CaptureStats::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        reader.extend(&chunk[..n]);
        while let Some(result) = reader.next_frame() {
            match result {
                Ok(_) => stats.frames += 1,
                Err(e) => *stats.rejected.entry(rejection_reason(&e)).or_insert(0) += 1,
            }
        }
    }

    stats.trailing_bytes = reader.pending();
    Ok(stats)
}

pub fn scan_capture_file(path: &Path) -> Result<CaptureStats> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    scan_capture(BufReader::new(file))
        .with_context(|| format!("Failed to read file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINE: &str = "1;2;3;4;5;6;7;8;9;10;11;12\n";

    #[test]
    fn test_scan_counts_frames_and_rejections() {
        let input = format!("{}{}1;2\n\n{}1;2;x;4;5;6;7;8;9;10;11;12\n3;4", LINE, LINE, LINE);
        let stats = scan_capture(input.as_bytes()).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.rejected.get("field count"), Some(&1));
        assert_eq!(stats.rejected.get("empty line"), Some(&1));
        assert_eq!(stats.rejected.get("invalid field"), Some(&1));
        assert_eq!(stats.rejected_total(), 3);
        assert_eq!(stats.trailing_bytes, 3);
    }

    #[test]
    fn test_directory_captures_are_sorted_and_chained() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("session");
        std::fs::create_dir(&nested).unwrap();

        let mut b = File::create(nested.join("b.txt")).unwrap();
        write!(b, "{}", "2;2;2;2;2;2;2;2;2;2;2;2\n").unwrap();
        let mut a = File::create(dir.path().join("a.log")).unwrap();
        write!(a, "{}", LINE).unwrap();
        File::create(dir.path().join("notes.md")).unwrap();

        let files = collect_capture_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.log"));

        let mut text = String::new();
        open_capture(dir.path())
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, format!("{}2;2;2;2;2;2;2;2;2;2;2;2\n", LINE));
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_capture(dir.path()).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let err = open_capture(Path::new("/nonexistent/capture.txt")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
