//! File helpers shared by the readers and the batch persistence layer.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a text file for buffered line reading, transparently decompressing
/// gzip and BGZF input.
///
/// Compression is detected from the magic bytes rather than the extension.
/// BGZF files are a series of gzip members, so a multi-member decoder is used.
///
/// # Errors
///
/// Returns any IO error from opening or peeking the file.
pub fn open_text(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut reader = BufReader::with_capacity(1 << 20, File::open(path)?);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            1 << 20,
            MultiGzDecoder::new(reader),
        )))
    } else {
        Ok(Box::new(reader))
    }
}

/// Read the whole of a possibly-compressed text file into memory
///
/// # Errors
///
/// Returns any IO error, including invalid UTF-8.
pub fn read_text(path: &Path) -> io::Result<String> {
    let mut content = String::new();
    open_text(path)?.read_to_string(&mut content)?;
    Ok(content)
}

/// Write `path` atomically: the content goes to a temporary file in the same
/// directory, is flushed and fsynced, then renamed over the destination.
///
/// A reader never observes a partially written file, and a crash mid-write
/// leaves any previous version of `path` intact.
///
/// # Errors
///
/// Returns any IO error from writing, syncing, or renaming.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Make the rename itself durable
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_open_text_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("plain.tsv");
        std::fs::write(&plain, "a\tb\n").unwrap();
        assert_eq!(read_text(&plain).unwrap(), "a\tb\n");

        // Two gzip members back to back, as in BGZF
        let gz = dir.path().join("multi.tsv.bgz");
        let mut bytes = Vec::new();
        for chunk in ["line1\n", "line2\n"] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(chunk.as_bytes()).unwrap();
            bytes.extend(enc.finish().unwrap());
        }
        std::fs::write(&gz, bytes).unwrap();
        assert_eq!(read_text(&gz).unwrap(), "line1\nline2\n");
    }

    #[test]
    fn test_write_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");

        write_atomically(&path, |w| w.write_all(b"1\n")).unwrap();
        write_atomically(&path, |w| w.write_all(b"2\n")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2\n");

        // No stray temp files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_write_atomically_failure_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.tsv");
        std::fs::write(&path, "old").unwrap();

        let result = write_atomically(&path, |w| {
            w.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
    }
}
