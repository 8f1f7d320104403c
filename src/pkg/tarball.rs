use crate::pkg::error::PkgDiffError;
use flate2::bufread::GzDecoder;
use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use tar::Archive;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Unpacks the tar (optionally gzipped) archive at `archive_path` into `dest`.
///
/// Entries keep their relative paths; anything that would land outside `dest`
/// is skipped by `tar`. Returns the number of entries unpacked.
pub fn unpack(
    archive_path: &Path,
    dest: &Path,
    cancel: &AtomicBool,
) -> Result<usize, PkgDiffError> {
    let file = open_archive(archive_path)?;
    let mut reader = BufReader::new(file);

    let is_gzip = reader
        .fill_buf()
        .map_err(|error| PkgDiffError::file_access(archive_path, error))?
        .starts_with(&GZIP_MAGIC);

    debug!(archive = %archive_path.display(), is_gzip, "Opening archive");

    let count = if is_gzip {
        unpack_entries(GzDecoder::new(reader), archive_path, dest, cancel)?
    } else {
        unpack_entries(reader, archive_path, dest, cancel)?
    };

    info!(archive = %archive_path.display(), entries = count, "Archive unpacked");

    Ok(count)
}

fn open_archive(archive_path: &Path) -> Result<File, PkgDiffError> {
    let metadata = fs::metadata(archive_path)
        .map_err(|error| PkgDiffError::file_access(archive_path, error))?;

    if !metadata.is_file() {
        return Err(PkgDiffError::file_access(
            archive_path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    File::open(archive_path).map_err(|error| PkgDiffError::file_access(archive_path, error))
}

/// Records how the archive stream ended, so unpack failures can be pinned on
/// the archive or on the destination.
#[derive(Default)]
struct SourceState {
    eof: Cell<bool>,
    failed: Cell<bool>,
}

struct TrackedSource<R> {
    inner: R,
    state: Rc<SourceState>,
}

impl<R: Read> Read for TrackedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.state.eof.set(true);
                Ok(0)
            }
            Ok(read) => Ok(read),
            Err(error) => {
                if error.kind() != io::ErrorKind::Interrupted {
                    self.state.failed.set(true);
                }
                Err(error)
            }
        }
    }
}

fn unpack_entries<R: Read>(
    reader: R,
    archive_path: &Path,
    dest: &Path,
    cancel: &AtomicBool,
) -> Result<usize, PkgDiffError> {
    let malformed = |error: io::Error| PkgDiffError::Extraction {
        path: archive_path.to_path_buf(),
        reason: error.to_string(),
    };

    let state = Rc::new(SourceState::default());
    let mut archive = Archive::new(TrackedSource {
        inner: reader,
        state: Rc::clone(&state),
    });
    let mut count = 0;

    for entry in archive.entries().map_err(malformed)? {
        if cancel.load(Ordering::Relaxed) {
            return Err(PkgDiffError::Cancelled);
        }

        let mut entry = entry.map_err(malformed)?;

        entry.unpack_in(dest).map_err(|error| {
            if state.eof.get() || state.failed.get() || is_decode_error(&error) {
                malformed(error)
            } else {
                PkgDiffError::file_access(dest, error)
            }
        })?;

        count += 1;
    }

    // `tar` only stops early on an end-of-archive block; hitting EOF first means the tail is gone.
    if state.eof.get() {
        return Err(malformed(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "archive ends without an end-of-archive marker",
        )));
    }

    // Reading to the end makes the gzip decoder verify its CRC and length trailer.
    io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(malformed)?;

    Ok(count)
}

fn is_decode_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other
    )
}
