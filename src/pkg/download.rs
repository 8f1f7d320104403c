use crate::pkg::error::PkgDiffError;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const BLOCK_SIZE: usize = 8192;

/// Receives transfer counters as chunks land. Must not block.
pub trait ProgressObserver: Sync {
    fn on_progress(&self, file_name: &str, transferred: u64, total: Option<u64>);

    fn on_finish(&self, _file_name: &str) {}
}

/// Per-run knobs a fetch honours: a cancellation flag and an optional observer.
#[derive(Clone, Copy)]
pub struct TransferContext<'a> {
    pub cancel: &'a AtomicBool,
    pub observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> TransferContext<'a> {
    pub fn new(cancel: &'a AtomicBool) -> Self {
        TransferContext {
            cancel,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Retrieves the bytes behind `url` into the file at `dest`.
pub trait Fetch: Sync {
    fn fetch(&self, url: &Url, dest: &Path, ctx: &TransferContext) -> Result<u64, PkgDiffError>;
}

#[derive(Debug)]
pub enum CopyError {
    Read(std::io::Error),
    Write(std::io::Error),
    Truncated { received: u64, expected: u64 },
    Cancelled,
}

/// Streams `reader` into `writer` in [`BLOCK_SIZE`] chunks, calling `on_chunk`
/// with the running total.
pub fn copy_chunks<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    cancel: &AtomicBool,
    mut on_chunk: F,
) -> Result<u64, CopyError>
where
    R: Read,
    W: Write,
    F: FnMut(u64),
{
    let mut buffer = [0u8; BLOCK_SIZE];
    let mut transferred: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(CopyError::Cancelled);
        }

        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(error) => {
                // A body cut short surfaces as a read error from the transport.
                if let Some(expected) = total.filter(|expected| transferred < *expected) {
                    return Err(CopyError::Truncated {
                        received: transferred,
                        expected,
                    });
                }

                return Err(CopyError::Read(error));
            }
        };

        writer.write_all(&buffer[..read]).map_err(CopyError::Write)?;
        transferred += read as u64;
        on_chunk(transferred);
    }

    writer.flush().map_err(CopyError::Write)?;

    if let Some(expected) = total.filter(|expected| transferred < *expected) {
        return Err(CopyError::Truncated {
            received: transferred,
            expected,
        });
    }

    Ok(transferred)
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PkgDiffError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| {
                PkgDiffError::Config(format!("Could not build HTTP client: {error}"))
            })?;

        Ok(HttpFetcher { client })
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        HttpFetcher { client }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url, dest: &Path, ctx: &TransferContext) -> Result<u64, PkgDiffError> {
        let network_error = |reason: String| PkgDiffError::Network {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|error| network_error(error.to_string()))?;

        let total = response.content_length();
        let file_name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());

        info!(file = %file_name, bytes = ?total, "Downloading");
        debug!(status = %response.status(), "Response headers received");

        let file = File::create(dest).map_err(|error| PkgDiffError::file_access(dest, error))?;
        let mut writer = BufWriter::new(file);

        let transferred = copy_chunks(&mut response, &mut writer, total, ctx.cancel, |sent| {
            if let Some(observer) = ctx.observer {
                observer.on_progress(&file_name, sent, total);
            }
        });

        if let Some(observer) = ctx.observer {
            observer.on_finish(&file_name);
        }

        match transferred {
            Ok(transferred) => {
                debug!(file = %file_name, transferred, "Download complete");
                Ok(transferred)
            }
            Err(CopyError::Read(error)) => Err(network_error(error.to_string())),
            Err(CopyError::Write(error)) => Err(PkgDiffError::file_access(dest, error)),
            Err(CopyError::Truncated { received, expected }) => {
                Err(PkgDiffError::IncompleteTransfer {
                    url: url.to_string(),
                    received,
                    expected,
                })
            }
            Err(CopyError::Cancelled) => Err(PkgDiffError::Cancelled),
        }
    }
}
