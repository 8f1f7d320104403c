use crate::diff::results::ChangeSet;
use crate::pkg::download::ProgressObserver;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;

/// Writes `pkgname, <v1>, <v2>` then one `<name>, <before>, <after>` line per change.
pub fn write_report<W: Write>(
    out: &mut W,
    version1: &str,
    version2: &str,
    changes: &ChangeSet,
) -> io::Result<()> {
    writeln!(out, "pkgname, {version1}, {version2}")?;

    for change in changes {
        writeln!(
            out,
            "{}, {}, {}",
            change.name,
            change.before_or_empty(),
            change.after_or_empty()
        )?;
    }

    out.flush()
}

#[derive(Default)]
struct TransferState {
    transferred: u64,
    total: Option<u64>,
}

/// Redraws one stderr status line covering every in-flight download.
#[derive(Default)]
pub struct TermProgress {
    transfers: Mutex<BTreeMap<String, TransferState>>,
}

impl TermProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(transfers: &BTreeMap<String, TransferState>) -> String {
        transfers
            .iter()
            .map(|(file_name, state)| match state.total {
                Some(total) if total > 0 => format!(
                    "{file_name}: {:>10}  [{:>6.2}%]",
                    state.transferred,
                    state.transferred as f64 * 100.0 / total as f64
                ),
                _ => format!("{file_name}: {:>10}  [????]", state.transferred),
            })
            .collect::<Vec<_>>()
            .join("  ")
    }
}

impl ProgressObserver for TermProgress {
    fn on_progress(&self, file_name: &str, transferred: u64, total: Option<u64>) {
        // Skip the frame rather than wait on the other download thread.
        let Ok(mut transfers) = self.transfers.try_lock() else {
            return;
        };

        let state = transfers.entry(file_name.to_string()).or_default();
        state.transferred = transferred;
        state.total = total;

        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r{}\x1b[K", Self::render(&transfers));
        let _ = stderr.flush();
    }

    fn on_finish(&self, file_name: &str) {
        let Ok(mut transfers) = self.transfers.try_lock() else {
            return;
        };

        transfers.remove(file_name);

        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[K{}", Self::render(&transfers));

        if transfers.is_empty() {
            let _ = writeln!(stderr);
        }
    }
}
