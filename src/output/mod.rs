pub mod json;
pub mod tsv;

use std::io::Write;

use crate::cli::OutputFormat;
use crate::error::SnapError;
use crate::state::Snapshot;

/// Write one snapshot in the requested format. `host_name` maps a remote
/// address to a display name (TSV only).
pub fn write_snapshot(
    snapshot: &Snapshot,
    format: OutputFormat,
    host_name: &dyn Fn(&str) -> String,
    writer: &mut impl Write,
) -> Result<(), SnapError> {
    match format {
        OutputFormat::Tsv => tsv::write_tsv(snapshot, host_name, writer),
        OutputFormat::Json => json::write_json(snapshot, writer),
    }
}
