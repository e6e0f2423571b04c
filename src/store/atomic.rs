use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

pub(crate) const TEMP_PREFIX: &str = ".crewdesk.tmp.";

/// Stages `bytes` next to `path` and persists the staged file over it, so a
/// reader sees either the previous document or the new one in full. A staged
/// file that never reaches `path` is removed when it is dropped.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = document_dir(path)?;
    fs::create_dir_all(dir)?;

    let mut staged = Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    sync_dir(dir)
}

fn document_dir(path: &Path) -> io::Result<&Path> {
    match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(dir) => Ok(dir),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("`{}` does not name a document", path.display()),
        )),
    }
}

/// Makes the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
