use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Create `dir` (and parents) when absent.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Atomically claim a fresh file named `<stem>.<ext>` in `dir`, falling back to
/// `<stem>-1.<ext>`, `<stem>-2.<ext>`, ... when the name is already taken.
pub fn claim_unique_file(dir: &Path, stem: &str, ext: &str) -> io::Result<PathBuf> {
    for n in 0u32..1000 {
        let name = if n == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}-{n}.{ext}")
        };
        let candidate = dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {stem}.{ext} in {}", dir.display()),
    ))
}
