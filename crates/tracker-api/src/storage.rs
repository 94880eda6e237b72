use anyhow::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Longest client filename kept, in bytes. Leaves room for the timestamp
/// prefix under the usual 255-byte component limit.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Extensions longer than this are not preserved when a name is shortened.
const MAX_EXTENSION_BYTES: usize = 16;

/// Same-name uploads within one millisecond get a counter; give up after this many.
const MAX_NAME_ATTEMPTS: u32 = 32;

/// On-disk blob area for uploaded media.
///
/// Each event gets its own directory, `{root}/event_{id}`, and every upload
/// is stored as `{unix_millis}_{original_filename}` inside it, or
/// `{unix_millis}-{n}_{original_filename}` when that name is already taken.
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn event_dir(&self, event_id: i64) -> PathBuf {
        self.dir.join(format!("event_{}", event_id))
    }

    /// Write a blob durably and return its path. Never overwrites an
    /// existing file; a partially written file is removed before returning
    /// the error.
    pub async fn write_blob(&self, event_id: i64, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let dir = self.event_dir(event_id);
        fs::create_dir_all(&dir).await?;

        let millis = chrono::Utc::now().timestamp_millis();
        let (path, mut file) = create_unique(&dir, millis, filename).await?;

        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!("Failed to remove partial blob {}: {}", path.display(), cleanup);
            }
            return Err(e.into());
        }

        Ok(path)
    }

    /// Delete a blob. A file that is already gone is not an error.
    pub async fn delete_blob(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!("Deleted blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Blob {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an event's whole directory. A missing directory is not an error.
    pub async fn remove_event_dir(&self, event_id: i64) -> Result<()> {
        let dir = self.event_dir(event_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create a new file for `filename` in `dir`, adding a counter after the
/// timestamp while the name is taken.
async fn create_unique(dir: &Path, millis: i64, filename: &str) -> Result<(PathBuf, fs::File)> {
    let mut attempt = 0;
    loop {
        let name = if attempt == 0 {
            format!("{}_{}", millis, filename)
        } else {
            format!("{}-{}_{}", millis, attempt, filename)
        };
        let path = dir.join(name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt + 1 < MAX_NAME_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Reduce a client-supplied filename to its last path component, shortened
/// to `MAX_FILENAME_BYTES` with a short extension kept. Returns `None` when
/// nothing usable is left or the name carries control characters.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." || last.chars().any(char::is_control) {
        return None;
    }
    if last.len() <= MAX_FILENAME_BYTES {
        return Some(last.to_string());
    }

    let ext = match last.rfind('.') {
        Some(i) if i > 0 && last.len() - i <= MAX_EXTENSION_BYTES => &last[i..],
        _ => "",
    };
    let mut cut = MAX_FILENAME_BYTES - ext.len();
    while !last.is_char_boundary(cut) {
        cut -= 1;
    }
    Some(format!("{}{}", &last[..cut], ext))
}
