//! Imported sound files.
//!
//! Custom sounds are copied into the sounds directory and referenced from
//! alarms as `blob:<file name>`, so an alarm keeps working after the original
//! file is moved. Sounds given as `http(s)` URLs are downloaded into the
//! library the first time they are needed.

use std::{
    collections::hash_map::DefaultHasher,
    ffi::OsStr,
    fmt, fs,
    hash::{Hash, Hasher},
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, info};

pub const BLOB_PREFIX: &str = "blob:";
pub const DEFAULT_MAX_SOUND_BYTES: u64 = 10 * 1024 * 1024;
const DOWNLOADS: &str = "downloads";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("roosty_scheduler/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("couldn't access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} is {size} bytes, sounds are limited to {max} bytes")]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("sound {0:?} not found")]
    NotFound(String),
    #[error("there already is a sound called {0}, pick another name")]
    Exists(String),
    #[error("couldn't download {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("{url} is larger than {max} bytes")]
    RemoteTooLarge { url: String, max: u64 },
    #[error("invalid sound name {0:?}")]
    InvalidName(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LibraryError + '_ {
    move |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSound {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl StoredSound {
    /// the locator alarms use to refer to this sound
    #[must_use]
    pub fn locator(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(OsStr::to_string_lossy)
            .unwrap_or_default();
        format!("{BLOB_PREFIX}{file_name}")
    }
}

impl fmt::Display for StoredSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} bytes)", self.name, self.locator(), self.size)
    }
}

/// Downloads remote sounds.
pub trait Fetch: Send + Sync {
    /// The body at `url`, refusing anything over `limit` bytes.
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, LibraryError>;
}

/// Plain blocking HTTP GET.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, LibraryError> {
        let failed = |e: reqwest::Error| LibraryError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(failed)?
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(failed)?;
        if response.content_length().is_some_and(|size| size > limit) {
            return Err(LibraryError::RemoteTooLarge {
                url: url.to_string(),
                max: limit,
            });
        }
        read_limited(response, url, limit)
    }
}

/// Reads `body` to the end unless it holds more than `limit` bytes.
fn read_limited(body: impl Read, url: &str, limit: u64) -> Result<Vec<u8>, LibraryError> {
    let mut bytes = Vec::new();
    body.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| LibraryError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    if u64::try_from(bytes.len()).map_or(true, |len| len > limit) {
        return Err(LibraryError::RemoteTooLarge {
            url: url.to_string(),
            max: limit,
        });
    }
    Ok(bytes)
}

#[derive(Clone)]
pub struct SoundLibrary {
    root: PathBuf,
    max_bytes: u64,
    fetcher: Arc<dyn Fetch>,
}

impl fmt::Debug for SoundLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundLibrary")
            .field("root", &self.root)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl SoundLibrary {
    #[must_use]
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        Self {
            root,
            max_bytes,
            fetcher: Arc::new(HttpFetcher),
        }
    }

    /// Downloads remote sounds through `fetcher` instead of plain HTTP.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies `source` into the library under `name`, keeping its extension.
    pub fn import(&self, name: &str, source: &Path) -> Result<StoredSound, LibraryError> {
        let size = fs::metadata(source).map_err(io_error(source))?.len();
        if size > self.max_bytes {
            return Err(LibraryError::TooLarge {
                path: source.to_path_buf(),
                size,
                max: self.max_bytes,
            });
        }
        let stem = sanitize(name).ok_or_else(|| LibraryError::InvalidName(name.to_string()))?;
        let file_name = match source.extension().and_then(OsStr::to_str) {
            Some(extension) => format!("{stem}.{extension}"),
            None => stem,
        };
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let path = self.root.join(&file_name);
        if path.exists() {
            return Err(LibraryError::Exists(format!("{BLOB_PREFIX}{file_name}")));
        }
        fs::copy(source, &path).map_err(io_error(&path))?;
        info!("imported {} as {}", source.display(), path.display());
        Ok(StoredSound {
            name: name.to_string(),
            path,
            size,
        })
    }

    /// Every sound in the library, by name. A missing directory is an empty library.
    pub fn list(&self) -> Result<Vec<StoredSound>, LibraryError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error(&self.root)(e)),
        };
        let mut sounds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.root))?;
            let metadata = entry.metadata().map_err(io_error(&entry.path()))?;
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            sounds.push(StoredSound {
                name,
                path,
                size: metadata.len(),
            });
        }
        sounds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sounds)
    }

    pub fn remove(&self, locator: &str) -> Result<(), LibraryError> {
        let path = self.resolve(locator)?;
        if !path.starts_with(&self.root) {
            return Err(LibraryError::NotFound(locator.to_string()));
        }
        fs::remove_file(&path).map_err(io_error(&path))?;
        debug!("removed {}", path.display());
        Ok(())
    }

    /// Turns an alarm's locator into a file that can be decoded.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, LibraryError> {
        let locator = locator.trim();
        let path = if let Some(id) = locator.strip_prefix(BLOB_PREFIX) {
            if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
                return Err(LibraryError::NotFound(locator.to_string()));
            }
            self.root.join(id)
        } else if locator.starts_with("http://") || locator.starts_with("https://") {
            return self.download(locator);
        } else if let Some(path) = locator.strip_prefix("file://") {
            PathBuf::from(path)
        } else if locator.is_empty() {
            return Err(LibraryError::NotFound(locator.to_string()));
        } else {
            PathBuf::from(locator)
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(LibraryError::NotFound(locator.to_string()))
        }
    }

    /// The local copy of `url`, fetched the first time it is asked for.
    fn download(&self, url: &str) -> Result<PathBuf, LibraryError> {
        let dir = self.root.join(DOWNLOADS);
        let path = dir.join(download_name(url));
        if path.is_file() {
            return Ok(path);
        }
        let bytes = self.fetcher.fetch(url, self.max_bytes)?;
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        fs::write(&path, bytes).map_err(io_error(&path))?;
        info!("downloaded {url} to {}", path.display());
        Ok(path)
    }
}

/// A file name unique to `url` that keeps the extension decoders look at.
fn download_name(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query.rsplit('/').next().unwrap_or_default();
    let stem: String = sanitize(last_segment.split('.').next().unwrap_or_default())
        .unwrap_or_else(|| "download".to_string())
        .chars()
        .take(32)
        .collect();
    let name = format!("{stem}-{:016x}", hasher.finish());
    match last_segment.rsplit_once('.') {
        Some((_, extension))
            if !extension.is_empty() && extension.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{name}.{extension}")
        }
        _ => name,
    }
}

/// Lower case file stem made of letters, digits, `-` and `_`.
fn sanitize(name: &str) -> Option<String> {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('_').to_string();
    (!stem.is_empty()).then_some(stem)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Serves the same body for every URL and counts requests.
    #[derive(Default)]
    struct Canned {
        body: Vec<u8>,
        requests: AtomicUsize,
    }

    impl Fetch for Canned {
        fn fetch(&self, url: &str, limit: u64) -> Result<Vec<u8>, LibraryError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            read_limited(self.body.as_slice(), url, limit)
        }
    }

    struct Offline;

    impl Fetch for Offline {
        fn fetch(&self, url: &str, _limit: u64) -> Result<Vec<u8>, LibraryError> {
            Err(LibraryError::Fetch {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn library(dir: &tempfile::TempDir, max: u64) -> SoundLibrary {
        SoundLibrary::new(dir.path().join("sounds"), max)
    }

    fn write(dir: &tempfile::TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, vec![0_u8; bytes]).unwrap();
        path
    }

    #[test]
    fn import_then_resolve_blob() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, 1024);
        let source = write(&dir, "Rooster Call.mp3", 100);
        let stored = library.import("Rooster Call", &source).unwrap();
        assert_eq!(stored.locator(), "blob:rooster_call.mp3");
        assert_eq!(library.resolve(&stored.locator()).unwrap(), stored.path);
        assert_eq!(library.list().unwrap(), vec![StoredSound {
            name: "rooster_call".to_string(),
            ..stored.clone()
        }]);
        library.remove(&stored.locator()).unwrap();
        assert!(library.list().unwrap().is_empty());
    }

    #[test]
    fn rejects_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(&dir, "big.wav", 2048);
        assert!(matches!(
            library(&dir, 1024).import("big", &source),
            Err(LibraryError::TooLarge { size: 2048, .. })
        ));
    }

    #[test]
    fn taken_names_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, 1024);
        let first = write(&dir, "first.mp3", 10);
        let second = write(&dir, "second.mp3", 20);
        let stored = library.import("Rooster", &first).unwrap();
        assert!(matches!(
            library.import("rooster", &second),
            Err(LibraryError::Exists(locator)) if locator == "blob:rooster.mp3"
        ));
        assert_eq!(fs::metadata(&stored.path).unwrap().len(), 10);
        assert_eq!(library.list().unwrap().len(), 1);
    }

    #[test]
    fn remote_sounds_are_downloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(Canned {
            body: vec![7; 32],
            ..Canned::default()
        });
        let library = library(&dir, 1024).with_fetcher(fetcher.clone());
        let url = "https://example.com/sounds/bell.mp3?v=2";

        let path = library.resolve(url).unwrap();
        assert!(path.starts_with(dir.path().join("sounds").join(DOWNLOADS)));
        assert_eq!(path.extension().and_then(OsStr::to_str), Some("mp3"));
        assert_eq!(fs::read(&path).unwrap(), vec![7; 32]);
        assert_eq!(library.resolve(url).unwrap(), path);
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 1);
        assert!(library.list().unwrap().is_empty(), "downloads aren't imported sounds");
    }

    #[test]
    fn remote_sounds_respect_the_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, 16).with_fetcher(Arc::new(Canned {
            body: vec![0; 17],
            ..Canned::default()
        }));
        assert!(matches!(
            library.resolve("http://example.com/long.ogg"),
            Err(LibraryError::RemoteTooLarge { max: 16, .. })
        ));
        assert!(!dir.path().join("sounds").join(DOWNLOADS).exists());
        assert_eq!(read_limited(&[1_u8; 16][..], "x", 16).unwrap().len(), 16);
    }

    #[test]
    fn failed_downloads_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, 1024).with_fetcher(Arc::new(Offline));
        assert!(matches!(
            library.resolve("https://example.com/bell.mp3"),
            Err(LibraryError::Fetch { .. })
        ));
    }

    #[test]
    fn download_names_differ_per_url() {
        let a = download_name("https://a.example/bell.mp3");
        let b = download_name("https://b.example/bell.mp3");
        assert_ne!(a, b);
        assert!(a.starts_with("bell-") && a.ends_with(".mp3"));
        assert!(download_name("https://example.com/").starts_with("download-"));
    }

    #[test]
    fn resolves_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, 1024);
        let local = write(&dir, "bell.ogg", 10);
        assert_eq!(library.resolve(local.to_str().unwrap()).unwrap(), local);
        let url = format!("file://{}", local.display());
        assert_eq!(library.resolve(&url).unwrap(), local);
        assert!(matches!(
            library.resolve("blob:../bell.ogg"),
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(
            library.resolve("blob:missing.mp3"),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(library(&dir, 1).list().unwrap().is_empty());
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize(" Wake Up! ").as_deref(), Some("wake_up"));
        assert_eq!(sanitize("???"), None);
    }
}
