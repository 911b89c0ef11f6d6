// src/fetcher.rs

//! Tarball download, verification and extraction
//!
//! A package tarball is streamed into a temporary file inside the install
//! root, checked against the registry's integrity string, and unpacked into
//! a staging directory next to it. The archive must contain exactly one
//! top-level directory (npm uses `package/`); that directory is handed back
//! as an `ExtractedRoot` for the installer to move into place.
//!
//! The temporary archive never outlives `fetch`, whatever the outcome.

use crate::error::{Error, Result};
use crate::registry::ResolvedPackage;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256, Sha512};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Timeout for a whole tarball download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Moves tarball bytes from a URL into a writer
pub trait Transport {
    /// Write the body at `url` into `dest`, returning the byte count
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Reads `file://` URLs from local disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| Error::Download(format!("Not a file:// URL: {}", url)))?;

        let mut file = File::open(path)
            .map_err(|e| Error::Download(format!("Failed to open {}: {}", path, e)))?;
        io::copy(&mut file, dest).map_err(|e| Error::Download(format!("Failed to read {}: {}", path, e)))
    }
}

/// HTTP(S) transport
///
/// `file://` URLs are handed to [`FileTransport`], so registries that point
/// tarballs at local disk work without a separate client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        if url.starts_with("file://") {
            return FileTransport.download(url, dest);
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Download(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .copy_to(dest)
            .map_err(|e| Error::Download(format!("Failed to write downloaded data: {}", e)))
    }
}

/// Parsed subresource integrity value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    Sha256(Vec<u8>),
    Sha512(Vec<u8>),
}

impl Integrity {
    /// Pick the strongest supported hash from an SRI string
    ///
    /// Returns `None` when no entry uses sha256 or sha512 (npm's old sha1
    /// entries, for instance).
    pub fn parse(sri: &str) -> Option<Self> {
        let mut best = None;
        for token in sri.split_whitespace() {
            let Some((algorithm, digest)) = token.split_once('-') else {
                continue;
            };
            // Options after '?' are reserved by the SRI format
            let digest = digest.split('?').next().unwrap_or(digest);
            let Ok(bytes) = BASE64.decode(digest) else {
                continue;
            };
            match algorithm {
                "sha512" => return Some(Self::Sha512(bytes)),
                "sha256" => best = Some(Self::Sha256(bytes)),
                _ => {}
            }
        }
        best
    }

    fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha256(_) => "sha256",
            Self::Sha512(_) => "sha512",
        }
    }

    fn expected(&self) -> &[u8] {
        match self {
            Self::Sha256(bytes) | Self::Sha512(bytes) => bytes,
        }
    }

    /// Hash `path` and compare against the expected digest
    pub fn verify(&self, path: &Path) -> Result<()> {
        debug!("Verifying {} integrity for {}", self.algorithm(), path.display());

        let mut file = File::open(path)?;
        let actual = match self {
            Self::Sha256(_) => {
                let mut hasher = Sha256::new();
                io::copy(&mut file, &mut hasher)?;
                hasher.finalize().to_vec()
            }
            Self::Sha512(_) => {
                let mut hasher = Sha512::new();
                io::copy(&mut file, &mut hasher)?;
                hasher.finalize().to_vec()
            }
        };

        if actual != self.expected() {
            return Err(Error::ChecksumMismatch {
                expected: format!("{}-{}", self.algorithm(), BASE64.encode(self.expected())),
                actual: format!("{}-{}", self.algorithm(), BASE64.encode(&actual)),
            });
        }

        Ok(())
    }
}

/// Unpacked package waiting to be moved into place
///
/// Owns the staging directory it was extracted into; dropping it removes
/// whatever has not been relocated.
#[derive(Debug)]
pub struct ExtractedRoot {
    root: PathBuf,
    _staging: TempDir,
}

impl ExtractedRoot {
    /// Wrap a staging directory that holds exactly one top-level directory
    pub fn from_staging(staging: TempDir) -> Result<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(staging.path())? {
            entries.push(entry?);
        }

        if entries.len() != 1 {
            return Err(Error::Extraction(format!(
                "expected a single top-level directory, found {} entries",
                entries.len()
            )));
        }

        let entry = entries.remove(0);
        if !entry.file_type()?.is_dir() {
            return Err(Error::Extraction(format!(
                "top-level entry {} is not a directory",
                entry.file_name().to_string_lossy()
            )));
        }

        Ok(Self {
            root: entry.path(),
            _staging: staging,
        })
    }

    /// Current location of the package contents
    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Produces an extracted package for a resolved descriptor
pub trait ArchiveFetcher {
    fn fetch(&self, package: &ResolvedPackage) -> Result<ExtractedRoot>;
}

impl<T: ArchiveFetcher + ?Sized> ArchiveFetcher for &T {
    fn fetch(&self, package: &ResolvedPackage) -> Result<ExtractedRoot> {
        (**self).fetch(package)
    }
}

/// File-name-safe form of a package name (`@scope/pkg` -> `%40scope%2Fpkg`)
pub fn tarball_stem(name: &str) -> String {
    name.replace('@', "%40").replace('/', "%2F")
}

/// Fetches gzipped npm tarballs into a work directory
pub struct TarballFetcher<T> {
    work_dir: PathBuf,
    transport: T,
}

impl<T: Transport> TarballFetcher<T> {
    /// `work_dir` should be on the same filesystem as the install root so the
    /// final move is a rename
    pub fn new(work_dir: impl Into<PathBuf>, transport: T) -> Self {
        Self {
            work_dir: work_dir.into(),
            transport,
        }
    }

    fn unpack(&self, archive_path: &Path) -> Result<ExtractedRoot> {
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.work_dir)?;

        let file = File::open(archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive
            .unpack(staging.path())
            .map_err(|e| Error::Extraction(format!("{}: {}", archive_path.display(), e)))?;

        ExtractedRoot::from_staging(staging)
    }
}

impl<T: Transport> ArchiveFetcher for TarballFetcher<T> {
    fn fetch(&self, package: &ResolvedPackage) -> Result<ExtractedRoot> {
        fs::create_dir_all(&self.work_dir)?;

        let mut archive = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", tarball_stem(&package.name), package.version))
            .suffix(".tgz")
            .tempfile_in(&self.work_dir)?;

        info!("Downloading {} from {}", package.id(), package.dist.tarball);
        let bytes = self
            .transport
            .download(&package.dist.tarball, archive.as_file_mut())?;
        archive.as_file_mut().flush()?;
        debug!("Downloaded {} bytes to {}", bytes, archive.path().display());

        match package.dist.integrity.as_deref().map(|sri| (sri, Integrity::parse(sri))) {
            Some((_, Some(integrity))) => integrity.verify(archive.path())?,
            Some((sri, None)) => warn!("Unsupported integrity '{}' for {}, not verified", sri, package.id()),
            None => debug!("No integrity for {}, not verified", package.id()),
        }

        debug!("Extracting {} into {}", archive.path().display(), self.work_dir.display());
        let extracted = self.unpack(archive.path());

        if let Err(e) = archive.close() {
            warn!("Failed to remove temporary archive for {}: {}", package.id(), e);
        }

        extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DependencySpec, Dist};
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a gzipped tarball from `(path, contents)` pairs
    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn sri(data: &[u8]) -> String {
        format!("sha512-{}", BASE64.encode(Sha512::digest(data)))
    }

    fn package(tarball: String, integrity: Option<String>) -> ResolvedPackage {
        ResolvedPackage {
            name: "@demo/pkg".to_string(),
            version: "1.0.0".to_string(),
            dependencies: DependencySpec::new(),
            dist: Dist {
                tarball,
                integrity,
                shasum: None,
            },
        }
    }

    /// Serves fixed bytes, or fails like a dropped connection
    struct StaticTransport(Option<Vec<u8>>);

    impl Transport for StaticTransport {
        fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
            match &self.0 {
                Some(bytes) => {
                    dest.write_all(bytes)?;
                    Ok(bytes.len() as u64)
                }
                None => {
                    dest.write_all(b"partial")?;
                    Err(Error::Download(format!("connection reset fetching {}", url)))
                }
            }
        }
    }

    fn leftover_archives(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".tgz"))
            .collect()
    }

    #[test]
    fn test_fetch_extracts_single_root() {
        let work = tempfile::tempdir().unwrap();
        let data = tarball(&[
            ("package/package.json", r#"{"name":"@demo/pkg"}"#),
            ("package/index.js", "module.exports = 13;"),
        ]);
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(Some(data.clone())));

        let extracted = fetcher
            .fetch(&package("https://example.com/pkg.tgz".into(), Some(sri(&data))))
            .unwrap();

        assert_eq!(extracted.path().file_name().unwrap(), "package");
        assert!(extracted.path().join("index.js").exists());
        assert!(leftover_archives(work.path()).is_empty());

        let staging = extracted.path().parent().unwrap().to_path_buf();
        drop(extracted);
        assert!(!staging.exists(), "staging directory is removed on drop");
    }

    #[test]
    fn test_download_failure_removes_archive() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(None));

        let result = fetcher.fetch(&package("https://example.com/pkg.tgz".into(), None));

        assert!(matches!(result, Err(Error::Download(_))));
        assert!(leftover_archives(work.path()).is_empty());
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let work = tempfile::tempdir().unwrap();
        let fetcher = TarballFetcher::new(
            work.path(),
            StaticTransport(Some(b"definitely not gzip".to_vec())),
        );

        let result = fetcher.fetch(&package("https://example.com/pkg.tgz".into(), None));

        assert!(matches!(result, Err(Error::Extraction(_))));
        assert!(leftover_archives(work.path()).is_empty());
    }

    #[test]
    fn test_integrity_mismatch() {
        let work = tempfile::tempdir().unwrap();
        let data = tarball(&[("package/index.js", "1")]);
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(Some(data)));

        let result = fetcher.fetch(&package(
            "https://example.com/pkg.tgz".into(),
            Some(sri(b"something else")),
        ));

        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
        assert!(leftover_archives(work.path()).is_empty());
    }

    #[test]
    fn test_multiple_top_level_entries_rejected() {
        let work = tempfile::tempdir().unwrap();
        let data = tarball(&[("package/index.js", "1"), ("other/index.js", "2")]);
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(Some(data)));

        let result = fetcher.fetch(&package("https://example.com/pkg.tgz".into(), None));

        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_empty_archive_rejected() {
        let work = tempfile::tempdir().unwrap();
        let data = tarball(&[]);
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(Some(data)));

        let result = fetcher.fetch(&package("https://example.com/pkg.tgz".into(), None));

        assert!(matches!(result, Err(Error::Extraction(_))));
        assert!(leftover_archives(work.path()).is_empty());
    }

    #[test]
    fn test_single_top_level_file_rejected() {
        let work = tempfile::tempdir().unwrap();
        let data = tarball(&[("index.js", "1")]);
        let fetcher = TarballFetcher::new(work.path(), StaticTransport(Some(data.clone())));

        let result = fetcher.fetch(&package("https://example.com/pkg.tgz".into(), Some(sri(&data))));

        match result {
            Err(Error::Extraction(msg)) => assert!(msg.contains("not a directory"), "{}", msg),
            other => panic!("expected extraction error, got {:?}", other),
        }
        assert!(leftover_archives(work.path()).is_empty());
    }

    #[test]
    fn test_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pkg.tgz");
        fs::write(&source, b"tarball bytes").unwrap();

        let mut out = Vec::new();
        let n = FileTransport
            .download(&format!("file://{}", source.display()), &mut out)
            .unwrap();
        assert_eq!(n, 13);
        assert_eq!(out, b"tarball bytes");

        let missing = FileTransport.download(
            &format!("file://{}", dir.path().join("missing.tgz").display()),
            &mut Vec::new(),
        );
        assert!(matches!(missing, Err(Error::Download(_))));
        assert!(matches!(
            FileTransport.download("https://example.com/pkg.tgz", &mut Vec::new()),
            Err(Error::Download(_))
        ));
    }

    #[test]
    fn test_http_transport_delegates_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("pkg.tgz");
        fs::write(&source, b"tarball bytes").unwrap();

        let transport = HttpTransport::new().unwrap();
        let mut out = Vec::new();
        transport
            .download(&format!("file://{}", source.display()), &mut out)
            .unwrap();

        assert_eq!(out, b"tarball bytes");
    }

    #[test]
    fn test_integrity_parse() {
        let digest = BASE64.encode([7u8; 32]);
        assert_eq!(
            Integrity::parse(&format!("sha256-{}", digest)),
            Some(Integrity::Sha256(vec![7u8; 32]))
        );
        assert_eq!(Integrity::parse("sha1-AAAA"), None);
        assert_eq!(Integrity::parse("garbage"), None);

        // sha512 wins over sha256 when both are present
        let strong = BASE64.encode([1u8; 64]);
        assert!(matches!(
            Integrity::parse(&format!("sha256-{} sha512-{}", digest, strong)),
            Some(Integrity::Sha512(_))
        ));
    }

    #[test]
    fn test_tarball_stem() {
        assert_eq!(tarball_stem("left-pad"), "left-pad");
        assert_eq!(tarball_stem("@types/node"), "%40types%2Fnode");
    }
}
