//! Archive download and extraction.
//!
//! Install root layout:
//!
//! ```text
//! <install-root>/
//!   <addon-id>/package/package.json      installed addons
//!   .downloads/<addon-id>-<uuid>.tgz     scratch archives, removed after extraction
//!   .staging-<addon-id>-<uuid>/          extraction in progress
//!   .backup-<addon-id>-<uuid>/           previous version during an update swap
//! ```
//!
//! Everything starting with `.` is invisible to the catalog, so a crash at any
//! point leaves either the old install or the new one, never a half-written
//! directory under the addon's name.

use std::{
    io::BufReader,
    path::{Component, Path, PathBuf},
};

use {
    futures::StreamExt,
    tokio::io::AsyncWriteExt,
    uuid::Uuid,
};

use crate::{
    error::{Context, Error, Result},
    identifier::validate_identifier,
    types::{AddonManifest, DownloadStatus, DownloadTask, InstalledAddon, manifest_path},
    validate::ManifestValidator,
};

pub const SCRATCH_DIR: &str = ".downloads";
const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".backup-";

/// Unpacked size limit used unless configured otherwise.
pub const DEFAULT_MAX_UNPACKED_BYTES: u64 = 100 * 1024 * 1024;

/// Downloads addon archives and unpacks them under the install root.
pub struct ArchiveInstaller {
    client: reqwest::Client,
    install_root: PathBuf,
    validator: ManifestValidator,
    max_archive_bytes: u64,
    max_unpacked_bytes: u64,
}

impl ArchiveInstaller {
    pub fn new(
        client: reqwest::Client,
        install_root: PathBuf,
        validator: ManifestValidator,
        max_archive_bytes: u64,
    ) -> Self {
        Self {
            client,
            install_root,
            validator,
            max_archive_bytes,
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_unpacked_bytes(mut self, limit: u64) -> Self {
        self.max_unpacked_bytes = limit;
        self
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn target_dir(&self, id: &str) -> PathBuf {
        self.install_root.join(id)
    }

    /// Download `archive_url` and install it as `id`, replacing any existing
    /// install only once the new one has been unpacked and validated.
    pub async fn install(&self, archive_url: &str, id: &str) -> Result<InstalledAddon> {
        let task = self.download(archive_url, id).await?;
        self.extract(task, id).await
    }

    /// Stream the archive into the scratch directory.
    pub async fn download(&self, archive_url: &str, id: &str) -> Result<DownloadTask> {
        validate_identifier(id)?;

        let scratch = self.install_root.join(SCRATCH_DIR);
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| Error::fs(&scratch, e))?;

        let destination = scratch.join(format!("{id}-{}.tgz", Uuid::new_v4()));
        let mut task = DownloadTask::new(archive_url, destination);

        match self.fetch_to_file(&mut task).await {
            Ok(()) => {
                task.status = DownloadStatus::Success;
                tracing::debug!(%id, bytes = task.bytes_written, path = %task.destination.display(), "archive downloaded");
                Ok(task)
            },
            Err(e) => {
                task.status = DownloadStatus::Failed;
                remove_file_quietly(&task.destination).await;
                Err(e)
            },
        }
    }

    async fn fetch_to_file(&self, task: &mut DownloadTask) -> Result<()> {
        let response = self
            .client
            .get(&task.url)
            .send()
            .await
            .map_err(|e| download_error(&task.url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed(format!(
                "{}: HTTP {status}",
                task.url
            )));
        }
        if let Some(len) = response.content_length()
            && len > self.max_archive_bytes
        {
            return Err(self.too_large(&task.url));
        }

        let mut file = tokio::fs::File::create(&task.destination)
            .await
            .map_err(|e| Error::fs(&task.destination, e))?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_error(&task.url, &e))?;
            task.bytes_written += chunk.len() as u64;
            if task.bytes_written > self.max_archive_bytes {
                return Err(self.too_large(&task.url));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::fs(&task.destination, e))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::fs(&task.destination, e))?;

        let written = tokio::fs::metadata(&task.destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(Error::DownloadFailed(format!(
                "{}: downloaded archive is empty",
                task.url
            )));
        }
        Ok(())
    }

    fn too_large(&self, url: &str) -> Error {
        Error::DownloadFailed(format!(
            "{url}: archive exceeds the {} byte limit",
            self.max_archive_bytes
        ))
    }

    /// Unpack a downloaded archive and move it into place as `id`.
    ///
    /// The scratch archive is always removed. On failure the staging
    /// directory is removed too and any previous install is left untouched.
    pub async fn extract(&self, task: DownloadTask, id: &str) -> Result<InstalledAddon> {
        validate_identifier(id)?;

        let staging = self
            .install_root
            .join(format!("{STAGING_PREFIX}{id}-{}", Uuid::new_v4()));
        let result = self.stage_and_commit(&task.destination, &staging, id).await;

        remove_file_quietly(&task.destination).await;
        if result.is_err() {
            remove_dir_quietly(&staging).await;
        }
        result
    }

    async fn stage_and_commit(
        &self,
        archive: &Path,
        staging: &Path,
        id: &str,
    ) -> Result<InstalledAddon> {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            return Err(Error::DownloadFailed(format!(
                "archive {} is missing",
                archive.display()
            )));
        }

        tokio::fs::create_dir_all(staging)
            .await
            .map_err(|e| Error::fs(staging, e))?;

        let archive_owned = archive.to_path_buf();
        let staging_owned = staging.to_path_buf();
        let limit = self.max_unpacked_bytes;
        let entries = tokio::task::spawn_blocking(move || {
            unpack_archive(&archive_owned, &staging_owned, limit)
        })
        .await
        .context("extraction task failed")??;

        let manifest = self.read_staged_manifest(staging, id).await?;
        let target = self.target_dir(id);
        swap_into_place(&self.install_root, staging, &target, id).await?;

        tracing::info!(%id, version = %manifest.version, entries, "addon unpacked");
        Ok(InstalledAddon {
            id: id.to_string(),
            path: target,
            manifest,
            enabled: false,
        })
    }

    async fn read_staged_manifest(
        &self,
        staging: &Path,
        id: &str,
    ) -> Result<AddonManifest> {
        let path = manifest_path(staging);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CorruptArchive(
                    "archive has no package/package.json".into(),
                ));
            },
            Err(e) => return Err(Error::fs(&path, e)),
        };
        self.validator
            .validate_str(&text)
            .map_err(|reason| Error::invalid_addon(id, reason))
    }
}

/// Replace `target` with `staging`, keeping the previous install as a backup
/// until the final rename has succeeded.
async fn swap_into_place(root: &Path, staging: &Path, target: &Path, id: &str) -> Result<()> {
    let backup = if tokio::fs::try_exists(target).await.unwrap_or(false) {
        let backup = root.join(format!("{BACKUP_PREFIX}{id}-{}", Uuid::new_v4()));
        tokio::fs::rename(target, &backup)
            .await
            .map_err(|e| Error::fs(target, e))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = tokio::fs::rename(staging, target).await {
        if let Some(backup) = &backup
            && let Err(restore) = tokio::fs::rename(backup, target).await
        {
            tracing::error!(%id, backup = %backup.display(), error = %restore, "failed to restore previous install");
        }
        return Err(Error::fs(target, e));
    }

    if let Some(backup) = backup
        && let Err(e) = tokio::fs::remove_dir_all(&backup).await
    {
        tracing::warn!(%id, backup = %backup.display(), error = %e, "failed to remove previous install");
    }
    Ok(())
}

/// Blocking gzip+tar extraction into `staging`. Returns the number of entries
/// written. Aborts once the declared sizes of the entries exceed
/// `max_unpacked_bytes`.
fn unpack_archive(archive: &Path, staging: &Path, max_unpacked_bytes: u64) -> Result<usize> {
    let file = std::fs::File::open(archive).map_err(|e| Error::fs(archive, e))?;
    let canonical_root = std::fs::canonicalize(staging).map_err(|e| Error::fs(staging, e))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut tarball = tar::Archive::new(decoder);

    let mut written = 0;
    let mut unpacked_bytes: u64 = 0;
    for entry in tarball.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let kind = entry.header().entry_type();
        let raw_path = entry.path().map_err(corrupt)?.into_owned();

        let Some(relative) = contained_path(&raw_path)? else {
            continue;
        };

        if kind.is_symlink() || kind.is_hard_link() {
            tracing::warn!(entry = %raw_path.display(), "skipping link entry in addon archive");
            continue;
        }
        if !kind.is_file() && !kind.is_dir() {
            tracing::debug!(entry = %raw_path.display(), ?kind, "skipping non-file archive entry");
            continue;
        }

        let dest = staging.join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
            let canonical_parent =
                std::fs::canonicalize(parent).map_err(|e| Error::fs(parent, e))?;
            if !canonical_parent.starts_with(&canonical_root) {
                return Err(Error::unsafe_entry(&raw_path));
            }
        }

        if let Ok(meta) = std::fs::symlink_metadata(&dest)
            && meta.file_type().is_symlink()
        {
            return Err(Error::unsafe_entry(&raw_path));
        }

        if kind.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::fs(&dest, e))?;
            continue;
        }

        unpacked_bytes = unpacked_bytes.saturating_add(entry.size());
        if unpacked_bytes > max_unpacked_bytes {
            return Err(Error::CorruptArchive(format!(
                "archive expands beyond the {max_unpacked_bytes} byte limit"
            )));
        }

        entry.unpack(&dest).map_err(|e| match e.kind() {
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::PermissionDenied => {
                Error::fs(&dest, e)
            },
            _ => Error::CorruptArchive(format!("{}: {e}", raw_path.display())),
        })?;
        written += 1;
    }

    if written == 0 {
        return Err(Error::CorruptArchive("archive contains no files".into()));
    }
    Ok(written)
}

/// Reduce an archive entry name to a relative path, rejecting anything that
/// could climb out of the extraction directory.
///
/// Returns `None` for names that resolve to the directory itself (`./`).
fn contained_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::unsafe_entry(path));
            },
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

fn corrupt(e: std::io::Error) -> Error {
    Error::CorruptArchive(e.to_string())
}

fn download_error(url: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("downloading {url}: {err}"))
    } else {
        Error::DownloadFailed(format!("{url}: {err}"))
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch archive");
    }
}

async fn remove_dir_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove staging directory");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use {super::*, std::io::Write};

    /// Build a `.tgz` from `(path, contents)` pairs. Names are written into the
    /// header verbatim so hostile paths like `../x` can be produced.
    pub(crate) fn tgz(entries: &[(&str, &str)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.as_old_mut().name[..path.len()].copy_from_slice(path.as_bytes());
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    pub(crate) fn package_json(name: &str, version: &str) -> String {
        serde_json::json!({
            "name": name,
            "version": version,
            "author": "tester",
            "homepage": "https://example.com",
            "ankidroid_js_api": "0.0.1",
            "addon_type": "reviewer",
            "keywords": ["ankidroid-js-addon"],
        })
        .to_string()
    }

    fn installer(root: &Path) -> ArchiveInstaller {
        ArchiveInstaller::new(
            reqwest::Client::new(),
            root.to_path_buf(),
            ManifestValidator::default(),
            1024 * 1024,
        )
    }

    fn scratch_task(root: &Path, bytes: &[u8]) -> DownloadTask {
        let scratch = root.join(SCRATCH_DIR);
        std::fs::create_dir_all(&scratch).unwrap();
        let path = scratch.join("upload.tgz");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(bytes)
            .unwrap();
        let mut task = DownloadTask::new("file://upload.tgz", path);
        task.status = DownloadStatus::Success;
        task
    }

    fn visible_entries(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn contained_path_rejects_traversal() {
        assert!(contained_path(Path::new("../../evil")).is_err());
        assert!(contained_path(Path::new("package/../../evil")).is_err());
        assert!(contained_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn contained_path_normalizes_cur_dir() {
        assert_eq!(
            contained_path(Path::new("./package/index.js")).unwrap(),
            Some(PathBuf::from("package/index.js"))
        );
        assert_eq!(contained_path(Path::new("./")).unwrap(), None);
    }

    #[tokio::test]
    async fn extracts_into_identifier_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let archive = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("package/index.js", "console.log(1)\n"),
        ]);
        let task = scratch_task(tmp.path(), &archive);
        let archive_path = task.destination.clone();

        let installed = installer(&root).extract(task, "foo").await.unwrap();

        assert_eq!(installed.id, "foo");
        assert_eq!(installed.manifest.version, "1.0.0");
        assert_eq!(
            std::fs::read_to_string(root.join("foo/package/index.js")).unwrap(),
            "console.log(1)\n"
        );
        assert!(!archive_path.exists(), "scratch archive must be removed");
        assert_eq!(visible_entries(&root), vec!["foo"]);
        assert_eq!(
            std::fs::read_dir(&root)
                .unwrap()
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn traversal_entry_aborts_without_escaping() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("install").join("addons");
        std::fs::create_dir_all(&root).unwrap();
        let archive = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("../../evil", "pwned"),
        ]);
        let task = scratch_task(tmp.path(), &archive);

        let err = installer(&root).extract(task, "foo").await.unwrap_err();

        assert!(matches!(err, Error::UnsafeArchiveEntry { .. }), "{err:?}");
        assert!(!tmp.path().join("evil").exists());
        assert!(!tmp.path().join("install/evil").exists());
        assert!(!root.join("foo").exists());
        assert!(
            std::fs::read_dir(&root).unwrap().next().is_none(),
            "no staging leftovers expected"
        );
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_version() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let inst = installer(&root);

        let v1 = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("package/index.js", "v1"),
        ]);
        inst.extract(scratch_task(tmp.path(), &v1), "foo")
            .await
            .unwrap();

        let broken = tgz(&[("package/index.js", "v2 without manifest")]);
        let err = inst
            .extract(scratch_task(tmp.path(), &broken), "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)), "{err:?}");

        assert_eq!(
            std::fs::read_to_string(root.join("foo/package/index.js")).unwrap(),
            "v1"
        );
    }

    #[tokio::test]
    async fn reinstall_replaces_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let inst = installer(&root);

        let v1 = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("package/old.js", "old"),
        ]);
        let v2 = tgz(&[
            ("package/package.json", &package_json("foo", "2.0.0")),
            ("package/index.js", "new"),
        ]);
        inst.extract(scratch_task(tmp.path(), &v1), "foo")
            .await
            .unwrap();
        let installed = inst
            .extract(scratch_task(tmp.path(), &v2), "foo")
            .await
            .unwrap();

        assert_eq!(installed.manifest.version, "2.0.0");
        assert!(!root.join("foo/package/old.js").exists());
        assert_eq!(visible_entries(&root), vec!["foo"]);
        assert_eq!(
            std::fs::read_dir(&root)
                .unwrap()
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with(BACKUP_PREFIX))
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn invalid_staged_manifest_is_invalid_addon() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let archive = tgz(&[("package/package.json", r#"{"name":"foo"}"#)]);

        let err = installer(&root)
            .extract(scratch_task(tmp.path(), &archive), "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddon { .. }), "{err:?}");
        assert!(!root.join("foo").exists());
    }

    #[tokio::test]
    async fn garbage_archive_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");

        let err = installer(&root)
            .extract(scratch_task(tmp.path(), b"definitely not gzip"), "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)), "{err:?}");
    }

    #[tokio::test]
    async fn install_downloads_and_extracts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let archive = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("package/index.js", "console.log(1)\n"),
        ]);

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/foo/-/foo-1.0.0.tgz")
            .with_status(200)
            .with_body(archive)
            .create_async()
            .await;

        let url = format!("{}/foo/-/foo-1.0.0.tgz", server.url());
        let installed = installer(&root).install(&url, "foo").await.unwrap();

        assert_eq!(installed.path, root.join("foo"));
        assert!(root.join("foo/package/index.js").is_file());
        assert!(
            std::fs::read_dir(root.join(SCRATCH_DIR))
                .unwrap()
                .next()
                .is_none()
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_is_download_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/foo.tgz")
            .with_status(500)
            .create_async()
            .await;

        let err = installer(tmp.path())
            .download(&format!("{}/foo.tgz", server.url()), "foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn empty_download_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/foo.tgz")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let err = installer(tmp.path())
            .download(&format!("{}/foo.tgz", server.url()), "foo")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");
        assert!(
            std::fs::read_dir(tmp.path().join(SCRATCH_DIR))
                .unwrap()
                .next()
                .is_none()
        );
    }

    #[tokio::test]
    async fn oversized_download_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big.tgz")
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let inst = ArchiveInstaller::new(
            reqwest::Client::new(),
            tmp.path().to_path_buf(),
            ManifestValidator::default(),
            1024,
        );
        let err = inst
            .download(&format!("{}/big.tgz", server.url()), "big")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit"), "{err}");
    }

    #[tokio::test]
    async fn expanding_archive_over_limit_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("addons");
        let padding = "x".repeat(2048);
        let archive = tgz(&[
            ("package/package.json", &package_json("foo", "1.0.0")),
            ("package/index.js", &padding),
        ]);

        let err = installer(&root)
            .with_max_unpacked_bytes(1024)
            .extract(scratch_task(tmp.path(), &archive), "foo")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CorruptArchive(_)), "{err:?}");
        assert!(err.to_string().contains("1024"), "{err}");
        assert!(!root.join("foo").exists());
        assert!(visible_entries(&root).is_empty());
    }

    #[tokio::test]
    async fn stalled_download_is_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let base = crate::registry::tests::silent_server().await;
        let client = reqwest::Client::builder()
            .read_timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let inst = ArchiveInstaller::new(
            client,
            tmp.path().to_path_buf(),
            ManifestValidator::default(),
            1024 * 1024,
        );

        let err = inst
            .download(&format!("{base}/foo.tgz"), "foo")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
        assert!(
            std::fs::read_dir(tmp.path().join(SCRATCH_DIR))
                .unwrap()
                .next()
                .is_none()
        );
    }

    #[tokio::test]
    async fn slow_download_outlasting_read_timeout_completes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        const BODY: &[u8] = b"fifteen bytes!!";

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request).await.unwrap();
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", BODY.len());
            stream.write_all(head.as_bytes()).await.unwrap();
            for byte in BODY {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                stream.write_all(&[*byte]).await.unwrap();
                stream.flush().await.unwrap();
            }
        });

        let tmp = tempfile::tempdir().unwrap();
        let client = reqwest::Client::builder()
            .read_timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        let inst = ArchiveInstaller::new(
            client,
            tmp.path().to_path_buf(),
            ManifestValidator::default(),
            1024 * 1024,
        );

        let task = inst
            .download(&format!("http://{addr}/foo.tgz"), "foo")
            .await
            .unwrap();

        assert_eq!(task.status, DownloadStatus::Success);
        assert_eq!(task.bytes_written, BODY.len() as u64);
        assert_eq!(std::fs::read(&task.destination).unwrap(), BODY);
    }
}
