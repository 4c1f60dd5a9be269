//! Local filesystem backend. A 1:1 mapping of `std::fs` onto `DavFileSystem`,
//! with blocking calls pushed onto the tokio blocking pool.
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
#[cfg(target_os = "linux")]
use std::os::linux::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream;
#[cfg(test)]
use futures_util::stream::StreamExt;
use libc;

use crate::davpath::DavPath;
use crate::fs::*;

/// Local filesystem `DavFileSystem` implementation.
#[derive(Debug, Clone)]
pub struct LocalFs {
    basedir:         PathBuf,
    public:          bool,
    hide_symlinks:   bool,
    hide_dot_files:  bool,
}

#[derive(Debug)]
struct LocalFsMetaData(std::fs::Metadata);

#[derive(Debug)]
struct LocalFsFile(std::fs::File);

#[derive(Debug)]
struct LocalFsDirEntry {
    entry: std::fs::DirEntry,
    name:  Vec<u8>,
}

impl LocalFs {
    /// Create a new `LocalFs` that serves `base`. If `public` is set, all
    /// files and directories created will be world-readable (mode 644/755),
    /// otherwise they are private (mode 600/700). The umask still applies.
    ///
    /// `hide_symlinks` and `hide_dot_files`, if set, make symlinks resp.
    /// dotfile-prefixed entries invisible to `metadata()`/`read_dir()` (but
    /// not to `symlink_metadata()`, which callers use when they need ground
    /// truth, e.g. to detect a symlink before a MOVE).
    pub fn new<P: AsRef<Path>>(base: P, public: bool, hide_symlinks: bool, hide_dot_files: bool) -> Box<LocalFs> {
        Box::new(LocalFs {
            basedir: base.as_ref().to_path_buf(),
            public,
            hide_symlinks,
            hide_dot_files,
        })
    }

    fn fspath(&self, path: &DavPath) -> PathBuf {
        self.basedir.join(path.as_rel_ospath())
    }

    fn is_hidden_name(&self, name: &[u8]) -> bool {
        self.hide_dot_files && name.starts_with(b".")
    }
}

// Run a blocking closure on the tokio blocking pool and map a lost
// worker thread to a general failure, since there is nothing the
// caller can do about it anyway.
async fn blocking<F, R>(f: F) -> FsResult<R>
where
    F: FnOnce() -> FsResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or(Err(FsError::GeneralFailure))
}

impl DavFileSystem for LocalFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        let fspath = self.fspath(path);
        if self.is_hidden_name(path.file_name_bytes()) {
            return Box::pin(async { Err(FsError::NotFound) });
        }
        let hide_symlinks = self.hide_symlinks;
        Box::pin(async move {
            blocking(move || {
                let m = std::fs::symlink_metadata(&fspath)?;
                if hide_symlinks && m.file_type().is_symlink() {
                    return Err(FsError::NotFound);
                }
                std::fs::metadata(&fspath)
                    .map(|m| Box::new(LocalFsMetaData(m)) as Box<dyn DavMetaData>)
                    .map_err(|e| e.into())
            })
            .await
        })
    }

    fn symlink_metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        let fspath = self.fspath(path);
        Box::pin(async move {
            blocking(move || {
                std::fs::symlink_metadata(&fspath)
                    .map(|m| Box::new(LocalFsMetaData(m)) as Box<dyn DavMetaData>)
                    .map_err(|e| e.into())
            })
            .await
        })
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        meta: ReadDirMeta,
    ) -> FsFuture<FsStream<Box<dyn DavDirEntry>>>
    {
        let fspath = self.fspath(path);
        debug!("FS: read_dir {:?}", fspath);
        let hide_symlinks = self.hide_symlinks;
        let hide_dot_files = self.hide_dot_files;
        Box::pin(async move {
            let _ = meta;
            let entries = blocking(move || {
                let mut v = Vec::new();
                for entry in std::fs::read_dir(&fspath)? {
                    let entry = entry?;
                    let name = entry.file_name().as_bytes().to_vec();
                    if hide_dot_files && name.starts_with(b".") {
                        continue;
                    }
                    if hide_symlinks && entry.file_type().map(|t| t.is_symlink()).unwrap_or(false) {
                        continue;
                    }
                    v.push(LocalFsDirEntry { entry, name });
                }
                Ok(v)
            })
            .await?;
            let s = stream::iter(entries.into_iter().map(|e| Ok(Box::new(e) as Box<dyn DavDirEntry>)));
            Ok(Box::pin(s) as FsStream<Box<dyn DavDirEntry>>)
        })
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<Box<dyn DavFile>> {
        let fspath = self.fspath(path);
        let public = self.public;
        debug!("FS: open {:?}", fspath);
        Box::pin(async move {
            blocking(move || {
                std::fs::OpenOptions::new()
                    .read(options.read)
                    .write(options.write)
                    .append(options.append)
                    .truncate(options.truncate)
                    .create(options.create)
                    .create_new(options.create_new)
                    .mode(if public { 0o644 } else { 0o600 })
                    .open(&fspath)
                    .map(|f| Box::new(LocalFsFile(f)) as Box<dyn DavFile>)
                    .map_err(|e| e.into())
            })
            .await
        })
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fspath = self.fspath(path);
        let public = self.public;
        debug!("FS: create_dir {:?}", fspath);
        Box::pin(async move {
            blocking(move || {
                std::fs::DirBuilder::new()
                    .mode(if public { 0o755 } else { 0o700 })
                    .create(&fspath)
                    .map_err(|e| e.into())
            })
            .await
        })
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fspath = self.fspath(path);
        debug!("FS: remove_dir {:?}", fspath);
        Box::pin(async move { blocking(move || std::fs::remove_dir(&fspath).map_err(|e| e.into())).await })
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let fspath = self.fspath(path);
        debug!("FS: remove_file {:?}", fspath);
        Box::pin(async move { blocking(move || std::fs::remove_file(&fspath).map_err(|e| e.into())).await })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let from = self.fspath(from);
        let to = self.fspath(to);
        debug!("FS: rename {:?} {:?}", from, to);
        Box::pin(async move { blocking(move || std::fs::rename(&from, &to).map_err(|e| e.into())).await })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let from = self.fspath(from);
        let to = self.fspath(to);
        debug!("FS: copy {:?} {:?}", from, to);
        Box::pin(async move {
            blocking(move || {
                std::fs::copy(&from, &to).map(|_| ()).map_err(|e| {
                    debug!("copy failed: {:?}", e);
                    e.into()
                })
            })
            .await
        })
    }

    // boilerplate helper so that clone() works.
    fn box_clone(&self) -> Box<dyn DavFileSystem> {
        Box::new((*self).clone())
    }
}

impl DavDirEntry for LocalFsDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn metadata(&self) -> FsFuture<Box<dyn DavMetaData>> {
        let r = self
            .entry
            .metadata()
            .map(|m| Box::new(LocalFsMetaData(m)) as Box<dyn DavMetaData>)
            .map_err(|e| e.into());
        Box::pin(async move { r })
    }
}

impl DavFile for LocalFsFile {
    fn metadata(&mut self) -> FsFuture<Box<dyn DavMetaData>> {
        let r = self.0.metadata().map(|m| Box::new(LocalFsMetaData(m)) as Box<dyn DavMetaData>).map_err(|e| e.into());
        Box::pin(async move { r })
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<()> {
        use std::io::Write;
        let r = self.0.write_all(&buf).map_err(|e| e.into());
        Box::pin(async move { r })
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<()> {
        use std::io::Write;
        let mut r = Ok(());
        while buf.has_remaining() {
            let chunk = buf.chunk().to_vec();
            let n = chunk.len();
            if let Err(e) = self.0.write_all(&chunk) {
                r = Err(e.into());
                break;
            }
            buf.advance(n);
        }
        Box::pin(async move { r })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes> {
        use std::io::Read;
        let mut v = BytesMut::zeroed(count);
        let r = match self.0.read(&mut v) {
            Ok(n) => {
                v.truncate(n);
                Ok(v.freeze())
            },
            Err(e) => Err(e.into()),
        };
        Box::pin(async move { r })
    }

    fn seek(&mut self, pos: std::io::SeekFrom) -> FsFuture<u64> {
        use std::io::Seek;
        let r = self.0.seek(pos).map_err(|e| e.into());
        Box::pin(async move { r })
    }

    fn flush(&mut self) -> FsFuture<()> {
        use std::io::Write;
        let r = self.0.flush().map_err(|e| e.into());
        Box::pin(async move { r })
    }
}

impl DavMetaData for LocalFsMetaData {
    fn len(&self) -> u64 {
        self.0.len()
    }

    fn modified(&self) -> FsResult<SystemTime> {
        self.0.modified().map_err(|e| e.into())
    }

    fn accessed(&self) -> FsResult<SystemTime> {
        self.0.accessed().map_err(|e| e.into())
    }

    #[cfg(target_os = "linux")]
    fn status_changed(&self) -> FsResult<SystemTime> {
        Ok(UNIX_EPOCH + Duration::new(self.0.st_ctime() as u64, 0))
    }

    fn is_dir(&self) -> bool {
        self.0.is_dir()
    }

    fn is_file(&self) -> bool {
        self.0.is_file()
    }

    fn is_symlink(&self) -> bool {
        self.0.file_type().is_symlink()
    }

    fn executable(&self) -> FsResult<bool> {
        if self.0.is_file() {
            return Ok((self.0.permissions().mode() & 0o100) > 0);
        }
        Err(FsError::NotImplemented)
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        if let Some(errno) = e.raw_os_error() {
            match errno {
                libc::EMLINK | libc::ENOSPC | libc::EDQUOT => return FsError::InsufficientStorage,
                libc::EFBIG => return FsError::TooLarge,
                libc::EACCES | libc::EPERM => return FsError::Forbidden,
                libc::ENOTEMPTY | libc::EEXIST => return FsError::Exists,
                libc::ELOOP => return FsError::LoopDetected,
                libc::ENAMETOOLONG => return FsError::PathTooLong,
                libc::ENOTDIR => return FsError::Forbidden,
                libc::EISDIR => return FsError::Forbidden,
                libc::EROFS => return FsError::Forbidden,
                libc::ENOENT => return FsError::NotFound,
                libc::ENOSYS => return FsError::NotImplemented,
                libc::EXDEV => return FsError::IsRemote,
                _ => {},
            }
        } else {
            // not an OS error - must be "not implemented"
            // (e.g. metadata().created() on systems without st_crtime)
            return FsError::NotImplemented;
        }
        match e.kind() {
            ErrorKind::NotFound => FsError::NotFound,
            ErrorKind::PermissionDenied => FsError::Forbidden,
            _ => FsError::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OpenOptions;

    fn dp(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[tokio::test]
    async fn roundtrip_write_read() {
        let dir = tempdir();
        let fs = LocalFs::new(&dir, false, false, false);

        let mut oo = OpenOptions::write();
        oo.create = true;
        let mut file = fs.open(&dp("/hello.txt"), oo).await.unwrap();
        file.write_bytes(Bytes::from_static(b"hello world")).await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let mut file = fs.open(&dp("/hello.txt"), OpenOptions::read()).await.unwrap();
        let data = file.read_bytes(1024).await.unwrap();
        assert_eq!(&data[..], b"hello world");

        let meta = fs.metadata(&dp("/hello.txt")).await.unwrap();
        assert_eq!(meta.len(), 11);
        assert!(!meta.is_dir());
    }

    #[tokio::test]
    async fn mkdir_and_list() {
        let dir = tempdir();
        let fs = LocalFs::new(&dir, false, false, false);
        fs.create_dir(&dp("/sub")).await.unwrap();

        let meta = fs.metadata(&dp("/sub")).await.unwrap();
        assert!(meta.is_dir());

        let mut entries = fs.read_dir(&dp("/"), ReadDirMeta::Data).await.unwrap();
        let mut names = Vec::new();
        while let Some(e) = entries.next().await {
            names.push(e.unwrap().name());
        }
        assert_eq!(names, vec![b"sub".to_vec()]);
    }

    #[tokio::test]
    async fn remove_nonexistent_is_not_found() {
        let dir = tempdir();
        let fs = LocalFs::new(&dir, false, false, false);
        let e = fs.remove_file(&dp("/nope")).await.unwrap_err();
        assert_eq!(e, FsError::NotFound);
    }

    // minimal scratch-dir helper, avoids pulling in a tempdir crate dependency
    // for a handful of unit tests.
    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("dav-server-localfs-test-{}-{}", std::process::id(), unique()));
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    fn unique() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}
