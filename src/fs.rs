//! The adapter contract: an async, pluggable filesystem abstraction.
//!
//! The core never touches storage directly; every PUT/GET/COPY/MOVE/PROPFIND
//! etc. goes through a `DavFileSystem` implementation (see `localfs`/`memfs`
//! for two reference adapters).

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes};
use futures_util::stream::Stream;
use http::StatusCode;

use crate::davpath::DavPath;

/// The `Future` type returned by most `DavFileSystem`/`DavFile` methods.
pub type FsFuture<T> = Pin<Box<dyn Future<Output = FsResult<T>> + Send>>;

/// The `Stream` type returned by `read_dir`.
pub type FsStream<T> = Pin<Box<dyn Stream<Item = FsResult<T>> + Send>>;

/// Whether `read_dir` needs to return full metadata for each entry, or
/// whether cheaper "just enough to tell file from dir" data suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirMeta {
    Data,
    DataSymlink,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    LoopDetected,
    PathTooLong,
    TooLarge,
    IsRemote,
}

pub type FsResult<T> = std::result::Result<T, FsError>;

#[derive(Debug, Clone)]
pub struct DavProp {
    pub name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub xml: Option<Vec<u8>>,
}

macro_rules! notimplemented {
    () => {
        Box::pin(async { Err(FsError::NotImplemented) })
    };
}

pub trait DavFileSystem: Debug + Sync + Send {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>>;

    fn symlink_metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        self.metadata(path)
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        meta: ReadDirMeta,
    ) -> FsFuture<FsStream<Box<dyn DavDirEntry>>>;

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<Box<dyn DavFile>>;

    #[allow(unused_variables)]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn have_props<'a>(&'a self, path: &'a DavPath) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { false })
    }
    #[allow(unused_variables)]
    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        set: Vec<DavProp>,
        remove: Vec<DavProp>,
    ) -> FsFuture<Vec<(StatusCode, DavProp)>> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn get_props<'a>(&'a self, path: &'a DavPath, do_content: bool) -> FsFuture<Vec<DavProp>> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn get_prop<'a>(&'a self, path: &'a DavPath, prop: DavProp) -> FsFuture<Vec<u8>> {
        notimplemented!()
    }
    #[allow(unused_variables)]
    fn get_quota<'a>(&'a self, path: &'a DavPath) -> FsFuture<(u64, Option<u64>)> {
        notimplemented!()
    }

    // helper so that clone() works.
    fn box_clone(&self) -> Box<dyn DavFileSystem>;
}

// generic Clone, calls implementation-specific box_clone().
impl Clone for Box<dyn DavFileSystem> {
    fn clone(&self) -> Box<dyn DavFileSystem> {
        self.box_clone()
    }
}

pub trait DavDirEntry: Debug + Send + Sync {
    fn name(&self) -> Vec<u8>;
    fn metadata(&self) -> FsFuture<Box<dyn DavMetaData>>;

    // defaults. implementations can override this if their
    // metadata() method is expensive and there is a cheaper
    // way to provide the same info (e.g. windows/unix filesystems).
    fn is_dir<'a>(&'a self) -> Pin<Box<dyn Future<Output = FsResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.metadata().await?.is_dir()) })
    }
    fn is_file<'a>(&'a self) -> Pin<Box<dyn Future<Output = FsResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.metadata().await?.is_file()) })
    }
    fn is_symlink<'a>(&'a self) -> Pin<Box<dyn Future<Output = FsResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.metadata().await?.is_symlink()) })
    }
}

pub trait DavFile: Debug + Send {
    fn metadata(&mut self) -> FsFuture<Box<dyn DavMetaData>>;
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<()>;
    fn write_buf(&mut self, buf: Box<dyn Buf + Send>) -> FsFuture<()>;
    fn read_bytes(&mut self, count: usize) -> FsFuture<Bytes>;
    fn seek(&mut self, pos: std::io::SeekFrom) -> FsFuture<u64>;
    fn flush(&mut self) -> FsFuture<()>;
}

pub trait DavMetaData: Debug + Send + Sync {
    fn len(&self) -> u64;
    fn modified(&self) -> FsResult<SystemTime>;
    fn is_dir(&self) -> bool;

    // default implementations.
    fn etag(&self) -> Option<String> {
        if let Ok(t) = self.modified() {
            if let Ok(t) = t.duration_since(UNIX_EPOCH) {
                // apache style etag.
                return Some(format!(
                    "{:x}-{:x}",
                    self.len(),
                    t.as_secs() * 1000000 + t.subsec_nanos() as u64 / 1000
                ));
            }
        }
        Some(format!("{:x}", self.len()))
    }
    fn is_file(&self) -> bool {
        !self.is_dir()
    }
    fn is_symlink(&self) -> bool {
        false
    }

    fn accessed(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }
    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }
    fn status_changed(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }
    fn executable(&self) -> FsResult<bool> {
        Err(FsError::NotImplemented)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
    /// expected total size of the written data, if known (from `Content-Length`).
    pub size: Option<u64>,
}

impl OpenOptions {
    #[allow(dead_code)]
    pub fn new() -> OpenOptions {
        OpenOptions {
            read: false,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
            size: None,
        }
    }
    pub fn read() -> OpenOptions {
        OpenOptions { read: true, ..OpenOptions::new() }
    }
    pub fn write() -> OpenOptions {
        OpenOptions { write: true, ..OpenOptions::new() }
    }
}

impl std::error::Error for FsError {}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
