//! dav-server-rs, a WebDAV handler implementation written in Rust, using async/await.
//!
//! It's not really complete, and not RFC compliant, but it can be used for
//! basic file access over WebDAV together with locking.
//!
//! ## Example.
//!
//! Example server that serves the /tmp directory over webdav,
//! and listens on localhost port 4918.
//!
//! This example can also be found in `examples/sample-litmus-server.rs`, and
//! it is runnable, to test it first do a `cargo build --example sample-litmus-server`,
//! then run `target/debug/examples/sample-litmus-server`.
#![allow(clippy::upper_case_acronyms)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

#[cfg(feature = "actix-compat")]
pub mod actix;
pub mod body;
pub mod davpath;
pub mod fakels;
pub mod fs;
pub mod ls;
#[cfg(feature = "localfs")]
pub mod localfs;
#[cfg(feature = "memfs")]
pub mod memfs;
#[cfg(feature = "warp-compat")]
pub mod warp;

mod async_stream;
mod conditional;
mod davhandler;
mod davheaders;
mod encoding;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod lock_engine;
pub mod memls;
mod multierror;
mod tree;
mod util;
mod xmltree_ext;

pub use crate::davhandler::{DavConfig, DavHandler, DavOptionHide};
pub(crate) use crate::davhandler::DavInner;
pub(crate) use crate::errors::DavError;
pub(crate) use crate::fs::{FsError, FsResult};

pub(crate) type DavResult<T> = std::result::Result<T, DavError>;
