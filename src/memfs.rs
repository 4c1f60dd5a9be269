//! Simple in-memory filesystem.
//!
//! This implementation has state so - if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! So you have to create the instance once, using `MemFs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. Cloning is ofcourse not expensive, the
//! MemFs handle is refcounted, obviously.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures_util::stream;
use http::StatusCode;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::tree;

type Tree = tree::Tree<Vec<u8>, MemFsNode>;

#[derive(Debug)]
pub struct MemFs {
    tree: Arc<Mutex<Tree>>,
}

#[derive(Debug, Clone)]
enum MemFsNode {
    Dir(MemFsDirNode),
    File(MemFsFileNode),
}

#[derive(Debug, Clone)]
struct MemFsDirNode {
    props:  HashMap<String, DavProp>,
    mtime:  SystemTime,
    crtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFsFileNode {
    props:  HashMap<String, DavProp>,
    mtime:  SystemTime,
    crtime: SystemTime,
    data:   Vec<u8>,
}

#[derive(Debug, Clone)]
struct MemFsDirEntry {
    mtime:  SystemTime,
    crtime: SystemTime,
    is_dir: bool,
    name:   Vec<u8>,
    size:   u64,
}

#[derive(Debug)]
struct MemFsFile {
    tree:    Arc<Mutex<Tree>>,
    node_id: u64,
    pos:     usize,
    append:  bool,
}

impl MemFs {
    /// Create a new "memfs" filesystem.
    pub fn new() -> Box<MemFs> {
        let root = MemFsNode::new_dir();
        Box::new(MemFs { tree: Arc::new(Mutex::new(Tree::new(root))) })
    }

    fn do_open(&self, tree: &mut Tree, path: &[u8], options: OpenOptions) -> FsResult<MemFsFile> {
        let node_id = match tree.lookup(path) {
            Ok(n) => {
                if options.create_new {
                    return Err(FsError::Exists);
                }
                n
            },
            Err(FsError::NotFound) => {
                if !options.create {
                    return Err(FsError::NotFound);
                }
                let parent_id = tree.lookup_parent(path)?;
                tree.add_child(parent_id, file_name(path), MemFsNode::new_file(), true)?
            },
            Err(e) => return Err(e),
        };
        let node = tree.get_node_mut(node_id)?;
        if node.is_dir() {
            return Err(FsError::Forbidden);
        }
        if options.truncate {
            node.as_file_mut()?.data.truncate(0);
            node.update_mtime(SystemTime::now());
        }
        Ok(MemFsFile {
            tree: self.tree.clone(),
            node_id,
            pos: 0,
            append: options.append,
        })
    }
}

impl Clone for MemFs {
    fn clone(&self) -> Self {
        MemFs { tree: Arc::clone(&self.tree) }
    }
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<Box<dyn DavMetaData>> {
        let r = (|| {
            let tree = &*self.tree.lock().unwrap();
            let node_id = tree.lookup(path.as_bytes())?;
            Ok(Box::new(tree.get_node(node_id)?.as_dirent(path.as_bytes())) as Box<dyn DavMetaData>)
        })();
        Box::pin(async move { r })
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath, _meta: ReadDirMeta) -> FsFuture<FsStream<Box<dyn DavDirEntry>>> {
        let r = (|| {
            let tree = &*self.tree.lock().unwrap();
            let node_id = tree.lookup(path.as_bytes())?;
            if !tree.get_node(node_id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            let mut v: Vec<FsResult<Box<dyn DavDirEntry>>> = Vec::new();
            for (name, dnode_id) in tree.get_children(node_id)? {
                if let Ok(node) = tree.get_node(dnode_id) {
                    v.push(Ok(Box::new(node.as_dirent(&name)) as Box<dyn DavDirEntry>));
                }
            }
            Ok(Box::pin(stream::iter(v)) as FsStream<Box<dyn DavDirEntry>>)
        })();
        Box::pin(async move { r })
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<Box<dyn DavFile>> {
        let tree = &mut *self.tree.lock().unwrap();
        let r = self.do_open(tree, path.as_bytes(), options).map(|f| Box::new(f) as Box<dyn DavFile>);
        Box::pin(async move { r })
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        debug!("FS: create_dir {:?}", path);
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let path = path.as_bytes();
            let parent_id = tree.lookup_parent(path)?;
            tree.add_child(parent_id, file_name(path), MemFsNode::new_dir(), false)?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let parent_id = tree.lookup_parent(path.as_bytes())?;
            let node_id = tree.lookup(path.as_bytes())?;
            tree.delete_node(node_id)?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<()> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let parent_id = tree.lookup_parent(path.as_bytes())?;
            let node_id = tree.lookup(path.as_bytes())?;
            tree.delete_node(node_id)?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let node_id = tree.lookup(from.as_bytes())?;
            let parent_id = tree.lookup_parent(from.as_bytes())?;
            let dst_id = tree.lookup_parent(to.as_bytes())?;
            tree.move_node(node_id, dst_id, file_name(to.as_bytes()), true)?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            tree.get_node_mut(dst_id)?.update_mtime(SystemTime::now());
            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<()> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();

            // source must exist.
            let snode_id = tree.lookup(from.as_bytes())?;

            // make sure destination exists, create if needed.
            {
                let mut oo = OpenOptions::write();
                oo.create = true;
                self.do_open(tree, to.as_bytes(), oo)?;
            }
            let dnode_id = tree.lookup(to.as_bytes())?;

            // copy.
            let mut data = (*tree.get_node_mut(snode_id)?).clone();
            match data {
                MemFsNode::Dir(ref mut d) => d.crtime = SystemTime::now(),
                MemFsNode::File(ref mut f) => f.crtime = SystemTime::now(),
            }
            *tree.get_node_mut(dnode_id)? = data;

            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn have_props<'a>(&'a self, _path: &'a DavPath) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async { true })
    }

    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        set: Vec<DavProp>,
        remove: Vec<DavProp>,
    ) -> FsFuture<Vec<(StatusCode, DavProp)>>
    {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let node_id = tree.lookup(path.as_bytes())?;
            let node = tree.get_node_mut(node_id)?;
            let props = node.get_props_mut();
            let mut res = Vec::new();
            for p in remove.into_iter() {
                props.remove(&propkey(&p.namespace, &p.name));
                res.push((StatusCode::OK, p));
            }
            for p in set.into_iter() {
                res.push((StatusCode::OK, cloneprop(&p)));
                props.insert(propkey(&p.namespace, &p.name), p);
            }
            Ok(res)
        })();
        Box::pin(async move { r })
    }

    fn get_props<'a>(&'a self, path: &'a DavPath, do_content: bool) -> FsFuture<Vec<DavProp>> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let node_id = tree.lookup(path.as_bytes())?;
            let node = tree.get_node(node_id)?;
            let mut res = Vec::new();
            for (_, p) in node.get_props() {
                res.push(if do_content { p.clone() } else { cloneprop(p) });
            }
            Ok(res)
        })();
        Box::pin(async move { r })
    }

    fn get_prop<'a>(&'a self, path: &'a DavPath, prop: DavProp) -> FsFuture<Vec<u8>> {
        let r = (|| {
            let tree = &mut *self.tree.lock().unwrap();
            let node_id = tree.lookup(path.as_bytes())?;
            let node = tree.get_node(node_id)?;
            let p = node.get_props().get(&propkey(&prop.namespace, &prop.name)).ok_or(FsError::NotFound)?;
            p.xml.clone().ok_or(FsError::NotFound)
        })();
        Box::pin(async move { r })
    }

    fn box_clone(&self) -> Box<dyn DavFileSystem> {
        Box::new((*self).clone())
    }
}

// small helper.
fn propkey(ns: &Option<String>, name: &str) -> String {
    ns.as_deref().unwrap_or("").to_string() + name
}

// small helper.
fn cloneprop(p: &DavProp) -> DavProp {
    DavProp { name: p.name.clone(), namespace: p.namespace.clone(), prefix: p.prefix.clone(), xml: None }
}

impl DavDirEntry for MemFsDirEntry {
    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn metadata(&self) -> FsFuture<Box<dyn DavMetaData>> {
        let r: FsResult<Box<dyn DavMetaData>> = Ok(Box::new(self.clone()));
        Box::pin(async move { r })
    }
}

impl DavMetaData for MemFsDirEntry {
    fn len(&self) -> u64 {
        self.size
    }

    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.crtime)
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl DavFile for MemFsFile {
    fn metadata(&mut self) -> FsFuture<Box<dyn DavMetaData>> {
        let r = (|| {
            let tree = &*self.tree.lock().unwrap();
            let node = tree.get_node(self.node_id)?;
            Ok(Box::new(node.as_dirent(b"")) as Box<dyn DavMetaData>)
        })();
        Box::pin(async move { r })
    }

    fn write_bytes(&mut self, buf: bytes::Bytes) -> FsFuture<()> {
        let r = self.do_write(&buf);
        Box::pin(async move { r })
    }

    fn write_buf(&mut self, mut buf: Box<dyn bytes::Buf + Send>) -> FsFuture<()> {
        let r = (|| {
            while buf.has_remaining() {
                let n = {
                    let chunk = buf.chunk();
                    self.do_write(chunk)?;
                    chunk.len()
                };
                buf.advance(n);
            }
            Ok(())
        })();
        Box::pin(async move { r })
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<bytes::Bytes> {
        let r = (|| {
            let tree = &*self.tree.lock().unwrap();
            let node = tree.get_node(self.node_id)?;
            let file = node.as_file()?;
            let curlen = file.data.len();
            let mut start = self.pos;
            let mut end = self.pos + count;
            if start > curlen {
                start = curlen;
            }
            if end > curlen {
                end = curlen;
            }
            let data = bytes::Bytes::copy_from_slice(&file.data[start..end]);
            self.pos = end;
            Ok(data)
        })();
        Box::pin(async move { r })
    }

    fn seek(&mut self, pos: std::io::SeekFrom) -> FsFuture<u64> {
        let r = (|| {
            let (start, offset): (u64, i64) = match pos {
                std::io::SeekFrom::Start(npos) => {
                    self.pos = npos as usize;
                    return Ok(npos);
                },
                std::io::SeekFrom::Current(npos) => (self.pos as u64, npos),
                std::io::SeekFrom::End(npos) => {
                    let tree = &*self.tree.lock().unwrap();
                    let node = tree.get_node(self.node_id)?;
                    let curlen = node.as_file()?.data.len() as u64;
                    (curlen, npos)
                },
            };
            if offset < 0 {
                if -offset as u64 > start {
                    return Err(FsError::GeneralFailure);
                }
                self.pos = (start - (-offset as u64)) as usize;
            } else {
                self.pos = (start + offset as u64) as usize;
            }
            Ok(self.pos as u64)
        })();
        Box::pin(async move { r })
    }

    fn flush(&mut self) -> FsFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

impl MemFsFile {
    fn do_write(&mut self, buf: &[u8]) -> FsResult<()> {
        let tree = &mut *self.tree.lock().unwrap();
        let node = tree.get_node_mut(self.node_id)?;
        let file = node.as_file_mut()?;
        let start = if self.append { file.data.len() } else { self.pos };
        let end = start + buf.len();
        if end > file.data.len() {
            file.data.resize(end, 0);
        }
        file.data[start..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }
}

impl MemFsNode {
    fn new_dir() -> MemFsNode {
        MemFsNode::Dir(MemFsDirNode {
            crtime: SystemTime::now(),
            mtime:  SystemTime::now(),
            props:  HashMap::new(),
        })
    }

    fn new_file() -> MemFsNode {
        MemFsNode::File(MemFsFileNode {
            crtime: SystemTime::now(),
            mtime:  SystemTime::now(),
            props:  HashMap::new(),
            data:   Vec::new(),
        })
    }

    // helper to create MemFsDirEntry from a node.
    fn as_dirent(&self, name: &[u8]) -> MemFsDirEntry {
        let (is_dir, size, mtime, crtime) = match self {
            MemFsNode::File(file) => (false, file.data.len() as u64, file.mtime, file.crtime),
            MemFsNode::Dir(dir) => (true, 0, dir.mtime, dir.crtime),
        };
        MemFsDirEntry {
            name: name.to_vec(),
            mtime,
            crtime,
            is_dir,
            size,
        }
    }

    fn update_mtime(&mut self, tm: SystemTime) {
        match self {
            MemFsNode::Dir(d) => d.mtime = tm,
            MemFsNode::File(f) => f.mtime = tm,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, MemFsNode::Dir(_))
    }

    fn as_file(&self) -> FsResult<&MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }

    fn as_file_mut(&mut self) -> FsResult<&mut MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }

    fn get_props(&self) -> &HashMap<String, DavProp> {
        match self {
            MemFsNode::File(n) => &n.props,
            MemFsNode::Dir(d) => &d.props,
        }
    }

    fn get_props_mut(&mut self) -> &mut HashMap<String, DavProp> {
        match self {
            MemFsNode::File(n) => &mut n.props,
            MemFsNode::Dir(d) => &mut d.props,
        }
    }
}

trait TreeExt {
    fn lookup_segs(&self, segs: Vec<&[u8]>) -> FsResult<u64>;
    fn lookup(&self, path: &[u8]) -> FsResult<u64>;
    fn lookup_parent(&self, path: &[u8]) -> FsResult<u64>;
}

impl TreeExt for Tree {
    fn lookup_segs(&self, segs: Vec<&[u8]>) -> FsResult<u64> {
        let mut node_id = tree::ROOT_ID;
        let mut is_dir = true;
        for seg in segs.into_iter() {
            if !is_dir {
                return Err(FsError::Forbidden);
            }
            if self.get_node(node_id)?.is_dir() {
                node_id = self.get_child(node_id, seg)?;
            } else {
                is_dir = false;
            }
        }
        Ok(node_id)
    }

    fn lookup(&self, path: &[u8]) -> FsResult<u64> {
        self.lookup_segs(path.split(|&c| c == b'/').filter(|s| !s.is_empty()).collect())
    }

    // pop the last segment off the path, do a lookup, then
    // check if the result is a directory.
    fn lookup_parent(&self, path: &[u8]) -> FsResult<u64> {
        let mut segs: Vec<&[u8]> = path.split(|&c| c == b'/').filter(|s| !s.is_empty()).collect();
        segs.pop();
        let node_id = self.lookup_segs(segs)?;
        if !self.get_node(node_id)?.is_dir() {
            return Err(FsError::Forbidden);
        }
        Ok(node_id)
    }
}

// helper
fn file_name(path: &[u8]) -> Vec<u8> {
    path.split(|&c| c == b'/').filter(|s| !s.is_empty()).last().unwrap_or(b"").to_vec()
}
