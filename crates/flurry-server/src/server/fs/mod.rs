//! The synthetic file tree served over 9P.
//!
//! ```text
//! /
//! ├── clone              read: create session <n>, return "<n>"
//! ├── stats              read: "<requests>,<ids>\n"
//! └── <n>/
//!     ├── ctl            write: "<count>"; read: name of the newest data file
//!     └── <datafile>     read: <count> records of 16 hex digits + '\n'
//! ```
//!
//! A [`Namespace`] owns the tree. Nodes are addressed by [`Node`] values,
//! which the 9P session engine stores in its fid table and hands back on every
//! operation; reads and writes are dispatched to a per-kind handler module.
//! A stats-only namespace exports nothing but `/stats`.

mod clone;
mod ctl;
mod data;
mod stats;

use crate::server::service::IdService;
use bytes::{Bytes, BytesMut};
use chrono::{Local, Utc};
use flurry_proto::{
    Error, Result, SnowflakeId,
    ninep::{DMDIR, OpenMode, Qid, Stat},
};
use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;

const ROOT_PATH: u64 = 0;
const CLONE_PATH: u64 = 1;
const STATS_PATH: u64 = 2;
const FIRST_DYNAMIC_PATH: u64 = 3;

const CONTROL_NAME: &str = "ctl";

/// Which files a namespace exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `clone`, `stats` and the session directories.
    Full,
    /// Only `stats`.
    StatsOnly,
}

/// A file or directory in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Root,
    Clone,
    Stats,
    Session(u64),
    Control(u64),
    Data { session: u64, name: String },
}

struct Session {
    dir_path: u64,
    control_path: u64,
    created: u32,
    /// Name of the last data file a `ctl` write produced.
    control: String,
    data: BTreeMap<String, DataFile>,
}

struct DataFile {
    path: u64,
    created: u32,
    ids: Vec<SnowflakeId>,
}

/// The file tree of one listener, backed by the process-wide ID service.
pub struct Namespace {
    service: IdService,
    layout: Layout,
    owner: String,
    max_batch: u64,
    started: u32,
    clones: AtomicU64,
    next_path: AtomicU64,
    sessions: RwLock<BTreeMap<u64, Session>>,
}

impl Namespace {
    pub fn new(service: IdService, layout: Layout, owner: String, max_batch: u64) -> Self {
        Self {
            service,
            layout,
            owner,
            max_batch,
            started: unix_seconds(),
            clones: AtomicU64::new(0),
            next_path: AtomicU64::new(FIRST_DYNAMIC_PATH),
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn service(&self) -> &IdService {
        &self.service
    }

    /// Resolves `name` inside the directory `from`.
    pub fn walk(&self, from: &Node, name: &str) -> Result<Node> {
        match (from, name) {
            (Node::Root, "..") | (Node::Session(_), "..") => Ok(Node::Root),
            (Node::Root, "stats") => Ok(Node::Stats),
            (Node::Root, "clone") if self.layout == Layout::Full => Ok(Node::Clone),
            (Node::Root, name) if self.layout == Layout::Full => {
                let id = name.parse::<u64>().map_err(|_| Error::NotFound)?;
                // "01" and "+1" parse too, but only the canonical name exists.
                if id.to_string() != name || !self.sessions.read().contains_key(&id) {
                    return Err(Error::NotFound);
                }
                Ok(Node::Session(id))
            }
            (Node::Session(id), CONTROL_NAME) => {
                self.with_session(*id, |_| ())?;
                Ok(Node::Control(*id))
            }
            (Node::Session(id), name) => {
                let exists = self.with_session(*id, |s| s.data.contains_key(name))?;
                if !exists {
                    return Err(Error::NotFound);
                }
                Ok(Node::Data {
                    session: *id,
                    name: name.to_owned(),
                })
            }
            _ => Err(Error::NotFound),
        }
    }

    pub fn qid(&self, node: &Node) -> Result<Qid> {
        Ok(self.stat(node)?.qid)
    }

    pub fn stat(&self, node: &Node) -> Result<Stat> {
        let (qid, mode, time, length, name) = match node {
            Node::Root => (
                Qid::dir(ROOT_PATH),
                DMDIR | 0o555,
                self.started,
                0,
                "/".to_owned(),
            ),
            Node::Clone => (
                Qid::file(CLONE_PATH),
                0o444,
                self.started,
                0,
                "clone".to_owned(),
            ),
            Node::Stats => (
                Qid::file(STATS_PATH),
                0o444,
                self.started,
                0,
                "stats".to_owned(),
            ),
            Node::Session(id) => self.with_session(*id, |s| {
                (
                    Qid::dir(s.dir_path),
                    DMDIR | 0o777,
                    s.created,
                    0,
                    id.to_string(),
                )
            })?,
            Node::Control(id) => self.with_session(*id, |s| {
                (
                    Qid::file(s.control_path),
                    0o666,
                    s.created,
                    s.control.len() as u64,
                    CONTROL_NAME.to_owned(),
                )
            })?,
            Node::Data { session, name } => self.with_data(*session, name, |d| {
                (
                    Qid::file(d.path),
                    0o444,
                    d.created,
                    data::length(d.ids.len()),
                    name.clone(),
                )
            })?,
        };

        Ok(Stat {
            ty: 0,
            dev: 0,
            qid,
            mode,
            atime: time,
            mtime: time,
            length,
            name,
            uid: self.owner.clone(),
            gid: self.owner.clone(),
            muid: self.owner.clone(),
        })
    }

    /// Checks that `node` may be opened with `mode`.
    pub fn open(&self, node: &Node, mode: OpenMode) -> Result<Qid> {
        let qid = self.qid(node)?;
        let writable = matches!(node, Node::Control(_));
        if (mode.allows_write() && !writable) || mode.remove_on_close() {
            return Err(Error::PermissionDenied);
        }
        Ok(qid)
    }

    pub fn read(&self, node: &Node, offset: u64, count: u32) -> Result<Bytes> {
        match node {
            Node::Root | Node::Session(_) => self.read_dir(node, offset, count),
            Node::Clone => clone::read(self, offset, count),
            Node::Stats => Ok(stats::read(self, offset, count)),
            Node::Control(id) => ctl::read(self, *id, offset, count),
            Node::Data { session, name } => {
                self.with_data(*session, name, |d| data::read(&d.ids, offset, count))
            }
        }
    }

    /// Writes to `node`, returning the number of bytes consumed.
    ///
    /// A `ctl` write generates its whole batch before returning; callers on
    /// an async runtime should run it on the blocking pool.
    pub fn write(&self, node: &Node, _offset: u64, data: &[u8]) -> Result<u32> {
        match node {
            Node::Control(id) => {
                ctl::write(self, *id, data, Local::now())?;
                Ok(data.len() as u32)
            }
            _ => Err(Error::PermissionDenied),
        }
    }

    /// Reads whole directory entries starting at byte `offset` of the
    /// listing, as many as fit in `count` bytes.
    fn read_dir(&self, node: &Node, offset: u64, count: u32) -> Result<Bytes> {
        let children = self.children(node)?;
        let mut out = BytesMut::new();
        let mut pos = 0u64;
        for child in children {
            // Children removed since the listing was taken are skipped.
            let Ok(stat) = self.stat(&child) else {
                continue;
            };
            let len = stat.encoded_len() as u64;
            if pos >= offset {
                if out.len() as u64 + len > u64::from(count) {
                    break;
                }
                stat.encode(&mut out)?;
            }
            pos += len;
        }
        Ok(out.freeze())
    }

    fn children(&self, node: &Node) -> Result<Vec<Node>> {
        match node {
            Node::Root => {
                let mut children = Vec::new();
                if self.layout == Layout::Full {
                    children.push(Node::Clone);
                }
                children.push(Node::Stats);
                if self.layout == Layout::Full {
                    children.extend(self.sessions.read().keys().map(|id| Node::Session(*id)));
                }
                Ok(children)
            }
            Node::Session(id) => self.with_session(*id, |s| {
                std::iter::once(Node::Control(*id))
                    .chain(s.data.keys().map(|name| Node::Data {
                        session: *id,
                        name: name.clone(),
                    }))
                    .collect()
            }),
            _ => Err(Error::NotFound),
        }
    }

    fn alloc_path(&self) -> u64 {
        self.next_path.fetch_add(1, Ordering::Relaxed)
    }

    fn create_session(&self, id: u64) -> Result<()> {
        let session = Session {
            dir_path: self.alloc_path(),
            control_path: self.alloc_path(),
            created: unix_seconds(),
            control: String::new(),
            data: BTreeMap::new(),
        };
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return Err(Error::ResourceCreation {
                name: id.to_string(),
                reason: "session exists".into(),
            });
        }
        sessions.insert(id, session);
        Ok(())
    }

    fn remove_session(&self, id: u64) {
        self.sessions.write().remove(&id);
    }

    fn create_data_file(&self, session: u64, name: &str) -> Result<()> {
        let path = self.alloc_path();
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(&session).ok_or(Error::NotFound)?;
        if session.data.contains_key(name) || name == CONTROL_NAME {
            return Err(Error::ResourceCreation {
                name: name.to_owned(),
                reason: "file exists".into(),
            });
        }
        session.data.insert(
            name.to_owned(),
            DataFile {
                path,
                created: unix_seconds(),
                ids: Vec::new(),
            },
        );
        Ok(())
    }

    fn with_session<R>(&self, id: u64, f: impl FnOnce(&Session) -> R) -> Result<R> {
        self.sessions.read().get(&id).map(f).ok_or(Error::NotFound)
    }

    fn with_session_mut<R>(&self, id: u64, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        self.sessions
            .write()
            .get_mut(&id)
            .map(f)
            .ok_or(Error::NotFound)
    }

    fn with_data<R>(&self, session: u64, name: &str, f: impl FnOnce(&DataFile) -> R) -> Result<R> {
        self.sessions
            .read()
            .get(&session)
            .and_then(|s| s.data.get(name))
            .map(f)
            .ok_or(Error::NotFound)
    }
}

/// Returns the part of `content` a read of `count` bytes at `offset` sees.
fn slice(content: &[u8], offset: u64, count: u32) -> Bytes {
    let Ok(start) = usize::try_from(offset) else {
        return Bytes::new();
    };
    if start >= content.len() {
        return Bytes::new();
    }
    let end = content.len().min(start.saturating_add(count as usize));
    Bytes::copy_from_slice(&content[start..end])
}

fn unix_seconds() -> u32 {
    u32::try_from(Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::tests::test_service;
    use flurry_proto::ninep::QidType;

    pub(super) fn namespace() -> Namespace {
        Namespace::new(test_service(), Layout::Full, "glenda".into(), 1_000_000)
    }

    fn read_all(ns: &Namespace, node: &Node) -> Bytes {
        ns.read(node, 0, u32::MAX).unwrap()
    }

    fn list(ns: &Namespace, node: &Node) -> Vec<String> {
        let mut buf = read_all(ns, node);
        let mut names = Vec::new();
        while !buf.is_empty() {
            names.push(Stat::decode(&mut buf).unwrap().name);
        }
        names
    }

    #[test]
    fn session_flow() {
        let ns = namespace();

        assert_eq!(read_all(&ns, &Node::Clone), "1");
        assert_eq!(read_all(&ns, &Node::Clone), "2");

        let session = ns.walk(&Node::Root, "1").unwrap();
        let ctl = ns.walk(&session, "ctl").unwrap();
        assert_eq!(ns.write(&ctl, 0, b"5").unwrap(), 1);

        let name = String::from_utf8(read_all(&ns, &ctl).to_vec()).unwrap();
        assert!(!name.is_empty());

        let data = ns.walk(&session, &name).unwrap();
        let content = read_all(&ns, &data);
        assert_eq!(content.len(), 85);
        for record in content.chunks(17) {
            assert_eq!(record[16], b'\n');
            assert!(
                record[..16]
                    .iter()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
            );
        }
        assert_eq!(ns.stat(&data).unwrap().length, 85);
        assert_eq!(ns.service().stats().snapshot().ids, 5);
    }

    #[test]
    fn partial_reads_match_full_read() {
        let ns = namespace();
        read_all(&ns, &Node::Clone);
        ns.write(&Node::Control(1), 0, b"5\n").unwrap();
        let name = String::from_utf8(read_all(&ns, &Node::Control(1)).to_vec()).unwrap();
        let data = Node::Data { session: 1, name };

        let full = read_all(&ns, &data);
        assert_eq!(ns.read(&data, 12, 10).unwrap(), full.slice(12..22));
        assert_eq!(ns.read(&data, 80, 100).unwrap(), full.slice(80..));
        assert!(ns.read(&data, 85, 10).unwrap().is_empty());
        assert!(ns.read(&data, 1_000, 10).unwrap().is_empty());
    }

    #[test]
    fn stats_file_tracks_counters() {
        let ns = namespace();
        assert_eq!(read_all(&ns, &Node::Stats), "0,0\n");

        ns.service().stats().record_request();
        read_all(&ns, &Node::Clone);
        ns.write(&Node::Control(1), 0, b"7").unwrap();
        assert_eq!(read_all(&ns, &Node::Stats), "1,7\n");
        assert_eq!(ns.read(&Node::Stats, 2, 1).unwrap(), "7");
    }

    #[test]
    fn walks() {
        let ns = namespace();
        assert_eq!(ns.walk(&Node::Root, "clone").unwrap(), Node::Clone);
        assert_eq!(ns.walk(&Node::Root, "stats").unwrap(), Node::Stats);
        assert_eq!(ns.walk(&Node::Root, "..").unwrap(), Node::Root);
        assert!(matches!(ns.walk(&Node::Root, "1"), Err(Error::NotFound)));
        assert!(matches!(ns.walk(&Node::Root, "x"), Err(Error::NotFound)));
        assert!(matches!(ns.walk(&Node::Stats, "x"), Err(Error::NotFound)));

        read_all(&ns, &Node::Clone);
        let session = ns.walk(&Node::Root, "1").unwrap();
        assert_eq!(ns.walk(&session, "..").unwrap(), Node::Root);
        assert!(matches!(ns.walk(&session, "nope"), Err(Error::NotFound)));
        for alias in ["01", "+1", " 1"] {
            assert!(matches!(ns.walk(&Node::Root, alias), Err(Error::NotFound)));
        }
    }

    #[test]
    fn stat_modes_and_qids() {
        let ns = namespace();
        read_all(&ns, &Node::Clone);

        let root = ns.stat(&Node::Root).unwrap();
        assert_eq!(root.mode, DMDIR | 0o555);
        assert!(root.qid.ty.is_dir());

        let session = ns.stat(&Node::Session(1)).unwrap();
        assert_eq!(session.name, "1");
        assert_eq!(session.mode, DMDIR | 0o777);
        assert_eq!(session.uid, "glenda");

        let ctl = ns.stat(&Node::Control(1)).unwrap();
        assert_eq!(ctl.qid.ty, QidType::FILE);
        assert_ne!(ctl.qid.path, session.qid.path);
        assert_eq!(ns.stat(&Node::Clone).unwrap().mode, 0o444);
    }

    #[test]
    fn directory_listings() {
        let ns = namespace();
        read_all(&ns, &Node::Clone);
        read_all(&ns, &Node::Clone);
        assert_eq!(list(&ns, &Node::Root), ["clone", "stats", "1", "2"]);

        ns.write(&Node::Control(2), 0, b"1").unwrap();
        let names = list(&ns, &Node::Session(2));
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "ctl");
        assert!(list(&ns, &Node::Session(1)) == ["ctl"]);
    }

    #[test]
    fn directory_reads_return_whole_entries() {
        let ns = namespace();
        let first = ns.stat(&Node::Clone).unwrap().encoded_len();

        let head = ns.read(&Node::Root, 0, first as u32 + 1).unwrap();
        assert_eq!(head.len(), first);

        let rest = ns.read(&Node::Root, first as u64, u32::MAX).unwrap();
        let mut rest_buf = rest.clone();
        assert_eq!(Stat::decode(&mut rest_buf).unwrap().name, "stats");
        assert!(rest_buf.is_empty());

        assert!(ns.read(&Node::Root, 0, 4).unwrap().is_empty());
    }

    #[test]
    fn open_permissions() {
        let ns = namespace();
        read_all(&ns, &Node::Clone);
        assert!(ns.open(&Node::Clone, OpenMode::READ).is_ok());
        assert!(matches!(
            ns.open(&Node::Clone, OpenMode::WRITE),
            Err(Error::PermissionDenied)
        ));
        assert!(matches!(
            ns.open(&Node::Root, OpenMode::RDWR),
            Err(Error::PermissionDenied)
        ));
        assert!(ns.open(&Node::Control(1), OpenMode::RDWR).is_ok());
        assert!(matches!(
            ns.open(&Node::Control(9), OpenMode::READ),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            ns.write(&Node::Stats, 0, b"1"),
            Err(Error::PermissionDenied)
        ));
    }

    #[test]
    fn stats_only_layout() {
        let ns = Namespace::new(test_service(), Layout::StatsOnly, "glenda".into(), 1);
        assert_eq!(list(&ns, &Node::Root), ["stats"]);
        assert!(matches!(ns.walk(&Node::Root, "clone"), Err(Error::NotFound)));
        assert_eq!(read_all(&ns, &Node::Stats), "0,0\n");
    }

    #[test]
    fn slicing() {
        assert_eq!(slice(b"12,34\n", 0, 100), "12,34\n");
        assert_eq!(slice(b"12,34\n", 3, 2), "34");
        assert!(slice(b"12,34\n", 6, 2).is_empty());
        assert!(slice(b"12,34\n", u64::MAX, 2).is_empty());
    }
}
