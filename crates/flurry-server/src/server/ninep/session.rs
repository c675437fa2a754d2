use crate::server::fs::{Namespace, Node};
use flurry_proto::{
    Error, Result,
    ninep::{
        HEADER_SIZE, MAX_MSIZE, MIN_MSIZE, NOFID, OpenMode, READ_HEADER_SIZE, Request,
        RequestBody, ResponseBody, VERSION, VERSION_UNKNOWN,
    },
};
use std::{collections::HashMap, sync::Arc};

struct Fid {
    node: Node,
    open: Option<OpenMode>,
}

/// Per-connection 9P state: the negotiated message size and the fid table.
///
/// Requests are answered one at a time in arrival order, so `Tflush` never
/// has anything left to cancel.
pub struct Session {
    ns: Arc<Namespace>,
    msize: u32,
    fids: HashMap<u32, Fid>,
}

impl Session {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self {
            ns,
            msize: MAX_MSIZE,
            fids: HashMap::new(),
        }
    }

    /// The largest frame either side may send.
    pub fn msize(&self) -> u32 {
        self.msize
    }

    fn iounit(&self) -> u32 {
        self.msize - READ_HEADER_SIZE
    }

    /// Answers one request. Failures become `Rerror` carrying the error text.
    pub async fn handle(&mut self, request: Request) -> ResponseBody {
        match self.dispatch(request.body).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(tag = request.tag, "request failed: {e}");
                ResponseBody::Error {
                    ename: fit_ename(e.to_string(), self.msize),
                }
            }
        }
    }

    async fn dispatch(&mut self, body: RequestBody) -> Result<ResponseBody> {
        match body {
            RequestBody::Version { msize, version } => self.version(msize, &version),
            RequestBody::Auth { .. } => Err(Error::Unsupported("authentication")),
            RequestBody::Attach { fid, afid, .. } => {
                if afid != NOFID {
                    return Err(Error::Unsupported("authentication"));
                }
                if self.fids.contains_key(&fid) {
                    return Err(Error::FidInUse(fid));
                }
                let qid = self.ns.qid(&Node::Root)?;
                self.fids.insert(
                    fid,
                    Fid {
                        node: Node::Root,
                        open: None,
                    },
                );
                Ok(ResponseBody::Attach { qid })
            }
            RequestBody::Flush { .. } => Ok(ResponseBody::Flush),
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => self.walk(fid, newfid, &wnames),
            RequestBody::Open { fid, mode } => {
                let iounit = self.iounit();
                let entry = self.fids.get_mut(&fid).ok_or(Error::UnknownFid(fid))?;
                if entry.open.is_some() {
                    return Err(Error::Unsupported("reopening a fid"));
                }
                let qid = self.ns.open(&entry.node, mode)?;
                entry.open = Some(mode);
                Ok(ResponseBody::Open { qid, iounit })
            }
            RequestBody::Create { .. } => Err(Error::PermissionDenied),
            RequestBody::Read { fid, offset, count } => {
                let count = count.min(self.iounit());
                let node = self.opened(fid, OpenMode::allows_read)?;
                let data = self.ns.read(node, offset, count)?;
                Ok(ResponseBody::Read { data })
            }
            RequestBody::Write { fid, offset, data } => {
                let node = self.opened(fid, OpenMode::allows_write)?.clone();
                let ns = Arc::clone(&self.ns);
                let count = tokio::task::spawn_blocking(move || ns.write(&node, offset, &data))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))??;
                Ok(ResponseBody::Write { count })
            }
            RequestBody::Clunk { fid } => {
                self.fids.remove(&fid).ok_or(Error::UnknownFid(fid))?;
                Ok(ResponseBody::Clunk)
            }
            RequestBody::Remove { fid } => {
                // The fid is clunked even though the remove itself fails.
                self.fids.remove(&fid).ok_or(Error::UnknownFid(fid))?;
                Err(Error::PermissionDenied)
            }
            RequestBody::Stat { fid } => {
                let entry = self.fids.get(&fid).ok_or(Error::UnknownFid(fid))?;
                let stat = self.ns.stat(&entry.node)?;
                Ok(ResponseBody::Stat { stat })
            }
            RequestBody::Wstat { .. } => Err(Error::PermissionDenied),
        }
    }

    fn version(&mut self, msize: u32, version: &str) -> Result<ResponseBody> {
        if msize < MIN_MSIZE {
            return Err(Error::Unsupported("msize below 256"));
        }
        // A new version starts a new session.
        self.fids.clear();
        self.msize = msize.min(MAX_MSIZE);
        let version = if version.starts_with(VERSION) {
            VERSION
        } else {
            VERSION_UNKNOWN
        };
        Ok(ResponseBody::Version {
            msize: self.msize,
            version: version.to_owned(),
        })
    }

    fn walk(&mut self, fid: u32, newfid: u32, wnames: &[String]) -> Result<ResponseBody> {
        let entry = self.fids.get(&fid).ok_or(Error::UnknownFid(fid))?;
        if entry.open.is_some() {
            return Err(Error::Unsupported("walking an open fid"));
        }
        if newfid != fid && self.fids.contains_key(&newfid) {
            return Err(Error::FidInUse(newfid));
        }

        let mut node = entry.node.clone();
        let mut qids = Vec::with_capacity(wnames.len());
        for name in wnames {
            match self.ns.walk(&node, name) {
                Ok(next) => {
                    qids.push(self.ns.qid(&next)?);
                    node = next;
                }
                Err(e) if qids.is_empty() => return Err(e),
                Err(_) => break,
            }
        }

        // Only a complete walk binds newfid.
        if qids.len() == wnames.len() {
            self.fids.insert(newfid, Fid { node, open: None });
        }
        Ok(ResponseBody::Walk { qids })
    }

    fn opened(&self, fid: u32, allowed: fn(OpenMode) -> bool) -> Result<&Node> {
        let entry = self.fids.get(&fid).ok_or(Error::UnknownFid(fid))?;
        match entry.open {
            Some(mode) if allowed(mode) => Ok(&entry.node),
            _ => Err(Error::PermissionDenied),
        }
    }
}

/// Truncates `ename` so that an `Rerror` carrying it fits in `msize`.
fn fit_ename(mut ename: String, msize: u32) -> String {
    let max = msize.saturating_sub(HEADER_SIZE + 2) as usize;
    if ename.len() > max {
        let mut end = max;
        while !ename.is_char_boundary(end) {
            end -= 1;
        }
        ename.truncate(end);
    }
    ename
}
