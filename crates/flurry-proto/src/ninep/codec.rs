use super::types::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use core::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Rauth = 103,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
    Tstat = 124,
    Rstat = 125,
    Twstat = 126,
    Rwstat = 127,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            102 => Tauth,
            103 => Rauth,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            124 => Tstat,
            125 => Rstat,
            126 => Twstat,
            127 => Rwstat,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// A message that can be carried in a 9P frame.
///
/// `encode` writes everything after the `size[4]` prefix; `decode` receives
/// the same bytes back, i.e. `type[1] tag[2] body`.
pub trait Message: Sized {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError>;
    fn decode(src: Bytes) -> Result<Self, CodecError>;
}

/// Length-delimited 9P framing over a byte stream.
///
/// Decodes messages of type `D` and encodes messages of type `E`. Frames
/// larger than [`max_size`](Self::max_size) are rejected in both directions.
#[derive(Debug)]
pub struct NinepCodec<D, E> {
    max_size: u32,
    _marker: PhantomData<fn(E) -> D>,
}

/// Decodes T-messages, encodes R-messages.
pub type ServerCodec = NinepCodec<Request, Response>;

/// Decodes R-messages, encodes T-messages.
pub type ClientCodec = NinepCodec<Response, Request>;

impl<D, E> NinepCodec<D, E> {
    pub fn new() -> Self {
        Self::with_max_size(MAX_MSIZE)
    }

    pub fn with_max_size(max_size: u32) -> Self {
        Self {
            max_size,
            _marker: PhantomData,
        }
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Applies the `msize` agreed on by `Tversion`.
    pub fn set_max_size(&mut self, max_size: u32) {
        self.max_size = max_size;
    }
}

impl<D, E> Default for NinepCodec<D, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, E> Clone for NinepCodec<D, E> {
    fn clone(&self) -> Self {
        Self::with_max_size(self.max_size)
    }
}

impl<D: Message, E> Decoder for NinepCodec<D, E> {
    type Item = D;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let size = (&src[..4]).get_u32_le();
        if size < HEADER_SIZE || size > self.max_size {
            return Err(CodecError::FrameSize {
                size,
                max: self.max_size,
            });
        }
        let size = size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(size).freeze();
        frame.advance(4);
        D::decode(frame).map(Some)
    }
}

impl<D, E: Message> Encoder<E> for NinepCodec<D, E> {
    type Error = CodecError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        dst.put_u32_le(0);
        if let Err(err) = item.encode(dst) {
            dst.truncate(start);
            return Err(err);
        }
        let size = (dst.len() - start) as u64;
        if size > u64::from(self.max_size) {
            dst.truncate(start);
            return Err(CodecError::FrameSize {
                size: u32::try_from(size).unwrap_or(u32::MAX),
                max: self.max_size,
            });
        }
        dst[start..start + 4].copy_from_slice(&(size as u32).to_le_bytes());
        Ok(())
    }
}

impl Message for Request {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let ty = match &self.body {
            RequestBody::Version { .. } => MessageType::Tversion,
            RequestBody::Auth { .. } => MessageType::Tauth,
            RequestBody::Attach { .. } => MessageType::Tattach,
            RequestBody::Flush { .. } => MessageType::Tflush,
            RequestBody::Walk { .. } => MessageType::Twalk,
            RequestBody::Open { .. } => MessageType::Topen,
            RequestBody::Create { .. } => MessageType::Tcreate,
            RequestBody::Read { .. } => MessageType::Tread,
            RequestBody::Write { .. } => MessageType::Twrite,
            RequestBody::Clunk { .. } => MessageType::Tclunk,
            RequestBody::Remove { .. } => MessageType::Tremove,
            RequestBody::Stat { .. } => MessageType::Tstat,
            RequestBody::Wstat { .. } => MessageType::Twstat,
        };
        dst.put_u8(ty as u8);
        dst.put_u16_le(self.tag);
        match &self.body {
            RequestBody::Version { msize, version } => {
                dst.put_u32_le(*msize);
                put_str(dst, version)?;
            }
            RequestBody::Auth { afid, uname, aname } => {
                dst.put_u32_le(*afid);
                put_str(dst, uname)?;
                put_str(dst, aname)?;
            }
            RequestBody::Attach {
                fid,
                afid,
                uname,
                aname,
            } => {
                dst.put_u32_le(*fid);
                dst.put_u32_le(*afid);
                put_str(dst, uname)?;
                put_str(dst, aname)?;
            }
            RequestBody::Flush { oldtag } => dst.put_u16_le(*oldtag),
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => {
                if wnames.len() > MAXWELEM {
                    return Err(CodecError::TooLong("walk"));
                }
                dst.put_u32_le(*fid);
                dst.put_u32_le(*newfid);
                dst.put_u16_le(wnames.len() as u16);
                for name in wnames {
                    put_str(dst, name)?;
                }
            }
            RequestBody::Open { fid, mode } => {
                dst.put_u32_le(*fid);
                dst.put_u8(mode.raw());
            }
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => {
                dst.put_u32_le(*fid);
                put_str(dst, name)?;
                dst.put_u32_le(*perm);
                dst.put_u8(mode.raw());
            }
            RequestBody::Read { fid, offset, count } => {
                dst.put_u32_le(*fid);
                dst.put_u64_le(*offset);
                dst.put_u32_le(*count);
            }
            RequestBody::Write { fid, offset, data } => {
                dst.put_u32_le(*fid);
                dst.put_u64_le(*offset);
                put_data(dst, data)?;
            }
            RequestBody::Clunk { fid } | RequestBody::Remove { fid } | RequestBody::Stat { fid } => {
                dst.put_u32_le(*fid);
            }
            RequestBody::Wstat { fid, stat } => {
                dst.put_u32_le(*fid);
                put_nested_stat(dst, stat)?;
            }
        }
        Ok(())
    }

    fn decode(src: Bytes) -> Result<Self, CodecError> {
        let mut r = Reader(src);
        let ty = MessageType::try_from(r.u8()?)?;
        let tag = r.u16()?;
        let body = match ty {
            MessageType::Tversion => RequestBody::Version {
                msize: r.u32()?,
                version: r.string()?,
            },
            MessageType::Tauth => RequestBody::Auth {
                afid: r.u32()?,
                uname: r.string()?,
                aname: r.string()?,
            },
            MessageType::Tattach => RequestBody::Attach {
                fid: r.u32()?,
                afid: r.u32()?,
                uname: r.string()?,
                aname: r.string()?,
            },
            MessageType::Tflush => RequestBody::Flush { oldtag: r.u16()? },
            MessageType::Twalk => {
                let fid = r.u32()?;
                let newfid = r.u32()?;
                let n = r.u16()? as usize;
                if n > MAXWELEM {
                    return Err(CodecError::TooLong("walk"));
                }
                let wnames = (0..n).map(|_| r.string()).collect::<Result<_, _>>()?;
                RequestBody::Walk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            MessageType::Topen => RequestBody::Open {
                fid: r.u32()?,
                mode: OpenMode::from_raw(r.u8()?),
            },
            MessageType::Tcreate => RequestBody::Create {
                fid: r.u32()?,
                name: r.string()?,
                perm: r.u32()?,
                mode: OpenMode::from_raw(r.u8()?),
            },
            MessageType::Tread => RequestBody::Read {
                fid: r.u32()?,
                offset: r.u64()?,
                count: r.u32()?,
            },
            MessageType::Twrite => RequestBody::Write {
                fid: r.u32()?,
                offset: r.u64()?,
                data: r.data()?,
            },
            MessageType::Tclunk => RequestBody::Clunk { fid: r.u32()? },
            MessageType::Tremove => RequestBody::Remove { fid: r.u32()? },
            MessageType::Tstat => RequestBody::Stat { fid: r.u32()? },
            MessageType::Twstat => RequestBody::Wstat {
                fid: r.u32()?,
                stat: r.nested_stat()?,
            },
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        r.finish()?;
        Ok(Request { tag, body })
    }
}

impl Message for Response {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let ty = match &self.body {
            ResponseBody::Version { .. } => MessageType::Rversion,
            ResponseBody::Auth { .. } => MessageType::Rauth,
            ResponseBody::Error { .. } => MessageType::Rerror,
            ResponseBody::Flush => MessageType::Rflush,
            ResponseBody::Attach { .. } => MessageType::Rattach,
            ResponseBody::Walk { .. } => MessageType::Rwalk,
            ResponseBody::Open { .. } => MessageType::Ropen,
            ResponseBody::Create { .. } => MessageType::Rcreate,
            ResponseBody::Read { .. } => MessageType::Rread,
            ResponseBody::Write { .. } => MessageType::Rwrite,
            ResponseBody::Clunk => MessageType::Rclunk,
            ResponseBody::Remove => MessageType::Rremove,
            ResponseBody::Stat { .. } => MessageType::Rstat,
            ResponseBody::Wstat => MessageType::Rwstat,
        };
        dst.put_u8(ty as u8);
        dst.put_u16_le(self.tag);
        match &self.body {
            ResponseBody::Version { msize, version } => {
                dst.put_u32_le(*msize);
                put_str(dst, version)?;
            }
            ResponseBody::Auth { aqid: qid } | ResponseBody::Attach { qid } => put_qid(dst, qid),
            ResponseBody::Error { ename } => put_str(dst, ename)?,
            ResponseBody::Walk { qids } => {
                if qids.len() > MAXWELEM {
                    return Err(CodecError::TooLong("walk"));
                }
                dst.put_u16_le(qids.len() as u16);
                for qid in qids {
                    put_qid(dst, qid);
                }
            }
            ResponseBody::Open { qid, iounit } | ResponseBody::Create { qid, iounit } => {
                put_qid(dst, qid);
                dst.put_u32_le(*iounit);
            }
            ResponseBody::Read { data } => put_data(dst, data)?,
            ResponseBody::Write { count } => dst.put_u32_le(*count),
            ResponseBody::Stat { stat } => put_nested_stat(dst, stat)?,
            ResponseBody::Flush
            | ResponseBody::Clunk
            | ResponseBody::Remove
            | ResponseBody::Wstat => {}
        }
        Ok(())
    }

    fn decode(src: Bytes) -> Result<Self, CodecError> {
        let mut r = Reader(src);
        let ty = MessageType::try_from(r.u8()?)?;
        let tag = r.u16()?;
        let body = match ty {
            MessageType::Rversion => ResponseBody::Version {
                msize: r.u32()?,
                version: r.string()?,
            },
            MessageType::Rauth => ResponseBody::Auth { aqid: r.qid()? },
            MessageType::Rerror => ResponseBody::Error { ename: r.string()? },
            MessageType::Rflush => ResponseBody::Flush,
            MessageType::Rattach => ResponseBody::Attach { qid: r.qid()? },
            MessageType::Rwalk => {
                let n = r.u16()? as usize;
                if n > MAXWELEM {
                    return Err(CodecError::TooLong("walk"));
                }
                let qids = (0..n).map(|_| r.qid()).collect::<Result<_, _>>()?;
                ResponseBody::Walk { qids }
            }
            MessageType::Ropen => ResponseBody::Open {
                qid: r.qid()?,
                iounit: r.u32()?,
            },
            MessageType::Rcreate => ResponseBody::Create {
                qid: r.qid()?,
                iounit: r.u32()?,
            },
            MessageType::Rread => ResponseBody::Read { data: r.data()? },
            MessageType::Rwrite => ResponseBody::Write { count: r.u32()? },
            MessageType::Rclunk => ResponseBody::Clunk,
            MessageType::Rremove => ResponseBody::Remove,
            MessageType::Rstat => ResponseBody::Stat {
                stat: r.nested_stat()?,
            },
            MessageType::Rwstat => ResponseBody::Wstat,
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        r.finish()?;
        Ok(Response { tag, body })
    }
}

impl Stat {
    /// Appends this entry in directory-read layout: `size[2]` followed by
    /// the fields.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let body_len = u16::try_from(self.body_len()).map_err(|_| CodecError::TooLong("stat"))?;
        dst.reserve(self.encoded_len());
        dst.put_u16_le(body_len);
        dst.put_u16_le(self.ty);
        dst.put_u32_le(self.dev);
        put_qid(dst, &self.qid);
        dst.put_u32_le(self.mode);
        dst.put_u32_le(self.atime);
        dst.put_u32_le(self.mtime);
        dst.put_u64_le(self.length);
        put_str(dst, &self.name)?;
        put_str(dst, &self.uid)?;
        put_str(dst, &self.gid)?;
        put_str(dst, &self.muid)?;
        Ok(())
    }

    /// Reads one entry in directory-read layout from the front of `src`.
    pub fn decode(src: &mut Bytes) -> Result<Self, CodecError> {
        let mut r = Reader(core::mem::take(src));
        let stat = r.stat();
        *src = r.0;
        stat
    }
}

fn put_str(dst: &mut BytesMut, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len()).map_err(|_| CodecError::TooLong("string"))?;
    dst.put_u16_le(len);
    dst.put_slice(s.as_bytes());
    Ok(())
}

fn put_data(dst: &mut BytesMut, data: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(data.len()).map_err(|_| CodecError::TooLong("data"))?;
    dst.put_u32_le(len);
    dst.put_slice(data);
    Ok(())
}

fn put_qid(dst: &mut BytesMut, qid: &Qid) {
    dst.put_u8(qid.ty.raw());
    dst.put_u32_le(qid.version);
    dst.put_u64_le(qid.path);
}

/// `Rstat` and `Twstat` wrap the entry in a second length prefix.
fn put_nested_stat(dst: &mut BytesMut, stat: &Stat) -> Result<(), CodecError> {
    let len = u16::try_from(stat.encoded_len()).map_err(|_| CodecError::TooLong("stat"))?;
    dst.put_u16_le(len);
    stat.encode(dst)
}

/// Bounds-checked little-endian reads over a frame.
struct Reader(Bytes);

impl Reader {
    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.0.remaining() < n {
            return Err(CodecError::Truncated);
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.0.get_u8())
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.0.get_u16_le())
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.0.get_u32_le())
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        Ok(self.0.get_u64_le())
    }

    fn take(&mut self, n: usize) -> Result<Bytes, CodecError> {
        self.need(n)?;
        Ok(self.0.split_to(n))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn data(&mut self) -> Result<Bytes, CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn qid(&mut self) -> Result<Qid, CodecError> {
        Ok(Qid {
            ty: QidType::from_raw(self.u8()?),
            version: self.u32()?,
            path: self.u64()?,
        })
    }

    fn stat(&mut self) -> Result<Stat, CodecError> {
        let len = self.u16()? as usize;
        let mut r = Reader(self.take(len)?);
        let stat = Stat {
            ty: r.u16()?,
            dev: r.u32()?,
            qid: r.qid()?,
            mode: r.u32()?,
            atime: r.u32()?,
            mtime: r.u32()?,
            length: r.u64()?,
            name: r.string()?,
            uid: r.string()?,
            gid: r.string()?,
            muid: r.string()?,
        };
        r.finish()?;
        Ok(stat)
    }

    fn nested_stat(&mut self) -> Result<Stat, CodecError> {
        let len = self.u16()? as usize;
        let mut r = Reader(self.take(len)?);
        let stat = r.stat()?;
        r.finish()?;
        Ok(stat)
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.0.remaining() {
            0 => Ok(()),
            n => Err(CodecError::Trailing(n)),
        }
    }
}
