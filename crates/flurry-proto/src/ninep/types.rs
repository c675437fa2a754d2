use bytes::Bytes;
use std::io;

/// Protocol version string spoken by this codec.
pub const VERSION: &str = "9P2000";

/// Version string returned when the client's version is not understood.
pub const VERSION_UNKNOWN: &str = "unknown";

/// Largest frame this codec accepts before a `Tversion` lowers it.
pub const MAX_MSIZE: u32 = 65536;

/// Smallest `msize` worth negotiating: a header plus a useful payload.
pub const MIN_MSIZE: u32 = 256;

/// Bytes of a frame header: `size[4] type[1] tag[2]`.
pub const HEADER_SIZE: u32 = 7;

/// Bytes of an `Rread` header before its data: header plus `count[4]`.
pub const READ_HEADER_SIZE: u32 = HEADER_SIZE + 4;

/// Tag used by `Tversion`.
pub const NOTAG: u16 = 0xffff;

/// Fid meaning "no fid", used as `afid` when no authentication is done.
pub const NOFID: u32 = 0xffff_ffff;

/// Maximum number of path elements in one `Twalk`.
pub const MAXWELEM: usize = 16;

/// Directory bit in a file mode.
pub const DMDIR: u32 = 0x8000_0000;

/// Qid type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QidType(u8);

impl QidType {
    pub const DIR: Self = Self(0x80);
    pub const FILE: Self = Self(0x00);

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_dir(self) -> bool {
        self.0 & Self::DIR.0 != 0
    }
}

/// The server's unique identity for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Qid {
    pub ty: QidType,
    pub version: u32,
    pub path: u64,
}

impl Qid {
    /// Encoded size on the wire.
    pub const SIZE: usize = 13;

    pub const fn dir(path: u64) -> Self {
        Self {
            ty: QidType::DIR,
            version: 0,
            path,
        }
    }

    pub const fn file(path: u64) -> Self {
        Self {
            ty: QidType::FILE,
            version: 0,
            path,
        }
    }
}

/// Open mode flags of `Topen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(u8);

impl OpenMode {
    pub const READ: Self = Self(0);
    pub const WRITE: Self = Self(1);
    pub const RDWR: Self = Self(2);
    pub const EXEC: Self = Self(3);
    pub const TRUNC: u8 = 0x10;
    pub const RCLOSE: u8 = 0x40;

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn allows_read(self) -> bool {
        matches!(self.0 & 0x03, 0 | 2 | 3)
    }

    pub const fn allows_write(self) -> bool {
        matches!(self.0 & 0x03, 1 | 2) || self.0 & Self::TRUNC != 0
    }

    pub const fn remove_on_close(self) -> bool {
        self.0 & Self::RCLOSE != 0
    }
}

/// A directory entry as carried by `Rstat` and directory reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub ty: u16,
    pub dev: u32,
    pub qid: Qid,
    pub mode: u32,
    pub atime: u32,
    pub mtime: u32,
    pub length: u64,
    pub name: String,
    pub uid: String,
    pub gid: String,
    pub muid: String,
}

impl Stat {
    /// Size of the encoded entry, excluding its own leading `size[2]`.
    pub fn body_len(&self) -> usize {
        2 + 4
            + Qid::SIZE
            + 4
            + 4
            + 4
            + 8
            + 2
            + self.name.len()
            + 2
            + self.uid.len()
            + 2
            + self.gid.len()
            + 2
            + self.muid.len()
    }

    /// Size of the encoded entry including its leading `size[2]`.
    pub fn encoded_len(&self) -> usize {
        2 + self.body_len()
    }
}

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub tag: u16,
    pub body: RequestBody,
}

/// The T-messages of 9P2000.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Version {
        msize: u32,
        version: String,
    },
    Auth {
        afid: u32,
        uname: String,
        aname: String,
    },
    Attach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
    },
    Flush {
        oldtag: u16,
    },
    Walk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    Open {
        fid: u32,
        mode: OpenMode,
    },
    Create {
        fid: u32,
        name: String,
        perm: u32,
        mode: OpenMode,
    },
    Read {
        fid: u32,
        offset: u64,
        count: u32,
    },
    Write {
        fid: u32,
        offset: u64,
        data: Bytes,
    },
    Clunk {
        fid: u32,
    },
    Remove {
        fid: u32,
    },
    Stat {
        fid: u32,
    },
    Wstat {
        fid: u32,
        stat: Stat,
    },
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub tag: u16,
    pub body: ResponseBody,
}

/// The R-messages of 9P2000.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Version { msize: u32, version: String },
    Auth { aqid: Qid },
    Error { ename: String },
    Flush,
    Attach { qid: Qid },
    Walk { qids: Vec<Qid> },
    Open { qid: Qid, iounit: u32 },
    Create { qid: Qid, iounit: u32 },
    Read { data: Bytes },
    Write { count: u32 },
    Clunk,
    Remove,
    Stat { stat: Stat },
    Wstat,
}

/// Possible errors produced while encoding or decoding 9P frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame ended before a field was complete.
    #[error("truncated frame")]
    Truncated,
    /// Encountered an unknown or unexpected message type.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Encountered malformed UTF-8 data.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// Declared frame size is outside `HEADER_SIZE..=max_size`.
    #[error("invalid frame size {size} (max {max})")]
    FrameSize { size: u32, max: u32 },
    /// A string or list exceeds what its length prefix can express.
    #[error("{0} too long")]
    TooLong(&'static str),
    /// Bytes left over after a message body.
    #[error("{0} trailing bytes in frame")]
    Trailing(usize),
    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_permissions() {
        assert!(OpenMode::READ.allows_read());
        assert!(!OpenMode::READ.allows_write());
        assert!(OpenMode::WRITE.allows_write());
        assert!(!OpenMode::WRITE.allows_read());
        assert!(OpenMode::RDWR.allows_read() && OpenMode::RDWR.allows_write());
        assert!(OpenMode::from_raw(OpenMode::TRUNC).allows_write());
        assert!(OpenMode::from_raw(OpenMode::RCLOSE).remove_on_close());
    }

    #[test]
    fn stat_length_accounts_for_strings() {
        let stat = Stat {
            ty: 0,
            dev: 0,
            qid: Qid::file(1),
            mode: 0o444,
            atime: 0,
            mtime: 0,
            length: 0,
            name: "clone".into(),
            uid: "glenda".into(),
            gid: "glenda".into(),
            muid: String::new(),
        };
        // 39 fixed bytes + 8 for the string lengths + string contents
        assert_eq!(stat.body_len(), 39 + 8 + 5 + 6 + 6);
        assert_eq!(stat.encoded_len(), stat.body_len() + 2);
    }
}
