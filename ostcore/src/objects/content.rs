//! The content codec: conversions between the physical on-disk file
//! representations (bare, bare-user, archive-z2) and the abstract
//! `(stream, file-info, xattrs)` triple (spec §4.2, §3 "Storage mode").

use super::format::Xattr;
use super::variant::Value;
use crate::error::{Error, Result};
use std::io::{Read, Write};

/// POSIX identity and size of a loaded file object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// Owning user id (canonicalized to 0 under `BARE_USER_ONLY`).
    pub uid: u32,
    /// Owning group id (canonicalized to 0 under `BARE_USER_ONLY`).
    pub gid: u32,
    /// Full POSIX mode, including the `S_IFMT` type bits.
    pub mode: u32,
    /// Uncompressed content size in bytes (link target length for symlinks).
    pub size: u64,
}

impl FileInfo {
    /// True if the `S_IFLNK` bit is set.
    pub fn is_symlink(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFLNK
    }
}

/// The payload of a loaded file object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Regular file content.
    Regular(Vec<u8>),
    /// Symlink target, as raw bytes.
    Symlink(Vec<u8>),
}

/// A fully decoded file object: identity, xattrs, and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// POSIX identity.
    pub info: FileInfo,
    /// Extended attributes (empty when `core/disable-xattrs` is set, or
    /// canonicalized to empty under `BARE_USER_ONLY`).
    pub xattrs: Vec<Xattr>,
    /// File payload.
    pub payload: Payload,
}

/// Encode a [`FileContent`] as an archive-z2 `.filez` blob: a length-framed
/// header tuple `(uid, gid, mode, size, xattrs)` followed by the payload
/// (symlink target bytes verbatim, or zlib-compressed regular-file bytes).
pub fn encode_archive(content: &FileContent, zlib_level: u32) -> Result<Vec<u8>> {
    let header = Value::Tuple(vec![
        Value::U32(content.info.uid),
        Value::U32(content.info.gid),
        Value::U32(content.info.mode),
        Value::U64(content.info.size),
        super::format::xattrs_to_value(&content.xattrs),
    ]);
    let mut out = Vec::new();
    let header_bytes = header.to_bytes();
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&header_bytes);
    match &content.payload {
        Payload::Symlink(target) => out.extend_from_slice(target),
        Payload::Regular(bytes) => {
            let level = zlib_level.clamp(1, 9);
            let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
            enc.write_all(bytes)
                .map_err(|e| Error::corruption(format!("zlib compress: {e}")))?;
            let compressed = enc
                .finish()
                .map_err(|e| Error::corruption(format!("zlib finish: {e}")))?;
            out.extend_from_slice(&compressed);
        }
    }
    Ok(out)
}

/// Decode an archive-z2 `.filez` blob produced by [`encode_archive`].
pub fn decode_archive(data: &[u8]) -> Result<FileContent> {
    if data.len() < 4 {
        return Err(Error::corruption("archive object truncated"));
    }
    let header_len = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
    let rest = &data[4..];
    if rest.len() < header_len {
        return Err(Error::corruption("archive object header truncated"));
    }
    let header = Value::from_bytes(&rest[..header_len])?;
    let t = header.as_tuple()?;
    if t.len() != 5 {
        return Err(Error::corruption("archive header: expected 5 fields"));
    }
    let info = FileInfo {
        uid: t[0].as_u32()?,
        gid: t[1].as_u32()?,
        mode: t[2].as_u32()?,
        size: t[3].as_u64()?,
    };
    let xattrs = super::format::xattrs_from_value(&t[4])?;
    let payload_bytes = &rest[header_len..];
    let payload = if info.is_symlink() {
        Payload::Symlink(payload_bytes.to_vec())
    } else {
        let mut dec = flate2::read::ZlibDecoder::new(payload_bytes);
        let mut buf = Vec::with_capacity(info.size as usize);
        dec.read_to_end(&mut buf)
            .map_err(|e| Error::corruption(format!("zlib decompress: {e}")))?;
        Payload::Regular(buf)
    };
    Ok(FileContent { info, xattrs, payload })
}

/// Encode the `user.ostreemeta` xattr payload for a bare-user regular
/// file: the same `(uuua(ayay))` layout as `DIR_META` (spec invariant 4).
pub fn encode_bare_user_meta(info: &FileInfo, xattrs: &[Xattr]) -> Vec<u8> {
    super::format::DirMeta {
        uid: info.uid,
        gid: info.gid,
        mode: info.mode,
        xattrs: xattrs.to_vec(),
    }
    .to_bytes()
}

/// Decode a `user.ostreemeta` xattr payload.
pub fn decode_bare_user_meta(data: &[u8]) -> Result<super::format::DirMeta> {
    super::format::DirMeta::from_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_round_trips_regular_file() {
        let content = FileContent {
            info: FileInfo {
                uid: 0,
                gid: 0,
                mode: libc::S_IFREG | 0o644,
                size: 11,
            },
            xattrs: vec![(b"user.foo".to_vec(), b"bar".to_vec())],
            payload: Payload::Regular(b"hello world".to_vec()),
        };
        let encoded = encode_archive(&content, 6).unwrap();
        let decoded = decode_archive(&encoded).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn archive_round_trips_symlink() {
        let content = FileContent {
            info: FileInfo {
                uid: 0,
                gid: 0,
                mode: libc::S_IFLNK | 0o777,
                size: 8,
            },
            xattrs: vec![],
            payload: Payload::Symlink(b"/usr/bin".to_vec()),
        };
        let encoded = encode_archive(&content, 6).unwrap();
        let decoded = decode_archive(&encoded).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn bare_user_meta_round_trips() {
        let info = FileInfo {
            uid: 1000,
            gid: 1000,
            mode: libc::S_IFREG | 0o600,
            size: 0,
        };
        let xattrs = vec![(b"security.selinux".to_vec(), b"label_t".to_vec())];
        let encoded = encode_bare_user_meta(&info, &xattrs);
        let decoded = decode_bare_user_meta(&encoded).unwrap();
        assert_eq!(decoded.uid, 1000);
        assert_eq!(decoded.mode, info.mode);
        assert_eq!(decoded.xattrs, xattrs);
    }
}
