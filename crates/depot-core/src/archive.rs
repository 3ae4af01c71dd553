//! Archive sniffing and best-effort member extraction
//!
//! Adapters only ever peek into uploaded archives: magic-byte checks for
//! content validation, and single-member reads for metadata enrichment.

use flate2::read::GzDecoder;
use std::io::Read;
use tar::Archive;

use crate::error::Result;

/// Upper bound on a member read for metadata extraction
pub const MAX_MEMBER_SIZE: u64 = 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const USTAR_OFFSET: usize = 257;

/// Gzip stream (`.tgz`, `.crate`, `.tar.gz`)
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Zip container (`.nupkg`, `.whl`, `.jar`)
pub fn is_zip(data: &[u8]) -> bool {
    data.starts_with(&ZIP_MAGIC)
}

/// Plain POSIX tar (`.gem`)
pub fn is_tar(data: &[u8]) -> bool {
    data.len() >= USTAR_OFFSET + 5 && &data[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar"
}

/// Read the first member of a tar.gz whose path satisfies `matches`
///
/// Members larger than [`MAX_MEMBER_SIZE`] are skipped.
pub fn read_tgz_member<F>(data: &[u8], matches: F) -> Result<Option<Vec<u8>>>
where
    F: Fn(&str) -> bool,
{
    let gz = GzDecoder::new(data);
    let mut archive = Archive::new(gz);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        if !matches(&path) || entry.header().size()? > MAX_MEMBER_SIZE {
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        return Ok(Some(buf));
    }

    Ok(None)
}

/// Build an in-memory tar.gz from `(path, content)` pairs
#[cfg(test)]
pub(crate) fn build_tgz(members: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (path, content) in members {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
