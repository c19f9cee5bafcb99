//! QCOW2 header inspection for the disk image handed to `create`.
//!
//! The image is uploaded verbatim into a volume declared as `qcow2`, so a
//! raw or truncated file would only fail much later, at domain boot. Reading
//! the fixed header up front rejects it before any host state is touched.
//!
//! # Header layout
//!
//! All multi-byte fields are big-endian. Only the fields below are read.
//!
//! ```text
//!   Offset  Size  Field
//!   ──────  ────  ─────
//!     0       4   Magic number (0x514649FB, "QFI\xfb")
//!     4       4   Version (2 or 3)
//!     8       8   Backing file offset (0 = none)
//!    16       4   Backing file name length
//!    20       4   Cluster bits
//!    24       8   Virtual size in bytes
//! ```
//!
//! Reference: <https://github.com/qemu/qemu/blob/master/docs/interop/qcow2.txt>

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::NodeboxError;

/// QCOW2 magic number: the ASCII bytes `QFI` followed by `0xFB`.
const QCOW2_MAGIC: u32 = 0x514649FB;

const HEADER_LEN: usize = 32;

/// What `create` needs to know about the disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub version: u32,
    /// Guest-visible disk size.
    pub virtual_size: u64,
    /// Byte length of the image file; the volume is created with this capacity.
    pub file_size: u64,
    pub has_backing_file: bool,
}

fn read_be32(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(b)
}

fn read_be64(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(b)
}

/// Parse the fixed part of a QCOW2 header.
fn parse_header(header: &[u8]) -> Result<(u32, u64, bool), String> {
    if header.len() < HEADER_LEN {
        return Err(format!("file too short for a qcow2 header ({} bytes)", header.len()));
    }
    if read_be32(header, 0) != QCOW2_MAGIC {
        return Err("not a qcow2 image (bad magic)".into());
    }
    let version = read_be32(header, 4);
    if !(2..=3).contains(&version) {
        return Err(format!("unsupported qcow2 version {version}"));
    }
    let has_backing = read_be64(header, 8) != 0;
    Ok((version, read_be64(header, 24), has_backing))
}

/// Open `path` and validate its QCOW2 header.
pub async fn inspect(path: &Path) -> Result<ImageInfo, NodeboxError> {
    let invalid = |message: String| NodeboxError::InvalidImage {
        path: path.display().to_string(),
        message,
    };

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let file_size = file
        .metadata()
        .await
        .map_err(|e| invalid(e.to_string()))?
        .len();

    let mut header = Vec::with_capacity(HEADER_LEN);
    (&mut file)
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .await
        .map_err(|e| invalid(e.to_string()))?;

    let (version, virtual_size, has_backing_file) = parse_header(&header).map_err(invalid)?;
    if has_backing_file {
        // The uploaded volume would point at a path that only exists here.
        return Err(invalid("image has a backing file; flatten it with `qemu-img convert`".into()));
    }

    tracing::info!(
        path = %path.display(),
        version,
        virtual_size,
        file_size,
        "inspected disk image"
    );
    Ok(ImageInfo {
        version,
        virtual_size,
        file_size,
        has_backing_file,
    })
}
