//! KTX 1.1 container layout.
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ magic (12 bytes)                           │
//! │ endianness = 0x04030201 (u32 LE)           │
//! │ glType, glTypeSize, glFormat               │
//! │ glInternalFormat, glBaseInternalFormat     │
//! │ pixelWidth, pixelHeight, pixelDepth        │
//! │ numberOfArrayElements, numberOfFaces       │
//! │ numberOfMipmapLevels, bytesOfKeyValueData  │
//! ├────────────────────────────────────────────┤
//! │ key/value data (4-byte aligned entries)    │
//! ├────────────────────────────────────────────┤
//! │ per mip level:                             │
//! │   imageSize (u32)                          │
//! │   per array layer, per face: blob + pad4   │
//! └────────────────────────────────────────────┘
//! ```
//!
//! For non-array cubemaps `imageSize` is the size of a single face, per the
//! KTX 1.1 special case. All integers are little endian (we always write the
//! 0x04030201 marker as-is).

use std::collections::BTreeMap;

use crate::Error;

/// 12-byte KTX 1.1 identifier.
pub const KTX_MAGIC: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];

const ENDIAN_MARKER: u32 = 0x0403_0201;
const HEADER_SIZE: usize = 12 + 13 * 4;

// OpenGL enums used in headers we emit
pub const GL_UNSIGNED_BYTE: u32 = 0x1401;
pub const GL_RGB: u32 = 0x1907;
pub const GL_RGBA: u32 = 0x1908;
pub const GL_COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;

/// Header fields of a KTX file. Dimensions and counts only; blob storage
/// lives in [`KtxContainer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KtxInfo {
    pub gl_type: u32,
    pub gl_type_size: u32,
    pub gl_format: u32,
    pub gl_internal_format: u32,
    pub gl_base_internal_format: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_depth: u32,
    pub num_array_elements: u32,
    pub num_faces: u32,
    pub num_mip_levels: u32,
}

impl KtxInfo {
    /// Uncompressed RGBA8 defaults; callers override dimensions and counts.
    pub fn rgba8() -> Self {
        Self {
            gl_type: GL_UNSIGNED_BYTE,
            gl_type_size: 4,
            gl_format: GL_RGBA,
            gl_internal_format: GL_RGBA,
            gl_base_internal_format: GL_RGBA,
            pixel_width: 0,
            pixel_height: 0,
            pixel_depth: 0,
            num_array_elements: 0,
            num_faces: 1,
            num_mip_levels: 1,
        }
    }

    /// Block-compressed defaults. `internal_format` selects the codec.
    pub fn compressed(internal_format: u32) -> Self {
        Self {
            gl_type: 0,
            gl_type_size: 1,
            gl_format: 0,
            gl_internal_format: internal_format,
            gl_base_internal_format: GL_RGBA,
            pixel_width: 0,
            pixel_height: 0,
            pixel_depth: 0,
            num_array_elements: 0,
            num_faces: 1,
            num_mip_levels: 1,
        }
    }

    // 0 means "not an array" / "not 3D" in the header, but there is always
    // at least one layer of data
    fn layer_count(&self) -> usize {
        self.num_array_elements.max(1) as usize
    }

    fn blob_count(&self) -> usize {
        self.layer_count() * self.num_faces as usize * self.num_mip_levels as usize
    }
}

/// In-memory KTX file: header info, key-value metadata, and one image blob
/// per (mip, layer, face). Fill every blob before serializing.
#[derive(Debug, Clone)]
pub struct KtxContainer {
    info: KtxInfo,
    metadata: BTreeMap<String, String>,
    blobs: Vec<Vec<u8>>,
}

impl KtxContainer {
    pub fn new(info: KtxInfo) -> Self {
        let n = info.blob_count();
        Self {
            info,
            metadata: BTreeMap::new(),
            blobs: vec![Vec::new(); n],
        }
    }

    pub fn info(&self) -> &KtxInfo {
        &self.info
    }

    /// Attaches a printable metadata value. Keys serialize in sorted order,
    /// so output bytes do not depend on insertion order.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_owned(), value.to_owned());
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    fn blob_index(&self, mip: usize, layer: usize, face: usize) -> usize {
        let faces = self.info.num_faces as usize;
        let layers = self.info.layer_count();
        debug_assert!(mip < self.info.num_mip_levels as usize);
        debug_assert!(layer < layers && face < faces);
        mip * (layers * faces) + layer * faces + face
    }

    pub fn set_blob(&mut self, mip: usize, layer: usize, face: usize, data: Vec<u8>) {
        let i = self.blob_index(mip, layer, face);
        self.blobs[i] = data;
    }

    pub fn blob(&self, mip: usize, layer: usize, face: usize) -> &[u8] {
        &self.blobs[self.blob_index(mip, layer, face)]
    }

    fn key_value_size(&self) -> usize {
        self.metadata
            .iter()
            .map(|(k, v)| {
                let payload = k.len() + 1 + v.len();
                4 + pad4(payload)
            })
            .sum()
    }

    /// Exact size of [`Self::serialize`] output. Every blob in a mip level
    /// must have the same length.
    pub fn serialized_length(&self) -> usize {
        let mut n = HEADER_SIZE + self.key_value_size();
        let faces = self.info.num_faces as usize;
        let layers = self.info.layer_count();
        for mip in 0..self.info.num_mip_levels as usize {
            n += 4;
            for layer in 0..layers {
                for face in 0..faces {
                    n += pad4(self.blobs[self.blob_index(mip, layer, face)].len());
                }
            }
        }
        n
    }

    /// Serializes the container to the KTX byte layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_length());
        out.extend_from_slice(&KTX_MAGIC);
        let i = &self.info;
        for v in [
            ENDIAN_MARKER,
            i.gl_type,
            i.gl_type_size,
            i.gl_format,
            i.gl_internal_format,
            i.gl_base_internal_format,
            i.pixel_width,
            i.pixel_height,
            i.pixel_depth,
            i.num_array_elements,
            i.num_faces,
            i.num_mip_levels,
            self.key_value_size() as u32,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }

        for (k, v) in &self.metadata {
            let payload = k.len() + 1 + v.len();
            out.extend_from_slice(&(payload as u32).to_le_bytes());
            out.extend_from_slice(k.as_bytes());
            out.push(0);
            out.extend_from_slice(v.as_bytes());
            out.resize(out.len() + pad4(payload) - payload, 0);
        }

        let faces = self.info.num_faces as usize;
        let layers = self.info.layer_count();
        for mip in 0..self.info.num_mip_levels as usize {
            let first = self.blobs[self.blob_index(mip, 0, 0)].len();
            // KTX 1.1: for non-array cubemaps, imageSize is one face
            out.extend_from_slice(&(first as u32).to_le_bytes());
            for layer in 0..layers {
                for face in 0..faces {
                    let blob = &self.blobs[self.blob_index(mip, layer, face)];
                    debug_assert_eq!(blob.len(), first, "mismatched blob sizes in mip {}", mip);
                    out.extend_from_slice(blob);
                    out.resize(out.len() + pad4(blob.len()) - blob.len(), 0);
                }
            }
        }
        out
    }

    /// Parses a serialized container. Little-endian files only, matching
    /// what [`Self::serialize`] emits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::MalformedContainer("truncated header"));
        }
        if bytes[..12] != KTX_MAGIC {
            return Err(Error::MalformedContainer("bad magic"));
        }
        let u32_at = |offset: usize| -> u32 {
            u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
        };
        if u32_at(12) != ENDIAN_MARKER {
            return Err(Error::MalformedContainer("big-endian files not supported"));
        }
        let info = KtxInfo {
            gl_type: u32_at(16),
            gl_type_size: u32_at(20),
            gl_format: u32_at(24),
            gl_internal_format: u32_at(28),
            gl_base_internal_format: u32_at(32),
            pixel_width: u32_at(36),
            pixel_height: u32_at(40),
            pixel_depth: u32_at(44),
            num_array_elements: u32_at(48),
            num_faces: u32_at(52),
            num_mip_levels: u32_at(56),
        };
        let kv_size = u32_at(60) as usize;
        if info.num_faces == 0 || info.num_mip_levels == 0 {
            return Err(Error::MalformedContainer("zero faces or mip levels"));
        }
        // counts come straight from the file; bound them against its size
        // before allocating blob storage (each mip costs at least 4 bytes)
        let payload = (bytes.len() - HEADER_SIZE) as u64;
        let blob_count = info.num_mip_levels as u64
            * info.num_array_elements.max(1) as u64
            * info.num_faces as u64;
        if info.num_mip_levels as u64 * 4 > payload || blob_count > payload {
            return Err(Error::MalformedContainer("image counts exceed file size"));
        }

        let mut container = Self::new(info);
        let mut pos = HEADER_SIZE;
        let kv_end = pos + kv_size;
        if kv_end > bytes.len() {
            return Err(Error::MalformedContainer("key-value data out of bounds"));
        }
        while pos < kv_end {
            if pos + 4 > kv_end {
                return Err(Error::MalformedContainer("key-value entry out of bounds"));
            }
            let payload = u32_at(pos) as usize;
            pos += 4;
            if pos + payload > kv_end {
                return Err(Error::MalformedContainer("key-value entry out of bounds"));
            }
            let entry = &bytes[pos..pos + payload];
            let nul = entry
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::MalformedContainer("key without terminator"))?;
            let key = std::str::from_utf8(&entry[..nul])
                .map_err(|_| Error::MalformedContainer("non-utf8 key"))?;
            let value = std::str::from_utf8(&entry[nul + 1..])
                .map_err(|_| Error::MalformedContainer("non-utf8 value"))?;
            container.set_metadata(key, value);
            pos += pad4(payload);
        }
        pos = kv_end;

        let faces = container.info.num_faces as usize;
        let layers = container.info.layer_count();
        for mip in 0..container.info.num_mip_levels as usize {
            if pos + 4 > bytes.len() {
                return Err(Error::MalformedContainer("truncated mip level"));
            }
            let image_size = u32_at(pos) as usize;
            pos += 4;
            for layer in 0..layers {
                for face in 0..faces {
                    if pos + image_size > bytes.len() {
                        return Err(Error::MalformedContainer("truncated image blob"));
                    }
                    container.set_blob(mip, layer, face, bytes[pos..pos + image_size].to_vec());
                    pos += pad4(image_size);
                }
            }
        }
        Ok(container)
    }
}

#[inline]
fn pad4(n: usize) -> usize {
    (n + 3) & !3
}
