//! Signature block and stream directory of a metadata image.
//!
//! This module defines the [`Root`] struct, which reads the signature block that opens every
//! serialized metadata image, together with the directory of named streams following it, and
//! the [`ImageBuilder`] that writes both back out.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | signature, [`CIL_HEADER_MAGIC`] |
//! | 4 | 2 | major version |
//! | 6 | 2 | minor version |
//! | 8 | 4 | offset to extra header data, 0 if none |
//! | 12 | 4 | length of the version string, 4-byte aligned |
//! | 16 | n | NUL padded version string |
//! | 16 + n | 2 | flags |
//! | 18 + n | 2 | number of streams |
//! | 20 + n | .. | stream headers: offset, size, NUL padded name |
//!
//! # Example
//!
//! ```rust
//! use mdstore::metadata::root::{ImageBuilder, Root, StreamStore};
//!
//! let mut builder = ImageBuilder::new("v4.0.30319");
//! builder.create_stream("#Strings").extend_from_slice(b"\0Foo\0\0\0\0");
//! let image = builder.finish()?;
//!
//! let root = Root::read(&image)?;
//! assert_eq!(root.version, "v4.0.30319");
//! assert_eq!(root.open_stream(&image, "#Strings"), Some(&b"\0Foo\0\0\0\0"[..]));
//! # Ok::<(), mdstore::Error>(())
//! ```
//!
//! # References
//!
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align4, read_le, read_le_at, write_le_at},
    Error::OutOfBounds,
    Result,
};

/// Signature of the metadata root, 'BSJB'
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Stream holding compressed tables
pub const TABLES_STREAM: &str = "#~";
/// Stream holding uncompressed tables, as written by ENC saves
pub const ENC_TABLES_STREAM: &str = "#-";

const VALID_STREAM_NAMES: [&str; 6] = [
    "#Strings",
    "#US",
    "#Blob",
    "#GUID",
    TABLES_STREAM,
    ENC_TABLES_STREAM,
];

const ROOT_MAJOR: u16 = 1;
const ROOT_MINOR: u16 = 1;

/// Access to the named streams of an image
pub trait StreamStore {
    /// Borrow the content of the stream called `name`, `None` if the image has no such stream
    fn open_stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]>;
}

/// One entry of the stream directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the start of the root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header from the start of `data`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input, or
    /// [`crate::Error::Malformed`] for an unknown stream name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(len) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated stream header name"));
        };
        let name = String::from_utf8_lossy(&name_bytes[..len]).into_owned();

        if !VALID_STREAM_NAMES.iter().any(|valid_name| name == *valid_name) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Bytes this header occupies in the directory
    #[must_use]
    pub fn encoded_size(name: &str) -> usize {
        8 + align4(name.len() + 1)
    }
}

/// The metadata root: signature block plus stream directory
#[derive(Debug, Clone)]
pub struct Root {
    /// Magic signature, always [`CIL_HEADER_MAGIC`]
    pub signature: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Offset to extra header data
    pub reserved: u32,
    /// Padded length of the version string
    pub length: u32,
    /// Runtime version string, without padding
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// Directory of streams
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the root from the start of `data`
    ///
    /// # Arguments
    /// * 'data' - The metadata image
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature or a damaged directory, or
    /// [`crate::Error::OutOfBounds`] if a stream range lies outside of `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let length = read_le_at::<u32>(data, &mut 12)?;
        let Some(version_end) = (length as usize).checked_add(16) else {
            return Err(malformed_error!("Version string length overflows - {}", length));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version_bytes = &data[16..version_end];
        let version_len = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..version_len]).into_owned();

        let mut cursor = version_end;
        let flags = read_le_at::<u16>(data, &mut cursor)?;
        let stream_count = read_le_at::<u16>(data, &mut cursor)?;
        if stream_count == 0 || usize::from(stream_count) > VALID_STREAM_NAMES.len() {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut streams: Vec<StreamHeader> = Vec::with_capacity(usize::from(stream_count));
        let mut stream_offset = cursor;
        for _ in 0..stream_count {
            if stream_offset >= data.len() {
                return Err(OutOfBounds);
            }

            let header = StreamHeader::from(&data[stream_offset..])?;
            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(OutOfBounds),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }

            if streams.iter().any(|known| known.name == header.name) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            stream_offset += StreamHeader::encoded_size(&header.name);
            streams.push(header);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            length,
            version,
            flags,
            stream_headers: streams,
        })
    }

    /// Size of a root block with the given version string and stream names
    #[must_use]
    pub fn encoded_size<'a>(version: &str, names: impl IntoIterator<Item = &'a str>) -> usize {
        20 + align4(version.len() + 1)
            + names
                .into_iter()
                .map(StreamHeader::encoded_size)
                .sum::<usize>()
    }
}

impl StreamStore for Root {
    fn open_stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        let header = self.stream_headers.iter().find(|header| header.name == name)?;
        let start = header.offset as usize;
        data.get(start..start + header.size as usize)
    }
}

/// Writer of a metadata image: collects named streams, then emits root and streams
#[derive(Debug, Default)]
pub struct ImageBuilder {
    version: String,
    streams: Vec<(String, Vec<u8>)>,
}

impl ImageBuilder {
    /// Start an image carrying `version` in its signature block
    #[must_use]
    pub fn new(version: &str) -> Self {
        ImageBuilder {
            version: version.to_string(),
            streams: Vec::new(),
        }
    }

    /// Append a new stream called `name` and return its buffer. Streams are laid out in the
    /// order they were created.
    pub fn create_stream(&mut self, name: &str) -> &mut Vec<u8> {
        self.streams.push((name.to_string(), Vec::new()));
        let last = self.streams.len() - 1;
        &mut self.streams[last].1
    }

    /// Total size of the image as it would be written now
    #[must_use]
    pub fn size(&self) -> usize {
        Root::encoded_size(
            &self.version,
            self.streams.iter().map(|(name, _)| name.as_str()),
        ) + self
            .streams
            .iter()
            .map(|(_, data)| align4(data.len()))
            .sum::<usize>()
    }

    /// Serialize root, directory and every stream, each stream padded to 4 bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::Overflow`] if the image exceeds the 32-bit range.
    pub fn finish(self) -> Result<Vec<u8>> {
        let total = self.size();
        if u32::try_from(total).is_err() {
            return Err(crate::Error::Overflow {
                value: total as u64,
                width: 4,
            });
        }

        let mut out = vec![0u8; total];
        let version_len = align4(self.version.len() + 1);
        #[allow(clippy::cast_possible_truncation)]
        {
            let mut offset = 0;
            write_le_at(&mut out, &mut offset, CIL_HEADER_MAGIC)?;
            write_le_at(&mut out, &mut offset, ROOT_MAJOR)?;
            write_le_at(&mut out, &mut offset, ROOT_MINOR)?;
            write_le_at(&mut out, &mut offset, 0u32)?;
            write_le_at(&mut out, &mut offset, version_len as u32)?;
            out[offset..offset + self.version.len()].copy_from_slice(self.version.as_bytes());
            offset += version_len;
            write_le_at(&mut out, &mut offset, 0u16)?;
            write_le_at(&mut out, &mut offset, self.streams.len() as u16)?;

            let mut data_offset = Root::encoded_size(
                &self.version,
                self.streams.iter().map(|(name, _)| name.as_str()),
            );
            for (name, data) in &self.streams {
                write_le_at(&mut out, &mut offset, data_offset as u32)?;
                write_le_at(&mut out, &mut offset, align4(data.len()) as u32)?;
                out[offset..offset + name.len()].copy_from_slice(name.as_bytes());
                offset += align4(name.len() + 1);

                out[data_offset..data_offset + data.len()].copy_from_slice(data);
                data_offset += align4(data.len());
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            b'v', b'4', b'.', b'0', 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
            0x01, 0x00,

            0x28, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x2D, 0x00, 0x00,

            0xAA, 0xBB, 0xCC, 0xDD,
        ];

        let root = Root::read(&header_bytes).unwrap();

        assert_eq!(root.signature, CIL_HEADER_MAGIC);
        assert_eq!(root.major_version, 1);
        assert_eq!(root.minor_version, 1);
        assert_eq!(root.length, 8);
        assert_eq!(root.version, "v4.0");
        assert_eq!(root.stream_headers.len(), 1);
        assert_eq!(root.stream_headers[0].name, ENC_TABLES_STREAM);
        assert_eq!(
            root.open_stream(&header_bytes, ENC_TABLES_STREAM),
            Some(&[0xAA, 0xBB, 0xCC, 0xDD][..])
        );
        assert_eq!(root.open_stream(&header_bytes, "#Blob"), None);
    }

    #[test]
    fn crafted_invalid() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x24, 0x7E, 0x00,
        ];

        assert!(StreamHeader::from(&header_bytes).is_err());
        assert!(Root::read(&[0u8; 32]).is_err());
    }

    #[test]
    fn stream_out_of_range() {
        let mut builder = ImageBuilder::new("v4.0.30319");
        builder.create_stream("#GUID").extend_from_slice(&[1; 16]);
        let mut image = builder.finish().unwrap();
        image.truncate(image.len() - 4);

        assert!(matches!(Root::read(&image), Err(OutOfBounds)));
    }

    #[test]
    fn builder_layout() {
        let mut builder = ImageBuilder::new("v4.0.30319");
        builder.create_stream(TABLES_STREAM).extend_from_slice(&[1, 2, 3]);
        builder.create_stream("#Strings").extend_from_slice(b"\0A\0");
        let expected = builder.size();
        let image = builder.finish().unwrap();
        assert_eq!(image.len(), expected);

        let root = Root::read(&image).unwrap();
        assert_eq!(root.stream_headers[0].name, TABLES_STREAM);
        assert_eq!(root.stream_headers[0].size, 4);
        assert_eq!(root.stream_headers[1].name, "#Strings");
        assert_eq!(
            root.open_stream(&image, TABLES_STREAM),
            Some(&[1, 2, 3, 0][..])
        );
        assert_eq!(root.stream_headers[0].offset % 4, 0);
    }
}
