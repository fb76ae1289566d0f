use anyhow::Result;
use std::io::{Read, Write};
use std::path::Path;

/// Compression format detected from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some(ext) => Self::from_extension(ext),
            None => Compression::None,
        }
    }

    pub(crate) fn from_extension(ext: &str) -> Self {
        match ext {
            "gz" | "gzip" => Compression::Gzip,
            "bz2" | "bzip2" => Compression::Bzip2,
            "xz" | "lzma" => Compression::Xz,
            "zst" | "zstd" => Compression::Zstd,
            _ => Compression::None,
        }
    }

    /// Wrap a reader with the appropriate decompressor
    pub fn wrap_reader<'a>(&self, reader: Box<dyn Read + 'a>) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => reader,
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(reader)?),
        })
    }

    /// Run `write` against a compressing wrapper of `writer`, then finish
    /// the stream and hand the inner writer back.
    pub fn encode<W: Write>(
        &self,
        writer: W,
        write: impl FnOnce(&mut dyn Write) -> Result<()>,
    ) -> Result<W> {
        match self {
            Compression::None => {
                let mut writer = writer;
                write(&mut writer)?;
                Ok(writer)
            }
            Compression::Gzip => {
                let mut enc = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
                write(&mut enc)?;
                Ok(enc.finish()?)
            }
            Compression::Bzip2 => {
                let mut enc = bzip2::write::BzEncoder::new(writer, bzip2::Compression::default());
                write(&mut enc)?;
                Ok(enc.finish()?)
            }
            Compression::Xz => {
                let mut enc = xz2::write::XzEncoder::new(writer, 6);
                write(&mut enc)?;
                Ok(enc.finish()?)
            }
            Compression::Zstd => {
                let mut enc = zstd::stream::write::Encoder::new(writer, 0)?;
                write(&mut enc)?;
                Ok(enc.finish()?)
            }
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Bzip2 => write!(f, "bzip2"),
            Compression::Xz => write!(f, "xz"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}
