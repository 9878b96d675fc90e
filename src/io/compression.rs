//! Transparent (de)compression of table streams.
//!
//! Sources are sniffed by file extension first and by magic bytes second;
//! sinks only by extension. When nothing matches, streams pass through a
//! plain buffer.
//!
//! Built-in codecs, each behind its own feature flag:
//! - **Gzip** (`.gz`) via `flate2` (feature `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature `compression-xz`)
//!
//! Extra codecs can be plugged in with [`register_codec`].

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn builtin_codecs() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn codecs() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(builtin_codecs).clone()
}

/// Register a custom codec, consulted after the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(builtin_codecs).push(codec);
}

/// A compression format able to wrap byte streams.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions with their leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Signature found at the start of a compressed stream, if any.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> std::io::Result<Box<dyn Write + Send>>;
}

fn codec_for_path(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let lowered = path.to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| lowered.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Arc<dyn CompressionCodec>>> {
    let head = reader.fill_buf()?;
    if head.is_empty() {
        return Ok(None);
    }
    Ok(codecs().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| head.starts_with(magic))
    }))
}

/// Whether `path` names a file a registered codec would decompress.
///
/// Only the extension is checked, so no I/O happens.
#[must_use]
pub fn is_compressed_path(path: impl AsRef<Path>) -> bool {
    codec_for_path(path.as_ref()).is_some()
}

/// Wrap `reader` with the decompressor matching `path_hint` or the stream's
/// leading bytes. Uncompressed streams come back buffered.
///
/// # Errors
/// Fails when the leading bytes cannot be read or the codec refuses the stream.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: Option<&Path>,
) -> std::io::Result<Box<dyn Read>> {
    if let Some(codec) = path_hint.and_then(codec_for_path) {
        tracing::debug!(codec = codec.name(), "decompressing by extension");
        return codec.wrap_reader(Box::new(reader));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered)? {
        tracing::debug!(codec = codec.name(), "decompressing by magic bytes");
        return codec.wrap_reader(Box::new(buffered));
    }

    Ok(Box::new(buffered))
}

/// Wrap `writer` with the compressor matching the extension of `path_hint`.
///
/// # Errors
/// Fails when the codec cannot initialize its encoder.
pub fn auto_detect_writer<W: Write + Send + 'static>(
    writer: W,
    path_hint: &Path,
) -> std::io::Result<Box<dyn Write + Send>> {
    if let Some(codec) = codec_for_path(path_hint) {
        return codec.wrap_writer(Box::new(writer));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> std::io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> std::io::Result<Box<dyn Write + Send>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write + Send>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> std::io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(bzip2::write::BzEncoder::new(
            writer,
            bzip2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> std::io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
