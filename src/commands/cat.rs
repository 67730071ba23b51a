//! `cat` - stream stored objects to stdout
//!
//! Objects are written whole and in listing order, so a single worker
//! copies them. Keys ending in `.gz`, `.gzip` or `.bz2` are decompressed
//! when their content starts with the format's magic bytes; anything else
//! is copied as stored.

use bzip2::bufread::MultiBzDecoder;
use flate2::bufread::MultiGzDecoder;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::S3kitError;
use crate::location::RootLocation;
use crate::pipeline::{Pipeline, operation};
use crate::selection::SelectionPolicy;
use crate::store::{Enumerator, ObjectReader};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Compression of a stored object, detected from its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(".gz") || key.ends_with(".gzip") {
            Self::Gzip
        } else if key.ends_with(".bz2") {
            Self::Bzip2
        } else {
            Self::None
        }
    }

    const fn magic(self) -> &'static [u8] {
        match self {
            Self::None => &[],
            Self::Gzip => GZIP_MAGIC,
            Self::Bzip2 => BZIP2_MAGIC,
        }
    }
}

/// Reader over the decoded content of `source`
///
/// Content without the magic bytes of `compression` passes through unchanged.
///
/// # Errors
/// Returns an I/O error if the start of `source` cannot be read.
pub fn decode(
    source: Box<dyn Read + Send>,
    compression: Compression,
) -> io::Result<Box<dyn Read + Send>> {
    let mut reader = BufReader::new(source);
    let compressed =
        compression != Compression::None && reader.fill_buf()?.starts_with(compression.magic());
    Ok(match compression {
        Compression::Gzip if compressed => Box::new(MultiGzDecoder::new(reader)),
        Compression::Bzip2 if compressed => Box::new(MultiBzDecoder::new(reader)),
        _ => Box::new(reader),
    })
}

/// Copy every current object under `roots` to `out`, returning how many
///
/// # Errors
/// Returns the pipeline error of the first object that could not be listed,
/// opened, decoded or written.
pub fn write_objects<S, W>(
    store: &S,
    roots: &[RootLocation],
    out: &mut W,
) -> Result<usize, S3kitError>
where
    S: Enumerator + ObjectReader + ?Sized,
    W: Write + Send,
{
    let copied = AtomicUsize::new(0);
    let shared = Mutex::new(&mut *out);
    let copy_object = operation(|container, item| {
        let source = store.open(container, &item.key)?;
        let mut reader = decode(source, Compression::from_key(&item.key))?;
        let mut out = shared.lock().map_err(|_| "output lock poisoned")?;
        let bytes = io::copy(&mut reader, &mut **out)?;
        debug!(object = %item.url(container), bytes, "Copied");
        copied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    Pipeline::new(store)
        .with_workers(1)
        .run(roots, &SelectionPolicy::CurrentOnly, copy_object)?;
    drop(shared);
    out.flush()?;
    Ok(copied.into_inner())
}

/// Execute `cat`
///
/// # Errors
/// Returns an error if listing or reading fails or stdout cannot be written.
pub fn execute<S>(store: &S, roots: &[RootLocation]) -> Result<(), S3kitError>
where
    S: Enumerator + ObjectReader + ?Sized,
{
    let mut out = BufWriter::new(io::stdout());
    let copied = write_objects(store, roots, &mut out)?;
    info!("{copied} object(s) written");
    Ok(())
}
