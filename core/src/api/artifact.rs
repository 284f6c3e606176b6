//! Persisted bytecode artifacts.
//!
//! ```text
//! [b"DEM"][u8: version][u8: compression method][compressed chunk dump]
//! ```
//!
//! The method byte is a [`CompressionMethod`] discriminant, so an artifact
//! can always be read back regardless of the reader's configured method.

use std::{fs, path::Path};

use tracing::{debug, info};

use crate::{
    compression::CompressionMethod,
    errors::{Error, InternalError, Stage},
    types::TypeManager,
    vm::Chunk,
};

pub const MAGIC: &[u8; 3] = b"DEM";
pub const VERSION: u8 = 1;

/// Suffix of Dem source files.
pub const SOURCE_EXTENSION: &str = "dm";
/// Suffix of compiled artifacts.
pub const ARTIFACT_EXTENSION: &str = "dem";

const HEADER_LEN: usize = MAGIC.len() + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub method: CompressionMethod,
}

fn malformed(message: impl Into<String>) -> Error {
    Error::internal(Stage::VirtualMachine, InternalError::Message(message.into()))
}

/// Splits an artifact into its header and compressed payload.
pub fn read_header(bytes: &[u8]) -> Result<(Header, &[u8]), Error> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(malformed("not a Dem artifact"));
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(malformed(format!(
            "unsupported artifact version {version}, expected {VERSION}"
        )));
    }
    let method = CompressionMethod::from_u8(bytes[MAGIC.len() + 1])
        .map_err(|err| Error::internal(Stage::VirtualMachine, err))?;
    Ok((Header { version, method }, &bytes[HEADER_LEN..]))
}

pub fn encode(chunk: &Chunk<'_>, method: CompressionMethod) -> Result<Vec<u8>, Error> {
    let dump = chunk.dump();
    let payload = method
        .compressor()
        .compress(&dump)
        .map_err(|err| Error::internal(Stage::Compiler, err))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(method as u8);
    out.extend_from_slice(&payload);
    debug!(%method, dump = dump.len(), artifact = out.len(), "encoded artifact");
    Ok(out)
}

/// Reads an artifact back, returning the chunk and the method it was
/// stored with.
pub fn decode<'t>(
    types: &'t TypeManager<'t>,
    bytes: &[u8],
) -> Result<(Chunk<'t>, CompressionMethod), Error> {
    let (header, payload) = read_header(bytes)?;
    let dump = header
        .method
        .compressor()
        .decompress(payload)
        .map_err(|err| Error::internal(Stage::VirtualMachine, err))?;
    let chunk =
        Chunk::load(types, &dump).map_err(|err| Error::internal(Stage::VirtualMachine, err))?;
    debug!(method = %header.method, dump = dump.len(), "decoded artifact");
    Ok((chunk, header.method))
}

pub fn save(chunk: &Chunk<'_>, method: CompressionMethod, path: &Path) -> Result<(), Error> {
    let bytes = encode(chunk, method)?;
    fs::write(path, &bytes).map_err(|err| Error::internal(Stage::Compiler, err))?;
    info!(path = %path.display(), bytes = bytes.len(), "saved artifact");
    Ok(())
}

pub fn load<'t>(
    types: &'t TypeManager<'t>,
    path: &Path,
) -> Result<(Chunk<'t>, CompressionMethod), Error> {
    let bytes = fs::read(path).map_err(|err| Error::internal(Stage::VirtualMachine, err))?;
    info!(path = %path.display(), bytes = bytes.len(), "loading artifact");
    decode(types, &bytes)
}
