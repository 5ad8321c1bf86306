//! Transparent decompression of fetched files.

use super::provider::FetchError;
use std::io::{Cursor, Read};

/// A fetched file after decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    /// Name to use for the local copy (the archive entry's name for zips).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Unpack `bytes` fetched from `remote_path`.
///
/// `.zip` files must hold exactly one entry; anything else passes through.
pub fn unpack(remote_path: &str, bytes: Vec<u8>) -> Result<Unpacked, FetchError> {
    let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path).to_string();
    if !file_name.to_ascii_lowercase().ends_with(".zip") {
        return Ok(Unpacked { file_name, bytes });
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| FetchError::parse(remote_path, format!("zip: {e}")))?;
    if archive.len() != 1 {
        return Err(FetchError::parse(
            remote_path,
            format!("must be exactly 1 entry in zip archive, found {}", archive.len()),
        ));
    }
    let mut entry = archive
        .by_index(0)
        .map_err(|e| FetchError::parse(remote_path, format!("zip entry: {e}")))?;
    let inner_name = entry
        .name()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string();
    if inner_name == "." || inner_name == ".." {
        return Err(FetchError::parse(
            remote_path,
            format!("zip entry has no usable name: '{}'", entry.name()),
        ));
    }
    let mut out = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut out)
        .map_err(|e| FetchError::parse(remote_path, format!("zip inflate: {e}")))?;

    Ok(Unpacked {
        file_name: if inner_name.is_empty() {
            file_name.trim_end_matches(".zip").to_string()
        } else {
            inner_name
        },
        bytes: out,
    })
}

#[cfg(test)]
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
