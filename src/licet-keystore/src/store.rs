//! Loading and saving keypair records on disk.
//!
//! Saves never overwrite: the record is written to a temporary file in the
//! target directory and atomically renamed into place, so a crash leaves
//! either the old state or the new file, never a partial record.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::credentials::Credential;
use crate::error::KeystoreError;
use crate::keypair::{EncryptedKeypair, Keypair, KeypairRecord, PlaintextKeypair};
use crate::paths::SearchPath;

/// Load a keypair record from `path` and open it with the credential
/// candidates, in order.
///
/// # Errors
///
/// `Io` when the file is unreadable, `CorruptRecord` when it does not parse
/// as either record form, `BadCredentials` when no candidate opens it.
pub fn load_keypair(
    path: &Path,
    candidates: &[Credential],
) -> Result<(KeypairRecord, Keypair), KeystoreError> {
    let bytes = std::fs::read(path).map_err(|e| KeystoreError::io(path, e))?;
    let record: KeypairRecord = licet_codec::decode(&bytes)?;

    let keypair = record.open_with(candidates)?;
    tracing::debug!(
        path = %path.display(),
        vk = %licet_codec::b64::encode(keypair.vk()),
        "Opened keypair record"
    );

    Ok((record, keypair))
}

/// Load 32 bytes of seed material from a `*.crypto-seed` file
/// (64 hex characters, surrounding whitespace ignored).
///
/// # Errors
///
/// `Io` when unreadable, `CorruptRecord` when the content is not 64 hex
/// characters.
pub fn load_seed(path: &Path) -> Result<[u8; 32], KeystoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| KeystoreError::io(path, e))?;
    let trimmed = text.trim();

    let bytes = hex::decode(trimmed)
        .map_err(|e| KeystoreError::corrupt(format!("seed file is not hex: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        KeystoreError::corrupt(format!(
            "seed file must hold 32 bytes, got {}",
            bytes.len()
        ))
    })
}

/// Save an encrypted keypair record.
///
/// An absolute `path` is written as given. A relative `path` is resolved
/// against the search path: the most *general* writable directory by
/// default, or the most *specific* one first when `reverse_save` is set.
/// Returns the path actually written.
///
/// # Errors
///
/// `FileExists` when the target already exists (files are never
/// overwritten), `NoWritableLocation` when no search-path directory accepts
/// the write.
pub fn save_record(
    record: &EncryptedKeypair,
    path: &Path,
    search: &SearchPath,
    reverse_save: bool,
) -> Result<PathBuf, KeystoreError> {
    write_resolved(&KeypairRecord::Encrypted(record.clone()), path, search, reverse_save)
}

/// Save a plaintext keypair record.
///
/// Plaintext keys belong only in explicitly permitted files; the caller
/// opting into this function is that permission.
///
/// # Errors
///
/// As [`save_record`].
pub fn save_plaintext(
    record: &PlaintextKeypair,
    path: &Path,
    search: &SearchPath,
    reverse_save: bool,
) -> Result<PathBuf, KeystoreError> {
    tracing::warn!(
        path = %path.display(),
        "Saving PLAINTEXT keypair record; the file holds raw signing key material"
    );
    write_resolved(&KeypairRecord::Plaintext(record.clone()), path, search, reverse_save)
}

fn write_resolved(
    record: &KeypairRecord,
    path: &Path,
    search: &SearchPath,
    reverse_save: bool,
) -> Result<PathBuf, KeystoreError> {
    let bytes = licet_codec::encode(record)?;

    if path.is_absolute() {
        write_new(path, &bytes)?;
        return Ok(path.to_path_buf());
    }

    for dir in search.save_dirs(reverse_save) {
        let target = dir.join(path);
        match write_new(&target, &bytes) {
            Ok(()) => {
                tracing::info!(path = %target.display(), "Saved keypair record");
                return Ok(target);
            }
            Err(err @ KeystoreError::FileExists { .. }) => return Err(err),
            Err(_) => {
                tracing::debug!(path = %target.display(), "Location not writable, trying next");
            }
        }
    }

    Err(KeystoreError::NoWritableLocation {
        name: path.display().to_string(),
    })
}

/// Write `bytes` to `path` without ever overwriting: temp file in the same
/// directory, then atomic rename.
fn write_new(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if path.exists() {
        return Err(KeystoreError::FileExists {
            path: path.to_path_buf(),
        });
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| KeystoreError::io(dir, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| KeystoreError::corrupt("save path has no file name"))?;
    let tmp = dir.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .map_err(|e| KeystoreError::io(&tmp, e))?;

    let write_all = file
        .write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| KeystoreError::io(&tmp, e));
    if let Err(err) = write_all {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        KeystoreError::io(path, e)
    })
}
