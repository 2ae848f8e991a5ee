//! Host machine identity.
//!
//! The machine-id is an opaque 128-bit host identifier, coerced into RFC
//! 4122 UUIDv4 shape so license records carry one uniform format.

use std::path::Path;

use uuid::Uuid;

use crate::error::LicenseError;

/// Read the host machine-id, coerced to UUIDv4 shape.
///
/// On Linux this is `/etc/machine-id` (or the dbus fallback); an explicit
/// `machine_id_path` overrides the default, which is what tests and
/// cross-machine issuance use. On macOS the IOPlatform UUID is used.
///
/// # Errors
///
/// `Io` when no machine-id source is readable, `CorruptRecord` when the
/// content is not 128 bits of hex.
pub fn machine_uuid(machine_id_path: Option<&Path>) -> Result<Uuid, LicenseError> {
    let raw = match machine_id_path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| LicenseError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        None => read_host_machine_id()?,
    };

    coerce_uuid_v4(raw.trim())
}

#[cfg(target_os = "linux")]
fn read_host_machine_id() -> Result<String, LicenseError> {
    std::fs::read_to_string("/etc/machine-id")
        .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
        .map_err(|e| LicenseError::Io {
            path: "/etc/machine-id".into(),
            reason: e.to_string(),
        })
}

#[cfg(target_os = "macos")]
fn read_host_machine_id() -> Result<String, LicenseError> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .map_err(|e| LicenseError::Io {
            path: "ioreg".into(),
            reason: e.to_string(),
        })?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines()
        .find(|l| l.contains("IOPlatformUUID"))
        .and_then(|l| l.split('"').nth(3))
        .map(|uuid| uuid.replace('-', ""))
        .ok_or_else(|| LicenseError::Io {
            path: "ioreg".into(),
            reason: "IOPlatformUUID not reported".into(),
        })
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn read_host_machine_id() -> Result<String, LicenseError> {
    Err(LicenseError::Io {
        path: "machine-id".into(),
        reason: "no machine-id source on this platform; supply machine_id_path".into(),
    })
}

/// Force the version (4) and variant (10) bits onto 16 bytes of host
/// identity, the same coercion systemd documents for machine-id use.
fn coerce_uuid_v4(hex_text: &str) -> Result<Uuid, LicenseError> {
    let bytes = hex::decode(hex_text).map_err(|e| LicenseError::CorruptRecord {
        reason: format!("machine-id is not hex: {e}"),
    })?;
    let mut bytes: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
        LicenseError::CorruptRecord {
            reason: format!("machine-id must be 16 bytes, got {}", bytes.len()),
        }
    })?;

    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    Ok(Uuid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_sets_version_and_variant() {
        let uuid = coerce_uuid_v4("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(uuid.get_version_num(), 4);
        assert_eq!(uuid.to_string(), "00010203-0405-4607-8809-0a0b0c0d0e0f");
    }

    #[test]
    fn explicit_path_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        std::fs::write(&path, "ffffffffffffffffffffffffffffffff\n").unwrap();

        let uuid = machine_uuid(Some(&path)).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn short_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine-id");
        std::fs::write(&path, "abcd").unwrap();

        assert!(matches!(
            machine_uuid(Some(&path)),
            Err(LicenseError::CorruptRecord { .. })
        ));
    }
}
