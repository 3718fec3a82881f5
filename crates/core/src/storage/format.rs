use super::encryption::KdfParams;
use crate::errors::CoreError;

/// Magic bytes identifying a budget credential vault.
pub const MAGIC: &[u8; 4] = b"BGCV";

pub const CURRENT_VERSION: u16 = 1;

/// magic(4) + version(2) + kdf_params(12) + salt(16) + nonce(12) + ciphertext_len(4) = 50
pub const HEADER_SIZE: usize = 50;

/// Upper bound on the sealed payload; a session is a few hundred bytes.
pub const MAX_CIPHERTEXT: u32 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHeader {
    pub version: u16,
    pub kdf_params: KdfParams,
    pub salt: [u8; 16],
    pub nonce: [u8; 12],
}

/// Layout:
/// ```text
/// [BGCV: 4B] [version: 2B LE] [memory_cost: 4B LE] [time_cost: 4B LE]
/// [parallelism: 4B LE] [salt: 16B] [nonce: 12B] [ciphertext_len: 4B LE]
/// [ciphertext + tag]
/// ```
pub fn write_vault(header: &VaultHeader, ciphertext: &[u8]) -> Result<Vec<u8>, CoreError> {
    let len = u32::try_from(ciphertext.len())
        .ok()
        .filter(|l| *l <= MAX_CIPHERTEXT)
        .ok_or_else(|| {
            CoreError::Serialization(format!("Vault payload too large: {} bytes", ciphertext.len()))
        })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&header.version.to_le_bytes());
    buf.extend_from_slice(&header.kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&header.kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&header.kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(&header.salt);
    buf.extend_from_slice(&header.nonce);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(ciphertext);
    Ok(buf)
}

/// Sequential little-endian reader over the header bytes.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self, field: &str) -> Result<[u8; N], CoreError> {
        let end = self.offset + N;
        let slice = self.data.get(self.offset..end).ok_or_else(|| {
            CoreError::InvalidFileFormat(format!("Vault truncated while reading {field}"))
        })?;
        self.offset = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self, field: &str) -> Result<u32, CoreError> {
        Ok(u32::from_le_bytes(self.take::<4>(field)?))
    }
}

/// Parse and sanity-check a vault, returning the header and ciphertext.
pub fn read_vault(data: &[u8]) -> Result<(VaultHeader, &[u8]), CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a credential vault".into(),
        ));
    }
    let mut cur = Cursor { data, offset: 0 };

    if &cur.take::<4>("magic")? != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes — not a credential vault".into(),
        ));
    }

    let version = u16::from_le_bytes(cur.take::<2>("version")?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let kdf_params = KdfParams {
        memory_cost: cur.u32("memory_cost")?,
        time_cost: cur.u32("time_cost")?,
        parallelism: cur.u32("parallelism")?,
    };
    // Reject crafted headers that would make unlocking exhaust the device.
    if !(8..=262_144).contains(&kdf_params.memory_cost)
        || !(1..=10).contains(&kdf_params.time_cost)
        || !(1..=8).contains(&kdf_params.parallelism)
    {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF parameters out of range: {kdf_params:?}"
        )));
    }

    let salt = cur.take::<16>("salt")?;
    let nonce = cur.take::<12>("nonce")?;
    let len = cur.u32("ciphertext length")?;
    if len > MAX_CIPHERTEXT {
        return Err(CoreError::InvalidFileFormat(format!(
            "Vault payload length {len} exceeds {MAX_CIPHERTEXT}"
        )));
    }

    let start = cur.offset;
    let ciphertext = data.get(start..start + len as usize).ok_or_else(|| {
        CoreError::InvalidFileFormat(format!(
            "Vault truncated: expected {len} bytes of ciphertext, got {}",
            data.len() - start
        ))
    })?;

    Ok((
        VaultHeader {
            version,
            kdf_params,
            salt,
            nonce,
        },
        ciphertext,
    ))
}
