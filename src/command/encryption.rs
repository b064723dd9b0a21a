use crate::core::{Result, StoreError};
use lazy_static::lazy_static;
use std::fmt::Write as _;
use std::sync::Arc;

pub const NO_ENCRYPTION: &str = "none";
pub const KEYED_ENCRYPTION: &str = "key";

/// Transform applied to encoded value properties before they are stored.
pub trait DataEncryption: Send + Sync {
    /// Name written into the record header so readers pick the same transform.
    fn type_name(&self) -> &str;
    fn encrypt(&self, plain: &str) -> String;
    fn decrypt(&self, encrypted: &str) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncryption;

impl DataEncryption for NoEncryption {
    fn type_name(&self) -> &str {
        NO_ENCRYPTION
    }

    fn encrypt(&self, plain: &str) -> String {
        plain.to_string()
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        Ok(encrypted.to_string())
    }
}

/// Byte-wise key rotation, hex encoded. Obscures values at rest; not a
/// substitute for real cryptography.
#[derive(Debug, Clone)]
pub struct KeyedEncryption {
    key: Vec<u8>,
}

impl KeyedEncryption {
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(StoreError::DomainModel(
                "Keyed encryption requires a non-empty key".into(),
            ));
        }
        Ok(Self {
            key: key.as_bytes().to_vec(),
        })
    }

    fn key_byte(&self, index: usize) -> u8 {
        self.key[index % self.key.len()]
    }
}

impl DataEncryption for KeyedEncryption {
    fn type_name(&self) -> &str {
        KEYED_ENCRYPTION
    }

    fn encrypt(&self, plain: &str) -> String {
        let mut encrypted = String::with_capacity(plain.len() * 2);
        for (index, byte) in plain.bytes().enumerate() {
            let _ = write!(encrypted, "{:02x}", byte.wrapping_add(self.key_byte(index)));
        }
        encrypted
    }

    fn decrypt(&self, encrypted: &str) -> Result<String> {
        let corrupt = || StoreError::Storage(format!("Corrupt encrypted value '{}'", encrypted));
        if encrypted.len() % 2 != 0 {
            return Err(corrupt());
        }
        let bytes = (0..encrypted.len())
            .step_by(2)
            .enumerate()
            .map(|(index, offset)| {
                encrypted
                    .get(offset..offset + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .map(|byte| byte.wrapping_sub(self.key_byte(index)))
                    .ok_or_else(corrupt)
            })
            .collect::<Result<Vec<u8>>>()?;
        String::from_utf8(bytes).map_err(|_| corrupt())
    }
}

lazy_static! {
    static ref PASS_THROUGH: Arc<dyn DataEncryption> = Arc::new(NoEncryption);
}

/// Resolves an encryption transform by the type name stored in a record
/// header or configured on the store.
pub fn encryption_for(type_name: &str, key: Option<&str>) -> Result<Arc<dyn DataEncryption>> {
    match type_name {
        NO_ENCRYPTION => Ok(PASS_THROUGH.clone()),
        KEYED_ENCRYPTION => {
            let key = key.ok_or_else(|| {
                StoreError::DomainModel("Keyed encryption configured without a key".into())
            })?;
            Ok(Arc::new(KeyedEncryption::new(key)?))
        }
        other => Err(StoreError::DomainModel(format!(
            "Unknown encryption type '{}'",
            other
        ))),
    }
}

pub fn is_known_encryption(type_name: &str) -> bool {
    matches!(type_name, NO_ENCRYPTION | KEYED_ENCRYPTION)
}
