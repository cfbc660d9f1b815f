//! Crypto Layer: symmetric payload encryption with key persistence and
//! rotation.
//!
//! Encrypt-then-MAC: AES-128-CBC for confidentiality, HMAC-SHA256 over the
//! IV and ciphertext for integrity.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{RegistryError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 16;
const MAC_KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// A single symmetric key pair: one half for AES, one half for HMAC,
/// derived from a single 32-byte random seed so the key ring only ever
/// persists one value per generation.
#[derive(Clone)]
pub struct Key {
    aes_key: [u8; KEY_LEN],
    mac_key: [u8; MAC_KEY_LEN],
}

impl Key {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut seed = [0u8; KEY_LEN + MAC_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    fn from_seed(seed: &[u8]) -> Self {
        let mut aes_key = [0u8; KEY_LEN];
        let mut mac_key = [0u8; MAC_KEY_LEN];
        aes_key.copy_from_slice(&seed[..KEY_LEN]);
        mac_key.copy_from_slice(&seed[KEY_LEN..KEY_LEN + MAC_KEY_LEN]);
        Self { aes_key, mac_key }
    }

    /// Base64url encoding of the underlying seed, for persistence.
    pub fn to_base64(&self) -> String {
        let mut seed = Vec::with_capacity(KEY_LEN + MAC_KEY_LEN);
        seed.extend_from_slice(&self.aes_key);
        seed.extend_from_slice(&self.mac_key);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(seed)
    }

    /// Parse a key from its base64url encoding.
    pub fn from_base64(s: &str) -> Result<Self> {
        let seed = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| RegistryError::Encryption {
                message: format!("invalid key encoding: {e}"),
            })?;
        if seed.len() != KEY_LEN + MAC_KEY_LEN {
            return Err(RegistryError::Encryption {
                message: "key has unexpected length".to_string(),
            });
        }
        Ok(Self::from_seed(&seed))
    }
}

/// A bounded history of keys: the most recent is used for encryption; all
/// retained keys are tried on decryption so values encrypted before a
/// rotation remain readable.
pub struct KeyRing {
    keys: VecDeque<Key>,
    max_depth: usize,
}

impl KeyRing {
    /// Create a key ring seeded with a single fresh key.
    pub fn new(max_depth: usize) -> Self {
        let mut keys = VecDeque::with_capacity(max_depth.max(1));
        keys.push_front(Key::generate());
        Self {
            keys,
            max_depth: max_depth.max(1),
        }
    }

    /// Rotate in a new active key, retaining up to `max_depth` previous
    /// keys for decrypt-only use.
    pub fn rotate(&mut self) {
        self.keys.push_front(Key::generate());
        while self.keys.len() > self.max_depth {
            self.keys.pop_back();
        }
    }

    /// The currently active (most recent) key.
    pub fn active_key(&self) -> &Key {
        &self.keys[0]
    }

    fn all_keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }
}

/// Symmetric encrypt/decrypt API backed by a [`KeyRing`].
pub struct CryptoLayer {
    key_ring: tokio::sync::RwLock<KeyRing>,
    key_path: PathBuf,
}

impl CryptoLayer {
    /// Load the key ring from `key_path` if present, otherwise generate and
    /// persist a new one with mode 0600.
    pub async fn open(key_path: impl Into<PathBuf>, max_ring_depth: usize) -> Result<Self> {
        let key_path = key_path.into();
        let key_ring = if tokio::fs::try_exists(&key_path).await? {
            let encoded = tokio::fs::read_to_string(&key_path).await?;
            let mut keys = VecDeque::new();
            for line in encoded.lines().filter(|l| !l.is_empty()) {
                keys.push_back(Key::from_base64(line)?);
            }
            if keys.is_empty() {
                keys.push_back(Key::generate());
            }
            KeyRing {
                keys,
                max_depth: max_ring_depth.max(1),
            }
        } else {
            let ring = KeyRing::new(max_ring_depth);
            persist_key_ring(&key_path, &ring).await?;
            ring
        };

        Ok(Self {
            key_ring: tokio::sync::RwLock::new(key_ring),
            key_path,
        })
    }

    /// Rotate the active key and persist the updated ring.
    pub async fn rotate(&self) -> Result<()> {
        let mut ring = self.key_ring.write().await;
        ring.rotate();
        persist_key_ring(&self.key_path, &ring).await
    }

    /// Encrypt arbitrary bytes with the active key: `iv || ciphertext || tag`,
    /// base64url-encoded.
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let ring = self.key_ring.read().await;
        let key = ring.active_key();
        Ok(encrypt_with_key(key, plaintext))
    }

    /// Decrypt a ciphertext produced by [`CryptoLayer::encrypt`], trying
    /// every key in the ring (active first) until one verifies.
    pub async fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let ring = self.key_ring.read().await;
        for key in ring.all_keys() {
            if let Ok(plaintext) = decrypt_with_key(key, ciphertext) {
                return Ok(plaintext);
            }
        }
        Err(RegistryError::Encryption {
            message: "no key in the ring could decrypt this ciphertext".to_string(),
        })
    }

    /// Encrypt the canonical JSON of a map.
    pub async fn encrypt_map(
        &self,
        value: &std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let json = serde_json::to_vec(value)?;
        self.encrypt(&json).await
    }

    /// Decrypt into a map, the inverse of [`CryptoLayer::encrypt_map`].
    pub async fn decrypt_map(
        &self,
        ciphertext: &str,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>> {
        let bytes = self.decrypt(ciphertext).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

async fn persist_key_ring(path: &Path, ring: &KeyRing) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let encoded = ring
        .all_keys()
        .map(|k| k.to_base64())
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(path, encoded).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, permissions).await?;
    }

    Ok(())
}

fn encrypt_with_key(key: &Key, plaintext: &[u8]) -> String {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = Aes128CbcEnc::new(&key.aes_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = HmacSha256::new_from_slice(&key.mac_key).expect("HMAC accepts any key length");
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(out)
}

fn decrypt_with_key(key: &Key, encoded: &str) -> Result<Vec<u8>> {
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| RegistryError::Encryption {
            message: format!("invalid ciphertext encoding: {e}"),
        })?;

    if raw.len() < IV_LEN + TAG_LEN {
        return Err(RegistryError::Encryption {
            message: "ciphertext too short".to_string(),
        });
    }

    let (iv, rest) = raw.split_at(IV_LEN);
    let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

    let mut mac = HmacSha256::new_from_slice(&key.mac_key).expect("HMAC accepts any key length");
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| RegistryError::Encryption {
            message: "authentication tag mismatch".to_string(),
        })?;

    let iv_arr: [u8; IV_LEN] = iv.try_into().expect("checked length above");
    Aes128CbcDec::new(&key.aes_key.into(), &iv_arr.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| RegistryError::Encryption {
            message: format!("padding error: {e}"),
        })
}
