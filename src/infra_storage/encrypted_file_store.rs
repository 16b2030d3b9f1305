use crate::domain_model::*;
use crate::domain_port::*;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fixed key the session record is stored under.
pub const SESSION_STORAGE_KEY: &str = "session";

const NONCE_SIZE: usize = 12;

/// One encrypted file holding the session record.
///
/// File body: hex of `[nonce (12 bytes)][AES-256-GCM ciphertext]`, where the
/// plaintext is the JSON [`PersistedSession`]. The key is SHA-256 of the
/// configured secret.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileStore {
    pub fn new(dir: impl AsRef<Path>, secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self {
            path: dir.as_ref().join(format!("{SESSION_STORAGE_KEY}.enc")),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, PersistenceError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PersistenceError::Write(format!("cipher init failed: {e}")))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| PersistenceError::Write(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    fn open(&self, body: &str) -> Result<Vec<u8>, PersistenceError> {
        let sealed = hex::decode(body.trim())
            .map_err(|e| PersistenceError::Read(format!("not hex: {e}")))?;
        if sealed.len() < NONCE_SIZE {
            return Err(PersistenceError::Read("sealed record too short".to_string()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| PersistenceError::Read(format!("cipher init failed: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| PersistenceError::Read(format!("decryption failed: {e}")))
    }
}

#[async_trait::async_trait]
impl SessionPersistence for EncryptedFileStore {
    async fn load_session(&self) -> Result<SessionRecord, PersistenceError> {
        let body = match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(PersistenceError::NotFound),
            Err(e) => return Err(PersistenceError::Read(e.to_string())),
        };
        let plaintext = self.open(&body)?;
        let persisted: PersistedSession = serde_json::from_slice(&plaintext)
            .map_err(|e| PersistenceError::Read(format!("malformed record: {e}")))?;
        Ok(persisted.into())
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let plaintext = serde_json::to_vec(&PersistedSession::from(record))
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        let body = self.seal(&plaintext)?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PersistenceError::Write(e.to_string()))?;
        }
        let tmp = self.path.with_extension("enc.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        Ok(())
    }

    async fn delete_session(&self) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Write(e.to_string())),
        }
    }
}
