use crate::errors::{AuthError, Result};
use crate::signer::{LocalWallet, WalletSigner};
use chrono::{serde::ts_seconds, DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current on-disk key file schema version.
const KEYFILE_VERSION: u8 = 1;
const PLAINTEXT_WARNING: &str = "Key file stored without password protection";

/// Serialized wallet key written to disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub version: u8,
    pub address: String,
    pub public_key_hex: String,
    #[serde(with = "ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    private_key_hex: String,
}

impl KeyFile {
    /// Create a key file for a freshly generated wallet.
    pub fn generate() -> (Self, LocalWallet) {
        let wallet = LocalWallet::generate();
        (Self::from_wallet(&wallet), wallet)
    }

    pub fn from_wallet(wallet: &LocalWallet) -> Self {
        let owner = wallet.address();
        Self {
            version: KEYFILE_VERSION,
            address: owner.to_address(),
            public_key_hex: hex::encode(owner.as_bytes()),
            created_at: Utc::now(),
            warning: Some(PLAINTEXT_WARNING.to_string()),
            private_key_hex: hex::encode(wallet.secret_bytes()),
        }
    }

    /// Write the key file, refusing to overwrite an existing one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(AuthError::KeyFile(format!(
                "refusing to overwrite existing key file {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuthError::KeyFile(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| AuthError::KeyFile(e.to_string()))?;
        fs::write(path, json).map_err(|e| AuthError::KeyFile(e.to_string()))?;
        set_owner_only(path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            AuthError::KeyFile(format!("failed to read {}: {e}", path.display()))
        })?;
        let keyfile: KeyFile =
            serde_json::from_str(&data).map_err(|e| AuthError::KeyFile(e.to_string()))?;
        if keyfile.version != KEYFILE_VERSION {
            return Err(AuthError::KeyFile(format!(
                "unsupported key file version {}",
                keyfile.version
            )));
        }
        Ok(keyfile)
    }

    /// Recover the signing wallet, checking the stored public key matches.
    pub fn unlock(&self) -> Result<LocalWallet> {
        let secret: [u8; 32] = hex::decode(&self.private_key_hex)
            .map_err(|e| AuthError::KeyFile(format!("invalid private key hex: {e}")))?
            .try_into()
            .map_err(|_| AuthError::KeyFile("private key must be 32 bytes".to_string()))?;

        let wallet = LocalWallet::from_secret(secret);
        if hex::encode(wallet.address().as_bytes()) != self.public_key_hex
            || wallet.address().to_address() != self.address
        {
            return Err(AuthError::KeyFile(
                "stored public key does not match private key".to_string(),
            ));
        }
        Ok(wallet)
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| AuthError::KeyFile(e.to_string()))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_load_unlock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let (keyfile, wallet) = KeyFile::generate();
        keyfile.save(&path).unwrap();

        let loaded = KeyFile::load(&path).unwrap();
        let unlocked = loaded.unlock().unwrap();
        assert_eq!(unlocked.address(), wallet.address());
        assert_eq!(loaded.address, wallet.address().to_address());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        KeyFile::generate().0.save(&path).unwrap();
        assert!(KeyFile::generate().0.save(&path).is_err());
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let (mut keyfile, _) = KeyFile::generate();
        keyfile.public_key_hex = hex::encode([0u8; 32]);
        assert!(matches!(keyfile.unlock(), Err(AuthError::KeyFile(_))));
    }
}
