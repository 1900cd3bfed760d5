#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Platform keychain access, one entry per account under a fixed service.
#[derive(Clone)]
pub struct SecretVault {
    service_name: String,
    backend: SecretBackend,
}

#[derive(Clone)]
enum SecretBackend {
    Keyring,
    #[cfg(test)]
    Memory(Arc<Mutex<HashMap<String, SecretString>>>),
}

impl SecretVault {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            backend: SecretBackend::Keyring,
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            service_name: "in-memory".to_string(),
            backend: SecretBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    pub fn read(&self, account: &str) -> AppResult<Option<SecretString>> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                match entry.get_password() {
                    Ok(value) => Ok(Some(SecretString::from(value))),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => Ok(store.lock().get(account).cloned()),
        }
    }

    pub fn write(&self, account: &str, secret: &SecretString) -> AppResult<()> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                entry.set_password(secret.expose_secret())?;
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => {
                store.lock().insert(account.to_string(), secret.clone());
            }
        }
        debug!(
            target: "secret_vault",
            service = %self.service_name,
            account,
            "stored secret in secure backend"
        );
        Ok(())
    }

    pub fn delete(&self, account: &str) -> AppResult<()> {
        match &self.backend {
            SecretBackend::Keyring => {
                let entry = keyring::Entry::new(&self.service_name, account)?;
                match entry.delete_password() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(err) => Err(AppError::from(err)),
                }
            }
            #[cfg(test)]
            SecretBackend::Memory(store) => {
                store.lock().remove(account);
                Ok(())
            }
        }
    }

    pub fn has(&self, account: &str) -> AppResult<bool> {
        self.read(account).map(|secret| secret.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_reads_and_deletes() {
        let vault = SecretVault::in_memory();
        assert!(!vault.has("card").unwrap());

        vault
            .write("card", &SecretString::from("payload".to_string()))
            .unwrap();
        assert_eq!(
            vault.read("card").unwrap().unwrap().expose_secret(),
            "payload"
        );

        vault.delete("card").unwrap();
        vault.delete("card").unwrap();
        assert!(vault.read("card").unwrap().is_none());
    }
}
