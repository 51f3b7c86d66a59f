use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy::{primitives::Address, signers::Signer, signers::local::PrivateKeySigner};
use chrono::Utc;
use serde::Deserialize;

use crate::{error::ChainError, transaction::Account};

/// A decrypted account able to sign transactions.
#[derive(Clone, Debug)]
pub struct ProfilingAccount {
    address: Address,
    signer: PrivateKeySigner,
}

impl ProfilingAccount {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn account(&self) -> Account {
        Account {
            address: self.address,
        }
    }
}

/// Drops every account whose address was already seen, keeping the first copy.
/// Two copies of one key would otherwise be handed the same nonces.
pub fn unique_accounts(accounts: Vec<ProfilingAccount>) -> Vec<ProfilingAccount> {
    let mut seen = HashSet::new();
    accounts
        .into_iter()
        .filter(|account| {
            let first = seen.insert(account.address());
            if !first {
                tracing::warn!(address = ?account.address(), "Skipping duplicate account");
            }
            first
        })
        .collect()
}

/// Lists keystore candidates in `dir`, sorted by file name. Directories and
/// dotfiles are ignored.
pub fn keystore_paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ChainError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| ChainError::keystore(dir, e.to_string()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ChainError::keystore(dir, e.to_string()))?;
        let path = entry.path();

        let is_hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));

        if path.is_file() && !is_hidden {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Decrypts a single keystore file.
pub fn load_account(path: impl AsRef<Path>, password: &str) -> Result<ProfilingAccount, ChainError> {
    let path = path.as_ref();
    let signer = PrivateKeySigner::decrypt_keystore(path, password)
        .map_err(|e| ChainError::keystore(path, format!("Failed to decrypt keystore: {e}")))?;

    Ok(ProfilingAccount::new(signer))
}

/// Decrypts every keystore in `dir`. Any unreadable keystore fails the whole load.
pub fn load_accounts(dir: impl AsRef<Path>, password: &str) -> Result<Vec<ProfilingAccount>, ChainError> {
    keystore_paths(dir)?
        .into_iter()
        .map(|path| {
            let account = load_account(&path, password)?;
            tracing::debug!(address = ?account.address(), path = ?path, "Loaded account");
            Ok(account)
        })
        .collect()
}

/// Like [`load_accounts`], but keystores that fail to decrypt are logged and
/// skipped instead of failing the load.
pub fn load_readable_accounts(
    dir: impl AsRef<Path>,
    password: &str,
) -> Result<Vec<ProfilingAccount>, ChainError> {
    let mut accounts = Vec::new();
    for path in keystore_paths(dir)? {
        match load_account(&path, password) {
            Ok(account) => accounts.push(account),
            Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping unreadable keystore"),
        }
    }
    Ok(accounts)
}

#[derive(Deserialize)]
struct KeystoreAddress {
    address: Option<String>,
}

fn address_from_file_name(path: &Path) -> Option<Address> {
    let name = path.file_name()?.to_str()?;
    let suffix = name.rsplit("--").next()?;
    Address::from_str(suffix).ok()
}

fn address_from_contents(data: &[u8]) -> Option<Address> {
    let parsed: KeystoreAddress = serde_json::from_slice(data).ok()?;
    Address::from_str(&parsed.address?).ok()
}

/// Reads account addresses without decrypting. The address comes from the
/// keystore's `address` field, falling back to the `UTC--<time>--<address>`
/// file name. Empty and unrecognised files are skipped.
pub fn read_accounts(dir: impl AsRef<Path>) -> Result<Vec<Account>, ChainError> {
    let mut accounts = Vec::new();

    for path in keystore_paths(dir)? {
        let data = fs::read(&path).map_err(|e| ChainError::keystore(&path, e.to_string()))?;
        if data.is_empty() {
            continue;
        }

        match address_from_contents(&data).or_else(|| address_from_file_name(&path)) {
            Some(address) => accounts.push(Account { address }),
            None => tracing::debug!(path = ?path, "Skipping file without a recognisable address"),
        }
    }

    Ok(accounts)
}

/// Generates `count` new encrypted keystores in `dir`, creating it if needed.
///
/// Keystores use the library's default scrypt parameters; these accounts are
/// meant for throwaway profiling funds only.
pub fn create_accounts(
    dir: impl AsRef<Path>,
    count: usize,
    password: &str,
) -> Result<Vec<Account>, ChainError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| ChainError::keystore(dir, e.to_string()))?;

    let mut rng = rand::thread_rng();
    let mut accounts = Vec::with_capacity(count);

    for _ in 0..count {
        let signer = PrivateKeySigner::random_with(&mut rng);
        let address = signer.address();
        let file_name = format!(
            "UTC--{}--{}",
            Utc::now().format("%Y-%m-%dT%H-%M-%S%.9fZ"),
            hex_address(address)
        );

        PrivateKeySigner::encrypt_keystore(
            dir,
            &mut rng,
            signer.credential().to_bytes(),
            password,
            Some(&file_name),
        )
        .map_err(|e| ChainError::keystore(dir.join(&file_name), e.to_string()))?;

        tracing::info!(address = ?address, "Created account");
        accounts.push(Account { address });
    }

    Ok(accounts)
}

fn hex_address(address: Address) -> String {
    let checksummed = address.to_string();
    checksummed.trim_start_matches("0x").to_lowercase()
}
