//! Persistent stores: the single source of truth for users, device records,
//! preferences, pending email recoveries, and encrypted key material.
//!
//! Two logical databases exist, mirroring their on-disk separation:
//! `PasskeyClientDb` (users / devices / preferences / app-state) and
//! `PasskeyNearKeysDb` (encrypted key material only). Record semantics,
//! schema versioning, and migrations live here over a record-transactional
//! `StorageBackend`; the browser IndexedDB adapter is embedder glue. Only
//! encrypted forms and metadata are ever persisted.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::confirm_flow::ConfirmationConfig;
use crate::errors::{WalletError, WalletResult};

// === SCHEMA ===

pub const CLIENT_DB_NAME: &str = "passkeyClientDB";
pub const NEAR_KEYS_DB_NAME: &str = "passkeyNearKeysDB";

pub const STORE_USERS: &str = "users";
pub const STORE_DEVICES: &str = "devices";
pub const STORE_PREFERENCES: &str = "preferences";
pub const STORE_APP_STATE: &str = "appState";
pub const STORE_KEY_MATERIAL: &str = "keyMaterial";

const SCHEMA_VERSION_KEY: &str = "schemaVersion";

/// Pending email recoveries are abandoned after this long.
pub const RECOVERY_TTL_MS: f64 = 15.0 * 60.0 * 1000.0;

// === BACKEND SEAM ===

/// Record-level transactional storage: each get/put/delete is atomic for one
/// record. The in-memory backend is the reference implementation and the
/// test harness; IndexedDB supplies the same contract in the browser.
pub trait StorageBackend {
    fn get(&self, store: &str, key: &str) -> Option<Value>;
    fn put(&mut self, store: &str, key: &str, value: Value);
    fn delete(&mut self, store: &str, key: &str);
    fn keys(&self, store: &str) -> Vec<String>;
}

#[derive(Default)]
pub struct MemoryBackend {
    records: BTreeMap<(String, String), Value>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, store: &str, key: &str) -> Option<Value> {
        self.records
            .get(&(store.to_string(), key.to_string()))
            .cloned()
    }

    fn put(&mut self, store: &str, key: &str, value: Value) {
        self.records
            .insert((store.to_string(), key.to_string()), value);
    }

    fn delete(&mut self, store: &str, key: &str) {
        self.records.remove(&(store.to_string(), key.to_string()));
    }

    fn keys(&self, store: &str) -> Vec<String> {
        self.records
            .keys()
            .filter(|(s, _)| s == store)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

// === RECORD TYPES ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub account_id: String,
    pub registered_at_ms: f64,
    pub last_used_device_number: u8,
    /// PRF-wrapped VRF keypair (opaque ciphertext blob)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_vrf_keypair: Option<Value>,
    /// Relay-locked VRF keypair blob; `serverKeyId` inside must match an
    /// active or grace relay key at unlock time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_encrypted_vrf_keypair: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub account_id: String,
    /// Monotonically assigned starting at 1; (accountId, deviceNumber) unique
    pub device_number: u8,
    pub credential_id: String,
    /// COSE public key bytes from the registration attestation
    pub credential_public_key: Vec<u8>,
    pub transports: Vec<String>,
    pub vrf_public_key: String,
    pub created_at_ms: f64,
    pub last_used_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[serde(rename = "dark")]
    Dark,
    #[serde(rename = "light")]
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_config: Option<ConfirmationConfig>,
    pub last_used_device_number: u8,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            confirmation_config: None,
            last_used_device_number: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStatus {
    #[serde(rename = "awaiting-email")]
    AwaitingEmail,
    #[serde(rename = "awaiting-add-key")]
    AwaitingAddKey,
    #[serde(rename = "finalizing")]
    Finalizing,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
}

impl RecoveryStatus {
    /// Forward-only lifecycle; `Error` is reachable from any live state.
    fn can_transition_to(self, next: RecoveryStatus) -> bool {
        use RecoveryStatus::*;
        match (self, next) {
            (AwaitingEmail, AwaitingAddKey) => true,
            (AwaitingAddKey, Finalizing) => true,
            (Finalizing, Complete) => true,
            (AwaitingEmail | AwaitingAddKey | Finalizing, Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEmailRecovery {
    pub account_id: String,
    pub device_number: u8,
    pub new_near_public_key: String,
    pub request_id: String,
    pub encrypted_vrf_keypair: Value,
    pub vrf_public_key: String,
    /// Serialized registration credential (PRF-free)
    pub credential: Value,
    pub created_at_ms: f64,
    pub status: RecoveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyRecord {
    pub account_id: String,
    pub device_number: u8,
    pub encrypted_private_key_data: String,
    pub chacha20_nonce_b64u: String,
    pub wrap_key_salt_b64u: String,
}

// === CLIENT DB ===

pub struct PasskeyClientDb<B: StorageBackend> {
    backend: B,
}

fn device_key(account_id: &str, device_number: u8) -> String {
    format!("{}#{}", account_id, device_number)
}

fn recovery_key(account_id: &str, near_public_key: &str) -> String {
    format!("recovery:{}:{}", account_id, near_public_key)
}

impl<B: StorageBackend> PasskeyClientDb<B> {
    /// Current schema version. Migrations are append-only: new versions add
    /// steps, existing steps never change.
    pub const SCHEMA_VERSION: u32 = 3;

    pub fn open(backend: B) -> Self {
        let mut db = Self { backend };
        db.run_migrations();
        db
    }

    pub fn schema_version(&self) -> u32 {
        self.backend
            .get(STORE_APP_STATE, SCHEMA_VERSION_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    fn run_migrations(&mut self) {
        let mut version = self.schema_version();
        while version < Self::SCHEMA_VERSION {
            version += 1;
            debug!("{}: migrating to v{}", CLIENT_DB_NAME, version);
            match version {
                // v1: initial stores (nothing to transform)
                1 => {}
                // v2: preferences gained confirmationConfig (optional field;
                // old records deserialize unchanged)
                2 => {}
                // v3: pending recoveries moved into app-state keyed records
                3 => {}
                _ => {}
            }
            self.backend.put(
                STORE_APP_STATE,
                SCHEMA_VERSION_KEY,
                Value::from(version),
            );
        }
    }

    // --- users ---

    pub fn upsert_user(&mut self, user: &UserRecord) -> WalletResult<()> {
        let value = serde_json::to_value(user)
            .map_err(|e| WalletError::internal(format!("serialize user: {}", e)))?;
        self.backend.put(STORE_USERS, &user.account_id, value);
        Ok(())
    }

    pub fn get_user(&self, account_id: &str) -> Option<UserRecord> {
        self.backend
            .get(STORE_USERS, account_id)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Explicit deletion cascades to devices and preferences.
    pub fn delete_user(&mut self, account_id: &str) {
        self.backend.delete(STORE_USERS, account_id);
        self.backend.delete(STORE_PREFERENCES, account_id);
        for key in self.backend.keys(STORE_DEVICES) {
            if key.starts_with(&format!("{}#", account_id)) {
                self.backend.delete(STORE_DEVICES, &key);
            }
        }
    }

    // --- devices ---

    /// Add a device record, assigning the next device number (starting at 1).
    pub fn add_device(
        &mut self,
        account_id: &str,
        credential_id: &str,
        credential_public_key: Vec<u8>,
        transports: Vec<String>,
        vrf_public_key: &str,
        now_ms: f64,
    ) -> WalletResult<DeviceRecord> {
        let next_number = self
            .list_devices(account_id)
            .iter()
            .map(|d| d.device_number)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1);

        let record = DeviceRecord {
            account_id: account_id.to_string(),
            device_number: next_number,
            credential_id: credential_id.to_string(),
            credential_public_key,
            transports,
            vrf_public_key: vrf_public_key.to_string(),
            created_at_ms: now_ms,
            last_used_ms: now_ms,
        };
        self.put_device(&record)?;
        Ok(record)
    }

    /// Insert a device at an explicit slot. (accountId, deviceNumber) is
    /// unique; inserting over an existing slot is a conflict.
    pub fn insert_device_at(&mut self, record: &DeviceRecord) -> WalletResult<()> {
        if self
            .get_device(&record.account_id, record.device_number)
            .is_some()
        {
            return Err(WalletError::Conflict(format!(
                "device {} already exists for {}",
                record.device_number, record.account_id
            )));
        }
        self.put_device(record)
    }

    fn put_device(&mut self, record: &DeviceRecord) -> WalletResult<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| WalletError::internal(format!("serialize device: {}", e)))?;
        self.backend.put(
            STORE_DEVICES,
            &device_key(&record.account_id, record.device_number),
            value,
        );
        Ok(())
    }

    pub fn get_device(&self, account_id: &str, device_number: u8) -> Option<DeviceRecord> {
        self.backend
            .get(STORE_DEVICES, &device_key(account_id, device_number))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn list_devices(&self, account_id: &str) -> Vec<DeviceRecord> {
        let prefix = format!("{}#", account_id);
        let mut devices: Vec<DeviceRecord> = self
            .backend
            .keys(STORE_DEVICES)
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .filter_map(|k| self.backend.get(STORE_DEVICES, &k))
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        devices.sort_by_key(|d: &DeviceRecord| d.device_number);
        devices
    }

    /// Update lastUsed on login.
    pub fn touch_device(
        &mut self,
        account_id: &str,
        device_number: u8,
        now_ms: f64,
    ) -> WalletResult<()> {
        let mut record = self.get_device(account_id, device_number).ok_or_else(|| {
            WalletError::invalid_input(format!(
                "no device {} for {}",
                device_number, account_id
            ))
        })?;
        record.last_used_ms = now_ms;
        self.put_device(&record)
    }

    pub fn remove_device(&mut self, account_id: &str, device_number: u8) {
        self.backend
            .delete(STORE_DEVICES, &device_key(account_id, device_number));
    }

    // --- preferences ---

    pub fn set_preferences(&mut self, account_id: &str, prefs: &Preferences) -> WalletResult<()> {
        let value = serde_json::to_value(prefs)
            .map_err(|e| WalletError::internal(format!("serialize preferences: {}", e)))?;
        self.backend.put(STORE_PREFERENCES, account_id, value);
        Ok(())
    }

    pub fn get_preferences(&self, account_id: &str) -> Option<Preferences> {
        self.backend
            .get(STORE_PREFERENCES, account_id)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    // --- pending email recoveries (app-state) ---

    pub fn put_pending_recovery(&mut self, recovery: &PendingEmailRecovery) -> WalletResult<()> {
        let value = serde_json::to_value(recovery)
            .map_err(|e| WalletError::internal(format!("serialize recovery: {}", e)))?;
        self.backend.put(
            STORE_APP_STATE,
            &recovery_key(&recovery.account_id, &recovery.new_near_public_key),
            value,
        );
        Ok(())
    }

    pub fn get_pending_recovery(
        &self,
        account_id: &str,
        near_public_key: &str,
    ) -> Option<PendingEmailRecovery> {
        self.backend
            .get(STORE_APP_STATE, &recovery_key(account_id, near_public_key))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Advance a recovery through its lifecycle; invalid transitions are
    /// conflicts (a replayed or out-of-order update).
    pub fn update_recovery_status(
        &mut self,
        account_id: &str,
        near_public_key: &str,
        next: RecoveryStatus,
    ) -> WalletResult<()> {
        let mut recovery = self
            .get_pending_recovery(account_id, near_public_key)
            .ok_or_else(|| WalletError::invalid_input("no pending recovery".to_string()))?;

        if !recovery.status.can_transition_to(next) {
            return Err(WalletError::Conflict(format!(
                "invalid recovery transition {:?} -> {:?}",
                recovery.status, next
            )));
        }

        recovery.status = next;
        self.put_pending_recovery(&recovery)
    }

    pub fn remove_pending_recovery(&mut self, account_id: &str, near_public_key: &str) {
        self.backend
            .delete(STORE_APP_STATE, &recovery_key(account_id, near_public_key));
    }

    /// Drop recoveries past their TTL. Returns how many were pruned.
    pub fn prune_expired_recoveries(&mut self, now_ms: f64) -> usize {
        let mut pruned = 0;
        for key in self.backend.keys(STORE_APP_STATE) {
            if !key.starts_with("recovery:") {
                continue;
            }
            let Some(recovery) = self
                .backend
                .get(STORE_APP_STATE, &key)
                .and_then(|v| serde_json::from_value::<PendingEmailRecovery>(v).ok())
            else {
                continue;
            };
            if now_ms - recovery.created_at_ms >= RECOVERY_TTL_MS {
                self.backend.delete(STORE_APP_STATE, &key);
                pruned += 1;
            }
        }
        pruned
    }
}

// === NEAR KEYS DB ===

pub struct PasskeyNearKeysDb<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> PasskeyNearKeysDb<B> {
    pub fn open(backend: B) -> Self {
        Self { backend }
    }

    pub fn put_key_material(&mut self, record: &EncryptedKeyRecord) -> WalletResult<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| WalletError::internal(format!("serialize key material: {}", e)))?;
        self.backend.put(
            STORE_KEY_MATERIAL,
            &device_key(&record.account_id, record.device_number),
            value,
        );
        Ok(())
    }

    pub fn get_key_material(
        &self,
        account_id: &str,
        device_number: u8,
    ) -> Option<EncryptedKeyRecord> {
        self.backend
            .get(STORE_KEY_MATERIAL, &device_key(account_id, device_number))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn delete_key_material(&mut self, account_id: &str, device_number: u8) {
        self.backend
            .delete(STORE_KEY_MATERIAL, &device_key(account_id, device_number));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_db() -> PasskeyClientDb<MemoryBackend> {
        PasskeyClientDb::open(MemoryBackend::new())
    }

    #[test]
    fn open_runs_migrations_to_current_version() {
        let db = client_db();
        assert_eq!(db.schema_version(), PasskeyClientDb::<MemoryBackend>::SCHEMA_VERSION);
    }

    #[test]
    fn device_numbers_are_assigned_monotonically_from_one() {
        let mut db = client_db();
        let d1 = db
            .add_device("alice.testnet", "cred-1", vec![1], vec![], "vrf-pk-1", 100.0)
            .unwrap();
        let d2 = db
            .add_device("alice.testnet", "cred-2", vec![2], vec![], "vrf-pk-2", 200.0)
            .unwrap();
        assert_eq!(d1.device_number, 1);
        assert_eq!(d2.device_number, 2);

        // Removing device 1 does not recycle its number
        db.remove_device("alice.testnet", 1);
        let d3 = db
            .add_device("alice.testnet", "cred-3", vec![3], vec![], "vrf-pk-3", 300.0)
            .unwrap();
        assert_eq!(d3.device_number, 3);
    }

    #[test]
    fn device_slots_are_unique_per_account() {
        let mut db = client_db();
        let record = DeviceRecord {
            account_id: "alice.testnet".to_string(),
            device_number: 1,
            credential_id: "cred-1".to_string(),
            credential_public_key: vec![1],
            transports: vec!["internal".to_string()],
            vrf_public_key: "vrf-pk".to_string(),
            created_at_ms: 0.0,
            last_used_ms: 0.0,
        };
        db.insert_device_at(&record).unwrap();
        assert!(matches!(
            db.insert_device_at(&record),
            Err(WalletError::Conflict(_))
        ));

        // The same slot on another account is fine
        let other = DeviceRecord {
            account_id: "bob.testnet".to_string(),
            ..record
        };
        db.insert_device_at(&other).unwrap();
    }

    #[test]
    fn touch_device_updates_last_used() {
        let mut db = client_db();
        db.add_device("alice.testnet", "cred-1", vec![], vec![], "vrf-pk", 100.0)
            .unwrap();
        db.touch_device("alice.testnet", 1, 500.0).unwrap();
        assert_eq!(db.get_device("alice.testnet", 1).unwrap().last_used_ms, 500.0);

        assert!(db.touch_device("alice.testnet", 9, 500.0).is_err());
    }

    #[test]
    fn delete_user_cascades_to_devices_and_preferences() {
        let mut db = client_db();
        db.upsert_user(&UserRecord {
            account_id: "alice.testnet".to_string(),
            registered_at_ms: 0.0,
            last_used_device_number: 1,
            encrypted_vrf_keypair: Some(json!({ "encryptedVrfDataB64u": "AA" })),
            server_encrypted_vrf_keypair: None,
        })
        .unwrap();
        db.add_device("alice.testnet", "cred-1", vec![], vec![], "vrf-pk", 0.0)
            .unwrap();
        db.set_preferences("alice.testnet", &Preferences::default())
            .unwrap();

        db.delete_user("alice.testnet");

        assert!(db.get_user("alice.testnet").is_none());
        assert!(db.list_devices("alice.testnet").is_empty());
        assert!(db.get_preferences("alice.testnet").is_none());
    }

    fn recovery(created_at_ms: f64) -> PendingEmailRecovery {
        PendingEmailRecovery {
            account_id: "alice.testnet".to_string(),
            device_number: 1,
            new_near_public_key: "ed25519:newpk".to_string(),
            request_id: "req-recovery".to_string(),
            encrypted_vrf_keypair: json!({ "encryptedVrfDataB64u": "AA" }),
            vrf_public_key: "vrf-pk".to_string(),
            credential: json!({ "id": "cred", "type": "public-key" }),
            created_at_ms,
            status: RecoveryStatus::AwaitingEmail,
        }
    }

    #[test]
    fn recovery_lifecycle_is_forward_only() {
        let mut db = client_db();
        db.put_pending_recovery(&recovery(0.0)).unwrap();

        db.update_recovery_status("alice.testnet", "ed25519:newpk", RecoveryStatus::AwaitingAddKey)
            .unwrap();
        db.update_recovery_status("alice.testnet", "ed25519:newpk", RecoveryStatus::Finalizing)
            .unwrap();
        db.update_recovery_status("alice.testnet", "ed25519:newpk", RecoveryStatus::Complete)
            .unwrap();

        // Complete is terminal
        assert!(matches!(
            db.update_recovery_status("alice.testnet", "ed25519:newpk", RecoveryStatus::Error),
            Err(WalletError::Conflict(_))
        ));
    }

    #[test]
    fn recovery_can_error_from_any_live_state() {
        let mut db = client_db();
        db.put_pending_recovery(&recovery(0.0)).unwrap();
        db.update_recovery_status("alice.testnet", "ed25519:newpk", RecoveryStatus::Error)
            .unwrap();
    }

    #[test]
    fn expired_recoveries_are_pruned() {
        let mut db = client_db();
        db.put_pending_recovery(&recovery(0.0)).unwrap();

        assert_eq!(db.prune_expired_recoveries(RECOVERY_TTL_MS - 1.0), 0);
        assert_eq!(db.prune_expired_recoveries(RECOVERY_TTL_MS), 1);
        assert!(db
            .get_pending_recovery("alice.testnet", "ed25519:newpk")
            .is_none());
    }

    #[test]
    fn key_material_is_keyed_by_account_and_device() {
        let mut db = PasskeyNearKeysDb::open(MemoryBackend::new());
        let record = EncryptedKeyRecord {
            account_id: "alice.testnet".to_string(),
            device_number: 2,
            encrypted_private_key_data: "ciphertext".to_string(),
            chacha20_nonce_b64u: "nonce".to_string(),
            wrap_key_salt_b64u: "salt".to_string(),
        };
        db.put_key_material(&record).unwrap();

        assert_eq!(db.get_key_material("alice.testnet", 2), Some(record));
        assert!(db.get_key_material("alice.testnet", 1).is_none());

        db.delete_key_material("alice.testnet", 2);
        assert!(db.get_key_material("alice.testnet", 2).is_none());
    }

    #[test]
    fn preferences_roundtrip_with_confirmation_config() {
        let mut db = client_db();
        let prefs = Preferences {
            theme: Theme::Light,
            confirmation_config: Some(ConfirmationConfig::default()),
            last_used_device_number: 2,
        };
        db.set_preferences("alice.testnet", &prefs).unwrap();
        assert_eq!(db.get_preferences("alice.testnet"), Some(prefs));
    }
}
