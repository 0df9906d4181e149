//! Key/value persistence for configuration records

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{RuntimeState, Settings, WifiCredentials};
use crate::error::StoreError;

/// Largest encoded record.
const RECORD_BUFFER: usize = 256;

/// Byte-oriented storage backend, one blob per key.
pub trait KeyValueStore {
    /// Read the blob stored under `key` into `buf`, returning its length.
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError>;
    /// Replace the blob stored under `key`.
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    /// Append to the blob stored under `key`, creating it if missing.
    fn append(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
    /// Length in bytes of the blob stored under `key`.
    fn size(&mut self, key: &str) -> Result<usize, StoreError>;
}

/// A store behind a blocking mutex, so the configuration and the log
/// writer can share one card.
pub struct SharedStore<'a, M: RawMutex, S> {
    inner: &'a Mutex<M, RefCell<S>>,
}

impl<'a, M: RawMutex, S> SharedStore<'a, M, S> {
    pub fn new(inner: &'a Mutex<M, RefCell<S>>) -> Self {
        Self { inner }
    }

    fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.inner.lock(|store| f(&mut store.borrow_mut()))
    }
}

impl<M: RawMutex, S: KeyValueStore> KeyValueStore for SharedStore<'_, M, S> {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.with(|store| store.read(key, buf))
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.with(|store| store.write(key, data))
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.with(|store| store.remove(key))
    }

    fn append(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.with(|store| store.append(key, data))
    }

    fn size(&mut self, key: &str) -> Result<usize, StoreError> {
        self.with(|store| store.size(key))
    }
}

/// A record with its own storage key.
pub trait Persisted: Serialize + DeserializeOwned + Default {
    const KEY: &'static str;
}

/// All three records, as loaded at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub settings: Settings,
    pub wifi: WifiCredentials,
    pub runtime: RuntimeState,
}

/// Typed access to a [`KeyValueStore`] using `postcard` encoding.
pub struct ConfigStore<S> {
    store: S,
}

impl<S: KeyValueStore> ConfigStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load a record, falling back to its defaults when it is missing or
    /// cannot be decoded.
    pub fn load<T: Persisted>(&mut self) -> T {
        let mut buf = [0u8; RECORD_BUFFER];
        let len = match self.store.read(T::KEY, &mut buf) {
            Ok(len) => len,
            Err(StoreError::NotFound) => {
                info!(" Config: {} not found, using defaults", T::KEY);
                return T::default();
            }
            Err(e) => {
                warn!(" Config: failed to read {}: {}", T::KEY, e);
                return T::default();
            }
        };

        match postcard::from_bytes(&buf[..len]) {
            Ok(value) => value,
            Err(e) => {
                warn!(" Config: {} is corrupt ({:?}), using defaults", T::KEY, e);
                T::default()
            }
        }
    }

    pub fn save<T: Persisted>(&mut self, value: &T) -> Result<(), StoreError> {
        let mut buf = [0u8; RECORD_BUFFER];
        let encoded = postcard::to_slice(value, &mut buf).map_err(|e| match e {
            postcard::Error::SerializeBufferFull => StoreError::Overflow,
            _ => StoreError::Encode,
        })?;
        self.store.write(T::KEY, encoded)?;
        info!(" Config: saved {} ({} bytes)", T::KEY, encoded.len());
        Ok(())
    }

    /// Remove a record so the next load yields its defaults.
    pub fn reset<T: Persisted>(&mut self) -> Result<(), StoreError> {
        match self.store.remove(T::KEY) {
            Ok(()) | Err(StoreError::NotFound) => {
                info!(" Config: reset {}", T::KEY);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Seed WiFi credentials from build-time defaults.
    ///
    /// Only a missing record is seeded. A cleared record is stored as an
    /// explicit empty value and stays unconfigured.
    pub fn seed_wifi(&mut self, ssid: &str, password: &str) -> WifiCredentials {
        let mut buf = [0u8; RECORD_BUFFER];
        match self.store.read(WifiCredentials::KEY, &mut buf) {
            Err(StoreError::NotFound) if !ssid.is_empty() => {}
            _ => return self.load(),
        }

        info!(" Config: seeding WiFi credentials from build defaults");
        let wifi = WifiCredentials::new(ssid, password);
        if let Err(e) = self.save(&wifi) {
            warn!(" Config: could not persist {}: {}", WifiCredentials::KEY, e);
        }
        wifi
    }

    pub fn load_all(&mut self) -> Config {
        Config {
            settings: self.load(),
            wifi: self.load(),
            runtime: self.load(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// Heap-backed store for the simulator and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write and remove fail with an I/O error.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::Io(crate::error::message("read-only store")));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError> {
        let data = self.entries.get(key).ok_or(StoreError::NotFound)?;
        let dest = buf.get_mut(..data.len()).ok_or(StoreError::Overflow)?;
        dest.copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.insert(String::from(key), Vec::from(data));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn append(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries
            .entry(String::from(key))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn size(&mut self, key: &str) -> Result<usize, StoreError> {
        self.entries
            .get(key)
            .map(Vec::len)
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatingMode;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_missing_records_load_defaults() {
        let mut config = ConfigStore::new(MemoryStore::new());
        assert_eq!(config.load_all(), Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let mut config = ConfigStore::new(MemoryStore::new());
        let runtime = RuntimeState {
            mode: OperatingMode::Station,
            screen_timeout_s: 120,
        };
        config.save(&runtime).unwrap();
        assert_eq!(config.load::<RuntimeState>(), runtime);
    }

    #[test]
    fn test_corrupt_record_falls_back() {
        let mut config = ConfigStore::new(MemoryStore::new());
        config
            .inner_mut()
            .write(RuntimeState::KEY, &[0xff, 0xff, 0xff])
            .unwrap();
        assert_eq!(config.load::<RuntimeState>(), RuntimeState::default());
    }

    #[test]
    fn test_reset_is_isolated_per_key() {
        let mut config = ConfigStore::new(MemoryStore::new());
        config.save(&WifiCredentials::new("lab", "secret")).unwrap();
        config
            .save(&RuntimeState {
                mode: OperatingMode::Station,
                screen_timeout_s: 60,
            })
            .unwrap();

        config.reset::<WifiCredentials>().unwrap();
        assert!(!config.load::<WifiCredentials>().is_configured());
        assert_eq!(config.load::<RuntimeState>().mode, OperatingMode::Station);

        // Resetting an absent record is not an error.
        assert_eq!(config.reset::<WifiCredentials>(), Ok(()));
    }

    #[test]
    fn test_seed_fills_missing_credentials() {
        let mut config = ConfigStore::new(MemoryStore::new());
        let wifi = config.seed_wifi("lab", "secret");
        assert_eq!(wifi.ssid.as_str(), "lab");
        assert_eq!(config.load::<WifiCredentials>(), wifi);

        // An empty build default leaves the record absent.
        let mut config = ConfigStore::new(MemoryStore::new());
        assert!(!config.seed_wifi("", "").is_configured());
        assert!(!config.inner().contains(WifiCredentials::KEY));
    }

    #[test]
    fn test_seed_keeps_stored_credentials() {
        let mut config = ConfigStore::new(MemoryStore::new());
        config.save(&WifiCredentials::new("home", "pw")).unwrap();
        assert_eq!(config.seed_wifi("lab", "secret").ssid.as_str(), "home");
    }

    #[test]
    fn test_cleared_credentials_survive_seeding() {
        let mut config = ConfigStore::new(MemoryStore::new());
        config.seed_wifi("lab", "secret");

        config.save(&WifiCredentials::default()).unwrap();
        let wifi = config.seed_wifi("lab", "secret");
        assert!(!wifi.is_configured());
        assert!(!config.load_all().wifi.is_configured());
    }

    #[test]
    fn test_shared_store_sees_one_backend() {
        let card: Mutex<NoopRawMutex, RefCell<MemoryStore>> = Mutex::new(RefCell::new(MemoryStore::new()));
        let mut config = ConfigStore::new(SharedStore::new(&card));
        let mut log = SharedStore::new(&card);

        config.save(&RuntimeState::default()).unwrap();
        log.append("SYS.LOG", b"one\n").unwrap();
        log.append("SYS.LOG", b"two\n").unwrap();

        assert_eq!(log.size("SYS.LOG"), Ok(8));
        assert!(card.lock(|store| store.borrow().contains(RuntimeState::KEY)));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        let mut config = ConfigStore::new(store);
        assert!(matches!(
            config.save(&RuntimeState::default()),
            Err(StoreError::Io(_))
        ));
    }
}
