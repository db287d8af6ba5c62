//! Persisted per-device parameter sets.
//!
//! Each device's [`ParameterSet`] lives as one postcard blob behind a
//! [`Storage`] backend, keyed `"PARA1"`..`"PARA4"` under the
//! [`STORE_NAMESPACE`] namespace. The store keeps a cached copy of what it
//! last pushed to hardware and only persists a set after the hardware
//! accepted it.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use log::warn;

use crate::device::Device;
use crate::error::{Error, ParamError, Result, StorageError, TransportError};
use crate::registers::fields::ControlMode;
use crate::transport::MAX_DEVICES;

use super::{table, AdvancedParam, ParamValue, ParameterSet};

/// Namespace the parameter blobs are stored under.
pub const STORE_NAMESPACE: &str = "powerSTEP01";

/// Largest serialized parameter set the store will handle.
const BLOB_CAP: usize = 512;

/// Settle time after RESET_DEVICE before the register file is usable.
const RESET_SETTLE_MS: u32 = 10;

/// Key/value blob persistence, NVS-shaped. All keys belong to
/// [`STORE_NAMESPACE`].
pub trait Storage {
    /// Reads the blob stored under `key` into `buf`, returning its length.
    /// A missing key is [`StorageError::NotFound`].
    fn load(&mut self, key: &str, buf: &mut [u8]) -> core::result::Result<usize, StorageError>;

    /// Stores `data` under `key`, replacing any previous blob.
    fn save(&mut self, key: &str, data: &[u8]) -> core::result::Result<(), StorageError>;
}

/// In-memory [`Storage`] backend for tests and hosts without flash.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: heapless::FnvIndexMap<heapless::String<16>, heapless::Vec<u8, BLOB_CAP>, 8>,
}

impl MemoryStorage {
    /// An empty store.
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&mut self, key: &str, buf: &mut [u8]) -> core::result::Result<usize, StorageError> {
        let data = match self.blobs.get(&short_key(key)) {
            Some(data) => data,
            None => return Err(StorageError::NotFound(short_key(key))),
        };
        if data.len() > buf.len() {
            return Err(StorageError::Corrupt(short_key(key)));
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn save(&mut self, key: &str, data: &[u8]) -> core::result::Result<(), StorageError> {
        let mut blob = heapless::Vec::new();
        blob.extend_from_slice(data)
            .map_err(|_| StorageError::Serialize)?;
        self.blobs
            .insert(short_key(key), blob)
            .map(|_| ())
            .map_err(|_| StorageError::Backend(backend_msg("storage full")))
    }
}

fn short_key(key: &str) -> heapless::String<16> {
    let mut out = heapless::String::new();
    for c in key.chars().take(16) {
        let _ = out.push(c);
    }
    out
}

fn backend_msg(msg: &str) -> heapless::String<64> {
    let mut out = heapless::String::new();
    let _ = out.push_str(msg);
    out
}

pub(crate) fn blob_key(motor: usize) -> heapless::String<16> {
    let mut key = heapless::String::new();
    let _ = write!(key, "PARA{}", motor + 1);
    key
}

/// A profile that would leave the motor unable to move is never persisted.
fn zero_profile(set: &ParameterSet) -> bool {
    set.max_speed == 0.0 && set.min_speed == 0.0 && set.acc == 0.0 && set.dec == 0.0
}

/// Per-device parameter sets, cached in memory and persisted through `S`.
#[derive(Debug)]
pub struct ParamStore<S> {
    storage: S,
    sets: [Option<ParameterSet>; MAX_DEVICES],
}

impl<S: Storage> ParamStore<S> {
    /// A store with no cached sets; call [`ParamStore::init_device`] per
    /// motor before anything else.
    pub fn new(storage: S) -> ParamStore<S> {
        ParamStore {
            storage,
            sets: [None, None, None, None],
        }
    }

    /// Loads the device's persisted set, or falls back to the factory
    /// defaults for `mode`, pushes it to hardware, and caches it. The
    /// defaults are persisted when no usable blob existed.
    pub fn init_device<SPI: SpiDevice>(
        &mut self,
        dev: &mut Device<'_, SPI>,
        mode: ControlMode,
    ) -> Result<()> {
        let motor = dev.index();
        let (set, from_defaults) = match self.load_blob(motor) {
            Ok(set) if !zero_profile(&set) => (set, false),
            Ok(_) => {
                warn!("motor {}: persisted profile is all-zero, using defaults", motor);
                (ParameterSet::defaults_for(mode), true)
            }
            Err(Error::Storage(StorageError::NotFound(_))) => {
                (ParameterSet::defaults_for(mode), true)
            }
            Err(err) => {
                warn!("motor {}: parameter blob unusable ({}), using defaults", motor, err);
                (ParameterSet::defaults_for(mode), true)
            }
        };
        set.apply_all(dev)?;
        if from_defaults {
            self.persist(motor, &set)?;
        }
        *self.slot(motor)? = Some(set);
        Ok(())
    }

    /// Writes one named parameter to hardware and, on success, persists the
    /// updated set. A failed or unverified hardware write leaves the
    /// persisted blob untouched.
    pub fn set<SPI: SpiDevice>(
        &mut self,
        dev: &mut Device<'_, SPI>,
        param: AdvancedParam,
        value: ParamValue,
    ) -> Result<()> {
        let motor = dev.index();
        let mut next = match self.slot(motor)?.as_ref() {
            Some(set) => set.clone(),
            None => return Err(StorageError::NotFound(blob_key(motor)).into()),
        };
        table::write_param(dev, &mut next, param, value)?;
        *self.slot(motor)? = Some(next.clone());
        self.persist(motor, &next)
    }

    /// Reads one named parameter live from hardware.
    pub fn get<SPI: SpiDevice>(
        &mut self,
        dev: &mut Device<'_, SPI>,
        param: AdvancedParam,
    ) -> Result<ParamValue> {
        table::read_param(dev, param)
    }

    /// The set last pushed to this motor, if it was initialized.
    pub fn cached(&self, motor: usize) -> Option<&ParameterSet> {
        self.sets.get(motor).and_then(Option::as_ref)
    }

    /// Resets the device, re-applies the factory defaults for `mode` and
    /// persists them.
    pub fn reset_all<SPI: SpiDevice, D: DelayNs>(
        &mut self,
        dev: &mut Device<'_, SPI>,
        delay: &mut D,
        mode: ControlMode,
    ) -> Result<()> {
        let motor = dev.index();
        dev.reset_device()?;
        delay.delay_ms(RESET_SETTLE_MS);
        let set = ParameterSet::defaults_for(mode);
        set.apply_all(dev)?;
        self.persist(motor, &set)?;
        *self.slot(motor)? = Some(set);
        Ok(())
    }

    fn load_blob(&mut self, motor: usize) -> Result<ParameterSet> {
        let key = blob_key(motor);
        let mut buf = [0u8; BLOB_CAP];
        let len = self.storage.load(&key, &mut buf)?;
        postcard::from_bytes(&buf[..len]).map_err(|_| StorageError::Corrupt(key).into())
    }

    fn persist(&mut self, motor: usize, set: &ParameterSet) -> Result<()> {
        if zero_profile(set) {
            return Err(ParamError::InvalidProfile.into());
        }
        let mut buf = [0u8; BLOB_CAP];
        let used = postcard::to_slice(set, &mut buf).map_err(|_| StorageError::Serialize)?;
        self.storage.save(&blob_key(motor), used)?;
        Ok(())
    }

    fn slot(&mut self, motor: usize) -> Result<&mut Option<ParameterSet>> {
        let count = MAX_DEVICES;
        self.sets
            .get_mut(motor)
            .ok_or_else(|| TransportError::DeviceOutOfRange { index: motor, count }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_keys_are_one_based() {
        assert_eq!(blob_key(0).as_str(), "PARA1");
        assert_eq!(blob_key(3).as_str(), "PARA4");
    }

    #[test]
    fn memory_storage_round_trips() {
        let mut storage = MemoryStorage::new();
        storage.save("PARA1", &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(storage.load("PARA1", &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn missing_key_is_not_found() {
        let mut storage = MemoryStorage::new();
        let mut buf = [0u8; 8];
        assert!(matches!(
            storage.load("PARA2", &mut buf),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn zero_profile_is_refused() {
        let mut set = ParameterSet::voltage_defaults();
        set.max_speed = 0.0;
        set.min_speed = 0.0;
        set.acc = 0.0;
        set.dec = 0.0;
        assert!(zero_profile(&set));

        let mut store = ParamStore::new(MemoryStorage::new());
        assert!(matches!(
            store.persist(0, &set),
            Err(Error::Param(ParamError::InvalidProfile))
        ));
        let mut buf = [0u8; BLOB_CAP];
        assert!(store.storage.load("PARA1", &mut buf).is_err());
    }

    #[test]
    fn persisted_set_decodes_again() {
        let mut store = ParamStore::new(MemoryStorage::new());
        let set = ParameterSet::current_defaults();
        store.persist(2, &set).unwrap();
        let loaded = store.load_blob(2).unwrap();
        assert_eq!(loaded, set);
    }
}
