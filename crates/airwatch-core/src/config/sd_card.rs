use alloc::format;

use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};

use super::KeyValueStore;
use crate::error::{StoreError, message};

/// One file per key in the root directory of the first FAT volume.
///
/// These operations are blocking, like the display writes sharing the same
/// SPI bus. Records are small and only written from menu actions; the log
/// file is appended one line at a time.
pub struct SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

fn store_error(e: embedded_sdmmc::Error<SdCardError>) -> StoreError {
    match e {
        embedded_sdmmc::Error::NotFound => StoreError::NotFound,
        other => StoreError::Io(message(&format!("{:?}", other))),
    }
}

impl<S, D, T> SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(sd_card, ts);

        Self { volume_mgr }
    }

    fn read_file(
        &self,
        key: &str,
        buf: &mut [u8],
    ) -> Result<(usize, bool), embedded_sdmmc::Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(key, Mode::ReadOnly)?;

        let mut count = 0;
        while count < buf.len() {
            let read = file.read(&mut buf[count..])?;
            if read == 0 {
                break;
            }
            count += read;
        }
        let truncated = (file.length() as usize) > count;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok((count, truncated))
    }

    fn write_file(&self, key: &str, data: &[u8]) -> Result<(), embedded_sdmmc::Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(key, Mode::ReadWriteCreateOrTruncate)?;

        file.write(data)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn append_file(&self, key: &str, data: &[u8]) -> Result<(), embedded_sdmmc::Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(key, Mode::ReadWriteCreateOrAppend)?;

        file.write(data)?;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn file_size(&self, key: &str) -> Result<usize, embedded_sdmmc::Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(key, Mode::ReadOnly)?;
        let length = file.length() as usize;

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(length)
    }

    fn remove_file(&self, key: &str) -> Result<(), embedded_sdmmc::Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        root_dir.delete_file_in_dir(key)?;

        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }
}

impl<S, D, T> KeyValueStore for SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn read(&mut self, key: &str, buf: &mut [u8]) -> Result<usize, StoreError> {
        match self.read_file(key, buf).map_err(store_error)? {
            (_, true) => Err(StoreError::Overflow),
            (count, false) => Ok(count),
        }
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.write_file(key, data).map_err(store_error)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.remove_file(key).map_err(store_error)
    }

    fn append(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.append_file(key, data).map_err(store_error)
    }

    fn size(&mut self, key: &str) -> Result<usize, StoreError> {
        self.file_size(key).map_err(store_error)
    }
}
