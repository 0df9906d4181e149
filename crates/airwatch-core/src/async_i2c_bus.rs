//! Shared async I2C bus
//!
//! The climate and particulate sensors sit on one I2C bus. Each driver owns
//! a [`SharedI2c`] handle; the async mutex is held for one whole transaction
//! and released across the sampler's sleeps, so a slow read on one device
//! delays the other by at most that transaction.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

pub struct SharedI2c<'a, M: RawMutex, T> {
    bus: &'a Mutex<M, T>,
}

impl<'a, M: RawMutex, T> SharedI2c<'a, M, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<M, T>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, T: ErrorType> ErrorType for SharedI2c<'_, M, T> {
    type Error = T::Error;
}

impl<M: RawMutex, T: I2c> I2c for SharedI2c<'_, M, T> {
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal_async::i2c::ErrorKind;

    #[derive(Default)]
    struct CountingBus {
        addresses: heapless::Vec<u8, 8>,
    }

    impl ErrorType for CountingBus {
        type Error = ErrorKind;
    }

    impl I2c for CountingBus {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                if let Operation::Read(buf) = op {
                    buf.fill(address);
                }
            }
            self.addresses.push(address).map_err(|_| ErrorKind::Other)
        }
    }

    #[test]
    fn test_devices_share_one_bus() {
        let bus = Mutex::<NoopRawMutex, _>::new(CountingBus::default());
        let mut climate = SharedI2c::new(&bus);
        let mut particulate = SharedI2c::new(&bus);

        let mut buf = [0u8; 2];
        block_on(climate.write_read(0x44, &[0xFD], &mut buf)).unwrap();
        assert_eq!(buf, [0x44, 0x44]);
        block_on(particulate.read(0x12, &mut buf)).unwrap();

        let seen = block_on(bus.lock()).addresses.clone();
        assert_eq!(seen.as_slice(), &[0x44, 0x12]);
    }
}
