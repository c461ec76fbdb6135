//! MPU-6050 accelerometer over I2C
//!
//! Only the accelerometer is read. The gyro is configured so the part
//! runs with its usual clock source, but its data is ignored.

use embedded_hal::i2c::I2c;
use trolley_core::traits::{AccelSample, Accelerometer, SensorError};

/// Default address with AD0 tied low
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Register addresses
pub mod reg {
    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const WHO_AM_I: u8 = 0x75;
}

/// WHO_AM_I value of a genuine part
const DEVICE_ID: u8 = 0x68;

/// PWR_MGMT_1: awake, PLL with X gyro reference
const CLOCK_PLL_XGYRO: u8 = 0x01;

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    fn bits(self) -> u8 {
        match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        }
    }

    /// Raw counts per g
    pub fn lsb_per_g(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mpu6050Config {
    pub address: u8,
    pub range: AccelRange,
    /// DLPF_CFG value; 3 gives about 42 Hz accelerometer bandwidth
    pub dlpf: u8,
    /// Output rate in Hz (1 kHz internal rate with the DLPF on)
    pub sample_rate_hz: u16,
    /// GYRO_CONFIG FS_SEL; 1 is ±500 °/s
    pub gyro_range: u8,
}

impl Default for Mpu6050Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            range: AccelRange::G8,
            dlpf: 3,
            sample_rate_hz: 100,
            gyro_range: 1,
        }
    }
}

impl Mpu6050Config {
    /// SMPLRT_DIV for the requested rate
    pub fn sample_rate_divider(&self) -> u8 {
        let rate = self.sample_rate_hz.clamp(4, 1000);
        (1000 / rate - 1) as u8
    }
}

/// MPU-6050 on an I2C bus
pub struct Mpu6050<I2C> {
    i2c: I2C,
    config: Mpu6050Config,
    initialized: bool,
}

impl<I2C: I2c> Mpu6050<I2C> {
    pub fn new(i2c: I2C, config: Mpu6050Config) -> Self {
        Self {
            i2c,
            config,
            initialized: false,
        }
    }

    /// Check the device identity, wake it and apply the configuration
    pub fn init(&mut self) -> Result<(), SensorError> {
        if self.read_register(reg::WHO_AM_I)? != DEVICE_ID {
            return Err(SensorError::NotFound);
        }

        self.write_register(reg::PWR_MGMT_1, CLOCK_PLL_XGYRO)?;
        self.write_register(reg::SMPLRT_DIV, self.config.sample_rate_divider())?;
        self.write_register(reg::CONFIG, self.config.dlpf & 0x07)?;
        self.write_register(reg::GYRO_CONFIG, (self.config.gyro_range & 0x03) << 3)?;
        self.write_register(reg::ACCEL_CONFIG, self.config.range.bits() << 3)?;

        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &Mpu6050Config {
        &self.config
    }

    /// Raw accelerometer counts (x, y, z)
    pub fn read_raw(&mut self) -> Result<[i16; 3], SensorError> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        let mut buf = [0u8; 6];
        self.i2c
            .write_read(self.config.address, &[reg::ACCEL_XOUT_H], &mut buf)
            .map_err(|_| SensorError::Bus)?;
        Ok([
            i16::from_be_bytes([buf[0], buf[1]]),
            i16::from_be_bytes([buf[2], buf[3]]),
            i16::from_be_bytes([buf[4], buf[5]]),
        ])
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(self.config.address, &[register], &mut value)
            .map_err(|_| SensorError::Bus)?;
        Ok(value[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.config.address, &[register, value])
            .map_err(|_| SensorError::Bus)
    }
}

impl<I2C: I2c> Accelerometer for Mpu6050<I2C> {
    fn read(&mut self) -> Result<AccelSample, SensorError> {
        let [x, y, z] = self.read_raw()?;
        let scale = self.config.range.lsb_per_g();
        Ok(AccelSample::new(
            x as f32 / scale,
            y as f32 / scale,
            z as f32 / scale,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    #[derive(Debug)]
    struct MockError;

    impl embedded_hal::i2c::Error for MockError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Register file behind a fake bus
    struct MockBus {
        regs: [u8; 128],
        pointer: u8,
        fail: bool,
        writes: u32,
    }

    impl MockBus {
        fn new() -> Self {
            let mut regs = [0u8; 128];
            regs[reg::WHO_AM_I as usize] = DEVICE_ID;
            Self {
                regs,
                pointer: 0,
                fail: false,
                writes: 0,
            }
        }

        fn set_accel(&mut self, raw: [i16; 3]) {
            let base = reg::ACCEL_XOUT_H as usize;
            for (i, value) in raw.iter().enumerate() {
                let bytes = value.to_be_bytes();
                self.regs[base + 2 * i] = bytes[0];
                self.regs[base + 2 * i + 1] = bytes[1];
            }
        }
    }

    impl ErrorType for MockBus {
        type Error = MockError;
    }

    impl I2c for MockBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail || address != DEFAULT_ADDRESS {
                return Err(MockError);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.pointer = bytes[0];
                        if let Some(value) = bytes.get(1) {
                            self.regs[self.pointer as usize] = *value;
                            self.writes += 1;
                        }
                    }
                    Operation::Read(buf) => {
                        for byte in buf.iter_mut() {
                            *byte = self.regs[self.pointer as usize];
                            self.pointer += 1;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_init_configures_device() {
        let mut mpu = Mpu6050::new(MockBus::new(), Mpu6050Config::default());
        mpu.init().unwrap();
        assert!(mpu.is_initialized());

        let bus = mpu.release();
        assert_eq!(bus.regs[reg::PWR_MGMT_1 as usize], 0x01);
        assert_eq!(bus.regs[reg::SMPLRT_DIV as usize], 9);
        assert_eq!(bus.regs[reg::CONFIG as usize], 3);
        assert_eq!(bus.regs[reg::GYRO_CONFIG as usize], 0x08);
        assert_eq!(bus.regs[reg::ACCEL_CONFIG as usize], 0x10);
        assert_eq!(bus.writes, 5);
    }

    #[test]
    fn test_wrong_identity_rejected() {
        let mut bus = MockBus::new();
        bus.regs[reg::WHO_AM_I as usize] = 0x70;
        let mut mpu = Mpu6050::new(bus, Mpu6050Config::default());
        assert_eq!(mpu.init(), Err(SensorError::NotFound));
        assert!(!mpu.is_initialized());
    }

    #[test]
    fn test_read_before_init() {
        let mut mpu = Mpu6050::new(MockBus::new(), Mpu6050Config::default());
        assert_eq!(mpu.read(), Err(SensorError::NotInitialized));
    }

    #[test]
    fn test_read_scales_to_g() {
        let mut bus = MockBus::new();
        bus.set_accel([2048, -4096, 4096]);
        let mut mpu = Mpu6050::new(bus, Mpu6050Config::default());
        mpu.init().unwrap();

        let sample = mpu.read().unwrap();
        assert!((sample.x_g - 0.5).abs() < 1e-6);
        assert!((sample.y_g + 1.0).abs() < 1e-6);
        assert!((sample.z_g - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bus_error_reported() {
        let mut mpu = Mpu6050::new(MockBus::new(), Mpu6050Config::default());
        mpu.init().unwrap();
        let mut bus = mpu.release();
        bus.fail = true;
        let mut mpu = Mpu6050 {
            i2c: bus,
            config: Mpu6050Config::default(),
            initialized: true,
        };
        assert_eq!(mpu.read(), Err(SensorError::Bus));
    }

    #[test]
    fn test_sample_rate_divider() {
        let mut config = Mpu6050Config::default();
        assert_eq!(config.sample_rate_divider(), 9);
        config.sample_rate_hz = 1000;
        assert_eq!(config.sample_rate_divider(), 0);
        config.sample_rate_hz = 0;
        assert_eq!(config.sample_rate_divider(), 249);
    }
}
