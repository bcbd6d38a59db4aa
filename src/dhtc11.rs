//! DHTC11 driver: initialization, measurement orchestration and unit
//! conversion.
//!
//! The sensor ships two factory calibration constants that [`Dhtc11::begin`]
//! fetches once over the bus; every humidity reading is mapped linearly
//! between them and corrected for temperature. Communication failures are
//! retried within fixed budgets before an error surfaces.

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

use crate::bus::Bus;
use crate::crc8::crc8;
use crate::error::{Dhtc11Error, Phase};

// Every exchange opens by addressing all devices; the bus is single-drop.
const CMD_SKIP_ROM: u8 = 0xCC;
const CMD_READ_CALIBRATION: u8 = 0xDD;
const CMD_START_CONVERSION: u8 = 0x10;
const CMD_READ_MEASUREMENT: u8 = 0xBD;

// Frame lengths include the trailing CRC byte.
const CALIBRATION_FRAME_LEN: usize = 13;
const MEASUREMENT_FRAME_LEN: usize = 5;

// Retry budgets.
const PRESENCE_ATTEMPTS: u8 = 5;
const CALIBRATION_ATTEMPTS: u8 = 3;
const MEASUREMENT_ATTEMPTS: u8 = 5;

// Pauses between protocol steps.
const POWER_UP_MS: u32 = 10;
const RESET_SETTLE_US: u32 = 30;
const RETRY_PAUSE_MS: u32 = 20;
const CRC_RETRY_PAUSE_MS: u32 = 30;
const CONVERSION_WAIT_MS: u32 = 35;

/// Driver configuration.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// Refuse calibration data that fails CRC validation on every attempt.
    ///
    /// By default the driver falls back to the last-read constants when they
    /// are non-zero, trading accuracy for availability. Set this to get a
    /// hard [`Dhtc11Error::ChecksumFailed`] instead.
    pub strict_calibration: bool,
}

/// Reading returned by the DHTC11 sensor, in physical units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub relative_humidity: f32,
}

/// Integer-scaled reading for callers avoiding floating point.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawReading {
    /// Temperature in tenths of a degree Celsius (286 means 28.6 °C).
    pub temperature_x10: i16,
    /// Relative humidity in tenths of a percent (650 means 65.0 %RH).
    pub relative_humidity_x10: u16,
}

/// Driver for the DHTC11 temperature and humidity sensor.
pub struct Dhtc11<PIN, DELAY> {
    bus: Bus<PIN, DELAY>,
    config: Config,
    calib_a: u16,
    calib_b: u16,
    initialized: bool,
}

impl<PIN, DELAY, E> Dhtc11<PIN, DELAY>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    DELAY: DelayNs,
{
    /// Creates a new instance of the DHTC11 driver.
    ///
    /// # Arguments
    ///
    /// * `pin` - The GPIO pin connected to the DHTC11 data line. Must support
    ///   both input and output, wired open-drain style with a pull-up so that
    ///   `set_high` releases the line.
    /// * `delay` - A delay provider implementing the `DelayNs` trait. It has
    ///   to be microsecond-accurate; wrap a coarse platform delay in
    ///   [`crate::delay::PrecisionDelay`] if necessary.
    pub fn new(pin: PIN, delay: DELAY) -> Self {
        Self::with_config(pin, delay, Config::default())
    }

    /// Creates a driver with an explicit [`Config`].
    pub fn with_config(pin: PIN, delay: DELAY, config: Config) -> Self {
        Dhtc11 {
            bus: Bus::new(pin, delay),
            config,
            calib_a: 0,
            calib_b: 0,
            initialized: false,
        }
    }

    /// Initializes the sensor by reading its calibration constants.
    ///
    /// Must be called once before [`read`](Self::read) or
    /// [`read_raw`](Self::read_raw). The sequence is: wait for power-up,
    /// establish bus presence (up to 5 attempts), then fetch and CRC-check
    /// the 13-byte calibration frame (up to 3 attempts, re-establishing
    /// presence between them).
    ///
    /// When every CRC check fails but the constants read back non-zero, the
    /// driver keeps them and reports success unless
    /// [`Config::strict_calibration`] is set; accuracy may be impaired.
    ///
    /// # Errors
    ///
    /// * [`Dhtc11Error::NotResponding`] with [`Phase::Init`] if no presence
    ///   pulse was seen within the retry budget.
    /// * [`Dhtc11Error::ChecksumFailed`] if calibration never validated and
    ///   no usable fallback data was read.
    pub fn begin(&mut self) -> Result<(), Dhtc11Error<E>> {
        // Idle the line high and give the sensor time to power up.
        self.bus.pin.set_high()?;
        self.bus.delay.delay_ms(POWER_UP_MS);

        let mut responded = false;
        for attempt in 0..PRESENCE_ATTEMPTS {
            if self.establish_presence()? {
                responded = true;
                break;
            }
            if attempt + 1 < PRESENCE_ATTEMPTS {
                self.bus.delay.delay_ms(RETRY_PAUSE_MS);
            }
        }
        if !responded {
            return Err(Dhtc11Error::NotResponding(Phase::Init));
        }

        let mut frame = [0u8; CALIBRATION_FRAME_LEN];
        for attempt in 0..CALIBRATION_ATTEMPTS {
            self.bus.write_byte(CMD_SKIP_ROM)?;
            self.bus.write_byte(CMD_READ_CALIBRATION)?;
            self.bus.read_bytes(&mut frame)?;

            if crc8(&frame) == 0 {
                self.apply_calibration(&frame);
                return Ok(());
            }

            if attempt + 1 < CALIBRATION_ATTEMPTS {
                self.bus.delay.delay_ms(RETRY_PAUSE_MS);
                if !self.establish_presence()? {
                    return Err(Dhtc11Error::NotResponding(Phase::Init));
                }
            }
        }

        // Every CRC check failed. Constants that read back non-zero are
        // still better than refusing to run; all-zero bytes carry nothing
        // worth keeping.
        if !self.config.strict_calibration && frame[..4].iter().any(|&b| b != 0) {
            #[cfg(feature = "defmt")]
            defmt::warn!("calibration CRC failed on every attempt, keeping unvalidated constants");
            self.apply_calibration(&frame);
            return Ok(());
        }

        Err(Dhtc11Error::ChecksumFailed)
    }

    /// Reads temperature (°C) and relative humidity (%RH).
    ///
    /// Convenience wrapper around [`read_raw`](Self::read_raw) scaling the
    /// integer result by 1/10.
    pub fn read(&mut self) -> Result<Reading, Dhtc11Error<E>> {
        let raw = self.read_raw()?;
        Ok(Reading {
            temperature: f32::from(raw.temperature_x10) / 10.0,
            relative_humidity: f32::from(raw.relative_humidity_x10) / 10.0,
        })
    }

    /// Reads a measurement as tenths of a degree / tenths of a percent.
    ///
    /// Each attempt (up to 5) establishes presence, triggers a conversion,
    /// waits for it, re-establishes presence and reads the 5-byte result
    /// frame. CRC failures retry with a longer pause; unlike calibration,
    /// a measurement that never validates is never accepted.
    ///
    /// No floating point is used on this path.
    ///
    /// # Errors
    ///
    /// * [`Dhtc11Error::NotInitialized`] if [`begin`](Self::begin) has not
    ///   succeeded; the bus is not touched.
    /// * [`Dhtc11Error::CalibrationInvalid`] if the calibration constants are
    ///   equal (the conversion would divide by zero); the bus is not touched.
    /// * [`Dhtc11Error::NotResponding`] with [`Phase::ConvertStart`] or
    ///   [`Phase::ResultRead`] depending on which presence check exhausted
    ///   the budget.
    /// * [`Dhtc11Error::ChecksumFailed`] if every result frame failed CRC.
    pub fn read_raw(&mut self) -> Result<RawReading, Dhtc11Error<E>> {
        if !self.initialized {
            return Err(Dhtc11Error::NotInitialized);
        }
        if self.calib_a == self.calib_b {
            return Err(Dhtc11Error::CalibrationInvalid);
        }

        let mut frame = [0u8; MEASUREMENT_FRAME_LEN];
        for attempt in 0..MEASUREMENT_ATTEMPTS {
            let last = attempt + 1 == MEASUREMENT_ATTEMPTS;

            if !self.establish_presence()? {
                if last {
                    return Err(Dhtc11Error::NotResponding(Phase::ConvertStart));
                }
                self.bus.delay.delay_ms(RETRY_PAUSE_MS);
                continue;
            }
            self.bus.write_byte(CMD_SKIP_ROM)?;
            self.bus.write_byte(CMD_START_CONVERSION)?;
            self.bus.delay.delay_ms(CONVERSION_WAIT_MS);

            if !self.establish_presence()? {
                if last {
                    return Err(Dhtc11Error::NotResponding(Phase::ResultRead));
                }
                self.bus.delay.delay_ms(RETRY_PAUSE_MS);
                continue;
            }
            self.bus.write_byte(CMD_SKIP_ROM)?;
            self.bus.write_byte(CMD_READ_MEASUREMENT)?;
            self.bus.read_bytes(&mut frame)?;

            if crc8(&frame) == 0 {
                return Ok(self.convert(&frame));
            }
            if !last {
                self.bus.delay.delay_ms(CRC_RETRY_PAUSE_MS);
            }
        }

        Err(Dhtc11Error::ChecksumFailed)
    }

    /// One reset / settle / presence-check round trip.
    fn establish_presence(&mut self) -> Result<bool, E> {
        self.bus.reset()?;
        self.bus.delay.delay_us(RESET_SETTLE_US);
        self.bus.presence()
    }

    fn apply_calibration(&mut self, frame: &[u8; CALIBRATION_FRAME_LEN]) {
        self.calib_a = u16::from_be_bytes([frame[0], frame[1]]);
        self.calib_b = u16::from_be_bytes([frame[2], frame[3]]);
        self.initialized = true;
    }

    /// Converts a CRC-valid measurement frame into scaled integer units.
    fn convert(&self, frame: &[u8; MEASUREMENT_FRAME_LEN]) -> RawReading {
        // Temperature count is signed, little-endian; tenths of a degree are
        // 400 + count/25.6, and 10/256 is exactly 1/25.6. The offset is
        // folded into the dividend so truncation lands on the final sum:
        // truncating the quotient alone reads one tenth high whenever a
        // negative count divides with a remainder.
        let temp_count = i16::from_le_bytes([frame[0], frame[1]]);
        let temperature_x10 = ((400 * 256 + i32::from(temp_count) * 10) / 256) as i16;

        // Humidity maps linearly between the calibration points, then gets a
        // temperature correction. The caller guarantees calib_a != calib_b.
        let hum_count = i32::from(u16::from_le_bytes([frame[2], frame[3]]));
        let span = i32::from(self.calib_a) - i32::from(self.calib_b);
        let mut humidity = (hum_count - i32::from(self.calib_b)) * 600 / span + 300;
        humidity += 25 * (i32::from(temperature_x10) - 250) / 100;

        RawReading {
            temperature_x10,
            relative_humidity_x10: humidity.clamp(0, 999) as u16,
        }
    }
}
