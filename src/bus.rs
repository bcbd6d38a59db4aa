//! Single-wire bus engine: reset, presence detection and bit-level I/O.
//!
//! The DHTC11 shares one open-drain data line with the controller. The pin
//! must be set up so that `set_low` drives the line and `set_high` releases
//! it to the pull-up; reads observe the actual line level. Bit values are
//! encoded in low-pulse width: a short low pulse is a logical 1, a long one a
//! logical 0, and the reset pulse dwarfs both. Bytes travel LSB-first.

use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
};

// Reset pulse: brief release, at least 480us low, then release and settle.
const RESET_WARMUP_US: u32 = 5;
const RESET_LOW_US: u32 = 480;
const RESET_RELEASE_US: u32 = 8;

// Presence window, expressed as poll budgets rather than wall-clock time.
// After the settle the device must pull the line low within the high-poll
// budget, and its low pulse must end inside the low-poll window.
const PRESENCE_SETTLE_US: u32 = 5;
const HIGH_POLL_STEP_US: u32 = 10;
const HIGH_POLL_LIMIT: u16 = 100;
const LOW_POLL_STEP_US: u32 = 5;
const LOW_POLL_MIN: u16 = 10;
const LOW_POLL_LIMIT: u16 = 240;

// Read slot: short low pulse opens the slot, the device holds or releases
// the line, we sample shortly after release and then sit out the rest of
// the minimum 60us slot.
const READ_INIT_LOW_US: u32 = 5;
const READ_SAMPLE_US: u32 = 5;
const READ_HOLD_US: u32 = 80;

// Write slots share one shape: low pulse, then released remainder. The
// short/long split decides the bit.
const WRITE_SHORT_US: u32 = 5;
const WRITE_LONG_US: u32 = 80;

/// Owns the data pin and the delay source and speaks the wire format.
pub(crate) struct Bus<PIN, DELAY> {
    pub(crate) pin: PIN,
    pub(crate) delay: DELAY,
}

impl<PIN, DELAY, E> Bus<PIN, DELAY>
where
    PIN: InputPin<Error = E> + OutputPin<Error = E>,
    DELAY: DelayNs,
{
    pub(crate) fn new(pin: PIN, delay: DELAY) -> Self {
        Bus { pin, delay }
    }

    /// Drives the reset pulse that returns the bus to a known state.
    pub(crate) fn reset(&mut self) -> Result<(), E> {
        self.pin.set_high()?;
        self.delay.delay_us(RESET_WARMUP_US);
        self.pin.set_low()?;
        self.delay.delay_us(RESET_LOW_US);
        self.pin.set_high()?;
        self.delay.delay_us(RESET_RELEASE_US);
        Ok(())
    }

    /// Samples the presence pulse that a device answers a reset with.
    ///
    /// Returns `Ok(true)` when a device pulled the line low within the
    /// response window and released it again inside the allowed pulse width.
    /// A line that does not go low in time, a glitch-short pulse or a line
    /// held low past the window all report `Ok(false)`.
    pub(crate) fn presence(&mut self) -> Result<bool, E> {
        self.pin.set_high()?;
        self.delay.delay_us(PRESENCE_SETTLE_US);

        let mut high_polls: u16 = 0;
        while self.pin.is_high()? && high_polls < HIGH_POLL_LIMIT {
            high_polls += 1;
            self.delay.delay_us(HIGH_POLL_STEP_US);
        }
        // The window is exactly HIGH_POLL_LIMIT polls wide: a low first seen
        // once the budget is spent does not count as a response.
        if high_polls >= HIGH_POLL_LIMIT {
            return Ok(false);
        }

        let mut low_polls: u16 = 0;
        while self.pin.is_low()? && low_polls < LOW_POLL_LIMIT {
            low_polls += 1;
            self.delay.delay_us(LOW_POLL_STEP_US);
        }

        Ok((LOW_POLL_MIN..LOW_POLL_LIMIT).contains(&low_polls))
    }

    fn read_bit(&mut self) -> Result<bool, E> {
        self.pin.set_low()?;
        self.delay.delay_us(READ_INIT_LOW_US);
        self.pin.set_high()?;
        self.delay.delay_us(READ_SAMPLE_US);
        let bit = self.pin.is_high()?;
        self.delay.delay_us(READ_HOLD_US);
        Ok(bit)
    }

    /// Reads one byte, least significant bit first.
    pub(crate) fn read_byte(&mut self) -> Result<u8, E> {
        let mut byte: u8 = 0;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }

    /// Fills `buf` with consecutive bytes from the bus.
    pub(crate) fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), E> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), E> {
        if bit {
            self.pin.set_low()?;
            self.delay.delay_us(WRITE_SHORT_US);
            self.pin.set_high()?;
            self.delay.delay_us(WRITE_LONG_US);
        } else {
            self.pin.set_low()?;
            self.delay.delay_us(WRITE_LONG_US);
            self.pin.set_high()?;
            self.delay.delay_us(WRITE_SHORT_US);
        }
        Ok(())
    }

    /// Writes one byte, least significant bit first.
    pub(crate) fn write_byte(&mut self, byte: u8) -> Result<(), E> {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::{CheckedDelay, NoopDelay, Transaction as DelayTx};
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTx,
    };

    // One read slot per bit, LSB first: open the slot, release, sample.
    fn encode_read_byte(byte: u8) -> Vec<PinTx> {
        (0..8)
            .flat_map(|i| {
                let bit = (byte >> i) & 1;
                [
                    PinTx::set(PinState::Low),
                    PinTx::set(PinState::High),
                    PinTx::get(if bit == 1 {
                        PinState::High
                    } else {
                        PinState::Low
                    }),
                ]
            })
            .collect()
    }

    #[test]
    fn test_reset_pulse_shape() {
        let mut pin = PinMock::new(&[
            PinTx::set(PinState::High),
            PinTx::set(PinState::Low),
            PinTx::set(PinState::High),
        ]);
        let delay_expects = [
            DelayTx::delay_us(5),
            DelayTx::delay_us(480),
            DelayTx::delay_us(8),
        ];
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut bus = Bus::new(pin.clone(), &mut delay);
        bus.reset().unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_presence_detected() {
        // Two polls high, then a low pulse spanning twelve polls.
        let mut expect = vec![PinTx::set(PinState::High)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::High), 2));
        expect.push(PinTx::get(PinState::Low));
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::Low), 12));
        expect.push(PinTx::get(PinState::High));

        let mut delay_expects = vec![DelayTx::delay_us(5)];
        delay_expects.extend(std::iter::repeat_n(DelayTx::delay_us(10), 2));
        delay_expects.extend(std::iter::repeat_n(DelayTx::delay_us(5), 12));

        let mut pin = PinMock::new(&expect);
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut bus = Bus::new(pin.clone(), &mut delay);
        assert!(bus.presence().unwrap());

        pin.done();
        delay.done();
    }

    #[test]
    fn test_presence_timeout() {
        let mut expect = vec![PinTx::set(PinState::High)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::High), 101));

        let mut delay_expects = vec![DelayTx::delay_us(5)];
        delay_expects.extend(std::iter::repeat_n(DelayTx::delay_us(10), 100));

        let mut pin = PinMock::new(&expect);
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut bus = Bus::new(pin.clone(), &mut delay);
        assert!(!bus.presence().unwrap());

        pin.done();
        delay.done();
    }

    #[test]
    fn test_presence_low_past_the_window() {
        // The line first reads low on the poll after the budget is spent;
        // that poll must not count as a response.
        let mut expect = vec![PinTx::set(PinState::High)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::High), 100));
        expect.push(PinTx::get(PinState::Low));

        let mut pin = PinMock::new(&expect);
        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert!(!bus.presence().unwrap());

        // done() also proves the low-pulse window is never sampled.
        pin.done();
    }

    #[test]
    fn test_presence_low_on_the_last_poll() {
        // Going low on the final in-budget poll still counts, provided the
        // low pulse itself is well formed.
        let mut expect = vec![PinTx::set(PinState::High)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::High), 99));
        expect.push(PinTx::get(PinState::Low));
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::Low), 12));
        expect.push(PinTx::get(PinState::High));

        let mut pin = PinMock::new(&expect);
        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert!(bus.presence().unwrap());

        pin.done();
    }

    #[test]
    fn test_presence_glitch_pulse() {
        // Low for only three polls: below the minimum pulse width.
        let mut expect = vec![PinTx::set(PinState::High), PinTx::get(PinState::Low)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::Low), 3));
        expect.push(PinTx::get(PinState::High));

        let mut pin = PinMock::new(&expect);
        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert!(!bus.presence().unwrap());

        pin.done();
    }

    #[test]
    fn test_presence_line_held_low() {
        let mut expect = vec![PinTx::set(PinState::High)];
        expect.extend(std::iter::repeat_n(PinTx::get(PinState::Low), 242));

        let mut pin = PinMock::new(&expect);
        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert!(!bus.presence().unwrap());

        pin.done();
    }

    #[test]
    fn test_read_bit_one() {
        let mut pin = PinMock::new(&[
            PinTx::set(PinState::Low),
            PinTx::set(PinState::High),
            PinTx::get(PinState::High),
        ]);
        let delay_expects = [
            DelayTx::delay_us(5),
            DelayTx::delay_us(5),
            DelayTx::delay_us(80),
        ];
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut bus = Bus::new(pin.clone(), &mut delay);
        assert!(bus.read_bit().unwrap());

        pin.done();
        delay.done();
    }

    #[test]
    fn test_read_bit_zero() {
        let mut pin = PinMock::new(&[
            PinTx::set(PinState::Low),
            PinTx::set(PinState::High),
            PinTx::get(PinState::Low),
        ]);

        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert!(!bus.read_bit().unwrap());

        pin.done();
    }

    #[test]
    fn test_read_byte_lsb_first() {
        let mut pin = PinMock::new(&encode_read_byte(0xB5));

        let mut bus = Bus::new(pin.clone(), NoopDelay);
        assert_eq!(bus.read_byte().unwrap(), 0xB5);

        pin.done();
    }

    #[test]
    fn test_read_bytes_in_order() {
        let mut expect = encode_read_byte(0x5A);
        expect.extend(encode_read_byte(0xC3));

        let mut pin = PinMock::new(&expect);
        let mut bus = Bus::new(pin.clone(), NoopDelay);

        let mut buf = [0u8; 2];
        bus.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0x5A, 0xC3]);

        pin.done();
    }

    #[test]
    fn test_write_byte_slot_timing() {
        // 0x53 LSB-first is 1,1,0,0,1,0,1,0. Pin transitions are identical
        // for both bit values; the short/long split carries the data.
        let expect: Vec<PinTx> = (0..8)
            .flat_map(|_| [PinTx::set(PinState::Low), PinTx::set(PinState::High)])
            .collect();

        let mut delay_expects = Vec::new();
        for i in 0..8 {
            if 0x53 & (1 << i) != 0 {
                delay_expects.push(DelayTx::delay_us(5));
                delay_expects.push(DelayTx::delay_us(80));
            } else {
                delay_expects.push(DelayTx::delay_us(80));
                delay_expects.push(DelayTx::delay_us(5));
            }
        }

        let mut pin = PinMock::new(&expect);
        let mut delay = CheckedDelay::new(&delay_expects);

        let mut bus = Bus::new(pin.clone(), &mut delay);
        bus.write_byte(0x53).unwrap();

        pin.done();
        delay.done();
    }

    #[test]
    fn test_byte_round_trip() {
        for byte in [0x00u8, 0x01, 0x80, 0xB5, 0xFF] {
            let mut pin = PinMock::new(&encode_read_byte(byte));
            let mut bus = Bus::new(pin.clone(), NoopDelay);
            assert_eq!(bus.read_byte().unwrap(), byte);
            pin.done();
        }
    }
}
