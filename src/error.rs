/// Bus phase in which a presence check ran out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// During `begin`, before calibration could be read.
    Init,
    /// Before triggering a conversion.
    ConvertStart,
    /// Before reading conversion results.
    ResultRead,
}

/// Possible errors from the DHTC11 driver.
#[derive(Debug, PartialEq, Eq)]
pub enum Dhtc11Error<E> {
    /// No presence pulse after exhausting the retry budget.
    NotResponding(Phase),
    /// A read was attempted before a successful `begin`.
    NotInitialized,
    /// CRC validation failed on every retry with no usable fallback data.
    ChecksumFailed,
    /// The calibration constants are equal and cannot be used as a divisor.
    CalibrationInvalid,
    /// Error from the GPIO pin (input/output).
    PinError(E),
}

impl<E> From<E> for Dhtc11Error<E> {
    fn from(value: E) -> Self {
        Self::PinError(value)
    }
}
