//! DHTC11 Sensor Driver for Embedded Rust
//!
//! This crate provides a platform-agnostic driver for the DHTC11 single-wire
//! temperature and humidity sensor, built on top of the [`embedded-hal`]
//! traits.
//!
//! The sensor hangs off one open-drain GPIO line with a pull-up and speaks a
//! reset/presence protocol with microsecond bit timing. Each device carries
//! factory calibration constants; [`Dhtc11::begin`] reads them once and every
//! measurement is converted against them, including a temperature correction
//! of the humidity value.
//!
//! # Features
//! - Blocking synchronous API using `embedded-hal` traits
//! - Designed for `no_std` environments
//! - Integer-only measurement path via [`Dhtc11::read_raw`] for targets
//!   without an FPU
//! - [`PrecisionDelay`] adapter for platforms whose delay provider is not
//!   accurate at the microsecond scale
//! - Optional logging support via `defmt`
//!
//! # Dependencies
//! This driver depends on the following `embedded-hal` traits:
//! - [`InputPin`] and [`OutputPin`] for GPIO access
//! - [`DelayNs`] for accurate timing
//!
//! # Optional Features
//! - `defmt`: Implements `defmt::Format` for logging support
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal
//! [`InputPin`]: embedded_hal::digital::InputPin
//! [`OutputPin`]: embedded_hal::digital::OutputPin
//! [`DelayNs`]: embedded_hal::delay::DelayNs

#![cfg_attr(not(test), no_std)]

mod bus;
mod crc8;
pub mod delay;
pub mod dhtc11;
pub mod error;

pub use delay::{MonotonicClock, PrecisionDelay};
pub use dhtc11::{Config, Dhtc11, RawReading, Reading};
pub use error::{Dhtc11Error, Phase};
