//! Physical constants used by the entropy estimator.

/// Faraday constant (J·mol⁻¹·V⁻¹).
pub const FARADAY: f64 = 96485.3415;

/// Number of electrons exchanged per reaction.
pub const ELECTRON_COUNT: f64 = 1.0;

/// Offset between the Celsius and kelvin scales.
pub const KELVIN_OFFSET: f64 = 273.15;
