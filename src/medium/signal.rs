//! Radio signal and timing calculations.
//!
//! Contains helpers for:
//! - dBm/mW power conversion
//! - Free-space and log-distance path loss (optional log-normal shadowing)
//! - Link-budget range inversion used by the medium's limit cache
//! - Frame airtime from bit length and bitrate
//!
//! Units:
//! - Power: dBm, mW (conversion provided)
//! - Time: seconds (f64)
//! - Distance: meters

use rand::thread_rng;
use rand_distr::{Distribution, Normal};

use crate::environment::material::SPEED_OF_LIGHT;

/// Convert power from dBm to milliwatts: `P(mW) = 10^(P(dBm) / 10)`.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert power from milliwatts to dBm: `P(dBm) = 10 * log10(P(mW))`.
/// Zero milliwatts maps to negative infinity.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Free-space path loss in dB at the given distance (m) and frequency (Hz):
///
/// ```text
/// FSPL(dB) = 20 * log10(4 * pi * d * f / c)
/// ```
///
/// Distances so short that the formula would turn into a gain are clamped
/// to 0 dB.
pub fn free_space_path_loss_db(distance: f64, frequency: f64) -> f64 {
    let ratio = 4.0 * std::f64::consts::PI * distance * frequency / SPEED_OF_LIGHT;
    if ratio <= 1.0 {
        return 0.0;
    }
    20.0 * ratio.log10()
}

/// Distance (m) at which the free-space path loss reaches `budget_db`.
pub fn free_space_range(budget_db: f64, frequency: f64) -> f64 {
    10f64.powf(budget_db / 20.0) * SPEED_OF_LIGHT / (4.0 * std::f64::consts::PI * frequency)
}

/// Log-distance path loss with log-normal shadowing:
///
/// ```text
/// PL(d) = PL(d0) + 10 * n * log10(d / d0) + X_sigma,   d0 = 1 m
/// ```
///
/// Distances below the reference distance return the reference loss. With a
/// positive `shadowing_sigma` every call samples a fresh Normal(0, sigma)
/// term, so the result is stochastic.
pub fn log_distance_path_loss_db(
    distance: f64,
    exponent: f64,
    reference_loss_db: f64,
    shadowing_sigma: f64,
) -> f64 {
    if distance < 1.0 {
        return reference_loss_db;
    }
    let path_loss = reference_loss_db + 10.0 * exponent * distance.log10();
    let shadowing = if shadowing_sigma > 0.0 {
        let normal = Normal::new(0.0, shadowing_sigma).expect("invalid normal sigma");
        normal.sample(&mut thread_rng())
    } else {
        0.0
    };
    path_loss + shadowing
}

/// Distance (m) at which the deterministic log-distance loss reaches
/// `budget_db`. Shadowing is intentionally not sampled here, so the result
/// is stable across calls:
///
/// ```text
/// d = 10^((budget - PL(d0)) / (10 * n))
/// ```
pub fn log_distance_range(budget_db: f64, exponent: f64, reference_loss_db: f64) -> f64 {
    let numerator = budget_db - reference_loss_db;
    if numerator <= 0.0 {
        return 0.0;
    }
    10f64.powf(numerator / (10.0 * exponent))
}

/// On-air duration of a frame in seconds.
pub fn frame_airtime(bit_length: usize, bitrate: f64, preamble_duration: f64) -> f64 {
    preamble_duration + bit_length as f64 / bitrate
}
