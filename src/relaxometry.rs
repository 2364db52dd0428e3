//! T2* relaxometry from two echoes
//!
//! Mono-exponential decay `M1 = M0 * exp(-ΔTE / T2*)` solved per voxel:
//! `T2* = ΔTE / ln(M0 / M1)`, reported in milliseconds.

use serde::{Deserialize, Serialize};

/// Handling of in-mask voxels where the decay model has no positive solution
///
/// This happens whenever `M1 >= M0`, `M1 == 0` or either magnitude is
/// non-finite, which is routine in low-signal regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Non-finite or non-positive T2* becomes 0
    #[default]
    Zero,
    /// Keep the IEEE-754 result of the formula (negative, ±inf or NaN)
    PassThrough,
}

/// Two-echo T2* map in milliseconds
///
/// # Arguments
/// * `m0` - Magnitude at the earlier echo
/// * `m1` - Magnitude at the later echo
/// * `delta_te` - Echo time difference in seconds (> 0)
/// * `mask` - Binary mask; voxels outside are exactly 0
/// * `policy` - Degenerate voxel handling inside the mask
pub fn t2star_two_echo(
    m0: &[f64],
    m1: &[f64],
    delta_te: f64,
    mask: &[u8],
    policy: DegeneratePolicy,
) -> Vec<f64> {
    let delta_te_ms = delta_te * 1e3;

    m0.iter()
        .zip(m1.iter())
        .zip(mask.iter())
        .map(|((&a, &b), &m)| {
            if m == 0 {
                return 0.0;
            }
            let t2s = delta_te_ms / (a / b).ln();
            match policy {
                DegeneratePolicy::Zero if !(t2s.is_finite() && t2s > 0.0) => 0.0,
                _ => t2s,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t2star_known_decay() {
        let m0 = vec![1000.0; 4];
        let m1 = vec![500.0; 4];
        let mask = vec![1u8; 4];
        let t2s = t2star_two_echo(&m0, &m1, 0.002, &mask, DegeneratePolicy::Zero);
        let expected = 0.002 / 2.0_f64.ln() * 1000.0;
        for &v in &t2s {
            assert!((v - expected).abs() < 1e-9, "Expected {}, got {}", expected, v);
        }
        assert!((expected - 2.885).abs() < 1e-3);
    }

    #[test]
    fn test_t2star_recovers_exponential() {
        let t2s_true_ms: f64 = 25.0;
        let delta_te = 0.005;
        let m0 = vec![800.0, 120.0];
        let decay = (-delta_te * 1e3 / t2s_true_ms).exp();
        let m1: Vec<f64> = m0.iter().map(|&m| m * decay).collect();
        let t2s = t2star_two_echo(&m0, &m1, delta_te, &[1, 1], DegeneratePolicy::Zero);
        for &v in &t2s {
            assert!((v - t2s_true_ms).abs() < 1e-9);
        }
    }

    #[test]
    fn test_t2star_zero_outside_mask() {
        // Outside the mask even degenerate voxels are exactly zero
        let m0 = vec![1000.0, 0.0, 10.0];
        let m1 = vec![500.0, 0.0, 20.0];
        let mask = vec![0u8, 0, 0];
        for policy in [DegeneratePolicy::Zero, DegeneratePolicy::PassThrough] {
            let t2s = t2star_two_echo(&m0, &m1, 0.002, &mask, policy);
            assert_eq!(t2s, vec![0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_t2star_degenerate_policies() {
        // Increase, equal, zero second echo, zero both
        let m0 = vec![100.0, 100.0, 100.0, 0.0];
        let m1 = vec![200.0, 100.0, 0.0, 0.0];
        let mask = vec![1u8; 4];

        let zeroed = t2star_two_echo(&m0, &m1, 0.002, &mask, DegeneratePolicy::Zero);
        assert_eq!(zeroed, vec![0.0; 4]);

        let raw = t2star_two_echo(&m0, &m1, 0.002, &mask, DegeneratePolicy::PassThrough);
        assert!(raw[0] < 0.0);
        assert!(raw[1].is_infinite());
        assert_eq!(raw[2], 0.0);
        assert!(raw[3].is_nan());
    }
}
