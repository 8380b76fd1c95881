//! Butterworth low-pass design and zero-phase (forward-backward) filtering.

use nalgebra::{Complex, DMatrix, DVector};
use ndarray::Array2;

use crate::error::{Result, TrackError};

/// Digital Butterworth low-pass filter in transfer-function form.
///
/// Designed from the analog prototype through a pre-warped bilinear
/// transform, so the -3 dB point lands exactly on the requested cutoff.
#[derive(Debug, Clone)]
pub struct Butterworth {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl Butterworth {
    /// Design an `order`-pole low-pass with cutoff `cutoff_hz` for a signal
    /// sampled at `sample_rate` Hz.
    pub fn low_pass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        if order == 0 {
            return Err(TrackError::InvalidFilter("order must be at least 1".into()));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(TrackError::InvalidFilter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        let nyquist = 0.5 * sample_rate;
        let wn = cutoff_hz / nyquist;
        if !(wn > 0.0 && wn < 1.0) {
            return Err(TrackError::InvalidFilter(format!(
                "cutoff {cutoff_hz} Hz must lie strictly between 0 and the Nyquist frequency {nyquist} Hz"
            )));
        }

        // Analog prototype poles on the unit circle, left half plane.
        let n = order as f64;
        let warped = 4.0 * (std::f64::consts::PI * wn / 2.0).tan();
        let poles: Vec<Complex<f64>> = (0..order)
            .map(|k| {
                let m = -(n - 1.0) + 2.0 * k as f64;
                -Complex::from_polar(1.0, std::f64::consts::PI * m / (2.0 * n)) * warped
            })
            .collect();

        // Bilinear transform with fs = 2 (so 2 * fs = 4). All zeros map to -1.
        let fs2 = Complex::new(4.0, 0.0);
        let digital_poles: Vec<Complex<f64>> =
            poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
        let denom = poles
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));
        let gain = warped.powi(order as i32) * (Complex::new(1.0, 0.0) / denom).re;

        let b = binomial_row(order).into_iter().map(|c| c * gain).collect();
        let a = poly(&digital_poles).into_iter().map(|c| c.re).collect();

        Ok(Self { b, a })
    }

    /// Numerator and denominator coefficients, highest power first, `a[0] == 1`.
    pub fn coefficients(&self) -> (&[f64], &[f64]) {
        (&self.b, &self.a)
    }

    /// Samples of odd extension added at each end before filtering.
    pub fn pad_len(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// A signal must be strictly longer than this to be filtered.
    pub fn min_len(&self) -> usize {
        self.pad_len()
    }

    /// Filter `x` forward and then backward, cancelling the phase lag.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>> {
        let pad = self.pad_len();
        if x.len() <= pad {
            return Err(TrackError::SignalTooShort {
                samples: x.len(),
                required: pad,
            });
        }
        let zi = self.steady_state()?;

        let first = x[0];
        let last = x[x.len() - 1];
        let mut ext = Vec::with_capacity(x.len() + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend_from_slice(x);
        ext.extend((1..=pad).map(|i| 2.0 * last - x[x.len() - 1 - i]));

        let forward = self.lfilter(&ext, &scaled(&zi, ext[0]));
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let y0 = reversed[0];
        reversed = self.lfilter(&reversed, &scaled(&zi, y0));
        reversed.reverse();

        Ok(reversed[pad..pad + x.len()].to_vec())
    }

    /// Run [`Butterworth::filtfilt`] down every column of `data`.
    pub fn filtfilt_columns(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros(data.raw_dim());
        for (c, column) in data.columns().into_iter().enumerate() {
            let filtered = self.filtfilt(&column.to_vec())?;
            for (r, v) in filtered.into_iter().enumerate() {
                out[[r, c]] = v;
            }
        }
        Ok(out)
    }

    /// Direct form II transposed, starting from delay state `zi`.
    fn lfilter(&self, x: &[f64], zi: &[f64]) -> Vec<f64> {
        let n = self.a.len();
        let mut z = zi.to_vec();
        let mut y = Vec::with_capacity(x.len());
        for &xi in x {
            let yi = self.b[0] * xi + z.first().copied().unwrap_or(0.0);
            for j in 0..n - 1 {
                let carry = if j + 1 < n - 1 { z[j + 1] } else { 0.0 };
                z[j] = self.b[j + 1] * xi + carry - self.a[j + 1] * yi;
            }
            y.push(yi);
        }
        y
    }

    /// Delay state matching a unit step response at steady state.
    ///
    /// Solves `(I - A^T) zi = b[1..] - a[1..] * b[0]` where `A` is the
    /// companion matrix of `a`.
    fn steady_state(&self) -> Result<Vec<f64>> {
        let m = self.a.len() - 1;
        let a = &self.a;
        let b = &self.b;
        let lhs = DMatrix::from_fn(m, m, |i, j| {
            let mut v = if i == j { 1.0 } else { 0.0 };
            if j == 0 {
                v += a[i + 1];
            }
            if j == i + 1 {
                v -= 1.0;
            }
            v
        });
        let rhs = DVector::from_iterator(m, (1..=m).map(|i| b[i] - a[i] * b[0]));
        let zi = lhs.lu().solve(&rhs).ok_or_else(|| {
            TrackError::InvalidFilter("filter initial conditions are singular".into())
        })?;
        Ok(zi.iter().copied().collect())
    }
}

fn scaled(v: &[f64], k: f64) -> Vec<f64> {
    v.iter().map(|x| x * k).collect()
}

/// Coefficients of `(x + 1)^n`.
fn binomial_row(n: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for _ in 0..n {
        let mut next = vec![1.0; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

/// Monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for &r in roots {
        let mut next = vec![Complex::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * r;
        }
        coeffs = next;
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_first_order_half_band() {
        let f = Butterworth::low_pass(1, 25.0, 100.0).unwrap();
        let (b, a) = f.coefficients();
        assert_abs_diff_eq!(b[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(b[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(a[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_second_order_half_band() {
        let f = Butterworth::low_pass(2, 0.5, 2.0).unwrap();
        let (b, a) = f.coefficients();
        assert_abs_diff_eq!(b[0], 0.292_893_218_8, epsilon = 1e-9);
        assert_abs_diff_eq!(b[1], 0.585_786_437_6, epsilon = 1e-9);
        assert_abs_diff_eq!(b[2], 0.292_893_218_8, epsilon = 1e-9);
        assert_abs_diff_eq!(a[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a[2], 0.171_572_875_3, epsilon = 1e-9);
    }

    #[test]
    fn test_unity_dc_gain() {
        for order in 1..=5 {
            let f = Butterworth::low_pass(order, 3.0, 30.0).unwrap();
            let (b, a) = f.coefficients();
            let gain = b.iter().sum::<f64>() / a.iter().sum::<f64>();
            assert_abs_diff_eq!(gain, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_signal_passes_unchanged() {
        let f = Butterworth::low_pass(2, 2.0, 30.0).unwrap();
        let x = vec![7.5; 40];
        let y = f.filtfilt(&x).unwrap();
        for v in y {
            assert_abs_diff_eq!(v, 7.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_slow_sine_passes_without_lag() {
        let f = Butterworth::low_pass(3, 2.0, 30.0).unwrap();
        let w = 2.0 * std::f64::consts::PI * 0.2 / 30.0;
        let x: Vec<f64> = (0..300).map(|i| (w * i as f64).sin()).collect();
        let y = f.filtfilt(&x).unwrap();
        for i in 50..250 {
            assert_abs_diff_eq!(x[i], y[i], epsilon = 1e-2);
        }
    }

    #[test]
    fn test_attenuates_high_frequency() {
        let f = Butterworth::low_pass(2, 1.0, 30.0).unwrap();
        let x: Vec<f64> = (0..300)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let y = f.filtfilt(&x).unwrap();
        let peak = y[50..250].iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.01, "alternating signal should be removed, peak {peak}");
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            Butterworth::low_pass(0, 1.0, 30.0),
            Err(TrackError::InvalidFilter(_))
        ));
        assert!(matches!(
            Butterworth::low_pass(2, 15.0, 30.0),
            Err(TrackError::InvalidFilter(_))
        ));
        assert!(matches!(
            Butterworth::low_pass(2, -1.0, 30.0),
            Err(TrackError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_short_signal_rejected() {
        let f = Butterworth::low_pass(2, 1.0, 30.0).unwrap();
        assert_eq!(f.min_len(), 9);
        assert_eq!(
            f.filtfilt(&[0.0; 9]),
            Err(TrackError::SignalTooShort {
                samples: 9,
                required: 9
            })
        );
        assert!(f.filtfilt(&[0.0; 10]).is_ok());
    }
}
