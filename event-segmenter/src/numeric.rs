//! Summary statistics over flat sample buffers.
//!
//! All functions are generic over [`num::Float`] so the same code serves the
//! `f64` working buffers and `f32` layouts decoded without widening.
use num::Float;

/// Dead-band used by [`signum`].
pub const EPS: f64 = 1e-10;

pub fn signal_max<T: Float>(signal: &[T]) -> Option<T> {
    signal.iter().copied().reduce(T::max)
}

pub fn signal_min<T: Float>(signal: &[T]) -> Option<T> {
    signal.iter().copied().reduce(T::min)
}

/// Arithmetic mean, or zero for an empty buffer.
pub fn signal_average<T: Float>(signal: &[T]) -> T {
    match T::from(signal.len()) {
        Some(n) if !signal.is_empty() => {
            signal.iter().copied().fold(T::zero(), |acc, x| acc + x) / n
        }
        _ => T::zero(),
    }
}

/// Unbiased sample variance. Buffers shorter than two samples have zero variance.
///
/// Deviations are taken relative to the first sample, so a constant buffer
/// gives exactly zero regardless of rounding in the mean.
pub fn signal_variance<T: Float>(signal: &[T]) -> T {
    let (Some(&shift), Some(n_minus_1)) = (signal.first(), T::from(signal.len().saturating_sub(1)))
    else {
        return T::zero();
    };
    if signal.len() < 2 {
        return T::zero();
    }
    let n = n_minus_1 + T::one();
    let (sum, sum_of_squares) = signal
        .iter()
        .map(|&x| x - shift)
        .fold((T::zero(), T::zero()), |(s, ss), d| (s + d, ss + d * d));
    let variance = (sum_of_squares - sum * sum / n) / n_minus_1;
    variance.max(T::zero())
}

/// The largest value of `signal[i] * sign`.
///
/// The accumulator starts from the first sample, so buffers whose values all
/// lie on the other side of zero still report their true extreme.
pub fn signal_extreme<T: Float>(signal: &[T], sign: T) -> T {
    signal
        .iter()
        .map(|&x| x * sign)
        .reduce(T::max)
        .unwrap_or_else(T::zero)
}

/// Index of the first maximum.
pub fn locate_max<T: Float>(signal: &[T]) -> Option<usize> {
    signal
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, T)>, (i, &x)| match best {
            Some((_, b)) if x <= b => best,
            _ => Some((i, x)),
        })
        .map(|(i, _)| i)
}

/// Index of the first minimum.
pub fn locate_min<T: Float>(signal: &[T]) -> Option<usize> {
    signal
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, T)>, (i, &x)| match best {
            Some((_, b)) if x >= b => best,
            _ => Some((i, x)),
        })
        .map(|(i, _)| i)
}

pub fn signum<T: Float>(value: T) -> T {
    let eps = T::from(EPS).unwrap_or_else(T::epsilon);
    if value > eps {
        T::one()
    } else if value < -eps {
        -T::one()
    } else {
        T::zero()
    }
}
