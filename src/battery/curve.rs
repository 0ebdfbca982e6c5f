use itertools::Itertools;

use crate::config::CurvePoint;

/// Fraction of the maximum rate per whole SoC percent.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerCurve(pub [f64; 101]);

impl Default for PowerCurve {
    fn default() -> Self {
        Self::FLAT
    }
}

impl PowerCurve {
    pub const FLAT: Self = Self([1.0; 101]);

    /// Interpolate linearly between the points, holding the outermost values.
    #[must_use]
    pub fn from_points(points: &[CurvePoint]) -> Self {
        let points = points
            .iter()
            .map(|point| (point.soc_percent.min(100), point.fraction.clamp(0.0, 1.0)))
            .sorted_by_key(|(percent, _)| *percent)
            .dedup_by(|lhs, rhs| lhs.0 == rhs.0)
            .collect_vec();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Self::FLAT;
        };

        let mut fractions = [1.0; 101];
        for percent in 0..=100_u8 {
            fractions[usize::from(percent)] = if percent <= first.0 {
                first.1
            } else if percent >= last.0 {
                last.1
            } else {
                points
                    .iter()
                    .tuple_windows()
                    .find(|((lower, _), (upper, _))| *lower <= percent && percent <= *upper)
                    .map_or(1.0, |((lower, from), (upper, to))| {
                        from + (to - from) * f64::from(percent - lower) / f64::from(upper - lower)
                    })
            };
        }
        Self(fractions)
    }

    /// Fraction at the given SoC percentage, rounded to the nearest whole percent.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fraction(&self, percent: f64) -> f64 {
        if !percent.is_finite() {
            return self.0[0];
        }
        self.0[percent.round().clamp(0.0, 100.0) as usize]
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.0.iter().all(|fraction| (*fraction - 1.0).abs() < f64::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_empty_is_flat() {
        assert!(PowerCurve::from_points(&[]).is_flat());
    }

    #[test]
    fn test_interpolation() {
        let curve = PowerCurve::from_points(&[
            CurvePoint { soc_percent: 100, fraction: 0.2 },
            CurvePoint { soc_percent: 90, fraction: 1.0 },
        ]);
        assert_abs_diff_eq!(curve.fraction(50.0), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(curve.fraction(95.0), 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(curve.fraction(100.0), 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(curve.fraction(140.0), 0.2, epsilon = 1e-9);
    }
}
