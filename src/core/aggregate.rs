use std::ops::{Add, Div};

use itertools::Itertools;

impl<T> Aggregate for T where T: ?Sized {}

pub trait Aggregate {
    #[must_use]
    fn median<V>(self) -> Option<V>
    where
        Self: Sized + IntoIterator<Item = V>,
        V: Copy + Add<Output = V> + Div<f64, Output = V> + Ord,
    {
        let mut values = self.into_iter().collect_vec();
        if values.is_empty() {
            return None;
        }
        values.sort_unstable();
        let index = values.len() / 2;
        if values.len() % 2 == 1 {
            Some(values[index])
        } else {
            Some((values[index - 1] + values[index]) / 2.0)
        }
    }

    /// Population mean and standard deviation.
    #[must_use]
    fn mean_deviation(self) -> Option<(f64, f64)>
    where
        Self: Sized + IntoIterator<Item = f64>,
    {
        let values = self.into_iter().collect_vec();
        if values.is_empty() {
            return None;
        }
        #[expect(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / n;
        Some((mean, variance.sqrt()))
    }

    /// Weighted mean of `(value, weight)` pairs, [`None`] when the weights sum to zero.
    #[must_use]
    fn weighted_mean(self) -> Option<f64>
    where
        Self: Sized + IntoIterator<Item = (f64, f64)>,
    {
        let mut sum = 0.0;
        let mut total_weight = 0.0;
        for (value, weight) in self {
            sum += value * weight;
            total_weight += weight;
        }
        (total_weight > 0.0).then(|| sum / total_weight)
    }
}
