//! Chronological train/test split.

use ndarray::{s, Array1, ArrayView1, ArrayView2};

/// Sizes of a time-ordered split: the first `train` rows fit, the last `test` rows
/// are held out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub test: usize,
}

impl SplitSizes {
    /// `test = ceil(n * test_fraction)`, capped so at least one row trains.
    pub fn new(n: usize, test_fraction: f64) -> Self {
        if n == 0 {
            return Self { train: 0, test: 0 };
        }
        // The epsilon absorbs products like 30 * 0.1 = 3.0000000000000004.
        let raw = (n as f64 * test_fraction - 1e-9).ceil().max(0.0) as usize;
        let test = raw.min(n - 1);
        Self {
            train: n - test,
            test,
        }
    }
}

/// Borrowed views of the two halves of a split. No rows are copied or shuffled.
pub struct ChronologicalSplit<'a> {
    pub x_train: ArrayView2<'a, f64>,
    pub y_train: ArrayView1<'a, f64>,
    pub x_test: ArrayView2<'a, f64>,
    pub y_test: ArrayView1<'a, f64>,
}

impl<'a> ChronologicalSplit<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>, sizes: SplitSizes) -> Self {
        let cut = sizes.train;
        Self {
            x_train: x.slice_move(s![..cut, ..]),
            y_train: y.slice_move(s![..cut]),
            x_test: x.slice_move(s![cut.., ..]),
            y_test: y.slice_move(s![cut..]),
        }
    }

    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.y_train.len(),
            test: self.y_test.len(),
        }
    }
}

/// Root mean squared error; `None` for empty input.
pub fn rmse(actual: ArrayView1<'_, f64>, predicted: &Array1<f64>) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Some((sse / actual.len() as f64).sqrt())
}
