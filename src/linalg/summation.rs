//! Compensated summation.

/// Sum of squares using Neumaier's variant of Kahan-Babuška summation.
///
/// Returns exactly `0.0` for an all-zero input.
pub fn sum_of_squares<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;

    for &x in values {
        let term = x * x;
        let t = sum + term;
        if sum.abs() >= term.abs() {
            compensation += (sum - t) + term;
        } else {
            compensation += (term - t) + sum;
        }
        sum = t;
    }

    sum + compensation
}
