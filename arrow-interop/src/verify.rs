//! Element-wise comparison of the device result against the reference.

use std::fmt;

use arrow_array::{Array, Int64Array};
use tracing::info;

/// Number of leading element pairs kept for display.
pub const SAMPLE_LIMIT: usize = 20;

/// A single differing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub result: i64,
    /// `None` when the reference slot is null or past its end.
    pub expected: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub num_val: usize,
    pub result_len: usize,
    pub reference_len: usize,
    pub error_count: usize,
    /// The first [`SAMPLE_LIMIT`] `(result, reference)` pairs.
    pub samples: Vec<(i64, Option<i64>)>,
    pub first_mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.error_count == 0
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "Test passed!")
        } else {
            write!(
                f,
                "Test failed. Found {} errors in the output Arrow array",
                self.error_count
            )
        }
    }
}

/// Compare `result` against the first `num_val` elements of `reference`.
///
/// Every compared position where the values differ, the reference is null or
/// the reference has already ended counts as one error. A `result` that does
/// not hold exactly `num_val` elements adds one more.
pub fn compare_arrays(result: &Int64Array, reference: &Int64Array, num_val: usize) -> VerificationReport {
    let compared = result.len().min(num_val);
    let mut error_count = 0usize;
    let mut samples = Vec::with_capacity(SAMPLE_LIMIT.min(compared));
    let mut first_mismatches = Vec::new();

    for i in 0..compared {
        let got = result.value(i);
        let expected = if i < reference.len() && reference.is_valid(i) {
            Some(reference.value(i))
        } else {
            None
        };

        if expected != Some(got) {
            error_count += 1;
            if first_mismatches.len() < SAMPLE_LIMIT {
                first_mismatches.push(Mismatch {
                    index: i,
                    result: got,
                    expected,
                });
            }
        }
        if i < SAMPLE_LIMIT {
            samples.push((got, expected));
        }
    }

    if result.len() != num_val {
        error_count += 1;
    }

    let report = VerificationReport {
        num_val,
        result_len: result.len(),
        reference_len: reference.len(),
        error_count,
        samples,
        first_mismatches,
    };
    info!(
        "Verification: {} of {} elements compared, {} errors",
        compared, num_val, report.error_count
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_arrays_pass() {
        let a = Int64Array::from(vec![1, 2, 3]);
        let report = compare_arrays(&a, &a.clone(), 3);
        assert!(report.passed());
        assert_eq!(report.samples.len(), 3);
        assert_eq!(report.to_string(), "Test passed!");
    }

    #[test]
    fn reference_longer_than_num_val_is_truncated() {
        let result = Int64Array::from(vec![10, 20]);
        let reference = Int64Array::from(vec![10, 20, 30, 40]);
        assert!(compare_arrays(&result, &reference, 2).passed());
    }

    #[test]
    fn differing_values_are_counted() {
        let result = Int64Array::from(vec![1, 0, 3, 0]);
        let reference = Int64Array::from(vec![1, 2, 3, 4]);
        let report = compare_arrays(&result, &reference, 4);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.first_mismatches[0].index, 1);
        assert_eq!(report.first_mismatches[0].expected, Some(2));
        assert_eq!(
            report.to_string(),
            "Test failed. Found 2 errors in the output Arrow array"
        );
    }

    #[test]
    fn short_reference_counts_missing_elements() {
        let result = Int64Array::from(vec![1, 2, 3]);
        let reference = Int64Array::from(vec![1]);
        let report = compare_arrays(&result, &reference, 3);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.first_mismatches[1].expected, None);
    }

    #[test]
    fn short_result_is_a_length_error() {
        let result = Int64Array::from(vec![1, 2]);
        let reference = Int64Array::from(vec![1, 2, 3]);
        let report = compare_arrays(&result, &reference, 3);
        assert_eq!(report.error_count, 1);
        assert!(!report.passed());
    }

    #[test]
    fn null_reference_slot_is_an_error() {
        let result = Int64Array::from(vec![0, 5]);
        let reference = Int64Array::from(vec![None, Some(5)]);
        assert_eq!(compare_arrays(&result, &reference, 2).error_count, 1);
    }

    #[test]
    fn samples_are_capped() {
        let values: Vec<i64> = (0..100).collect();
        let a = Int64Array::from(values);
        let report = compare_arrays(&a, &a.clone(), 100);
        assert_eq!(report.samples.len(), SAMPLE_LIMIT);
    }
}
