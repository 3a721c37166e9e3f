use nalgebra::{SMatrix, SVector};

/// Pivots smaller than this are replaced by it instead of failing.
pub const PIVOT_EPS: f64 = 1e-12;

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
///
/// A vanishing pivot is nudged to `PIVOT_EPS` (keeping its sign) so that
/// near-singular systems still produce a finite answer; `None` is returned
/// only if the result is not finite.
pub fn solve_gaussian<const N: usize>(
    mut a: SMatrix<f64, N, N>,
    mut b: SVector<f64, N>,
) -> Option<SVector<f64, N>> {
    for col in 0..N {
        let mut pivot_row = col;
        let mut pivot_abs = a[(col, col)].abs();
        for row in (col + 1)..N {
            let v = a[(row, col)].abs();
            if v > pivot_abs {
                pivot_abs = v;
                pivot_row = row;
            }
        }
        if pivot_row != col {
            a.swap_rows(col, pivot_row);
            b.swap_rows(col, pivot_row);
        }
        if a[(col, col)].abs() < PIVOT_EPS {
            a[(col, col)] = if a[(col, col)] < 0.0 {
                -PIVOT_EPS
            } else {
                PIVOT_EPS
            };
        }

        let pivot = a[(col, col)];
        for row in (col + 1)..N {
            let factor = a[(row, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..N {
                a[(row, k)] -= factor * a[(col, k)];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = SVector::<f64, N>::zeros();
    for row in (0..N).rev() {
        let mut acc = b[row];
        for k in (row + 1)..N {
            acc -= a[(row, k)] * x[k];
        }
        x[row] = acc / a[(row, row)];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}
