use eyre::bail;
use faer::{Mat, Side};
use itertools::Itertools;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Eigenvalues of `X'X` below this fraction of the largest are treated as zero.
const RCOND: f64 = 1e-12;

/// Ordinary least squares for a fixed design matrix.
///
/// The design is given column-wise. `X'X` is inverted once through its eigendecomposition so that
/// many responses can be fit against the same design, ex. the per-probe residuals of an expression
/// matrix against a correction matrix. Directions with a null eigenvalue are dropped (Moore-Penrose
/// pseudo-inverse), so rank deficient designs still give the least squares projection.
pub struct OlsSolver {
    design: Mat<f64>,
    design_t: Mat<f64>,
    pinv_xtx: Mat<f64>,
    rank: usize,
}

impl OlsSolver {
    pub fn new(columns: &[Vec<f64>]) -> eyre::Result<Self> {
        let Some(nrows) = columns.first().map(|c| c.len()) else {
            bail!("Design matrix has no columns.");
        };
        if let Some(col) = columns.iter().find(|c| c.len() != nrows) {
            bail!(
                "Design matrix columns differ in length ({} vs {nrows}).",
                col.len()
            );
        }
        if nrows == 0 {
            bail!("Design matrix has no rows.");
        }
        let ncols = columns.len();
        let design = Mat::from_fn(nrows, ncols, |i, j| columns[j][i]);
        let design_t = design.transpose().to_owned();
        let xtx = &design_t * &design;

        let eig = xtx.selfadjoint_eigendecomposition(Side::Lower);
        let eigenvalues: Vec<f64> = (0..ncols)
            .map(|k| eig.s().column_vector().read(k))
            .collect();
        let eigenvectors = eig.u();
        let max_eigenvalue = eigenvalues.iter().copied().fold(0.0f64, f64::max);
        let kept: Vec<usize> = (0..ncols)
            .filter(|k| eigenvalues[*k] > RCOND * max_eigenvalue)
            .collect();
        let pinv_xtx = Mat::from_fn(ncols, ncols, |i, j| {
            kept.iter()
                .map(|k| eigenvectors.read(i, *k) * eigenvectors.read(j, *k) / eigenvalues[*k])
                .sum::<f64>()
        });

        Ok(Self {
            design,
            design_t,
            pinv_xtx,
            rank: kept.len(),
        })
    }

    pub fn ncols(&self) -> usize {
        self.design.ncols()
    }

    /// Number of linearly independent design columns.
    pub fn rank(&self) -> usize {
        self.rank
    }

    fn check_len(&self, n: usize) -> eyre::Result<()> {
        if n != self.design.nrows() {
            bail!(
                "Response has {n} values but design matrix has {} rows.",
                self.design.nrows()
            );
        }
        Ok(())
    }

    /// Minimum norm least squares coefficients.
    pub fn coefficients(&self, y: &[f64]) -> eyre::Result<Vec<f64>> {
        self.check_len(y.len())?;
        let y = Mat::from_fn(y.len(), 1, |i, _| y[i]);
        let xty = &self.design_t * &y;
        let coef = &self.pinv_xtx * &xty;
        Ok((0..coef.nrows()).map(|i| coef.read(i, 0)).collect())
    }

    pub fn predict(&self, y: &[f64]) -> eyre::Result<Vec<f64>> {
        let coef = self.coefficients(y)?;
        Ok(self.predict_with(&coef))
    }

    pub fn predict_with(&self, coef: &[f64]) -> Vec<f64> {
        let coef = Mat::from_fn(coef.len(), 1, |i, _| coef[i]);
        let fitted = &self.design * &coef;
        (0..fitted.nrows()).map(|i| fitted.read(i, 0)).collect()
    }

    pub fn residuals(&self, y: &[f64]) -> eyre::Result<Vec<f64>> {
        let fitted = self.predict(y)?;
        Ok(y.iter().zip(fitted).map(|(obs, fit)| obs - fit).collect())
    }

    /// Residuals of every row of `responses` (one observation per column) against the design.
    pub fn residual_rows(&self, responses: &Mat<f64>) -> eyre::Result<Mat<f64>> {
        self.check_len(responses.ncols())?;
        // (X (X'X)^+ X' y')' = y X (X'X)^+ X'
        let projected = &(responses * &self.design) * &self.pinv_xtx;
        let fitted = &projected * &self.design_t;
        Ok(responses - &fitted)
    }

    /// R² without centering, as reported for models that carry no intercept.
    pub fn uncentered_rsquared(&self, y: &[f64]) -> eyre::Result<f64> {
        let ssr: f64 = self.residuals(y)?.iter().map(|r| r * r).sum();
        let tss: f64 = y.iter().map(|v| v * v).sum();
        Ok(1.0 - ssr / tss)
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (`ddof = 1`). `NaN` for fewer than two values.
pub fn std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let mu = mean(values);
    let ss: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

pub fn pearsonr(x: &[f64], y: &[f64]) -> f64 {
    let (mx, my) = (mean(x), mean(y));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

/// 1-based ranks, ties get the average of the ranks they span.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let order = (0..values.len())
        .sorted_by(|&a, &b| values[a].total_cmp(&values[b]))
        .collect_vec();
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Ranks start..end (0-based) averaged and shifted to 1-based.
        let avg = (start + end + 1) as f64 / 2.0;
        for idx in &order[start..end] {
            ranks[*idx] = avg;
        }
        start = end;
    }
    ranks
}

pub fn spearmanr(x: &[f64], y: &[f64]) -> f64 {
    pearsonr(&rank(x), &rank(y))
}

/// x position of the vertex of `a x² + b x + c`.
pub fn calc_vertex_xpos(a: f64, b: f64) -> f64 {
    -b / (2.0 * a)
}

/// Pointwise confidence band of the simple regression `y ~ 1 + x`, evaluated at `grid`.
///
/// # Returns
/// * `(x, lower, upper)` per grid point, for a two-sided `level` (ex. `0.95`).
/// * Empty when the band is undefined: fewer than three points or a constant `x`.
pub fn regression_band(
    x: &[f64],
    y: &[f64],
    grid: &[f64],
    level: f64,
) -> eyre::Result<Vec<(f64, f64, f64)>> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return Ok(vec![]);
    }
    let x_mean = mean(x);
    let sxx: f64 = x.iter().map(|v| (v - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return Ok(vec![]);
    }
    let coef = OlsSolver::new(&[vec![1.0; n], x.to_vec()])?.coefficients(y)?;
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (yi - coef[0] - coef[1] * xi).powi(2))
        .sum();
    let s = (sse / (n - 2) as f64).sqrt();
    let t = StudentsT::new(0.0, 1.0, (n - 2) as f64)?.inverse_cdf(0.5 + level / 2.0);
    Ok(grid
        .iter()
        .map(|xg| {
            let fit = coef[0] + coef[1] * xg;
            let half = t * s * (1.0 / n as f64 + (xg - x_mean).powi(2) / sxx).sqrt();
            (*xg, fit - half, fit + half)
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_ols_recovers_exact_line() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 0.5 * v).collect();
        let solver = OlsSolver::new(&[vec![1.0; 5], x]).unwrap();
        let coef = solver.coefficients(&y).unwrap();
        assert_close(coef[0], 2.0);
        assert_close(coef[1], 0.5);
        for r in solver.residuals(&y).unwrap() {
            assert_close(r, 0.0);
        }
    }

    #[test]
    fn test_ols_residuals_orthogonal_to_design() {
        let x1 = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x2 = vec![0.3, -1.0, 2.2, 0.1, 0.0, 1.5];
        let y = vec![1.2, 0.7, 3.3, 2.9, 4.1, 6.8];
        let design = vec![vec![1.0; 6], x1, x2];
        let resid = OlsSolver::new(&design).unwrap().residuals(&y).unwrap();
        for col in &design {
            assert!(dot(col, &resid).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ols_rank_deficient() {
        let x = vec![1.0, 2.0, 3.0, 5.0];
        let x_dup: Vec<f64> = x.iter().map(|v| v * 2.0).collect();
        let design = vec![vec![1.0; 4], x, x_dup];
        let solver = OlsSolver::new(&design).unwrap();
        assert_eq!(solver.rank(), 2);
        let y = vec![0.4, 1.9, 2.1, 4.2];
        let resid = solver.residuals(&y).unwrap();
        for col in &design {
            assert!(dot(col, &resid).abs() < 1e-8);
        }
        // Same projection as the full rank design.
        let full = OlsSolver::new(&design[..2]).unwrap().residuals(&y).unwrap();
        for (a, b) in resid.iter().zip(&full) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_residual_rows_match_single_fits() {
        let design = vec![vec![1.0; 5], vec![0.0, 1.0, 0.0, 1.0, 1.0]];
        let solver = OlsSolver::new(&design).unwrap();
        let rows = [
            vec![1.0, 2.5, 2.0, 4.5, 6.0],
            vec![0.3, -0.2, 0.8, 0.1, 0.0],
        ];
        let responses = Mat::from_fn(2, 5, |i, j| rows[i][j]);
        let resid = solver.residual_rows(&responses).unwrap();
        for (i, row) in rows.iter().enumerate() {
            for (j, r) in solver.residuals(row).unwrap().into_iter().enumerate() {
                assert_close(resid.read(i, j), r);
            }
        }
        assert!(solver.residual_rows(&Mat::zeros(1, 4)).is_err());
    }

    #[test]
    fn test_ols_length_mismatch() {
        let solver = OlsSolver::new(&[vec![1.0; 3], vec![1.0, 2.0, 4.0]]).unwrap();
        assert!(solver.coefficients(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_pearsonr() {
        assert_close(pearsonr(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0);
        assert_close(pearsonr(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0);
        assert!(pearsonr(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
    }

    #[test]
    fn test_rank_with_ties() {
        assert_eq!(rank(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_spearmanr_monotonic() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 8.0, 27.0, 64.0];
        assert_close(spearmanr(&x, &y), 1.0);
    }

    #[test]
    fn test_std_and_mean() {
        assert_close(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_close(std(&[1.0, 2.0, 3.0]), 1.0);
        assert!(std(&[1.0]).is_nan());
    }

    #[test]
    fn test_vertex() {
        // (x - 3)² = x² - 6x + 9
        assert_close(calc_vertex_xpos(1.0, -6.0), 3.0);
    }

    #[test]
    fn test_regression_band() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.1, 0.9, 2.2, 2.8, 4.1];
        let band = regression_band(&x, &y, &[0.0, 2.0, 4.0], 0.95).unwrap();
        assert_eq!(band.len(), 3);
        for (_, lo, hi) in &band {
            assert!(lo < hi);
        }
        // Narrowest at the mean of x.
        let width = |i: usize| band[i].2 - band[i].1;
        assert!(width(1) < width(0));
        assert_close(width(0), width(2));

        assert!(regression_band(&x[..2], &y[..2], &[0.0], 0.95).unwrap().is_empty());
        assert!(regression_band(&[1.0; 4], &y[..4], &[1.0], 0.95).unwrap().is_empty());
    }

    #[test]
    fn test_uncentered_rsquared_perfect_fit() {
        let x = vec![1.0, 2.0, 3.0];
        let y = vec![2.0, 4.0, 6.0];
        let solver = OlsSolver::new(&[x]).unwrap();
        assert_close(solver.uncentered_rsquared(&y).unwrap(), 1.0);
    }
}
