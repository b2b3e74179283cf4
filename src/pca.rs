use eyre::bail;
use faer::{Mat, Side};

use crate::stats::{mean, std};

/// Principal components over the columns (samples) of a probes x samples matrix.
#[derive(Debug, Clone)]
pub struct Pca {
    /// Component x sample loadings, strongest component first.
    pub components: Mat<f64>,
    /// Percentage of the total variance per component.
    pub explained_variance: Vec<f64>,
}

impl Pca {
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn component(&self, k: usize) -> Vec<f64> {
        (0..self.components.ncols())
            .map(|j| self.components.read(k, j))
            .collect()
    }

    /// Names `Comp1..CompN`.
    pub fn component_names(&self) -> Vec<String> {
        (1..=self.n_components())
            .map(|k| format!("Comp{k}"))
            .collect()
    }
}

/// Z-score every column, then take the top eigenvectors of the column covariance matrix.
///
/// Rows are observations (probes), columns are variables (samples). Each component is signed so
/// that its largest absolute loading is positive. At most `min(n_components, rows, columns)`
/// components are returned. Fails when a column is constant or holds non-finite values.
pub fn pca(data: &Mat<f64>, n_components: usize) -> eyre::Result<Pca> {
    let (nrows, ncols) = (data.nrows(), data.ncols());
    let n_components = n_components.min(nrows).min(ncols);

    let column_stats: Vec<(f64, f64)> = (0..ncols)
        .map(|j| {
            let values: Vec<f64> = (0..nrows).map(|i| data.read(i, j)).collect();
            (mean(&values), std(&values))
        })
        .collect();
    if let Some(j) = column_stats
        .iter()
        .position(|(mu, sd)| !mu.is_finite() || !sd.is_finite() || *sd == 0.0)
    {
        bail!("Column {j} is constant or not finite.");
    }
    let zscores = Mat::from_fn(nrows, ncols, |i, j| {
        let (mu, sd) = column_stats[j];
        (data.read(i, j) - mu) / sd
    });
    let zscores_t = zscores.transpose().to_owned();
    let gram = &zscores_t * &zscores;
    let denom = (nrows.max(2) - 1) as f64;
    let covariance = Mat::from_fn(ncols, ncols, |i, j| gram.read(i, j) / denom);

    // Eigenvalues come in ascending order.
    let eig = covariance.selfadjoint_eigendecomposition(Side::Lower);
    let eigenvalues: Vec<f64> = (0..ncols)
        .map(|k| eig.s().column_vector().read(k))
        .collect();
    let eigenvectors = eig.u();
    let total: f64 = eigenvalues.iter().sum();
    let order: Vec<usize> = (0..ncols).rev().take(n_components).collect();

    let signs: Vec<f64> = order
        .iter()
        .map(|k| {
            let strongest = (0..ncols)
                .map(|i| eigenvectors.read(i, *k))
                .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            if strongest < 0.0 {
                -1.0
            } else {
                1.0
            }
        })
        .collect();
    let components = Mat::from_fn(n_components, ncols, |c, j| {
        signs[c] * eigenvectors.read(j, order[c])
    });
    let explained_variance = order
        .iter()
        .map(|k| 100.0 * eigenvalues[*k] / total)
        .collect();

    Ok(Pca {
        components,
        explained_variance,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    /// Two groups of samples that follow two independent probe patterns.
    fn two_groups() -> Mat<f64> {
        let pattern_a = [1.0, -1.0, 2.0, 0.5, -2.0, 0.0, 1.5, -0.5];
        let pattern_b = [0.0, 1.0, -1.0, 2.0, 0.5, -2.0, 0.3, -1.5];
        Mat::from_fn(8, 6, |i, j| {
            let noise = ((i * 7 + j * 3) % 5) as f64 * 0.01;
            if j < 3 {
                pattern_a[i] + noise
            } else {
                pattern_b[i] + noise
            }
        })
    }

    #[test]
    fn test_pca_components() {
        let pca = pca(&two_groups(), 25).unwrap();
        assert_eq!(pca.n_components(), 6);
        assert_eq!(pca.component_names()[..2], ["Comp1", "Comp2"]);

        // Explained variance is sorted and sums to at most 100%.
        let total: f64 = pca.explained_variance.iter().sum();
        assert!((total - 100.0).abs() < 1e-6);
        for pair in pca.explained_variance.windows(2) {
            assert!(pair[0] >= pair[1] - 1e-9);
        }

        // Unit length loadings, largest absolute loading positive.
        for k in 0..pca.n_components() {
            let comp = pca.component(k);
            let norm: f64 = comp.iter().map(|v| v * v).sum();
            assert!((norm - 1.0).abs() < 1e-9);
            let strongest = comp
                .iter()
                .copied()
                .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
            assert!(strongest > 0.0);
        }
    }

    #[test]
    fn test_pca_separates_groups() {
        let pca = pca(&two_groups(), 2).unwrap();
        assert_eq!(pca.n_components(), 2);
        // The first two components carry nearly all variance of two patterns.
        assert!(pca.explained_variance[0] + pca.explained_variance[1] > 99.0);
    }

    #[test]
    fn test_pca_constant_column() {
        let mut data = two_groups();
        for i in 0..data.nrows() {
            data.write(i, 2, 1.0);
        }
        assert!(pca(&data, 2).is_err());
    }
}
