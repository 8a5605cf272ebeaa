// Principal component analysis (PCA)

use log::{debug, info, trace};
use ndarray::{s, Array1, Array2, Axis};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{DimRedError, Result};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};

/// Decomposition used to compute the principal axes.
///
/// Only the dense SVD is available. The tag is kept as configuration so a
/// model records which solver produced it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcaSolver {
    /// Full dense SVD of the centered data matrix (tag `"svd"`).
    #[default]
    Svd,
}

impl FromStr for PcaSolver {
    type Err = DimRedError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "svd" => Ok(PcaSolver::Svd),
            other => Err(DimRedError::InvalidConfiguration(format!(
                "unknown PCA solver {:?}; recognized solvers: \"svd\"",
                other
            ))),
        }
    }
}

impl fmt::Display for PcaSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcaSolver::Svd => f.write_str("svd"),
        }
    }
}

/// Principal component analysis (PCA) structure.
///
/// Holds the number of components to keep, the solver tag, and once fitted the
/// per-feature mean and the full `D x D` matrix of principal axes (one axis per
/// row, ordered by descending singular value).
///
/// Models can be saved to and loaded from files.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PCA {
    n_components: usize,
    solver: PcaSolver,
    /// Mean vector of the training data.
    /// Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Right-singular vectors of the centered training data, one per row.
    /// Shape: (n_features, n_features)
    components: Option<Array2<f64>>,
    /// Singular values of the centered training data, descending.
    /// Shape: (min(n_samples, n_features))
    singular_values: Option<Array1<f64>>,
}

/// Everything a single `fit` produces. Installed into a `PCA` in one step.
struct FittedModel {
    mean: Array1<f64>,
    components: Array2<f64>,
    singular_values: Array1<f64>,
}

impl PCA {
    /// Creates an unfitted PCA that keeps `n_components` leading components.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if `n_components` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use svd_reduce::{PcaSolver, PCA};
    /// let pca = PCA::new(2, PcaSolver::Svd).unwrap();
    /// assert!(!pca.is_fitted());
    /// ```
    pub fn new(n_components: usize, solver: PcaSolver) -> Result<Self> {
        if n_components == 0 {
            return Err(DimRedError::InvalidConfiguration(
                "n_components must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            n_components,
            solver,
            mean: None,
            components: None,
            singular_values: None,
        })
    }

    /// Creates an unfitted PCA from a textual solver tag such as `"svd"`.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for a zero `n_components` or an unknown tag.
    pub fn with_solver_tag(n_components: usize, solver_tag: &str) -> Result<Self> {
        let solver = solver_tag.parse::<PcaSolver>()?;
        Self::new(n_components, solver)
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn solver(&self) -> PcaSolver {
        self.solver
    }

    /// Returns `true` once `fit` has succeeded (or a fitted model was loaded).
    pub fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.components.is_some()
    }

    /// Returns the mean vector of the training data, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Returns the full `(n_features, n_features)` component matrix, if fitted.
    ///
    /// Rows are orthonormal principal axes ordered by descending singular value;
    /// only the first `n_components` rows are used for projection.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Returns the singular values of the centered training data, if fitted.
    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.singular_values.as_ref()
    }

    /// Fits the model to `data_matrix` (shape `(n_samples, n_features)`).
    ///
    /// The per-feature mean is subtracted from every sample and the SVD of the
    /// centered matrix is computed. All `n_features` right-singular vectors become the
    /// component matrix; the left-singular vectors are never materialized beyond
    /// `min(n_samples, n_features)` columns unless the data is wider than tall. A successful call replaces any previously fitted model; a failed call
    /// leaves it untouched.
    ///
    /// # Errors
    /// * `EmptyDataset` if there are no samples.
    /// * `DimensionMismatch` if `n_components` exceeds the number of features.
    /// * `Backend` if the SVD provider fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use svd_reduce::{PcaSolver, PCA};
    ///
    /// let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
    /// let mut pca = PCA::new(1, PcaSolver::Svd).unwrap();
    /// pca.fit(data).unwrap();
    /// assert_eq!(pca.components().unwrap().dim(), (2, 2));
    /// ```
    pub fn fit(&mut self, data_matrix: Array2<f64>) -> Result<()> {
        let model = self.compute_model(data_matrix)?;
        self.mean = Some(model.mean);
        self.components = Some(model.components);
        self.singular_values = Some(model.singular_values);
        Ok(())
    }

    fn compute_model(&self, mut data_matrix: Array2<f64>) -> Result<FittedModel> {
        let (n_samples, n_features) = data_matrix.dim();
        if n_samples == 0 {
            return Err(DimRedError::EmptyDataset);
        }
        if self.n_components > n_features {
            return Err(DimRedError::dimension_mismatch(
                self.n_components,
                n_features,
                "fit (n_components exceeds feature count)",
            ));
        }
        info!(
            "Fitting PCA ({} solver) on {} samples x {} features, keeping {} components",
            self.solver, n_samples, n_features, self.n_components
        );

        let mean_vector = data_matrix
            .mean_axis(Axis(0))
            .ok_or(DimRedError::EmptyDataset)?;
        data_matrix -= &mean_vector;

        // Only Vt is kept. A thin SVD already yields all D right-singular vectors when
        // N >= D; the full decomposition is needed only for wide data, where U is N x N.
        let full_matrices = n_samples < n_features;
        let svd = match self.solver {
            PcaSolver::Svd => LinAlgBackendProvider::<f64>::new()
                .svd_into(data_matrix, full_matrices)
                .map_err(|e| DimRedError::Backend(e.to_string()))?,
        };
        debug!("Singular values of centered data: {:?}", svd.s);

        Ok(FittedModel {
            mean: mean_vector,
            components: svd.vt,
            singular_values: svd.s,
        })
    }

    fn fitted_parts(&self) -> Result<(&Array1<f64>, &Array2<f64>)> {
        match (self.mean.as_ref(), self.components.as_ref()) {
            (Some(mean), Some(components)) => Ok((mean, components)),
            _ => Err(DimRedError::NotFitted),
        }
    }

    /// Projects `x` (shape `(m_samples, n_features)`) onto the leading components.
    ///
    /// The stored mean is subtracted from every row (in place) and the result is
    /// multiplied by the transpose of the first `n_components` component rows.
    /// Returns an `(m_samples, n_components)` matrix.
    ///
    /// # Errors
    /// * `NotFitted` if called before `fit`.
    /// * `DimensionMismatch` if `x` does not have the fitted feature count.
    pub fn transform(&self, mut x: Array2<f64>) -> Result<Array2<f64>> {
        let (mean_vector, components) = self.fitted_parts()?;
        let n_model_features = mean_vector.len();
        if x.ncols() != n_model_features {
            return Err(DimRedError::dimension_mismatch(
                n_model_features,
                x.ncols(),
                "transform",
            ));
        }
        if x.nrows() == 0 {
            return Ok(Array2::zeros((0, self.n_components)));
        }
        trace!("Projecting {} samples onto {} components", x.nrows(), self.n_components);

        x -= mean_vector;
        let leading = components.slice(s![..self.n_components, ..]);
        Ok(x.dot(&leading.t()))
    }

    /// Fits the model and returns the projection of the same data.
    pub fn fit_transform(&mut self, data_matrix: Array2<f64>) -> Result<Array2<f64>> {
        self.fit(data_matrix.clone())?;
        self.transform(data_matrix)
    }

    /// Maps component coordinates (shape `(m_samples, n_components)`) back to the
    /// original feature space: `mean + coords * components[..n_components]`.
    ///
    /// With `n_components == n_features` this recovers the data passed to
    /// `transform` up to floating-point error.
    ///
    /// # Errors
    /// * `NotFitted` if called before `fit`.
    /// * `DimensionMismatch` if `coords` does not have `n_components` columns.
    pub fn inverse_transform(&self, coords: Array2<f64>) -> Result<Array2<f64>> {
        let (mean_vector, components) = self.fitted_parts()?;
        if coords.ncols() != self.n_components {
            return Err(DimRedError::dimension_mismatch(
                self.n_components,
                coords.ncols(),
                "inverse_transform",
            ));
        }
        let leading = components.slice(s![..self.n_components, ..]);
        let mut restored = coords.dot(&leading);
        restored += mean_vector;
        Ok(restored)
    }

    /// Returns the per-entry variance ratio of the component matrix.
    ///
    /// Every entry of the `D x D` component matrix is squared and divided by the
    /// sum of squares of its column (taken over all `D` components). The first
    /// `n_components` rows of that normalized matrix are returned, so the result has
    /// shape `(n_components, n_features)` and every entry lies in `[0, 1]`.
    ///
    /// This is computed from the component matrix rather than from the singular
    /// values; see [`PCA::singular_value_variance_ratio`] for the conventional ratio.
    ///
    /// # Errors
    /// Returns `NotFitted` if called before `fit`.
    pub fn explained_variance_ratio(&self) -> Result<Array2<f64>> {
        let (_, components) = self.fitted_parts()?;
        let squared = components.mapv(|v| v * v);
        let column_sums = squared.sum_axis(Axis(0));
        let ratio = &squared / &column_sums;
        Ok(ratio.slice_move(s![..self.n_components, ..]))
    }

    /// Returns `sigma_i^2 / sum(sigma^2)` for each of the leading `n_components`.
    ///
    /// Components beyond the number of singular values (when `n_samples <
    /// n_features`) carry no variance and report `0.0`, as does every component of
    /// a constant dataset.
    ///
    /// # Errors
    /// Returns `NotFitted` if called before `fit`.
    pub fn singular_value_variance_ratio(&self) -> Result<Array1<f64>> {
        let singular_values = self.singular_values.as_ref().ok_or(DimRedError::NotFitted)?;
        let squared = singular_values.mapv(|v| v * v);
        let total: f64 = squared.sum();
        Ok(Array1::from_shape_fn(self.n_components, |i| {
            match squared.get(i) {
                Some(&value) if total > 0.0 => value / total,
                _ => 0.0,
            }
        }))
    }

    /// Saves the fitted model to a file using bincode.
    ///
    /// # Errors
    /// Returns `NotFitted` for an unfitted model, `Io` if the file cannot be
    /// created, or `Serialization` if encoding fails.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if !self.is_fitted() || self.singular_values.is_none() {
            return Err(DimRedError::NotFitted);
        }
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| DimRedError::Serialization(format!("Failed to serialize PCA model: {}", e)))?;
        debug!("Saved PCA model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a model previously written by [`PCA::save_model`].
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be opened, `Serialization` if it cannot be
    /// decoded or is missing parts, and `DimensionMismatch` if the decoded parts have
    /// inconsistent shapes.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let pca_model: PCA =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| DimRedError::Serialization(format!("Failed to deserialize PCA model: {}", e)))?;
        pca_model.validate_loaded()?;
        debug!("Loaded PCA model from {:?}", path.as_ref());
        Ok(pca_model)
    }

    fn validate_loaded(&self) -> Result<()> {
        let missing = |part: &str| DimRedError::Serialization(format!("Loaded PCA model is missing its {}", part));
        let mean = self.mean.as_ref().ok_or_else(|| missing("mean vector"))?;
        let components = self.components.as_ref().ok_or_else(|| missing("component matrix"))?;
        let singular_values = self.singular_values.as_ref().ok_or_else(|| missing("singular values"))?;

        if self.n_components == 0 {
            return Err(DimRedError::InvalidConfiguration(
                "Loaded PCA model has n_components = 0".to_string(),
            ));
        }
        let n_features = mean.len();
        if components.nrows() != n_features {
            return Err(DimRedError::dimension_mismatch(n_features, components.nrows(), "loaded component rows"));
        }
        if components.ncols() != n_features {
            return Err(DimRedError::dimension_mismatch(n_features, components.ncols(), "loaded component columns"));
        }
        if self.n_components > n_features {
            return Err(DimRedError::dimension_mismatch(n_features, self.n_components, "loaded n_components"));
        }
        if singular_values.len() > n_features {
            return Err(DimRedError::dimension_mismatch(n_features, singular_values.len(), "loaded singular values"));
        }
        Ok(())
    }
}

/// A PCA model that can be shared between threads.
///
/// Readers take a snapshot of the current model; `fit` computes a complete new model
/// without holding the lock and then swaps it in. Concurrent fits are serialized by
/// the swap and the last one to finish wins.
#[derive(Debug)]
pub struct SharedPca {
    model: RwLock<Arc<PCA>>,
}

impl SharedPca {
    /// # Errors
    /// Returns `InvalidConfiguration` if `n_components` is zero.
    pub fn new(n_components: usize, solver: PcaSolver) -> Result<Self> {
        Ok(Self::from_model(PCA::new(n_components, solver)?))
    }

    pub fn from_model(model: PCA) -> Self {
        Self {
            model: RwLock::new(Arc::new(model)),
        }
    }

    /// Returns the model current at the time of the call.
    pub fn snapshot(&self) -> Arc<PCA> {
        Arc::clone(&self.model.read())
    }

    /// Fits a fresh model and publishes it. On error the published model is unchanged.
    pub fn fit(&self, data_matrix: Array2<f64>) -> Result<()> {
        let mut next = {
            let current = self.snapshot();
            PCA::new(current.n_components, current.solver)?
        };
        next.fit(data_matrix)?;
        *self.model.write() = Arc::new(next);
        Ok(())
    }

    pub fn transform(&self, x: Array2<f64>) -> Result<Array2<f64>> {
        self.snapshot().transform(x)
    }

    pub fn explained_variance_ratio(&self) -> Result<Array2<f64>> {
        self.snapshot().explained_variance_ratio()
    }
}
