//! t-SNE embedding through the `bhtsne` crate.
//!
//! Every option lives in [`TsneConfig`] and is passed to `bhtsne` as its own builder
//! call.

use log::info;
use ndarray::{Array2, ArrayView2};

use crate::error::{DimRedError, Result};

/// Options for a t-SNE run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneConfig {
    /// Dimension of the embedding.
    pub n_components: u8,
    /// Effective number of neighbours. Must satisfy `n_samples - 1 >= 3 * perplexity`.
    pub perplexity: f64,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Number of gradient descent iterations.
    pub epochs: usize,
    /// Barnes-Hut accuracy trade-off; `0.0` runs the exact algorithm.
    pub theta: f64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        TsneConfig {
            n_components: 2,
            perplexity: 30.0,
            learning_rate: 200.0,
            epochs: 1000,
            theta: 0.5,
        }
    }
}

impl TsneConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DimRedError::InvalidConfiguration(msg));
        if self.n_components == 0 {
            return invalid("t-SNE n_components must be positive".to_string());
        }
        if !(self.perplexity.is_finite() && self.perplexity > 0.0) {
            return invalid(format!("t-SNE perplexity must be positive, got {}", self.perplexity));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("t-SNE learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.epochs == 0 {
            return invalid("t-SNE epochs must be positive".to_string());
        }
        if !(self.theta.is_finite() && self.theta >= 0.0) {
            return invalid(format!("t-SNE theta must be non-negative, got {}", self.theta));
        }
        Ok(())
    }
}

fn euclidean(sample_a: &&[f64], sample_b: &&[f64]) -> f64 {
    sample_a
        .iter()
        .zip(sample_b.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// t-SNE runner that keeps the last embedding it produced.
#[derive(Debug, Clone)]
pub struct Tsne {
    config: TsneConfig,
    embedding: Option<Array2<f64>>,
}

impl Tsne {
    /// # Errors
    /// Returns `InvalidConfiguration` if any option is out of range.
    pub fn new(config: TsneConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            embedding: None,
        })
    }

    pub fn config(&self) -> &TsneConfig {
        &self.config
    }

    /// The embedding from the last successful `fit_transform`.
    pub fn embedding(&self) -> Option<&Array2<f64>> {
        self.embedding.as_ref()
    }

    /// Embeds `data` (shape `(n_samples, n_features)`) into `n_components` dimensions.
    ///
    /// # Errors
    /// * `EmptyDataset` if there are no samples.
    /// * `DimensionMismatch` if there are no features.
    /// * `InvalidConfiguration` if the perplexity is too large for the sample count.
    pub fn fit_transform(&mut self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 {
            return Err(DimRedError::EmptyDataset);
        }
        if n_features == 0 {
            return Err(DimRedError::dimension_mismatch(1, 0, "t-SNE features"));
        }
        if ((n_samples - 1) as f64) < 3.0 * self.config.perplexity {
            return Err(DimRedError::InvalidConfiguration(format!(
                "t-SNE perplexity {} is too large for {} samples",
                self.config.perplexity, n_samples
            )));
        }
        info!(
            "Running t-SNE on {} samples x {} features into {} dimensions",
            n_samples, n_features, self.config.n_components
        );

        let contiguous = data.as_standard_layout();
        let flat = contiguous.as_slice().ok_or_else(|| {
            DimRedError::InvalidConfiguration("t-SNE input is not contiguous".to_string())
        })?;
        let samples: Vec<&[f64]> = flat.chunks(n_features).collect();

        let mut tsne = bhtsne::tSNE::new(&samples);
        tsne.embedding_dim(self.config.n_components)
            .perplexity(self.config.perplexity)
            .learning_rate(self.config.learning_rate)
            .epochs(self.config.epochs);
        if self.config.theta > 0.0 {
            tsne.barnes_hut(self.config.theta, euclidean);
        } else {
            tsne.exact(euclidean);
        }

        let embedding = Array2::from_shape_vec(
            (n_samples, self.config.n_components as usize),
            tsne.embedding(),
        )
        .map_err(|e| DimRedError::Backend(format!("t-SNE returned a malformed embedding: {}", e)))?;
        self.embedding = Some(embedding.clone());
        Ok(embedding)
    }
}
