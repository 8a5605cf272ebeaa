// SVD-based dimensionality reduction

#![doc = include_str!("../README.md")]

pub mod error;
pub mod image_svd;
pub mod linalg_backends;
pub mod pca;
#[cfg(feature = "tsne")]
pub mod tsne;

pub use error::{parse_rank, DimRedError, Result, ThreadSafeStdError};
pub use image_svd::{
    apply_svd, batch_reconstruct, reconstruct, BatchReconstructConfig, ImageCodec,
    ImageCrateCodec, ImageDisplay, LogDisplay,
};
pub use pca::{PcaSolver, SharedPca, PCA};
#[cfg(feature = "tsne")]
pub use tsne::{Tsne, TsneConfig};

#[cfg(test)]
mod pca_tests;
