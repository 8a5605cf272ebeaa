//! Low-rank approximation of grayscale images by truncated SVD.
//!
//! [`reconstruct`] keeps the leading `rank` singular triplets of an image and
//! recomposes it. [`batch_reconstruct`] drives that for a list of ranks, reading the
//! source once through an [`ImageCodec`] and writing one file per rank.

use log::{debug, info, warn};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DimRedError, Result, ThreadSafeStdError};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider, SVDOutput};

/// Decodes images into grayscale intensity matrices and encodes them back.
pub trait ImageCodec: Sync {
    /// Reads `path` as an 8-bit grayscale image of shape `(height, width)`.
    fn load_grayscale(&self, path: &Path) -> std::result::Result<Array2<u8>, ThreadSafeStdError>;

    /// Writes `image` to `path`; the format follows the file extension.
    fn save_grayscale(&self, image: &Array2<u8>, path: &Path) -> std::result::Result<(), ThreadSafeStdError>;
}

/// Renders a reconstructed image with a title.
pub trait ImageDisplay: Sync {
    fn show(&self, image: &Array2<u8>, title: &str) -> std::result::Result<(), ThreadSafeStdError>;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Default, Copy, Clone)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn load_grayscale(&self, path: &Path) -> std::result::Result<Array2<u8>, ThreadSafeStdError> {
        let gray = image::open(path)?.to_luma8();
        let (width, height) = gray.dimensions();
        let pixels = Array2::from_shape_vec((height as usize, width as usize), gray.into_raw())?;
        Ok(pixels)
    }

    fn save_grayscale(&self, image: &Array2<u8>, path: &Path) -> std::result::Result<(), ThreadSafeStdError> {
        let (height, width) = image.dim();
        let raw: Vec<u8> = image.iter().copied().collect();
        let buffer = image::GrayImage::from_raw(u32::try_from(width)?, u32::try_from(height)?, raw)
            .ok_or("pixel buffer does not match image dimensions")?;
        buffer.save(path)?;
        Ok(())
    }
}

/// [`ImageDisplay`] that reports each image through the `log` facade.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogDisplay;

impl ImageDisplay for LogDisplay {
    fn show(&self, image: &Array2<u8>, title: &str) -> std::result::Result<(), ThreadSafeStdError> {
        let (height, width) = image.dim();
        let min = image.iter().copied().min().unwrap_or(0);
        let max = image.iter().copied().max().unwrap_or(0);
        info!("{}: {}x{} pixels, intensity range [{}, {}]", title, height, width, min, max);
        Ok(())
    }
}

fn check_rank(rank: usize, max_rank: usize) -> Result<()> {
    if rank == 0 || rank > max_rank {
        return Err(DimRedError::InvalidRank {
            rank: i64::try_from(rank).unwrap_or(i64::MAX),
            max: max_rank,
        });
    }
    Ok(())
}

/// Rank-`rank` approximation of a real matrix, without rounding or clamping.
///
/// Computes the compact SVD `U * diag(S) * VT` and recomposes it from the first
/// `rank` singular triplets only; the remaining singular values are treated as zero.
///
/// # Errors
/// * `InvalidRank` unless `1 <= rank <= min(height, width)`.
/// * `Backend` if the SVD provider fails.
pub fn reconstruct_f64(image: ArrayView2<f64>, rank: usize) -> Result<Array2<f64>> {
    let (height, width) = image.dim();
    check_rank(rank, height.min(width))?;

    let svd = compact_svd(image)?;
    Ok(truncated_product(&svd, rank))
}

fn compact_svd(image: ArrayView2<f64>) -> Result<SVDOutput<f64>> {
    LinAlgBackendProvider::<f64>::new()
        .svd_into(image.to_owned(), false)
        .map_err(|e| DimRedError::Backend(e.to_string()))
}

/// Recomposes `U[:, :rank] * diag(S[:rank]) * VT[:rank, :]`. `rank` must already be checked.
fn truncated_product(svd: &SVDOutput<f64>, rank: usize) -> Array2<f64> {
    let mut scaled_u = svd.u.slice(s![.., ..rank]).to_owned();
    scaled_u *= &svd.s.slice(s![..rank]);
    scaled_u.dot(&svd.vt.slice(s![..rank, ..]))
}

/// Rank-`rank` approximation of an 8-bit grayscale image.
///
/// Values are rounded to the nearest integer and clamped to `[0, 255]`; they never
/// wrap around.
///
/// # Errors
/// * `InvalidRank` unless `1 <= rank <= min(height, width)`.
/// * `Backend` if the SVD provider fails.
///
/// # Examples
///
/// ```
/// use ndarray::Array2;
/// use svd_reduce::image_svd::reconstruct;
///
/// let flat = Array2::<u8>::from_elem((8, 8), 128);
/// let approx = reconstruct(&flat, 1).unwrap();
/// assert_eq!(approx, flat);
/// ```
pub fn reconstruct(image: &Array2<u8>, rank: usize) -> Result<Array2<u8>> {
    let intensities = image.mapv(f64::from);
    let approx = reconstruct_f64(intensities.view(), rank)?;
    Ok(approx.mapv(to_intensity))
}

fn to_intensity(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Mean of the squared element-wise differences between two equally shaped matrices.
///
/// # Errors
/// Returns `DimensionMismatch` if the shapes differ.
pub fn mean_squared_error(original: ArrayView2<f64>, approx: ArrayView2<f64>) -> Result<f64> {
    if original.dim() != approx.dim() {
        let context = "mean_squared_error";
        return Err(if original.nrows() != approx.nrows() {
            DimRedError::dimension_mismatch(original.nrows(), approx.nrows(), context)
        } else {
            DimRedError::dimension_mismatch(original.ncols(), approx.ncols(), context)
        });
    }
    if original.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = original
        .iter()
        .zip(approx.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum();
    Ok(total / original.len() as f64)
}

/// Settings for [`batch_reconstruct`].
#[derive(Debug, Clone)]
pub struct BatchReconstructConfig {
    /// Source image, decoded as grayscale.
    pub image_path: PathBuf,
    /// Folder receiving one file per rank; created if missing.
    pub output_folder: PathBuf,
    /// Ranks to reconstruct, processed in order. Duplicates are processed again.
    pub ranks: Vec<usize>,
    /// Pass every reconstruction to the display collaborator.
    pub show_plots: bool,
    /// Extension of the written files; selects the encoder.
    pub file_extension: String,
    /// Process ranks on the rayon pool. Ignored when `ranks` contains duplicates.
    pub parallel: bool,
}

impl BatchReconstructConfig {
    pub fn new(image_path: impl Into<PathBuf>, output_folder: impl Into<PathBuf>, ranks: Vec<usize>) -> Self {
        Self {
            image_path: image_path.into(),
            output_folder: output_folder.into(),
            ranks,
            show_plots: true,
            file_extension: "jpg".to_string(),
            parallel: false,
        }
    }

    /// Path written for `rank`: `<output_folder>/reconstructed_svd_<rank>.<ext>`.
    pub fn output_path_for_rank(&self, rank: usize) -> PathBuf {
        self.output_folder
            .join(format!("reconstructed_svd_{}.{}", rank, self.file_extension))
    }
}

/// Reconstructs the configured image at every requested rank and writes the results.
///
/// The source is decoded and decomposed once; each rank truncates that single SVD.
/// The output folder is created if needed. For each rank
/// the reconstruction is written to [`BatchReconstructConfig::output_path_for_rank`]
/// and, when `show_plots` is set, handed to `display`. Returns the written paths in
/// rank-list order.
///
/// Processing stops at the first failing rank; files already written stay on disk.
/// In parallel mode other ranks may still complete, and the failure reported is the
/// first one in rank-list order.
///
/// # Errors
/// * `InvalidImage` if the source cannot be decoded.
/// * `IoFailure` with `rank: None` if the output folder cannot be created, or with
///   the offending rank if writing or displaying fails.
/// * `InvalidRank` for a rank outside `[1, min(height, width)]`.
/// * `Backend` if the SVD provider fails.
pub fn batch_reconstruct(
    config: &BatchReconstructConfig,
    codec: &dyn ImageCodec,
    display: &dyn ImageDisplay,
) -> Result<Vec<PathBuf>> {
    let image = codec
        .load_grayscale(&config.image_path)
        .map_err(|source| DimRedError::InvalidImage {
            path: config.image_path.clone(),
            source,
        })?;

    fs::create_dir_all(&config.output_folder).map_err(|e| DimRedError::IoFailure {
        rank: None,
        path: config.output_folder.clone(),
        source: Box::new(e),
    })?;

    let (height, width) = image.dim();
    info!(
        "Reconstructing {:?} ({}x{}) at {} rank(s) into {:?}",
        config.image_path,
        height,
        width,
        config.ranks.len(),
        config.output_folder
    );

    if config.ranks.is_empty() {
        return Ok(Vec::new());
    }
    let source = image.mapv(f64::from);
    let svd = compact_svd(source.view())?;
    debug!("Decomposed source once; {} singular values available", svd.s.len());
    let process = |rank: usize| process_rank(config, &source, &svd, rank, codec, display);

    if config.parallel {
        let mut seen = HashSet::new();
        if config.ranks.iter().all(|rank| seen.insert(*rank)) {
            let results: Vec<Result<PathBuf>> = config.ranks.par_iter().map(|&rank| process(rank)).collect();
            return results.into_iter().collect();
        }
        warn!("Duplicate ranks requested; processing sequentially so each output path has one writer");
    }
    config.ranks.iter().map(|&rank| process(rank)).collect()
}

fn process_rank(
    config: &BatchReconstructConfig,
    source: &Array2<f64>,
    svd: &SVDOutput<f64>,
    rank: usize,
    codec: &dyn ImageCodec,
    display: &dyn ImageDisplay,
) -> Result<PathBuf> {
    let (height, width) = source.dim();
    check_rank(rank, height.min(width))?;
    let approx = truncated_product(svd, rank);
    let error = mean_squared_error(source.view(), approx.view())?;
    debug!("Rank {} reconstruction mean squared error: {:.4}", rank, error);
    let reconstructed = approx.mapv(to_intensity);

    let output_path = config.output_path_for_rank(rank);
    let io_failure = |source: ThreadSafeStdError| DimRedError::IoFailure {
        rank: Some(rank),
        path: output_path.clone(),
        source,
    };
    codec.save_grayscale(&reconstructed, &output_path).map_err(io_failure)?;

    if config.show_plots {
        let title = format!("Reconstructed Image with {} Singular Values", rank);
        display.show(&reconstructed, &title).map_err(io_failure)?;
    }
    Ok(output_path)
}

/// Runs [`batch_reconstruct`] with the `image` crate codec and the logging display.
///
/// Files are written as `reconstructed_svd_<rank>.jpg`.
pub fn apply_svd(
    image_path: impl AsRef<Path>,
    output_folder: impl AsRef<Path>,
    ranks: &[usize],
    show_plots: bool,
) -> Result<Vec<PathBuf>> {
    let mut config = BatchReconstructConfig::new(
        image_path.as_ref(),
        output_folder.as_ref(),
        ranks.to_vec(),
    );
    config.show_plots = show_plots;
    batch_reconstruct(&config, &ImageCrateCodec, &LogDisplay)
}
