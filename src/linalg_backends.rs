// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use std::marker::PhantomData;

use crate::error::ThreadSafeStdError;

/// Dispatches dense decompositions to the backend selected by cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

/// Output of a Singular Value Decomposition `M = U * diag(S) * VT`.
///
/// For an `m x n` input with `k = min(m, n)`:
/// * full: `u` is `m x m`, `vt` is `n x n`
/// * compact: `u` is `m x k`, `vt` is `k x n`
///
/// `s` always has length `k` and is sorted in descending order.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Array2<F>,
    pub s: Array1<F>,
    pub vt: Array2<F>,
}

/// Trait for dense Singular Value Decomposition.
///
/// Implementations must return singular values in descending order together with
/// orthonormal singular vectors.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd_into(&self, matrix: Array2<F>, full_matrices: bool) -> Result<SVDOutput<F>, ThreadSafeStdError>;
}

// --- NdarrayLinAlgBackend (LAPACK through ndarray-linalg) ---
use ndarray_linalg::{JobSvd, SVDDCInto};

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_dyn_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

impl BackendSVD<f64> for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, full_matrices: bool) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        if matrix.is_empty() {
            return Ok(empty_svd_output(nrows, ncols, full_matrices));
        }
        let job = if full_matrices { JobSvd::All } else { JobSvd::Some };
        let (u, s, vt) = matrix.svddc_into(job).map_err(to_dyn_error)?;
        let u = u.ok_or("LAPACK did not return left singular vectors")?;
        let vt = vt.ok_or("LAPACK did not return right singular vectors")?;
        Ok(SVDOutput { u, s, vt })
    }
}

fn empty_svd_output(nrows: usize, ncols: usize, full_matrices: bool) -> SVDOutput<f64> {
    let k = nrows.min(ncols);
    let (u_cols, vt_rows) = if full_matrices { (nrows, ncols) } else { (k, k) };
    SVDOutput {
        u: Array2::eye(nrows).slice_move(ndarray::s![.., ..u_cols]),
        s: Array1::zeros(k),
        vt: Array2::eye(ncols).slice_move(ndarray::s![..vt_rows, ..]),
    }
}

// --- FaerLinAlgBackend ---
#[cfg(feature = "backend_faer")]
mod faer_specific_code {
    use super::{empty_svd_output, BackendSVD, SVDOutput};
    use crate::error::ThreadSafeStdError;
    use bytemuck::Pod;
    use faer::linalg::solvers::Svd as FaerSolverSvd;
    use faer::traits::num_traits::Zero;
    use faer::traits::ComplexField;
    use faer::MatRef;
    use ndarray::{Array1, Array2, ShapeBuilder};

    fn to_dyn_error_faer(msg: String) -> ThreadSafeStdError {
        Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
    }

    #[derive(Debug, Default, Copy, Clone)]
    pub struct FaerLinAlgBackend;

    fn faer_mat_to_ndarray<F: ComplexField + Copy + Pod + Zero>(faer_mat: MatRef<'_, F>) -> Array2<F> {
        let nrows = faer_mat.nrows();
        let ncols = faer_mat.ncols();
        if nrows == 0 || ncols == 0 {
            return Array2::zeros((nrows, ncols).f());
        }
        let mut data_vec = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data_vec.push(unsafe { *faer_mat.get_unchecked(i, j) });
            }
        }
        Array2::from_shape_vec((nrows, ncols).f(), data_vec)
            .expect("Shape and data length mismatch creating ndarray from faer Mat")
    }

    fn faer_col_to_ndarray_vec<F: ComplexField + Copy + Pod + Zero>(faer_col: faer::ColRef<'_, F>) -> Array1<F> {
        (0..faer_col.nrows())
            .map(|i| unsafe { *faer_col.get_unchecked(i) })
            .collect()
    }

    impl BackendSVD<f64> for FaerLinAlgBackend {
        fn svd_into(&self, matrix: Array2<f64>, full_matrices: bool) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
            let (nrows, ncols) = matrix.dim();
            if matrix.is_empty() {
                return Ok(empty_svd_output(nrows, ncols, full_matrices));
            }
            // faer views need contiguous memory; a row-major copy is made only when required.
            let matrix = matrix.as_standard_layout().into_owned();
            let slice = matrix.as_slice_memory_order().ok_or_else(|| {
                to_dyn_error_faer(format!(
                    "Failed to get slice from row-major ndarray matrix ({}x{})",
                    nrows, ncols
                ))
            })?;
            let faer_mat_ref = MatRef::from_row_major_slice(slice, nrows, ncols);

            let svd_solver_instance = if full_matrices {
                FaerSolverSvd::new(faer_mat_ref)
            } else {
                FaerSolverSvd::new_thin(faer_mat_ref)
            }
            .map_err(|e| to_dyn_error_faer(format!("Faer SVD computation failed: {:?}", e)))?;

            let s = faer_col_to_ndarray_vec(svd_solver_instance.S().column_vector());
            let u = faer_mat_to_ndarray(svd_solver_instance.U());
            let vt = faer_mat_to_ndarray(svd_solver_instance.V()).t().into_owned();

            Ok(SVDOutput { u, s, vt })
        }
    }
}

// --- LinAlgBackendProvider Dispatch ---

#[cfg(feature = "backend_faer")]
impl<F> BackendSVD<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendSVD<F>,
    faer_specific_code::FaerLinAlgBackend: BackendSVD<F>,
{
    fn svd_into(&self, matrix: Array2<F>, full_matrices: bool) -> Result<SVDOutput<F>, ThreadSafeStdError> {
        faer_specific_code::FaerLinAlgBackend.svd_into(matrix, full_matrices)
    }
}

#[cfg(not(feature = "backend_faer"))]
impl<F> BackendSVD<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendSVD<F>,
{
    fn svd_into(&self, matrix: Array2<F>, full_matrices: bool) -> Result<SVDOutput<F>, ThreadSafeStdError> {
        NdarrayLinAlgBackend.svd_into(matrix, full_matrices)
    }
}
