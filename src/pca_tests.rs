use crate::error::DimRedError;
use crate::pca::{PcaSolver, SharedPca, PCA};

use approx::assert_abs_diff_eq;
use float_cmp::assert_approx_eq;
use ndarray::{array, s, Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const TOLERANCE: f64 = 1e-9;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::random_using((n_samples, n_features), Uniform::new(-5.0, 5.0), &mut rng)
}

fn assert_rows_orthonormal(matrix: &Array2<f64>) {
    let gram = matrix.dot(&matrix.t());
    for i in 0..gram.nrows() {
        for j in 0..gram.ncols() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!(
                (gram[[i, j]] - expected).abs() < 1e-10,
                "gram[{}, {}] = {} (expected {})",
                i,
                j,
                gram[[i, j]],
                expected
            );
        }
    }
}

fn fitted(n_components: usize, data: &Array2<f64>) -> PCA {
    let mut pca = PCA::new(n_components, PcaSolver::Svd).unwrap();
    pca.fit(data.clone()).unwrap();
    pca
}

#[cfg(test)]
mod construction_tests {
    use super::*;

    #[test]
    fn zero_components_is_invalid() {
        assert!(matches!(
            PCA::new(0, PcaSolver::Svd),
            Err(DimRedError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn solver_tag_parsing() {
        let pca = PCA::with_solver_tag(3, "svd").unwrap();
        assert_eq!(pca.solver(), PcaSolver::Svd);
        assert_eq!(pca.n_components(), 3);
        assert!(PCA::with_solver_tag(3, " SVD ").is_ok());
        assert!(matches!(
            PCA::with_solver_tag(3, "randomized"),
            Err(DimRedError::InvalidConfiguration(_))
        ));
        assert_eq!(PcaSolver::Svd.to_string(), "svd");
    }

    #[test]
    fn new_model_is_unfitted() {
        let pca = PCA::new(2, PcaSolver::default()).unwrap();
        assert!(!pca.is_fitted());
        assert!(pca.mean().is_none());
        assert!(pca.components().is_none());
        assert!(pca.singular_values().is_none());
    }
}

#[cfg(test)]
mod fit_tests {
    use super::*;

    #[test]
    fn empty_dataset_is_rejected() {
        let mut pca = PCA::new(1, PcaSolver::Svd).unwrap();
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(pca.fit(empty), Err(DimRedError::EmptyDataset)));
    }

    #[test]
    fn too_many_components_is_a_dimension_mismatch() {
        let mut pca = PCA::new(4, PcaSolver::Svd).unwrap();
        let data = generate_random_data(10, 3, 1);
        assert!(matches!(
            pca.fit(data),
            Err(DimRedError::DimensionMismatch { expected: 4, actual: 3, .. })
        ));
        assert!(!pca.is_fitted());
    }

    #[test]
    fn mean_and_component_shapes() {
        let data = generate_random_data(20, 6, 2);
        let pca = fitted(2, &data);

        let expected_mean = data.mean_axis(Axis(0)).unwrap();
        let mean = pca.mean().unwrap();
        for (a, b) in mean.iter().zip(expected_mean.iter()) {
            assert_approx_eq!(f64, *a, *b, epsilon = TOLERANCE);
        }
        assert_eq!(pca.components().unwrap().dim(), (6, 6));
        assert_eq!(pca.singular_values().unwrap().len(), 6);
    }

    #[test]
    fn components_are_orthonormal() {
        for (n_samples, n_features, seed) in [(30, 5, 3), (7, 7, 4), (4, 9, 5)] {
            let data = generate_random_data(n_samples, n_features, seed);
            let pca = fitted(1, &data);
            let components = pca.components().unwrap();
            assert_eq!(components.dim(), (n_features, n_features));
            assert_rows_orthonormal(components);
        }
    }

    #[test]
    fn tall_data_yields_square_orthonormal_components() {
        let data = generate_random_data(6000, 4, 40);
        let mut pca = PCA::new(4, PcaSolver::Svd).unwrap();
        let projected = pca.fit_transform(data.clone()).unwrap();

        let components = pca.components().unwrap();
        assert_eq!(components.dim(), (4, 4));
        assert_rows_orthonormal(components);
        assert_eq!(pca.singular_values().unwrap().len(), 4);

        let restored = pca.inverse_transform(projected).unwrap();
        for (a, b) in restored.iter().zip(data.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn wide_data_still_yields_all_feature_axes() {
        let data = generate_random_data(3, 8, 41);
        let pca = fitted(8, &data);
        let components = pca.components().unwrap();
        assert_eq!(components.dim(), (8, 8));
        assert_rows_orthonormal(components);
        assert_eq!(pca.transform(data).unwrap().dim(), (3, 8));
    }

    #[test]
    fn single_sample_is_accepted() {
        let data = array![[1.0, 2.0, 3.0]];
        let pca = fitted(2, &data);
        let projected = pca.transform(data).unwrap();
        for v in projected.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = TOLERANCE);
        }
    }

    #[test]
    fn dominant_direction_of_known_data() {
        let data = array![
            [2.5, 2.4],
            [0.5, 0.7],
            [2.2, 2.9],
            [1.9, 2.2],
            [3.1, 3.0],
            [2.3, 2.7],
            [2.0, 1.6],
            [1.0, 1.1],
            [1.5, 1.6],
            [1.1, 0.9]
        ];
        let pca = fitted(1, &data);
        let first = pca.components().unwrap().row(0).to_owned();
        // Sign of a singular vector is arbitrary.
        let sign = first[0].signum();
        assert_abs_diff_eq!(sign * first[0], 0.677873, epsilon = 1e-5);
        assert_abs_diff_eq!(sign * first[1], 0.735179, epsilon = 1e-5);

        let ratio = pca.singular_value_variance_ratio().unwrap();
        assert_abs_diff_eq!(ratio[0], 0.963181, epsilon = 1e-5);
    }

    #[test]
    fn refit_replaces_the_model_and_failed_fit_keeps_it() {
        let mut pca = PCA::new(2, PcaSolver::Svd).unwrap();
        pca.fit(generate_random_data(10, 3, 6)).unwrap();
        let first_mean = pca.mean().unwrap().clone();

        let shifted = generate_random_data(10, 4, 7) + 100.0;
        pca.fit(shifted).unwrap();
        assert_eq!(pca.mean().unwrap().len(), 4);
        assert!(pca.mean().unwrap()[0] > 90.0);
        assert_ne!(pca.mean().unwrap().len(), first_mean.len());

        let before = pca.components().unwrap().clone();
        assert!(pca.fit(Array2::zeros((0, 4))).is_err());
        assert_eq!(pca.components().unwrap(), &before);
    }
}

#[cfg(test)]
mod transform_tests {
    use super::*;

    #[test]
    fn transform_before_fit_is_not_fitted() {
        let pca = PCA::new(1, PcaSolver::Svd).unwrap();
        assert!(matches!(
            pca.transform(array![[1.0, 2.0]]),
            Err(DimRedError::NotFitted)
        ));
        assert!(matches!(
            pca.inverse_transform(array![[1.0]]),
            Err(DimRedError::NotFitted)
        ));
    }

    #[test]
    fn transform_with_wrong_width_is_rejected() {
        let pca = fitted(2, &generate_random_data(12, 4, 8));
        assert!(matches!(
            pca.transform(Array2::zeros((3, 5))),
            Err(DimRedError::DimensionMismatch { expected: 4, actual: 5, .. })
        ));
        assert!(matches!(
            pca.inverse_transform(Array2::zeros((3, 3))),
            Err(DimRedError::DimensionMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn transform_shape_and_empty_input() {
        let data = generate_random_data(15, 5, 9);
        let pca = fitted(3, &data);
        assert_eq!(pca.transform(data).unwrap().dim(), (15, 3));
        assert_eq!(pca.transform(Array2::zeros((0, 5))).unwrap().dim(), (0, 3));
    }

    #[test]
    fn projection_matches_manual_computation() {
        let data = generate_random_data(9, 4, 10);
        let pca = fitted(2, &data);
        let rows = generate_random_data(3, 4, 11);

        let centered = &rows - pca.mean().unwrap();
        let expected = centered.dot(&pca.components().unwrap().slice(s![..2, ..]).t());
        let projected = pca.transform(rows).unwrap();
        for (a, b) in projected.iter().zip(expected.iter()) {
            assert_approx_eq!(f64, *a, *b, epsilon = TOLERANCE);
        }
    }

    #[test]
    fn full_rank_round_trip_reconstructs_data() {
        let data = generate_random_data(12, 5, 12);
        let pca = fitted(5, &data);
        let coords = pca.transform(data.clone()).unwrap();

        let manual = coords.dot(pca.components().unwrap()) + pca.mean().unwrap();
        let restored = pca.inverse_transform(coords).unwrap();
        for ((a, b), c) in restored.iter().zip(manual.iter()).zip(data.iter()) {
            assert_abs_diff_eq!(*a, *c, epsilon = 1e-9);
            assert_abs_diff_eq!(*b, *c, epsilon = 1e-9);
        }
    }

    #[test]
    fn fit_transform_equals_fit_then_transform() {
        let data = generate_random_data(10, 3, 13);
        let mut pca = PCA::new(2, PcaSolver::Svd).unwrap();
        let combined = pca.fit_transform(data.clone()).unwrap();
        let separate = pca.transform(data).unwrap();
        assert_eq!(combined, separate);
    }

    #[test]
    fn noisy_line_variance_is_captured_by_one_axis() {
        let direction = array![1.0, 2.0] / 5.0_f64.sqrt();
        let normal = array![-2.0, 1.0] / 5.0_f64.sqrt();
        let positions = [-3.0, -1.0, 1.0, 3.0];
        let noise = [1e-7, -1e-7, -1e-7, 1e-7];
        let mut data = Array2::<f64>::zeros((4, 2));
        for (i, (&t, &e)) in positions.iter().zip(noise.iter()).enumerate() {
            let point = &direction * t + &normal * e + array![5.0, -2.0];
            data.row_mut(i).assign(&point);
        }

        let pca = fitted(1, &data);
        let coords = pca.transform(data.clone()).unwrap();

        let n = data.nrows() as f64;
        let axis_variance = coords.column(0).mapv(|v| v * v).sum() / n;
        let centered = &data - &data.mean_axis(Axis(0)).unwrap();
        let total_variance = centered.mapv(|v| v * v).sum() / n;
        assert_abs_diff_eq!(axis_variance, total_variance, epsilon = 1e-9);

        let axis: Array1<f64> = pca.components().unwrap().row(0).to_owned();
        assert_abs_diff_eq!(axis.dot(&direction).abs(), 1.0, epsilon = 1e-9);
    }
}

#[cfg(test)]
mod variance_ratio_tests {
    use super::*;

    #[test]
    fn queries_before_fit_are_not_fitted() {
        let pca = PCA::new(1, PcaSolver::Svd).unwrap();
        assert!(matches!(pca.explained_variance_ratio(), Err(DimRedError::NotFitted)));
        assert!(matches!(pca.singular_value_variance_ratio(), Err(DimRedError::NotFitted)));
    }

    #[test]
    fn component_ratio_columns_sum_to_one_before_slicing() {
        let data = generate_random_data(25, 4, 14);
        let full = fitted(4, &data).explained_variance_ratio().unwrap();
        assert_eq!(full.dim(), (4, 4));
        for column_sum in full.sum_axis(Axis(0)).iter() {
            assert_approx_eq!(f64, *column_sum, 1.0, epsilon = 1e-12);
        }

        let sliced = fitted(2, &data).explained_variance_ratio().unwrap();
        assert_eq!(sliced.dim(), (2, 4));
        assert!(sliced.iter().all(|&v| (0.0..=1.0 + 1e-12).contains(&v)));
        assert_eq!(sliced, full.slice(s![..2, ..]));
    }

    #[test]
    fn component_ratio_matches_squared_entries() {
        let data = generate_random_data(8, 3, 15);
        let pca = fitted(3, &data);
        let components = pca.components().unwrap();
        let ratio = pca.explained_variance_ratio().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let column_sum: f64 = components.column(j).mapv(|v| v * v).sum();
                let expected = components[[i, j]].powi(2) / column_sum;
                assert_approx_eq!(f64, ratio[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn singular_value_ratio_is_descending_and_sums_to_one() {
        let data = generate_random_data(40, 5, 16);
        let ratio = fitted(5, &data).singular_value_variance_ratio().unwrap();
        assert_eq!(ratio.len(), 5);
        assert_approx_eq!(f64, ratio.sum(), 1.0, epsilon = 1e-12);
        for pair in ratio.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn singular_value_ratio_pads_missing_components_with_zero() {
        let data = generate_random_data(3, 6, 17);
        let ratio = fitted(6, &data).singular_value_variance_ratio().unwrap();
        assert_eq!(ratio.len(), 6);
        assert_abs_diff_eq!(ratio.slice(s![..3]).sum(), 1.0, epsilon = 1e-12);
        assert_eq!(ratio.slice(s![3..]).to_vec(), vec![0.0; 3]);
    }

    #[test]
    fn constant_data_has_zero_singular_value_ratio() {
        let data = Array2::from_elem((5, 3), 4.2);
        let ratio = fitted(2, &data).singular_value_variance_ratio().unwrap();
        assert_eq!(ratio.to_vec(), vec![0.0, 0.0]);
    }
}

#[cfg(test)]
mod persistence_tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn save_and_load_round_trip() {
        let data = generate_random_data(14, 4, 18);
        let pca = fitted(3, &data);
        let file = NamedTempFile::new().unwrap();
        pca.save_model(file.path()).unwrap();

        let loaded = PCA::load_model(file.path()).unwrap();
        assert_eq!(loaded.n_components(), 3);
        assert_eq!(loaded.solver(), PcaSolver::Svd);
        assert_eq!(loaded.mean(), pca.mean());
        assert_eq!(loaded.components(), pca.components());
        assert_eq!(
            loaded.transform(data.clone()).unwrap(),
            pca.transform(data).unwrap()
        );
    }

    #[test]
    fn saving_unfitted_model_fails() {
        let pca = PCA::new(1, PcaSolver::Svd).unwrap();
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(pca.save_model(file.path()), Err(DimRedError::NotFitted)));
    }

    #[test]
    fn loading_garbage_fails() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a model").unwrap();
        file.flush().unwrap();
        assert!(PCA::load_model(file.path()).is_err());
    }

    #[test]
    fn loading_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PCA::load_model(dir.path().join("missing.bin")),
            Err(DimRedError::Io(_))
        ));
    }
}

#[cfg(test)]
mod shared_model_tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fit_in_one_thread_is_visible_in_another() {
        let shared = Arc::new(SharedPca::new(2, PcaSolver::Svd).unwrap());
        assert!(matches!(
            shared.transform(Array2::zeros((1, 3))),
            Err(DimRedError::NotFitted)
        ));

        let data = generate_random_data(10, 3, 19);
        let writer = {
            let shared = Arc::clone(&shared);
            let data = data.clone();
            thread::spawn(move || shared.fit(data))
        };
        writer.join().unwrap().unwrap();

        let reader = {
            let shared = Arc::clone(&shared);
            let data = data.clone();
            thread::spawn(move || shared.transform(data))
        };
        let projected = reader.join().unwrap().unwrap();
        assert_eq!(projected, fitted(2, &data).transform(data).unwrap());
        assert_eq!(shared.explained_variance_ratio().unwrap().dim(), (2, 3));
    }

    #[test]
    fn snapshot_survives_refit() {
        let shared = SharedPca::new(1, PcaSolver::Svd).unwrap();
        shared.fit(generate_random_data(6, 2, 20)).unwrap();
        let old = shared.snapshot();
        shared.fit(generate_random_data(6, 5, 21)).unwrap();
        assert_eq!(old.mean().unwrap().len(), 2);
        assert_eq!(shared.snapshot().mean().unwrap().len(), 5);
    }

    #[test]
    fn failed_fit_keeps_published_model() {
        let shared = SharedPca::new(2, PcaSolver::Svd).unwrap();
        shared.fit(generate_random_data(6, 3, 22)).unwrap();
        assert!(shared.fit(generate_random_data(6, 1, 23)).is_err());
        assert_eq!(shared.snapshot().mean().unwrap().len(), 3);
    }
}
