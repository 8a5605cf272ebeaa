use ndarray::Array2;
use svd_reduce::{PcaSolver, PCA};

fn main() {
    env_logger::init();

    // Six samples along a noisy line in three dimensions.
    let data = Array2::from_shape_vec(
        (6, 3),
        vec![
            1.0, 2.1, 2.9, //
            2.0, 3.9, 6.1, //
            3.0, 6.0, 9.0, //
            4.0, 8.1, 11.8, //
            5.0, 9.9, 15.2, //
            6.0, 12.0, 18.0,
        ],
    )
    .unwrap();

    let mut pca = PCA::new(2, PcaSolver::Svd).expect("invalid PCA configuration");
    let projected = pca.fit_transform(data).expect("PCA fit failed");

    println!("Projected shape: {:?}", projected.dim());
    println!("Projected data:\n{:.4}", projected);
    println!(
        "Singular-value variance ratio: {:.4}",
        pca.singular_value_variance_ratio().unwrap()
    );
    println!(
        "Component-matrix variance ratio:\n{:.4}",
        pca.explained_variance_ratio().unwrap()
    );
}
