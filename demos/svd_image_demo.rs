//! Usage: svd_image_demo <image> <output-folder> [rank ...]
//!
//! Ranks default to 10 20 50 100. Set RUST_LOG=info to see each reconstruction.

use std::env;
use std::process::ExitCode;
use svd_reduce::{apply_svd, parse_rank};

const DEFAULT_RANKS: [usize; 4] = [10, 20, 50, 100];

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: svd_image_demo <image> <output-folder> [rank ...]");
        return ExitCode::from(2);
    }

    let ranks = if args.len() > 2 {
        match args[2..].iter().map(|arg| parse_rank(arg)).collect::<Result<Vec<_>, _>>() {
            Ok(ranks) => ranks,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::from(2);
            }
        }
    } else {
        DEFAULT_RANKS.to_vec()
    };

    match apply_svd(&args[0], &args[1], &ranks, true) {
        Ok(written) => {
            for path in written {
                println!("{}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
