//! Randomized checks of the Voronoi adjacency and the neighbor-walk
//! assignment against brute force.

use lensrecon::pixelization::assignment::{
    assign_exhaustive, assign_via_sparse_pairs, walk_to_nearest,
};
use lensrecon::pixelization::voronoi::voronoi_adjacency;
use lensrecon::{AssignmentStrategy, Coordinate, KMeansConfig, Pixelization, SourcePlane, SparseSourcePlane};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rand_distr::{Distribution, Normal};

fn uniform_points(rng: &mut StdRng, n: usize, half_width: f64) -> Vec<Coordinate> {
    (0..n)
        .map(|_| {
            Coordinate::new(
                (rng.random::<f64>() * 2.0 - 1.0) * half_width,
                (rng.random::<f64>() * 2.0 - 1.0) * half_width,
            )
        })
        .collect()
}

/// From any starting cell, the greedy walk over Delaunay neighbors ends at the
/// exhaustive nearest cell.
#[test]
fn test_walk_from_any_start_finds_nearest() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let mut rng = StdRng::seed_from_u64(42);

    for trial in 0..50 {
        let n_centers = 3 + (rng.random::<f64>() * 60.0) as usize;
        let centers = uniform_points(&mut rng, n_centers, 1.0 + trial as f64);
        let adjacency = voronoi_adjacency(&centers).expect("random centers tessellate");
        assert!(adjacency.is_connected(), "trial {}: graph not connected", trial);

        let queries = uniform_points(&mut rng, 200, 1.5 + trial as f64);
        let expected = assign_exhaustive(&queries, &centers).unwrap();
        for (i, (q, &nearest)) in queries.iter().zip(&expected).enumerate() {
            let start = (rng.random::<f64>() * n_centers as f64) as usize % n_centers;
            let found = walk_to_nearest(i, q, &centers, &adjacency, start).unwrap();
            let d_found = q.squared_distance(&centers[found]);
            let d_best = q.squared_distance(&centers[nearest]);
            assert!(
                d_found <= d_best,
                "trial {} query {}: walk from {} stopped at {} (d² {}) but {} is closer (d² {})",
                trial,
                i,
                start,
                found,
                d_found,
                nearest,
                d_best
            );
        }
    }
}

/// Sparse-pair assignment equals exhaustive assignment on clustered
/// sub-pixels with a sparse sample per pixel.
#[test]
fn test_sparse_pairs_match_exhaustive() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let mut rng = StdRng::seed_from_u64(7);
    let jitter = Normal::new(0.0, 0.02).unwrap();

    for trial in 0..20 {
        let pixels = 40 + trial * 5;
        let sub_grid = 1 + trial % 3;
        let per_pixel = sub_grid * sub_grid;

        // Each pixel's sub-pixels scatter around a random pixel position.
        let pixel_centers = uniform_points(&mut rng, pixels, 1.0);
        let mut coords = Vec::with_capacity(pixels * per_pixel);
        for p in &pixel_centers {
            for _ in 0..per_pixel {
                coords.push(Coordinate::new(
                    p.x + jitter.sample(&mut rng),
                    p.y + jitter.sample(&mut rng),
                ));
            }
        }

        let cell_count = 5 + trial;
        let pix = Pixelization::build(&coords, cell_count, None, &KMeansConfig::default())
            .expect("pixelization builds");
        let sparse = SparseSourcePlane::from_sub_grid(SourcePlane::new(coords.clone()), sub_grid)
            .unwrap();

        let exhaustive = assign_exhaustive(&coords, pix.centers()).unwrap();
        let sparse_to_cell = assign_exhaustive(sparse.sparse_coordinates(), pix.centers()).unwrap();
        let walked = assign_via_sparse_pairs(
            &coords,
            pix.centers(),
            pix.adjacency(),
            sparse.sub_to_sparse(),
            &sparse_to_cell,
        )
        .unwrap();
        assert_eq!(exhaustive, walked, "trial {}", trial);

        let via_pixelization = pix.assign(&sparse, AssignmentStrategy::SparsePairs).unwrap();
        assert_eq!(exhaustive, via_pixelization, "trial {}", trial);
    }
}

/// Adjacency is symmetric, loop-free and planar for random center sets.
#[test]
fn test_adjacency_is_planar_and_symmetric() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..30 {
        let n = 3 + (rng.random::<f64>() * 100.0) as usize;
        let centers = uniform_points(&mut rng, n, 10.0);
        let g = voronoi_adjacency(&centers).unwrap();
        assert!(g.pairs().len() <= 3 * n - 3);
        for &(i, j) in g.pairs() {
            assert!(i < j);
            assert!(g.neighbors(i).contains(&j));
            assert!(g.neighbors(j).contains(&i));
        }
        let total: usize = g.neighbor_counts().iter().sum();
        assert_eq!(total, 2 * g.pairs().len());
    }
}
