//! Force-directed layout (Fruchterman-Reingold)
//!
//! Every node repels every other node, connected nodes attract, and the
//! per-step displacement cap ("temperature") cools linearly to zero over the
//! iteration budget. Output is centered on the origin and scaled so the
//! largest absolute coordinate is 1.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use refnet_common::config::GraphConfig;
use std::collections::HashSet;

const MIN_DISTANCE: f64 = 0.01;
const INITIAL_TEMPERATURE: f64 = 0.1;

/// Layout tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub iterations: usize,
    /// Optimal distance between nodes
    pub k: f64,
    pub seed: u64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            iterations: 50,
            k: 3.0,
            seed: 42,
        }
    }
}

impl From<&GraphConfig> for LayoutParams {
    fn from(config: &GraphConfig) -> Self {
        Self {
            iterations: config.layout_iterations,
            k: config.layout_k,
            seed: config.layout_seed,
        }
    }
}

/// Compute positions for `node_count` nodes joined by `edges` (index pairs)
///
/// Edge direction is ignored. Same input and seed give the same output.
pub fn spring_layout(node_count: usize, edges: &[(usize, usize)], params: &LayoutParams) -> Vec<(f64, f64)> {
    match node_count {
        0 => return Vec::new(),
        1 => return vec![(0.0, 0.0)],
        _ => {}
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut pos: Vec<[f64; 2]> = (0..node_count).map(|_| [rng.gen::<f64>(), rng.gen::<f64>()]).collect();

    let mut adjacent: Vec<HashSet<usize>> = vec![HashSet::new(); node_count];
    for &(a, b) in edges {
        if a < node_count && b < node_count && a != b {
            adjacent[a].insert(b);
            adjacent[b].insert(a);
        }
    }

    let k = if params.k > 0.0 { params.k } else { (1.0 / node_count as f64).sqrt() };
    let mut temperature = INITIAL_TEMPERATURE;
    let cooling = temperature / (params.iterations as f64 + 1.0);
    let mut displacement = vec![[0.0f64; 2]; node_count];

    for _ in 0..params.iterations {
        for (i, disp) in displacement.iter_mut().enumerate() {
            *disp = [0.0, 0.0];
            for j in 0..node_count {
                if i == j {
                    continue;
                }
                let dx = pos[i][0] - pos[j][0];
                let dy = pos[i][1] - pos[j][1];
                let distance = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);

                let attraction = if adjacent[i].contains(&j) { distance / k } else { 0.0 };
                let force = k * k / (distance * distance) - attraction;
                disp[0] += dx * force;
                disp[1] += dy * force;
            }
        }

        for (p, disp) in pos.iter_mut().zip(&displacement) {
            let length = (disp[0] * disp[0] + disp[1] * disp[1]).sqrt().max(MIN_DISTANCE);
            p[0] += disp[0] * temperature / length;
            p[1] += disp[1] * temperature / length;
        }
        temperature -= cooling;
    }

    rescale(&mut pos);
    pos.into_iter().map(|[x, y]| (x, y)).collect()
}

/// Center on the origin, scale max |coordinate| to 1
fn rescale(pos: &mut [[f64; 2]]) {
    let n = pos.len() as f64;
    let mean_x = pos.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y = pos.iter().map(|p| p[1]).sum::<f64>() / n;

    let mut limit = 0.0f64;
    for p in pos.iter_mut() {
        p[0] -= mean_x;
        p[1] -= mean_y;
        limit = limit.max(p[0].abs()).max(p[1].abs());
    }

    if limit > 0.0 {
        for p in pos.iter_mut() {
            p[0] /= limit;
            p[1] /= limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs(pos: &[(f64, f64)]) -> f64 {
        pos.iter().fold(0.0f64, |m, (x, y)| m.max(x.abs()).max(y.abs()))
    }

    #[test]
    fn test_trivial_graphs() {
        let params = LayoutParams::default();
        assert!(spring_layout(0, &[], &params).is_empty());
        assert_eq!(spring_layout(1, &[], &params), vec![(0.0, 0.0)]);
    }

    #[test]
    fn test_output_is_centered_and_scaled() {
        let edges = [(0, 1), (1, 2), (2, 3), (3, 0), (0, 4)];
        let pos = spring_layout(6, &edges, &LayoutParams::default());
        assert_eq!(pos.len(), 6);

        let (sx, sy) = pos.iter().fold((0.0f64, 0.0f64), |(ax, ay), (x, y)| (ax + x, ay + y));
        assert!(sx.abs() < 1e-9 && sy.abs() < 1e-9);
        assert!((max_abs(&pos) - 1.0).abs() < 1e-9);
        assert!(pos.iter().all(|(x, y)| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn test_edges_are_undirected_and_sanitized() {
        let params = LayoutParams::default();
        let expected = spring_layout(3, &[(0, 1)], &params);
        // Reversed duplicate, self-loop and out-of-range edges change nothing
        let noisy = spring_layout(3, &[(0, 1), (1, 0), (2, 2), (1, 7)], &params);
        assert_eq!(noisy, expected);
    }

    #[test]
    fn test_seeded_layout_is_reproducible() {
        let edges = [(0, 1), (1, 2)];
        let params = LayoutParams::default();
        assert_eq!(spring_layout(3, &edges, &params), spring_layout(3, &edges, &params));

        let other = LayoutParams { seed: 7, ..params };
        assert_ne!(spring_layout(3, &edges, &params), spring_layout(3, &edges, &other));
    }
}
