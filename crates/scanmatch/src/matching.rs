//! 3-DOF hill climb of a scan pose over the local evidence map.

use transforms::{angle_diff, laser_endpoint, Move2D};

use crate::evidence::{EvidenceMap, EPSILON};
use crate::MatchParams;

/// Gaussian density with a degenerate-sigma escape used by the motion
/// prior.
fn gaussian_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    if sigma < 1e-9 {
        if (x - mu).abs() < 1e-9 {
            return 1.0;
        }
        return 0.0;
    }
    (1.0 / (2.0 * std::f64::consts::PI * sigma * sigma).sqrt())
        * (-((x - mu) * (x - mu)) / (2.0 * sigma * sigma)).exp()
}

/// Log prior penalizing deviation of a candidate move from the odometry
/// move, componentwise Gaussian.
fn log_prior_between_moves(params: &MatchParams, candidate: Move2D, odometry: Move2D) -> f64 {
    let mut sum = 0.0;
    sum += (EPSILON
        + gaussian_pdf(
            (candidate.forward - odometry.forward).abs(),
            0.0,
            params.motion_model_forward,
        ))
    .ln();
    sum += (EPSILON
        + gaussian_pdf(
            (candidate.sideward - odometry.sideward).abs(),
            0.0,
            params.motion_model_sideward,
        ))
    .ln();
    sum += (EPSILON
        + gaussian_pdf(
            angle_diff(candidate.rotation, odometry.rotation).abs(),
            0.0,
            params.motion_model_rotation,
        ))
    .ln();
    sum
}

/// Log likelihood of the scan when displaced by `candidate` from the map
/// center, plus the motion prior against `odometry`.
pub(crate) fn score_move(
    params: &MatchParams,
    map: &EvidenceMap,
    ranges: &[f64],
    angles: &[f64],
    candidate: Move2D,
    odometry: Move2D,
) -> f64 {
    let pose = candidate.origin_pose();
    let mut score = 0.0;
    for (&range, &angle) in ranges.iter().zip(angles) {
        if range < params.local_map_max_range {
            let (x, y) = laser_endpoint(&pose, range, angle);
            let (cx, cy) = map.cell_of(x, y);
            score += map.value_at(cx, cy).ln();
        } else {
            score += params.local_map_std_val.ln();
        }
    }
    if params.local_map_use_odometry {
        score += log_prior_between_moves(params, candidate, odometry);
    }
    score
}

/// One of the six axis moves around `base`, with the step scaled by
/// `1 / 2^level`.
fn test_move(params: &MatchParams, base: Move2D, which: usize, level: u32) -> Move2D {
    let div = 2f64.powi(level as i32);
    let mut mv = base;
    match which {
        0 => mv.rotation += params.pos_corr_step_size_rotation / div,
        1 => mv.rotation -= params.pos_corr_step_size_rotation / div,
        2 => mv.sideward += params.pos_corr_step_size_sideward / div,
        3 => mv.sideward -= params.pos_corr_step_size_sideward / div,
        4 => mv.forward += params.pos_corr_step_size_forward / div,
        5 => mv.forward -= params.pos_corr_step_size_forward / div,
        _ => {}
    }
    mv
}

/// Hill climb: accept strictly improving neighbors; when the neighborhood
/// is exhausted, halve the step and retry, up to the configured number of
/// refinement levels.
pub(crate) fn fit_scan(
    params: &MatchParams,
    map: &EvidenceMap,
    ranges: &[f64],
    angles: &[f64],
    odometry_move: Move2D,
) -> Move2D {
    let mut best = odometry_move;
    let mut best_score = f64::NEG_INFINITY;
    let mut level = 0u32;

    loop {
        let mut candidate = best;
        let mut candidate_score = best_score;
        for which in 0..6 {
            let mv = test_move(params, best, which, level);
            let score = score_move(params, map, ranges, angles, mv, odometry_move);
            if score > candidate_score {
                candidate = mv;
                candidate_score = score;
            }
        }

        if candidate_score - best_score > EPSILON {
            best = candidate;
            best_score = candidate_score;
        } else if (level as usize) < params.pos_corr_step_size_loop {
            level += 1;
        } else {
            break;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::gauss_kernel;

    fn flat_wall_scan(offset: f64) -> (Vec<f64>, Vec<f64>) {
        // Beams fanning +/-45 degrees at a wall x = 3.0 + offset meters
        // ahead of the robot.
        let mut ranges = Vec::new();
        let mut angles = Vec::new();
        for i in -45..=45 {
            let angle = (i as f64).to_radians();
            angles.push(angle);
            ranges.push((3.0 + offset) / angle.cos());
        }
        (ranges, angles)
    }

    fn build_map(params: &MatchParams, ranges: &[f64], angles: &[f64]) -> EvidenceMap {
        let mut map = EvidenceMap::new(
            params.local_map_max_range,
            params.local_map_resolution,
            params.local_map_std_val,
        );
        let origin = types::Pose::default();
        for (&r, &a) in ranges.iter().zip(angles) {
            if r < params.local_map_max_range {
                let (x, y) = laser_endpoint(&origin, r, a);
                let (cx, cy) = map.cell_of(x, y);
                map.add_endpoint(cx, cy);
            }
        }
        map.convolve(
            &gauss_kernel(params.local_map_kernel_len),
            params.local_map_num_convolve,
        );
        map
    }

    #[test]
    fn test_zero_move_scores_best_for_identical_scan() {
        let params = MatchParams::default();
        let (ranges, angles) = flat_wall_scan(0.0);
        let map = build_map(&params, &ranges, &angles);

        let zero = score_move(&params, &map, &ranges, &angles, Move2D::ZERO, Move2D::ZERO);
        let shifted = score_move(
            &params,
            &map,
            &ranges,
            &angles,
            Move2D::new(0.4, 0.0, 0.0),
            Move2D::ZERO,
        );
        assert!(zero > shifted);
    }

    #[test]
    fn test_fit_recovers_forward_shift() {
        let mut params = MatchParams::default();
        params.local_map_use_odometry = false;
        let (ranges, angles) = flat_wall_scan(0.0);
        let map = build_map(&params, &ranges, &angles);

        // The new scan sees the wall 0.15 m closer: the robot actually
        // moved forward 0.15 m. Seed the search at zero.
        let (new_ranges, new_angles) = flat_wall_scan(-0.15);
        let best = fit_scan(&params, &map, &new_ranges, &new_angles, Move2D::ZERO);
        assert!((best.forward - 0.15).abs() < 0.08, "forward={}", best.forward);
        assert!(best.sideward.abs() < 0.08);
    }

    #[test]
    fn test_fit_stays_put_when_aligned() {
        let params = MatchParams::default();
        let (ranges, angles) = flat_wall_scan(0.0);
        let map = build_map(&params, &ranges, &angles);
        let best = fit_scan(&params, &map, &ranges, &angles, Move2D::ZERO);
        assert!(best.forward.abs() < 0.05);
        assert!(best.sideward.abs() < 0.05);
        assert!(best.rotation.abs() < 0.05);
    }

    #[test]
    fn test_gaussian_pdf_degenerate_sigma() {
        assert_eq!(gaussian_pdf(0.0, 0.0, 0.0), 1.0);
        assert_eq!(gaussian_pdf(0.5, 0.0, 0.0), 0.0);
        assert!(gaussian_pdf(0.0, 0.0, 1.0) > gaussian_pdf(1.0, 0.0, 1.0));
    }
}
