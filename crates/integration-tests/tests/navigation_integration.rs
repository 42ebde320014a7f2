//! End-to-end tests over the assembled navigation pipeline:
//! likelihood map → particle filter → summary, and cost map → value
//! iteration → waypoints → velocity commands.
//!
//! Run with: cargo test --test navigation_integration

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use gridmap::{GridConfig, LikelihoodMap, LikelihoodParams, OccupancyGrid};
use localize::{LocalizeParams, MotionModel, ParticleFilter, StandardMotionParams};
use planner::{Planner, PlannerConfig, RobotConfig, WaypointResult};
use scanmatch::{MatchParams, ScanMatcher};
use types::{LaserConfig, Pose, RobotLaser, TrajPoint};

mod common;

fn low_noise_motion() -> MotionModel {
    MotionModel::Standard(StandardMotionParams {
        std_dev_d_d: 0.01,
        std_dev_c_d: 0.01,
        std_dev_t_d: 0.01,
        std_dev_t_t: 0.01,
        ..Default::default()
    })
}

/// 5x5 unit grid, one occupied cell, Gaussian cloud, one odometry step and
/// one four-beam scan: the summary mean must track the odometry step.
#[test]
fn test_unit_grid_gaussian_step() {
    let config = GridConfig::new(5, 5, 1.0);
    let mut cells = vec![0.0f32; 25];
    cells[2 * 5 + 2] = 1.0;
    let grid = OccupancyGrid::from_cells(config, cells).unwrap();
    let map = LikelihoodMap::build(&grid, LikelihoodParams::default());

    let params = LocalizeParams {
        num_particles: 100,
        motion: low_noise_motion(),
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(params);
    let mut rng = StdRng::seed_from_u64(17);
    filter.init_gaussian(
        &mut rng,
        Pose::new(0.5, 0.5, 0.0),
        Pose::new(0.01, 0.01, 0.01),
    );

    let laser_config = LaserConfig {
        start_angle: 0.0,
        angular_resolution: std::f64::consts::FRAC_PI_2,
        maximum_range: 80.0,
        ..Default::default()
    };
    // Seed the odometry delta, then hand in a scan stamped 0.1 m ahead.
    let seed_scan = RobotLaser {
        config: laser_config.clone(),
        ranges: vec![2.0; 4],
        robot_pose: Pose::new(0.5, 0.5, 0.0),
        ..Default::default()
    };
    filter.run(&mut rng, &map, &seed_scan, 0.0, false);

    let step_scan = RobotLaser {
        robot_pose: Pose::new(0.6, 0.5, 0.0),
        ..seed_scan.clone()
    };
    filter.run(&mut rng, &map, &step_scan, 0.0, false);

    let summary = filter.summarize(&map, &step_scan.ranges, &laser_config, 0.0, false);
    assert!(
        (summary.mean.x - 0.6).abs() < 0.05,
        "mean.x = {}",
        summary.mean.x
    );
    assert!(
        (summary.mean.y - 0.5).abs() < 0.05,
        "mean.y = {}",
        summary.mean.y
    );
    assert!(summary.converged);
}

/// Tracking through a box room: with odometry matching ground truth and
/// low motion noise, the weighted mean stays near the true pose while the
/// robot crosses the room, resampling on the way.
#[test]
fn test_tracking_across_box_room() {
    let room_w = 10.0;
    let room_h = 8.0;
    let grid = common::box_room_grid(room_w, room_h, 0.1);
    let map = LikelihoodMap::build(&grid, LikelihoodParams::default());

    let params = LocalizeParams {
        num_particles: 150,
        motion: low_noise_motion(),
        update_distance: 0.3,
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(params);
    let mut rng = StdRng::seed_from_u64(5);

    let mut truth = Pose::new(2.0, 4.0, 0.0);
    filter.init_gaussian(&mut rng, truth, Pose::new(0.1, 0.1, 0.05));

    for step in 0..30 {
        truth.x += 0.15;
        let scan = common::box_room_scan(room_w, room_h, &truth, &truth, 181, step as f64 * 0.1);
        filter.run(&mut rng, &map, &scan, 0.0, false);
    }

    let final_scan = common::box_room_scan(room_w, room_h, &truth, &truth, 181, 3.0);
    let summary = filter.summarize(
        &map,
        &final_scan.ranges,
        &final_scan.config,
        0.0,
        false,
    );
    assert!(
        summary.mean.distance(&truth) < 0.4,
        "drifted to {:?} vs truth {:?}",
        summary.mean,
        truth
    );
    assert!(summary.converged);
    // The whole cloud contracted around the truth after resampling.
    assert!(summary.std.x < 0.5);
    assert!(summary.std.y < 0.5);
}

/// Closed planning loop: drive a point robot with the planner's velocity
/// commands until it reports the goal reached.
#[test]
fn test_waypoint_following_reaches_goal() {
    let grid = common::box_room_grid(10.0, 8.0, 0.1);
    let nav = PlannerConfig {
        replan_frequency: 0.0,
        ..Default::default()
    };
    let mut planner = Planner::new(nav, RobotConfig::default());
    planner.set_map(grid, 0.0);

    let mut robot = TrajPoint::from_pose(Pose::new(2.0, 4.0, 0.0));
    planner.update_robot(&robot);
    assert!(planner.update_goal(Pose::new(8.0, 6.0, 0.0), true, 0.0));
    assert!(planner.goal_reachable());

    let dt = 0.1;
    let mut reached = false;
    for _ in 0..2000 {
        match planner.next_waypoint() {
            WaypointResult::GoalReached => {
                reached = true;
                break;
            }
            WaypointResult::NoPlan => panic!("plan lost mid-drive"),
            WaypointResult::Next { waypoint, .. } => {
                let cmd = planner.velocity_command(&robot, &waypoint);
                robot.theta += cmd.rv * dt;
                robot.x += cmd.tv * dt * robot.theta.cos();
                robot.y += cmd.tv * dt * robot.theta.sin();
                planner.update_robot(&robot);
            }
        }
    }
    assert!(reached, "never reached goal; ended at {:?}", robot.pose());
    assert!(robot.pose().distance(&Pose::new(8.0, 6.0, 0.0)) < 0.5);
}

/// The localizer's summary feeds the planner: a full static cycle.
#[test]
fn test_localize_summary_drives_planner() {
    let room_w = 10.0;
    let room_h = 8.0;
    let grid = common::box_room_grid(room_w, room_h, 0.1);
    let map = LikelihoodMap::build(&grid, LikelihoodParams::default());

    let params = LocalizeParams {
        num_particles: 100,
        motion: low_noise_motion(),
        ..Default::default()
    };
    let mut filter = ParticleFilter::new(params);
    let mut rng = StdRng::seed_from_u64(3);
    let truth = Pose::new(3.0, 3.0, 0.0);
    filter.init_gaussian(&mut rng, truth, Pose::new(0.05, 0.05, 0.02));

    let scan = common::box_room_scan(room_w, room_h, &truth, &truth, 181, 0.0);
    filter.run(&mut rng, &map, &scan, 0.0, false);
    let summary = filter.summarize(&map, &scan.ranges, &scan.config, 0.0, false);

    let mut planner = Planner::new(
        PlannerConfig {
            replan_frequency: 0.0,
            ..Default::default()
        },
        RobotConfig::default(),
    );
    planner.set_map(common::box_room_grid(room_w, room_h, 0.1), 0.0);
    assert!(planner.update_robot(&TrajPoint::from_pose(summary.mean)));
    assert!(planner.update_goal(Pose::new(7.0, 5.0, 0.0), true, 0.0));
    assert!(planner.goal_reachable());
    assert!(planner.path().len() > 1);
    // The path starts at the estimated pose.
    let head = planner.path()[0];
    assert_relative_eq!(head.x, summary.mean.x, epsilon = 1e-9);
    assert_relative_eq!(head.y, summary.mean.y, epsilon = 1e-9);
}

/// The incremental matcher must not corrupt consistent odometry: scans
/// generated along a straight run, with priors equal to ground truth,
/// come back essentially unchanged.
#[test]
fn test_scan_matcher_tracks_straight_run() {
    let room_w = 10.0;
    let room_h = 8.0;
    let mut matcher = ScanMatcher::new(MatchParams::default());

    let mut truth = Pose::new(2.0, 4.0, 0.0);
    for step in 0..6 {
        let scan = common::box_room_scan(room_w, room_h, &truth, &truth, 181, step as f64 * 0.1);
        // The matcher works in the robot frame of its first scan; priors
        // are the odometry poses.
        let angles: Vec<f64> = (0..scan.ranges.len())
            .map(|i| scan.config.beam_angle(i))
            .collect();
        let corrected = matcher.match_scan(&scan.ranges, &angles, truth, scan.timestamp);
        assert!(
            corrected.distance(&truth) < 0.12,
            "step {step}: corrected {corrected:?} vs truth {truth:?}"
        );
        truth.x += 0.1;
    }
}
