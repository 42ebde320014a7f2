//! The navigation core: bus message types and the handler state.
//!
//! Every subscribed topic is a variant of [`BusMessage`]; the event loop
//! pulls one message at a time and routes it here, so each handler runs to
//! completion before the next begins. All mutable state lives in
//! [`CoreState`].

use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use gridmap::{LikelihoodMap, OccupancyGrid};
use localize::{correct_odometry, LocalizeParams, LocalizeSummary, ParticleFilter};
use planner::{MapKind, NavigatorMapMessage, Planner, WaypointResult};
use scanmatch::ScanMatcher;
use types::{
    NamedPlace, NavigatorStatus, Odometry, PlaceKind, Pose, RobotLaser, StopReason, TrajPoint,
    VelocityCommand,
};

/// Messages delivered to the core by the bus.
#[derive(Debug)]
pub enum BusMessage {
    Odometry(Odometry),
    FrontLaser(RobotLaser),
    RearLaser(RobotLaser),
    Map {
        grid: OccupancyGrid,
        places: Vec<NamedPlace>,
    },
    InitializePose {
        mean: Pose,
        std: Pose,
    },
    InitializeGlobal,
    SetGoal {
        goal: Pose,
        any_orientation: bool,
    },
    SetGoalByName(String),
    StartAutonomous,
    StopAutonomous,
    MapRequest {
        kind: MapKind,
        compress: bool,
    },
}

/// Messages the core publishes back to the bus.
#[derive(Debug)]
pub enum Publication {
    GlobalPos {
        mean: Pose,
        std: Pose,
        odometry: Pose,
        xy_cov: f64,
        converged: bool,
        timestamp: f64,
    },
    Particles {
        poses: Vec<Pose>,
        mean: Pose,
        std: Pose,
    },
    Sensor {
        laser_pose: Pose,
        endpoints: Vec<(f64, f64)>,
        mask: Vec<bool>,
    },
    Status(NavigatorStatus),
    Plan(Vec<TrajPoint>),
    AutonomousStopped(StopReason),
    Velocity(VelocityCommand),
    MapReply(NavigatorMapMessage),
}

/// All navigation state, threaded through the message handlers.
pub struct CoreState {
    localize_params: LocalizeParams,
    pub filter: ParticleFilter,
    likelihood: Option<LikelihoodMap>,
    /// Optional odometry clean-up matcher applied to incoming scans
    matcher: Option<ScanMatcher>,
    pub planner: Planner,
    places: Vec<NamedPlace>,
    autonomous: bool,
    rng: StdRng,
    outbox: UnboundedSender<Publication>,
    /// Pending global initialization waiting for the next scan
    global_init_pending: bool,
    last_summary: Option<LocalizeSummary>,
    last_odometry: Option<Odometry>,
    /// Previous summary pose/stamp for localize-reset detection
    last_published_pose: Option<(Pose, f64)>,
}

impl CoreState {
    pub fn new(
        localize_params: LocalizeParams,
        planner: Planner,
        matcher: Option<ScanMatcher>,
        rng: StdRng,
        outbox: UnboundedSender<Publication>,
    ) -> Self {
        Self {
            filter: ParticleFilter::new(localize_params.clone()),
            localize_params,
            likelihood: None,
            matcher,
            planner,
            places: Vec::new(),
            autonomous: false,
            rng,
            outbox,
            global_init_pending: false,
            last_summary: None,
            last_odometry: None,
            last_published_pose: None,
        }
    }

    pub fn autonomous(&self) -> bool {
        self.autonomous
    }

    fn publish(&self, publication: Publication) {
        // The drain task only disappears at shutdown.
        let _ = self.outbox.send(publication);
    }

    /// Route one bus message. `now` is seconds since daemon start.
    pub fn handle(&mut self, message: BusMessage, now: f64) {
        match message {
            BusMessage::Odometry(odometry) => self.on_odometry(odometry),
            BusMessage::FrontLaser(laser) => self.on_front_laser(laser, now),
            BusMessage::RearLaser(laser) => self.on_rear_laser(laser, now),
            BusMessage::Map { grid, places } => self.on_map(grid, places, now),
            BusMessage::InitializePose { mean, std } => {
                self.filter.init_gaussian(&mut self.rng, mean, std);
                self.global_init_pending = false;
            }
            BusMessage::InitializeGlobal => {
                // Needs a scan to score hypotheses; defer to the next one.
                self.global_init_pending = true;
                info!("Global initialization armed");
            }
            BusMessage::SetGoal {
                goal,
                any_orientation,
            } => {
                self.planner.update_goal(goal, any_orientation, now);
                self.publish_status_and_plan();
            }
            BusMessage::SetGoalByName(name) => self.on_goal_by_name(&name, now),
            BusMessage::StartAutonomous => {
                self.autonomous = true;
                self.planner.reset_map();
                self.generate_motion_command();
            }
            BusMessage::StopAutonomous => {
                self.autonomous = false;
                self.publish(Publication::AutonomousStopped(StopReason::UserStopped));
                self.publish(Publication::Velocity(VelocityCommand::STOP));
            }
            BusMessage::MapRequest { kind, compress } => match self.planner.map_message(kind, compress)
            {
                Ok(reply) => self.publish(Publication::MapReply(reply)),
                Err(e) => warn!(?e, "Map request failed"),
            },
        }
    }

    /// Odometry feeds the planner's robot pose; the particle filter itself
    /// integrates the pose stamped on each laser.
    fn on_odometry(&mut self, odometry: Odometry) {
        let corrected = match &self.last_summary {
            Some(summary) => {
                correct_odometry(&odometry.pose(), &summary.mean, &summary.odometry_pos)
            }
            // No estimate yet; raw odometry is the best we have.
            None => odometry.pose(),
        };

        let robot = TrajPoint {
            x: corrected.x,
            y: corrected.y,
            theta: corrected.theta,
            t_vel: odometry.tv,
            r_vel: odometry.rv,
        };
        self.planner.update_robot(&robot);
        self.last_odometry = Some(odometry);

        if self.autonomous {
            self.generate_motion_command();
        }
        self.publish_status_and_plan();
    }

    /// Front laser drives the full localize cycle and, when autonomous,
    /// the dynamic map update.
    fn on_front_laser(&mut self, mut laser: RobotLaser, now: f64) {
        if let Some(matcher) = &mut self.matcher {
            let angles: Vec<f64> = (0..laser.ranges.len())
                .map(|i| laser.config.beam_angle(i))
                .collect();
            laser.robot_pose =
                matcher.match_scan(&laser.ranges, &angles, laser.robot_pose, laser.timestamp);
        }

        let Some(likelihood) = &self.likelihood else {
            debug!("Laser before map; dropped");
            return;
        };

        if self.global_init_pending {
            self.filter.init_uniform(&mut self.rng, &laser, likelihood);
            self.global_init_pending = false;
        }
        if !self.filter.is_initialized() {
            return;
        }

        let forward_offset = self.localize_params.front_laser_offset;
        self.filter
            .run(&mut self.rng, likelihood, &laser, forward_offset, false);

        let summary = self.filter.summarize(
            likelihood,
            &laser.ranges,
            &laser.config,
            forward_offset,
            false,
        );
        self.publish_localization(&summary, laser.timestamp);

        self.update_positions(&summary, now);

        // Only integrate obstacles once we know where we are.
        if self.autonomous
            && (self.planner.nav_config().map_update_obstacles
                || self.planner.nav_config().map_update_freespace)
        {
            let mut corrected = laser.clone();
            corrected.laser_pose = Pose {
                x: summary.mean.x + forward_offset * summary.mean.theta.cos(),
                y: summary.mean.y + forward_offset * summary.mean.theta.sin(),
                theta: summary.mean.theta,
            };
            self.planner.update_map(&corrected, now);
        }

        self.last_summary = Some(summary);

        if self.autonomous {
            self.generate_motion_command();
        }
        self.publish_status_and_plan();
    }

    /// The rear laser never enters localization; it may still paint
    /// obstacles into the planner's map.
    fn on_rear_laser(&mut self, laser: RobotLaser, now: f64) {
        if self.last_summary.is_none() {
            return;
        }
        if self.planner.nav_config().map_update_obstacles
            || self.planner.nav_config().map_update_freespace
        {
            self.planner.update_map(&laser, now);
        }
    }

    fn on_map(&mut self, grid: OccupancyGrid, places: Vec<NamedPlace>, now: f64) {
        info!(
            width = grid.width(),
            height = grid.height(),
            places = places.len(),
            "Map received"
        );
        // Rebuild the likelihood fields; the particle cloud carries over.
        self.likelihood = Some(LikelihoodMap::build(
            &grid,
            self.localize_params.likelihood,
        ));
        self.planner.set_map(grid, now);
        if let Some(matcher) = &mut self.matcher {
            matcher.reset();
        }
        self.places = places;
    }

    fn on_goal_by_name(&mut self, name: &str, now: f64) {
        let Some(place) = self.places.iter().find(|p| p.name == name) else {
            warn!(name, "Unknown place");
            return;
        };
        let any_orientation = place.kind == PlaceKind::Named;
        self.planner
            .update_goal(place.pose, any_orientation, now);
        self.publish_status_and_plan();
    }

    /// Feed the planner the best current pose and catch localizer resets.
    fn update_positions(&mut self, summary: &LocalizeSummary, now: f64) {
        let robot = if self.planner.nav_config().dont_integrate_odometry {
            TrajPoint::from_pose(summary.mean)
        } else {
            let pose = match &self.last_odometry {
                Some(odometry) => {
                    correct_odometry(&odometry.pose(), &summary.mean, &summary.odometry_pos)
                }
                None => summary.mean,
            };
            TrajPoint::from_pose(pose)
        };

        // A jump no physical robot could have made means the localizer was
        // re-initialized: drop the dynamic obstacle marks.
        if let Some((last_pose, last_stamp)) = self.last_published_pose {
            let dt = (now - last_stamp).max(1e-3);
            let max_travel = 2.0 * self.planner.robot_config().max_t_vel * dt;
            if last_pose.distance(&summary.mean) > max_travel {
                info!("Localizer reset detected; clearing dynamic map");
                self.planner.reset_map();
            }
        }
        self.last_published_pose = Some((summary.mean, now));

        self.planner.update_robot(&robot);
    }

    /// Waypoint arbitration and velocity output.
    fn generate_motion_command(&mut self) {
        match self.planner.next_waypoint() {
            WaypointResult::GoalReached => {
                self.autonomous = false;
                self.publish(Publication::AutonomousStopped(StopReason::GoalReached));
                self.publish(Publication::Velocity(VelocityCommand::STOP));
            }
            WaypointResult::NoPlan => {
                self.publish(Publication::Velocity(VelocityCommand::STOP));
            }
            WaypointResult::Next { waypoint, .. } => {
                let robot = self.planner.status(self.autonomous).robot;
                let command = self.planner.velocity_command(&robot, &waypoint);
                self.publish(Publication::Velocity(command));
            }
        }
    }

    fn publish_localization(&self, summary: &LocalizeSummary, timestamp: f64) {
        self.publish(Publication::GlobalPos {
            mean: summary.mean,
            std: summary.std,
            odometry: summary.odometry_pos,
            xy_cov: summary.xy_cov,
            converged: summary.converged,
            timestamp,
        });
        self.publish(Publication::Particles {
            poses: self
                .filter
                .particles()
                .iter()
                .map(|p| Pose::new(p.x, p.y, p.theta))
                .collect(),
            mean: summary.mean,
            std: summary.std,
        });
        self.publish(Publication::Sensor {
            laser_pose: summary.mean,
            endpoints: summary.mean_scan.iter().map(|s| (s.x, s.y)).collect(),
            mask: summary.mean_scan.iter().map(|s| s.mask).collect(),
        });
    }

    fn publish_status_and_plan(&self) {
        self.publish(Publication::Status(self.planner.status(self.autonomous)));
        self.publish(Publication::Plan(self.planner.path().to_vec()));
    }
}
