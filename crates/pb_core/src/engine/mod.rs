pub mod baserunning;
pub mod batted_ball;
pub mod context;
pub mod fielding;
pub mod game;
pub mod lineup;
pub mod pitch;
pub mod rng;
pub mod staff;
