//! Ballpark geometry and environment factors.

use serde::{Deserialize, Serialize};

/// Basic outfield dimensions for a ballpark.
///
/// Distances are measured in feet from home plate to the wall down the left
/// field line, straightaway center field and down the right field line.
/// `double` and `triple` are the fraction of the wall distance a ball must
/// carry to be ruled a double or triple when it stays in the park.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stadium {
    pub left: f64,
    pub center: f64,
    pub right: f64,
    pub double: f64,
    pub triple: f64,
}

impl Default for Stadium {
    fn default() -> Self {
        Self { left: 330.0, center: 400.0, right: 330.0, double: 0.62, triple: 0.92 }
    }
}

impl Stadium {
    /// Distance to the wall at `angle` radians.
    ///
    /// Angle 0 is the right field line and pi/2 the left field line; values
    /// in between interpolate linearly through straightaway center.
    pub fn wall_distance(&self, angle: f64) -> f64 {
        let half = std::f64::consts::FRAC_PI_4;
        if angle <= half {
            self.right + (self.center - self.right) * angle / half
        } else {
            self.center + (self.left - self.center) * (angle - half) / half
        }
    }

    pub fn double_distance(&self, angle: f64) -> f64 {
        self.wall_distance(angle) * self.double
    }

    pub fn triple_distance(&self, angle: f64) -> f64 {
        self.wall_distance(angle) * self.triple
    }
}

/// A venue: geometry plus overall run environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Park {
    pub name: String,
    pub stadium: Stadium,
    /// Overall park factor, 1.0 = neutral.
    pub park_factor: f64,
    pub foul_territory_scale: f64,
    pub altitude_ft: f64,
}

impl Default for Park {
    fn default() -> Self {
        Self {
            name: "Generic Park".to_string(),
            stadium: Stadium::default(),
            park_factor: 1.0,
            foul_territory_scale: 1.0,
            altitude_ft: 0.0,
        }
    }
}

impl Park {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_distance_interpolates_through_center() {
        let stadium = Stadium::default();
        assert_eq!(stadium.wall_distance(0.0), 330.0);
        assert_eq!(stadium.wall_distance(std::f64::consts::FRAC_PI_4), 400.0);
        assert_eq!(stadium.wall_distance(std::f64::consts::FRAC_PI_2), 330.0);
        let mid = stadium.wall_distance(std::f64::consts::FRAC_PI_4 / 2.0);
        assert!(mid > 330.0 && mid < 400.0);
    }

    #[test]
    fn hit_thresholds_scale_with_the_wall() {
        let stadium = Stadium::default();
        let angle = std::f64::consts::FRAC_PI_4;
        assert!(stadium.double_distance(angle) < stadium.triple_distance(angle));
        assert!(stadium.triple_distance(angle) < stadium.wall_distance(angle));
    }
}
