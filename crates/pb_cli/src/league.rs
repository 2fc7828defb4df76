//! Deterministic synthetic league for the long-term driver.
//!
//! Roster/lineup CSV loading belongs to the surrounding application; the
//! reference driver instead fabricates a league of rating-sheet players
//! from the run seed so every invocation is reproducible end-to-end.

use std::collections::HashMap;

use pb_core::models::player::{BatterRatings, Hand, PitchType, PitcherRatings, Position, StaffRole};
use pb_core::GameRng;

/// One synthesized club: lineup, bench and pitching staff.
#[derive(Debug, Clone)]
pub struct LeagueClub {
    pub team_id: String,
    pub division: String,
    pub lineup: Vec<BatterRatings>,
    pub positions: HashMap<String, Position>,
    pub bench: Vec<BatterRatings>,
    pub pitchers: Vec<PitcherRatings>,
    pub roles: HashMap<String, StaffRole>,
}

const LINEUP_POSITIONS: [Position; 9] = [
    Position::C,
    Position::First,
    Position::Second,
    Position::Third,
    Position::Short,
    Position::Left,
    Position::Center,
    Position::Right,
    Position::Dh,
];

const STAFF_ROLES: [&str; 9] = ["SP1", "SP2", "SP3", "SP4", "SP5", "LR", "MR", "SU", "CL"];

fn rating(rng: &mut GameRng) -> f64 {
    rng.gauss(50.0, 12.0).clamp(20.0, 90.0)
}

fn hand(rng: &mut GameRng) -> Hand {
    let roll = rng.uniform();
    if roll < 0.60 {
        Hand::R
    } else if roll < 0.92 {
        Hand::L
    } else {
        Hand::S
    }
}

fn make_batter(id: &str, position: Position, rng: &mut GameRng) -> BatterRatings {
    let mut batter = BatterRatings::neutral(id);
    batter.bats = hand(rng);
    batter.primary_position = Some(position);
    batter.contact = rating(rng);
    batter.power = rating(rng);
    batter.gb_tendency = rating(rng);
    batter.pull_tendency = rating(rng);
    batter.vs_left = rating(rng);
    batter.fielding = rating(rng);
    batter.arm = rating(rng);
    batter.speed = rating(rng);
    batter.eye = rating(rng);
    batter.durability = rating(rng);
    batter.height = rng.gauss(73.0, 2.0).clamp(66.0, 80.0);
    batter
}

fn make_pitcher(id: &str, role: &str, rng: &mut GameRng) -> PitcherRatings {
    let mut pitcher = PitcherRatings::neutral(id);
    pitcher.throws = if rng.chance(0.7) { Hand::R } else { Hand::L };
    pitcher.role = role.to_string();
    pitcher.control = rating(rng);
    pitcher.movement = rating(rng);
    pitcher.arm = rating(rng);
    pitcher.velocity = pitcher.arm;
    pitcher.gb_tendency = rating(rng);
    pitcher.vs_left = rating(rng);
    pitcher.hold_runner = rating(rng);
    pitcher.endurance = if role.starts_with("SP") {
        rng.gauss(62.0, 10.0).clamp(40.0, 90.0)
    } else {
        rng.gauss(42.0, 8.0).clamp(20.0, 70.0)
    };
    pitcher.durability = rating(rng);
    pitcher.fielding = rating(rng);
    let mut repertoire = HashMap::from([(PitchType::Fb, rng.gauss(60.0, 10.0).clamp(35.0, 90.0))]);
    let secondary = [PitchType::Sl, PitchType::Cb, PitchType::Cu, PitchType::Si];
    for pitch in secondary {
        if rng.chance(0.5) {
            repertoire.insert(pitch, rng.gauss(52.0, 10.0).clamp(25.0, 85.0));
        }
    }
    pitcher.repertoire = repertoire;
    pitcher
}

fn division_for(index: usize, total: usize) -> String {
    let half = total.div_ceil(2);
    let league = if index < half { "AL" } else { "NL" };
    let league_index = if index < half { index } else { index - half };
    let league_size = if index < half { half } else { total - half };
    let side = if league_index < league_size.div_ceil(2) { "East" } else { "West" };
    format!("{league} {side}")
}

/// Build `num_teams` clubs deterministically from `seed`.
pub fn synthesize_league(num_teams: usize, seed: u64) -> Vec<LeagueClub> {
    let mut rng = GameRng::seed_from(seed);
    let mut clubs = Vec::with_capacity(num_teams);
    for team_index in 0..num_teams {
        let team_id = format!("T{:02}", team_index + 1);
        let division = division_for(team_index, num_teams);

        let mut lineup = Vec::new();
        let mut positions = HashMap::new();
        for (slot, position) in LINEUP_POSITIONS.iter().enumerate() {
            let id = format!("{team_id}-B{}", slot + 1);
            let batter = make_batter(&id, *position, &mut rng);
            positions.insert(id, *position);
            lineup.push(batter);
        }
        let bench: Vec<BatterRatings> = (0..4)
            .map(|slot| {
                let id = format!("{team_id}-R{}", slot + 1);
                let position = LINEUP_POSITIONS[slot * 2 % 8];
                make_batter(&id, position, &mut rng)
            })
            .collect();

        let mut pitchers = Vec::new();
        let mut roles = HashMap::new();
        for (slot, role) in STAFF_ROLES.iter().enumerate() {
            let id = format!("{team_id}-P{}", slot + 1);
            let pitcher = make_pitcher(&id, role, &mut rng);
            roles.insert(id, StaffRole::parse(role));
            pitchers.push(pitcher);
        }

        clubs.push(LeagueClub {
            team_id,
            division,
            lineup,
            positions,
            bench,
            pitchers,
            roles,
        });
    }
    clubs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn league_is_deterministic_and_well_formed() {
        let a = synthesize_league(14, 42);
        let b = synthesize_league(14, 42);
        assert_eq!(a.len(), 14);
        for (club_a, club_b) in a.iter().zip(&b) {
            assert_eq!(club_a.team_id, club_b.team_id);
            assert_eq!(club_a.lineup.len(), 9);
            assert_eq!(club_a.pitchers.len(), 9);
            assert_eq!(
                club_a.lineup[0].contact.to_bits(),
                club_b.lineup[0].contact.to_bits()
            );
        }
        // Both leagues and all four divisions appear.
        let divisions: std::collections::HashSet<&str> =
            a.iter().map(|c| c.division.as_str()).collect();
        assert!(divisions.contains("AL East"));
        assert!(divisions.contains("NL West"));
    }
}
