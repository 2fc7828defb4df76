pub mod park;
pub mod player;
pub mod result;
pub mod stats;

pub use park::{Park, Stadium};
pub use player::{BatterRatings, Hand, PitchType, PitcherRatings, Position, StaffRole};
pub use result::{
    BallType, ErrorType, GameMeta, GameResult, GameScore, GameTotals, HitType, InjuryEvent,
    OutType, PitchLogEntry, PitchOutcome, SidePair, SubstitutionEvent,
};
pub use stats::{BatterLine, FieldingLine, PitcherLine, PitcherUsageSummary};
