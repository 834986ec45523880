/// Badge tiers, lowest first. The derived ordering follows declaration order,
/// so a longer streak never compares below a shorter one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BadgeTier {
    Beginner,
    Starter,
    WeekStar,
    MonthWarrior,
    QuarterChampion,
    HalfYearHero,
    YearMaster,
}

impl BadgeTier {
    /// Minimum current streak (in days) needed for this tier.
    pub fn threshold(&self) -> u32 {
        match self {
            BadgeTier::YearMaster => 365,
            BadgeTier::HalfYearHero => 180,
            BadgeTier::QuarterChampion => 90,
            BadgeTier::MonthWarrior => 30,
            BadgeTier::WeekStar => 7,
            BadgeTier::Starter => 3,
            BadgeTier::Beginner => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BadgeTier::YearMaster => "Year Master",
            BadgeTier::HalfYearHero => "Half Year Hero",
            BadgeTier::QuarterChampion => "Quarter Champion",
            BadgeTier::MonthWarrior => "Month Warrior",
            BadgeTier::WeekStar => "Week Star",
            BadgeTier::Starter => "Starter",
            BadgeTier::Beginner => "Beginner",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            BadgeTier::YearMaster => "🔥",
            BadgeTier::HalfYearHero => "⭐",
            BadgeTier::QuarterChampion => "💎",
            BadgeTier::MonthWarrior => "🎖️",
            BadgeTier::WeekStar => "🌟",
            BadgeTier::Starter => "🚀",
            BadgeTier::Beginner => "🌱",
        }
    }

    /// The tier above this one, if any.
    pub fn next(&self) -> Option<BadgeTier> {
        match self {
            BadgeTier::Beginner => Some(BadgeTier::Starter),
            BadgeTier::Starter => Some(BadgeTier::WeekStar),
            BadgeTier::WeekStar => Some(BadgeTier::MonthWarrior),
            BadgeTier::MonthWarrior => Some(BadgeTier::QuarterChampion),
            BadgeTier::QuarterChampion => Some(BadgeTier::HalfYearHero),
            BadgeTier::HalfYearHero => Some(BadgeTier::YearMaster),
            BadgeTier::YearMaster => None,
        }
    }
}

impl std::fmt::Display for BadgeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.emoji(), self.name())
    }
}

/// Maps a current streak length onto its badge tier.
///
/// Thresholds are checked from the highest tier down and the first match wins.
pub fn classify(current_streak: u32) -> BadgeTier {
    match current_streak {
        s if s >= 365 => BadgeTier::YearMaster,
        s if s >= 180 => BadgeTier::HalfYearHero,
        s if s >= 90 => BadgeTier::QuarterChampion,
        s if s >= 30 => BadgeTier::MonthWarrior,
        s if s >= 7 => BadgeTier::WeekStar,
        s if s >= 3 => BadgeTier::Starter,
        _ => BadgeTier::Beginner,
    }
}
