//! Built-in league priority table (20-110) with specific-country
//! disambiguation rules for ambiguous league names.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Teams known to play in the English Premier League, used to disambiguate
/// a bare "Premier League" league name against other countries' top flights
/// that share the name.
fn english_premier_league_teams() -> &'static HashSet<&'static str> {
    static TEAMS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    TEAMS.get_or_init(|| {
        [
            "Arsenal", "Aston Villa", "Bournemouth", "Brentford", "Brighton",
            "Chelsea", "Crystal Palace", "Everton", "Fulham", "Ipswich Town",
            "Leicester City", "Liverpool", "Manchester City", "Manchester United",
            "Newcastle United", "Nottingham Forest", "Southampton",
            "Tottenham Hotspur", "West Ham United", "Wolverhampton Wanderers",
        ]
        .into_iter()
        .collect()
    })
}

/// Priority table for unambiguous league names, scored 20-110: top European
/// leagues and major international competitions score highest, lower-tier
/// and regional leagues lowest.
fn base_priority_table() -> &'static std::collections::HashMap<&'static str, u32> {
    static TABLE: OnceLock<std::collections::HashMap<&'static str, u32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            ("UEFA Champions League", 110),
            ("FIFA World Cup", 110),
            ("UEFA Europa League", 95),
            ("UEFA Europa Conference League", 85),
            ("La Liga", 100),
            ("Serie A", 100),
            ("Bundesliga", 100),
            ("Ligue 1", 95),
            ("Eredivisie", 70),
            ("Primeira Liga", 65),
            ("Championship", 60),
            ("Copa Libertadores", 90),
            ("Copa America", 95),
            ("Euro Championship", 105),
            ("MLS", 55),
            ("Brasileirao", 75),
            ("Saudi Pro League", 50),
            ("Scottish Premiership", 45),
            ("Super Lig", 55),
        ]
        .into_iter()
        .collect()
    })
}

/// Default priority assigned to a league not present in the table at all.
const DEFAULT_PRIORITY: u32 = 30;

/// Resolves a league's priority, applying the Premier League disambiguation
/// rule: a bare "Premier League" league name is scored 100 if either team
/// is known to play in the English top flight, 30 otherwise (it is most
/// likely a same-named lower-profile league elsewhere).
pub fn league_priority(league_name: &str, home_team: &str, away_team: &str) -> u32 {
    if league_name.eq_ignore_ascii_case("premier league") {
        let epl = english_premier_league_teams();
        return if epl.contains(home_team) || epl.contains(away_team) { 100 } else { 30 };
    }
    base_priority_table().get(league_name).copied().unwrap_or(DEFAULT_PRIORITY)
}

/// A league counts as "high priority" for the diversity walk in
/// `selectDaily` step 4 when its priority contributes at least this much to
/// the candidate's score.
pub const HIGH_PRIORITY_THRESHOLD: u32 = 80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disambiguates_premier_league_by_team() {
        assert_eq!(league_priority("Premier League", "Arsenal", "Chelsea"), 100);
        assert_eq!(league_priority("Premier League", "Some FC", "Other FC"), 30);
    }

    #[test]
    fn unambiguous_leagues_use_the_table() {
        assert_eq!(league_priority("La Liga", "Real Madrid", "Barcelona"), 100);
        assert_eq!(league_priority("Unknown Regional League", "A", "B"), DEFAULT_PRIORITY);
    }
}
