use anyhow::Result;

use crate::output::format::to_rows;
use crate::types::{League, Match, Opportunity};

pub fn opportunities_to_csv(ranked: &[&Opportunity]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "rank",
        "market",
        "outcome",
        "bookmaker",
        "bookmaker_odds",
        "fair_odds",
        "probability",
        "ev_pct",
        "reason",
    ])?;
    for row in to_rows(ranked) {
        writer.write_record([
            row.rank.to_string(),
            row.market,
            row.outcome,
            row.bookmaker,
            format!("{:.2}", row.bookmaker_odds),
            row.display_fair_odds
                .map(|odds| format!("{odds:.2}"))
                .unwrap_or_default(),
            format!("{:.4}", row.probability),
            format!("{:.2}", row.ev_percent),
            row.reason.unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn leagues_to_csv(leagues: &[League], favorites: &[String]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["league_id", "name", "country", "favorite"])?;
    for league in leagues {
        let favorite = favorites.iter().any(|id| id == league.league_id.as_str());
        writer.write_record([
            league.league_id.to_string(),
            league.name.clone(),
            league.country.clone(),
            favorite.to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn matches_to_csv(matches: &[Match]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "match_id",
        "start_time",
        "home_team",
        "away_team",
        "status",
        "score",
    ])?;
    for fixture in matches {
        writer.write_record([
            fixture.match_id.to_string(),
            fixture.start_time.to_string(),
            fixture.home_team.clone(),
            fixture.away_team.clone(),
            fixture.status.to_string().to_lowercase(),
            fixture.score.clone().unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
