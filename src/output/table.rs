use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::breakdown::{stat_lines, stat_market_lines, FormBreakdown, FormTrend, MatchBreakdown};
use crate::output::format::{
    ev_tier, format_display_fair_odds, format_ev, format_kickoff, format_odds,
    format_probability, truncate, EvTier, PLACEHOLDER,
};
use crate::types::{
    H2hData, HealthCheck, League, Match, MatchOdds, MatchStatus, MatchSummary, Opportunity,
    StatsPredictions,
};

const REASON_WIDTH: usize = 60;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn ev_cell(ev: f64) -> Cell {
    let color = match ev_tier(ev) {
        EvTier::Strong => Color::Green,
        EvTier::Positive => Color::Cyan,
        EvTier::Marginal => Color::Yellow,
        EvTier::Negative => Color::Red,
    };
    Cell::new(format_ev(ev)).fg(color)
}

/// Opportunities in the order given; callers rank before rendering.
pub fn render_opportunities_table(ranked: &[&Opportunity]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "#",
        "Market",
        "Outcome",
        "Bookmaker",
        "Odds",
        "Fair Odds",
        "Probability",
        "EV",
        "Reason",
    ]);
    for (idx, opp) in ranked.iter().enumerate() {
        table.add_row(Row::from(vec![
            Cell::new(idx + 1),
            Cell::new(&opp.market),
            Cell::new(&opp.outcome),
            Cell::new(&opp.bookmaker),
            Cell::new(format_odds(opp.bookmaker_odds)),
            Cell::new(format_display_fair_odds(opp.probability)),
            Cell::new(format_probability(opp.probability)),
            ev_cell(opp.ev_percent),
            Cell::new(
                opp.reason
                    .as_deref()
                    .map(|r| truncate(r, REASON_WIDTH))
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
            ),
        ]));
    }
    table.to_string()
}

pub fn render_leagues_table(leagues: &[League], favorites: &[String]) -> String {
    let mut table = new_table();
    table.set_header(vec!["", "ID", "League", "Country"]);
    for league in leagues {
        let starred = favorites.iter().any(|id| id == league.league_id.as_str());
        let star = if starred {
            Cell::new("★").fg(Color::Yellow)
        } else {
            Cell::new("")
        };
        table.add_row(Row::from(vec![
            star,
            Cell::new(league.league_id.as_str()),
            Cell::new(&league.name),
            Cell::new(if league.country.is_empty() {
                PLACEHOLDER
            } else {
                league.country.as_str()
            }),
        ]));
    }
    table.to_string()
}

fn status_cell(status: MatchStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        MatchStatus::Live => cell.fg(Color::Red),
        MatchStatus::Finished => cell.fg(Color::DarkGrey),
        _ => cell,
    }
}

pub fn render_matches_table(matches: &[Match]) -> String {
    let mut table = new_table();
    table.set_header(vec!["ID", "Kickoff (Malta)", "Home", "Away", "Status", "Score"]);
    for fixture in matches {
        table.add_row(Row::from(vec![
            Cell::new(fixture.match_id.as_str()),
            Cell::new(format_kickoff(fixture.start_time)),
            Cell::new(&fixture.home_team),
            Cell::new(&fixture.away_team),
            status_cell(fixture.status),
            Cell::new(
                fixture
                    .score_parts()
                    .map(|(home, away)| format!("{home} - {away}"))
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
            ),
        ]));
    }
    table.to_string()
}

pub fn render_match_header(summary: &MatchSummary) -> String {
    let fixture = &summary.fixture;
    let score = fixture
        .score_parts()
        .map(|(home, away)| format!(" {home}-{away}"))
        .unwrap_or_default();
    format!(
        "{} vs {}{}\n{} | {} | {}",
        fixture.home_team,
        fixture.away_team,
        score,
        summary.league.name,
        format_kickoff(fixture.start_time),
        fixture.status
    )
}

fn trend_label(trend: FormTrend) -> &'static str {
    match trend {
        FormTrend::Up => "↑",
        FormTrend::Flat => "→",
        FormTrend::Down => "↓",
    }
}

fn form_label(form: &FormBreakdown) -> String {
    format!(
        "{} {:.0}% {} ({:.1} scored / {:.1} conceded)",
        form.record,
        form.form_pct,
        trend_label(form.trend),
        form.goals_scored,
        form.goals_conceded
    )
}

pub fn render_breakdown_table(breakdown: &MatchBreakdown) -> String {
    let mut table = new_table();
    table.set_header(vec!["Metric", "Home", "Away"]);
    table.add_row(vec![
        "Expected goals".to_string(),
        format!(
            "{:.2} ({:.0}%)",
            breakdown.home_expected_goals, breakdown.home_xg_share_pct
        ),
        format!(
            "{:.2} ({:.0}%)",
            breakdown.away_expected_goals, breakdown.away_xg_share_pct
        ),
    ]);
    table.add_row(vec![
        format!("Form (last {})", breakdown.form_window),
        form_label(&breakdown.home_form),
        form_label(&breakdown.away_form),
    ]);
    table.add_row(vec![
        format!("H2H wins ({} played)", breakdown.h2h.total),
        format!("{:.0}%", breakdown.h2h.home_win_pct),
        format!("{:.0}%", breakdown.h2h.away_win_pct),
    ]);
    table.add_row(vec![
        "H2H avg goals".to_string(),
        format!("{:.1}", breakdown.h2h.avg_home_goals),
        format!("{:.1}", breakdown.h2h.avg_away_goals),
    ]);
    format!("Model: {}\n{}", breakdown.model, table)
}

pub fn render_stats_table(predictions: &StatsPredictions) -> String {
    let mut table = new_table();
    table.set_header(vec!["Stat", "Home", "Away", "Total", "Confidence"]);
    for line in stat_lines(predictions) {
        table.add_row(vec![
            line.stat,
            format!("{:.1}", line.home),
            format!("{:.1}", line.away),
            format!("{:.1}", line.total),
            line.confidence
                .map(|c| format!("{c:.0}%"))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        ]);
    }

    let markets = stat_market_lines(predictions);
    if markets.is_empty() {
        return table.to_string();
    }
    let mut market_table = new_table();
    market_table.set_header(vec!["Stat", "Market", "Pick", "Probability", "Fair Odds"]);
    for line in markets {
        market_table.add_row(vec![
            line.stat,
            line.market,
            line.prediction,
            format_probability(line.probability),
            line.fair_odds
                .map(format_odds)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        ]);
    }
    format!("{table}\n{market_table}")
}

pub fn render_odds_table(odds: &MatchOdds) -> String {
    let mut table = new_table();
    table.set_header(vec!["Market", "Bookmaker", "Prices", "Updated"]);
    for market in &odds.markets {
        let prices = market
            .odds
            .entries()
            .into_iter()
            .map(|(label, price)| format!("{label} {}", format_odds(price)))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            market.market.clone(),
            market.bookmaker.clone(),
            if prices.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                prices
            },
            market
                .timestamp
                .map(format_kickoff)
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        ]);
    }
    table.to_string()
}

pub fn render_h2h_table(h2h: &H2hData) -> String {
    let mut table = new_table();
    table.set_header(vec!["Date", "Home", "Score", "Away"]);
    for game in &h2h.matches {
        table.add_row(vec![
            game.date.clone(),
            game.home_team.clone(),
            game.score.clone(),
            game.away_team.clone(),
        ]);
    }
    format!(
        "{table}\nHome wins: {} | Draws: {} | Away wins: {}",
        h2h.stats.home_wins, h2h.stats.draws, h2h.stats.away_wins
    )
}

pub fn render_health_table(health: &HealthCheck) -> String {
    let mut table = new_table();
    table.set_header(vec!["Check", "Value"]);
    let ok = if health.ok {
        Cell::new("OK").fg(Color::Green)
    } else {
        Cell::new("DOWN").fg(Color::Red)
    };
    table.add_row(Row::from(vec![Cell::new("Backend"), ok]));
    table.add_row(vec!["Latency".to_string(), format!("{} ms", health.latency_ms)]);
    table.add_row(vec!["Environment".to_string(), health.environment.clone()]);
    table.add_row(vec![
        "Odds feed configured".to_string(),
        health.betsapi_configured.to_string(),
    ]);
    table.add_row(vec!["Checked at".to_string(), health.timestamp.clone()]);
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::{render_leagues_table, render_matches_table, render_opportunities_table};
    use crate::provider::testing::opportunity;
    use crate::types::{EntityId, League, Match, MatchStatus};

    #[test]
    fn opportunity_table_shows_formatted_figures() {
        let opp = opportunity("1X2", "home", 2.1, 0.5, 5.0);
        let rendered = render_opportunities_table(&[&opp]);
        assert!(rendered.contains("+5.00%"));
        assert!(rendered.contains("50.0%"));
        assert!(rendered.contains("2.10"));
        assert!(rendered.contains("2.00"));
    }

    #[test]
    fn league_table_marks_favorites() {
        let leagues = vec![
            League {
                league_id: EntityId::from("39"),
                name: "Premier League".to_string(),
                country: "England".to_string(),
                logo: String::new(),
                season_id: None,
            },
            League {
                league_id: EntityId::from("140"),
                name: "La Liga".to_string(),
                country: String::new(),
                logo: String::new(),
                season_id: None,
            },
        ];
        let rendered = render_leagues_table(&leagues, &["39".to_string()]);
        assert_eq!(rendered.matches('★').count(), 1);
        assert!(rendered.contains("La Liga"));
    }

    #[test]
    fn match_table_renders_kickoff_and_score() {
        let fixture = Match {
            match_id: EntityId::from("5"),
            home_team: "Valletta".to_string(),
            away_team: "Floriana".to_string(),
            start_time: 1_718_042_400,
            status: MatchStatus::Live,
            home_logo: None,
            away_logo: None,
            league_name: None,
            score: Some("1-0".to_string()),
        };
        let rendered = render_matches_table(&[fixture]);
        assert!(rendered.contains("10/06/2024 20:00"));
        assert!(rendered.contains("1 - 0"));
        assert!(rendered.contains("LIVE"));
    }
}
