//! Display-only figures derived from the model's statistical metadata.

use serde::Serialize;

use crate::output::format::display_fair_odds;
use crate::types::{H2hSummary, StatisticalMetadata, StatsPredictions, TeamForm};

const FORM_UP_PCT: f64 = 60.0;
const FORM_DOWN_PCT: f64 = 40.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormTrend {
    Up,
    Flat,
    Down,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct H2hBreakdown {
    pub total: u32,
    pub home_win_pct: f64,
    pub away_win_pct: f64,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormBreakdown {
    pub record: String,
    pub form_pct: f64,
    pub trend: FormTrend,
    pub goals_scored: f64,
    pub goals_conceded: f64,
    pub match_count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchBreakdown {
    pub model: String,
    pub home_expected_goals: f64,
    pub away_expected_goals: f64,
    pub home_xg_share_pct: f64,
    pub away_xg_share_pct: f64,
    pub h2h: H2hBreakdown,
    pub home_form: FormBreakdown,
    pub away_form: FormBreakdown,
    pub form_window: u32,
}

pub fn h2h_breakdown(summary: &H2hSummary) -> H2hBreakdown {
    let total = summary
        .home_wins
        .saturating_add(summary.draws)
        .saturating_add(summary.away_wins);
    let pct = |wins: u32| {
        if total > 0 {
            f64::from(wins) / f64::from(total) * 100.0
        } else {
            0.0
        }
    };
    H2hBreakdown {
        total,
        home_win_pct: pct(summary.home_wins),
        away_win_pct: pct(summary.away_wins),
        avg_home_goals: summary.avg_home_goals,
        avg_away_goals: summary.avg_away_goals,
    }
}

/// Points-style form: a draw counts half a win.
pub fn form_pct(form: &TeamForm) -> f64 {
    if form.match_count == 0 {
        return 0.0;
    }
    (f64::from(form.wins) + f64::from(form.draws) * 0.5) / f64::from(form.match_count) * 100.0
}

pub fn form_trend(pct: f64) -> FormTrend {
    if pct >= FORM_UP_PCT {
        FormTrend::Up
    } else if pct <= FORM_DOWN_PCT {
        FormTrend::Down
    } else {
        FormTrend::Flat
    }
}

pub fn form_breakdown(form: &TeamForm) -> FormBreakdown {
    let pct = form_pct(form);
    FormBreakdown {
        record: format!("{}-{}-{}", form.wins, form.draws, form.losses),
        form_pct: pct,
        trend: form_trend(pct),
        goals_scored: form.goals_scored,
        goals_conceded: form.goals_conceded,
        match_count: form.match_count,
    }
}

/// Each side's share of the combined expected goals, in percent.
pub fn xg_share(home_xg: f64, away_xg: f64) -> (f64, f64) {
    let total = home_xg + away_xg;
    if !total.is_finite() || total <= 0.0 {
        return (0.0, 0.0);
    }
    (home_xg / total * 100.0, away_xg / total * 100.0)
}

pub fn match_breakdown(metadata: &StatisticalMetadata) -> MatchBreakdown {
    let (home_share, away_share) =
        xg_share(metadata.home_expected_goals, metadata.away_expected_goals);
    MatchBreakdown {
        model: metadata.model.clone(),
        home_expected_goals: metadata.home_expected_goals,
        away_expected_goals: metadata.away_expected_goals,
        home_xg_share_pct: home_share,
        away_xg_share_pct: away_share,
        h2h: h2h_breakdown(&metadata.h2h_summary),
        home_form: form_breakdown(&metadata.home_form),
        away_form: form_breakdown(&metadata.away_form),
        form_window: metadata
            .home_form
            .match_count
            .max(metadata.away_form.match_count),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatLine {
    pub stat: String,
    pub home: f64,
    pub away: f64,
    pub total: f64,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatMarketLine {
    pub stat: String,
    pub market: String,
    pub prediction: String,
    pub probability: f64,
    pub fair_odds: Option<f64>,
    pub reasoning: String,
}

pub fn stat_lines(predictions: &StatsPredictions) -> Vec<StatLine> {
    predictions
        .entries()
        .into_iter()
        .map(|(name, prediction)| StatLine {
            stat: name.to_string(),
            home: prediction.home,
            away: prediction.away,
            total: prediction.total_value(),
            confidence: prediction.effective_confidence(),
        })
        .collect()
}

pub fn stat_market_lines(predictions: &StatsPredictions) -> Vec<StatMarketLine> {
    let mut out = Vec::new();
    for (name, prediction) in predictions.entries() {
        for market in prediction.markets() {
            out.push(StatMarketLine {
                stat: name.to_string(),
                market: market.market.clone(),
                prediction: market.prediction.clone(),
                probability: market.probability,
                fair_odds: display_fair_odds(market.probability),
                reasoning: market.reasoning.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{form_breakdown, form_pct, h2h_breakdown, xg_share, FormTrend};
    use crate::types::{H2hSummary, TeamForm};

    fn form(wins: u32, draws: u32, losses: u32) -> TeamForm {
        TeamForm {
            goals_scored: 9.0,
            goals_conceded: 4.0,
            wins,
            draws,
            losses,
            match_count: wins + draws + losses,
        }
    }

    #[test]
    fn form_counts_draws_as_half() {
        assert!((form_pct(&form(3, 2, 0)) - 80.0).abs() < 1e-9);
        assert_eq!(form_pct(&form(0, 0, 0)), 0.0);
    }

    #[test]
    fn form_trend_uses_sixty_forty_bands() {
        assert_eq!(form_breakdown(&form(3, 0, 2)).trend, FormTrend::Up);
        assert_eq!(form_breakdown(&form(2, 0, 3)).trend, FormTrend::Down);
        assert_eq!(form_breakdown(&form(2, 1, 2)).trend, FormTrend::Flat);
        assert_eq!(form_breakdown(&form(2, 1, 2)).record, "2-1-2");
    }

    #[test]
    fn h2h_percentages_handle_no_meetings() {
        let empty = h2h_breakdown(&H2hSummary::default());
        assert_eq!(empty.total, 0);
        assert_eq!(empty.home_win_pct, 0.0);

        let summary = H2hSummary {
            home_wins: 2,
            draws: 1,
            away_wins: 1,
            avg_home_goals: 1.5,
            avg_away_goals: 1.0,
            match_count: 4,
        };
        let breakdown = h2h_breakdown(&summary);
        assert_eq!(breakdown.total, 4);
        assert!((breakdown.home_win_pct - 50.0).abs() < 1e-9);
        assert!((breakdown.away_win_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn xg_share_splits_total() {
        let (home, away) = xg_share(1.5, 0.5);
        assert!((home - 75.0).abs() < 1e-9);
        assert!((away - 25.0).abs() < 1e-9);
        assert_eq!(xg_share(0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn h2h_total_saturates_on_huge_counts() {
        let summary = H2hSummary {
            home_wins: u32::MAX,
            draws: 7,
            away_wins: 3,
            avg_home_goals: 1.0,
            avg_away_goals: 1.0,
            match_count: 0,
        };
        let breakdown = h2h_breakdown(&summary);
        assert_eq!(breakdown.total, u32::MAX);
        assert!((breakdown.home_win_pct - 100.0).abs() < 1e-6);
    }
}
