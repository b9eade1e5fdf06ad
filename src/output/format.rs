use chrono::{DateTime, Utc};
use chrono_tz::Europe::Malta;
use serde::Serialize;

use crate::criteria::FilterCriteria;
use crate::ranking::row_key;
use crate::types::{MatchStatus, Opportunity};

pub const PLACEHOLDER: &str = "-";
pub const KICKOFF_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvTier {
    Strong,
    Positive,
    Marginal,
    Negative,
}

pub fn ev_tier(ev: f64) -> EvTier {
    if ev >= 10.0 {
        EvTier::Strong
    } else if ev >= 5.0 {
        EvTier::Positive
    } else if ev >= 0.0 {
        EvTier::Marginal
    } else {
        EvTier::Negative
    }
}

pub fn format_ev(ev: f64) -> String {
    if ev > 0.0 {
        format!("+{ev:.2}%")
    } else {
        format!("{ev:.2}%")
    }
}

pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

pub fn format_odds(odds: f64) -> String {
    format!("{odds:.2}")
}

/// Break-even price `1 / p` rounded to cents, or `None` when `p` cannot price.
pub fn display_fair_odds(probability: f64) -> Option<f64> {
    if !probability.is_finite() || probability <= 0.0 {
        return None;
    }
    let raw = 1.0 / probability;
    Some((raw * 100.0).round() / 100.0)
}

pub fn format_display_fair_odds(probability: f64) -> String {
    display_fair_odds(probability)
        .map(format_odds)
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Kickoff time in Malta local time, `DD/MM/YYYY HH:mm`.
pub fn format_kickoff(unix_seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_seconds, 0)
        .map(|utc| utc.with_timezone(&Malta).format(KICKOFF_FORMAT).to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn status_label(status: MatchStatus) -> String {
    status.to_string()
}

pub fn truncate(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }
    let head: String = text.chars().take(length).collect();
    format!("{head}...")
}

pub fn opportunity_noun(count: usize) -> &'static str {
    if count == 1 {
        "opportunity"
    } else {
        "opportunities"
    }
}

pub fn summary_line(count: usize, criteria: &FilterCriteria) -> String {
    format!(
        "Showing {count} {} with EV ≥ {}% ({})",
        opportunity_noun(count),
        criteria.min_ev_percent,
        criteria.selected_market.label()
    )
}

pub const EMPTY_STATE: &str =
    "No EV opportunities found. Try adjusting your filters or check back later.";

/// One ranked opportunity as it is shown to a reader.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OpportunityRow {
    pub key: String,
    pub rank: usize,
    pub market: String,
    pub outcome: String,
    pub bookmaker: String,
    pub bookmaker_odds: f64,
    pub fair_odds: f64,
    pub display_fair_odds: Option<f64>,
    pub probability: f64,
    pub ev_percent: f64,
    pub ev_tier: EvTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OpportunityRow {
    pub fn from_ranked(index: usize, opportunity: &Opportunity) -> Self {
        Self {
            key: row_key(opportunity, index),
            rank: index + 1,
            market: opportunity.market.clone(),
            outcome: opportunity.outcome.clone(),
            bookmaker: opportunity.bookmaker.clone(),
            bookmaker_odds: opportunity.bookmaker_odds,
            fair_odds: opportunity.fair_odds,
            display_fair_odds: display_fair_odds(opportunity.probability),
            probability: opportunity.probability,
            ev_percent: opportunity.ev_percent,
            ev_tier: ev_tier(opportunity.ev_percent),
            reason: opportunity.reason.clone(),
        }
    }
}

pub fn to_rows(ranked: &[&Opportunity]) -> Vec<OpportunityRow> {
    ranked
        .iter()
        .enumerate()
        .map(|(idx, opp)| OpportunityRow::from_ranked(idx, opp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        display_fair_odds, ev_tier, format_display_fair_odds, format_ev, format_kickoff,
        format_probability, summary_line, truncate, EvTier,
    };
    use crate::criteria::FilterCriteria;

    #[test]
    fn formats_ev_with_sign() {
        assert_eq!(format_ev(7.4), "+7.40%");
        assert_eq!(format_ev(-1.2), "-1.20%");
        assert_eq!(format_ev(0.0), "0.00%");
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(ev_tier(12.0), EvTier::Strong);
        assert_eq!(ev_tier(10.0), EvTier::Strong);
        assert_eq!(ev_tier(5.0), EvTier::Positive);
        assert_eq!(ev_tier(0.0), EvTier::Marginal);
        assert_eq!(ev_tier(-0.1), EvTier::Negative);
    }

    #[test]
    fn fair_odds_rounds_and_guards_zero() {
        assert_eq!(display_fair_odds(0.51), Some(1.96));
        assert_eq!(display_fair_odds(0.0), None);
        assert_eq!(display_fair_odds(f64::NAN), None);
        assert_eq!(format_display_fair_odds(0.0), "-");
        assert_eq!(format_display_fair_odds(0.25), "4.00");
    }

    #[test]
    fn probability_uses_one_decimal() {
        assert_eq!(format_probability(0.5123), "51.2%");
    }

    #[test]
    fn kickoff_is_rendered_in_malta_time() {
        // 2024-06-10 18:00 UTC is 20:00 in Malta (CEST).
        assert_eq!(format_kickoff(1_718_042_400), "10/06/2024 20:00");
        // 2024-01-15 12:00 UTC is 13:00 in Malta (CET).
        assert_eq!(format_kickoff(1_705_320_000), "15/01/2024 13:00");
    }

    #[test]
    fn truncates_long_text() {
        assert_eq!(truncate("Manchester United", 10), "Manchester...");
        assert_eq!(truncate("Inter", 10), "Inter");
    }

    #[test]
    fn summary_pluralizes() {
        let criteria = FilterCriteria::default();
        assert_eq!(
            summary_line(1, &criteria),
            "Showing 1 opportunity with EV ≥ 4% (All Markets)"
        );
        assert!(summary_line(3, &criteria).contains("3 opportunities"));
    }
}
