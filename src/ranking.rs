//! Opportunity ranking: the filter and ordering applied to every opportunity list
//! before it is displayed.
//!
//! `rank` is pure. It reads its inputs, allocates a new vector of references and
//! never logs, blocks or touches shared state, so it is safe to call on every
//! refresh and from any number of tasks at once.

use std::cmp::Ordering;

use crate::criteria::{FilterCriteria, SortField, SortOrder};
use crate::types::Opportunity;

/// Filters `opportunities` by market and minimum EV, then stable-sorts the
/// survivors by the selected field.
///
/// An opportunity is kept when the market filter accepts its market and
/// `ev_percent >= min_ev_percent`. Equal sort keys keep their input order in
/// both directions, and `-0.0` ties with `0.0`. Floats are otherwise compared
/// with IEEE total ordering, so a `NaN` key never panics; a `NaN` EV fails the
/// threshold check and is dropped.
pub fn rank<'a>(opportunities: &'a [Opportunity], criteria: &FilterCriteria) -> Vec<&'a Opportunity> {
    let mut kept: Vec<&Opportunity> = opportunities
        .iter()
        .filter(|opp| passes_filters(opp, criteria))
        .collect();
    kept.sort_by(|a, b| compare(a, b, criteria.sort_by, criteria.sort_order));
    kept
}

/// Owned variant of [`rank`] for callers that need to outlive the input list.
pub fn rank_owned(opportunities: &[Opportunity], criteria: &FilterCriteria) -> Vec<Opportunity> {
    rank(opportunities, criteria).into_iter().cloned().collect()
}

pub fn passes_filters(opportunity: &Opportunity, criteria: &FilterCriteria) -> bool {
    criteria.selected_market.matches(&opportunity.market)
        && opportunity.ev_percent >= criteria.min_ev_percent
}

pub fn sort_key(opportunity: &Opportunity, field: SortField) -> f64 {
    match field {
        SortField::Ev => opportunity.ev_percent,
        SortField::Odds => opportunity.bookmaker_odds,
        SortField::Probability => opportunity.probability,
    }
}

fn compare(a: &Opportunity, b: &Opportunity, field: SortField, order: SortOrder) -> Ordering {
    // Adding +0.0 folds -0.0 into 0.0 so signed zeros tie.
    let (x, y) = (sort_key(a, field) + 0.0, sort_key(b, field) + 0.0);
    let ordering = x.total_cmp(&y);
    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Display key for a ranked row; duplicates stay distinct through the index.
pub fn row_key(opportunity: &Opportunity, index: usize) -> String {
    format!(
        "{}-{}-{}-{}",
        opportunity.bookmaker, opportunity.market, opportunity.outcome, index
    )
}
