pub mod schema;

pub use schema::{
    normalize_min_ev, FilterCriteria, MarketFilter, MarketParseError, SortField, SortOrder,
    SortParseError, DEFAULT_MIN_EV,
};
