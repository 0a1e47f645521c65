#[path = "property/score_bounds.rs"]
mod score_bounds;

#[path = "property/monotone_privacy.rs"]
mod monotone_privacy;

#[path = "property/fires_once.rs"]
mod fires_once;
