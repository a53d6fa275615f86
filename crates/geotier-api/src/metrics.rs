//! Prometheus text exposition format.
//!
//! Renders the cache tier status table for scraping by a Prometheus
//! server or compatible agent.

use geotier_state::{TierState, TierStatusTable};

/// Render the tier status table into Prometheus text format.
///
/// Every state gets a count line, even when zero, so dashboards see a
/// stable series set.
pub fn render_prometheus(tiers: &TierStatusTable) -> String {
    let mut out = String::new();

    out.push_str("# HELP geotier_cache_tiers Number of cache tier records by state.\n");
    out.push_str("# TYPE geotier_cache_tiers gauge\n");
    for state in TierState::ALL {
        out.push_str(&format!(
            "geotier_cache_tiers{{state=\"{}\"}} {}\n",
            state,
            tiers.count_in(state)
        ));
    }

    out.push_str("# HELP geotier_cache_tier_state Current state of each cache tier.\n");
    out.push_str("# TYPE geotier_cache_tier_state gauge\n");
    for r in tiers.iter() {
        out.push_str(&format!(
            "geotier_cache_tier_state{{rule=\"{}\",pool=\"{}\",cache_pool=\"{}\",state=\"{}\"}} 1\n",
            escape(&r.placement_rule),
            escape(&r.backing_pool),
            escape(&r.cache_pool),
            r.state
        ));
    }

    out.push_str(
        "# HELP geotier_cache_tier_last_transition_seconds Unix time of the last state change or refresh.\n",
    );
    out.push_str("# TYPE geotier_cache_tier_last_transition_seconds gauge\n");
    for r in tiers.iter() {
        out.push_str(&format!(
            "geotier_cache_tier_last_transition_seconds{{rule=\"{}\",pool=\"{}\",cache_pool=\"{}\"}} {}\n",
            escape(&r.placement_rule),
            escape(&r.backing_pool),
            escape(&r.cache_pool),
            r.last_transition_time
        ));
    }

    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
