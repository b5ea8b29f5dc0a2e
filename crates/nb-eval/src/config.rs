//! Engine-wide tunables. A single struct carried on [`crate::Engine`]
//! rather than process-wide statics, per the "no singletons" design note.

/// Tunables for the cell graph, time-condition engine, and reaction loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial horizon, in seconds, a schedule cell casts ahead of `now`
    /// when first enabled.
    pub initial_horizon_seconds: i64,
    /// How many times a schedule's horizon may double (each time casting
    /// found no true interval within the cached window) before the engine
    /// gives up and reports `ForecastStopped`.
    pub max_horizon_doublings: u32,
    /// Hard ceiling on a schedule's cast horizon regardless of doubling
    /// count; guards against runaway expansion for calendar units (e.g.
    /// `century`) whose natural step is enormous.
    pub max_horizon_seconds: i64,
    /// Depth guard on nested react() re-entrancy triggered by actions that
    /// themselves assert during firing, so a misbehaving rule set cannot
    /// spin the single-threaded loop forever.
    pub max_stimulus_cycles: u32,
    /// Whether to maintain the axon equality index described in the spec's
    /// cell-graph section. Purely a performance optimization; semantics
    /// are identical with it disabled.
    pub axon_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_horizon_seconds: 24 * 3600,
            max_horizon_doublings: 16,
            max_horizon_seconds: 50 * 365 * 24 * 3600,
            max_stimulus_cycles: 10_000,
            axon_enabled: true,
        }
    }
}
