/*!
# Vigil DevKit - test doubles for agent development

Facilitates testing agent behavior without touching a real host:
- Capturing telemetry/alert sinks with assertion helpers
- Scripted metric sources with per-probe failure and hang injection
- A harness wiring an agent to mocks with a fast test cadence
*/

pub mod harness;
pub mod sinks;
pub mod sources;

pub use harness::TestHarness;
pub use sinks::{CapturingAlertSink, CapturingTelemetrySink};
pub use sources::StaticMetricSource;
