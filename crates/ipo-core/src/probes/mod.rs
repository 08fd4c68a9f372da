//! Measurement probes
//!
//! Each probe turns external tool output into one typed result. Tool
//! invocation goes through `ProbeRunner` and DNS lookups through
//! `Resolver`, so every probe can be driven with scripted outputs.

mod bufferbloat;
mod dns;
mod iperf;
mod jitter;
mod ping;
mod system;
mod throughput;

pub use bufferbloat::{grade_latency, BufferbloatProbe, BufferbloatSamples};
pub use dns::{sort_results, DnsProbe, SYSTEM_RESOLVER_NAME};
pub use iperf::{Direction, Iperf3, TcpRun, UdpRun};
pub use jitter::JitterProbe;
pub use ping::{parse_output, Platform, PingProbe, PingTranscript};
pub use system::SystemInspector;
pub use throughput::ThroughputProbe;

#[cfg(test)]
pub(crate) use iperf::fixtures as iperf_fixtures;
