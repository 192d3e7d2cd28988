//! Real-time audio core for a clip-launching DAW: a lock-free UI/audio
//! state handoff, a node-graph DSP runtime hosting third-party plugins
//! through an external [`plugin::PluginAbi`], and the scheduler that turns
//! clips, live input, and automation into per-block plugin events.
//!
//! ```ignore
//! let config = EngineConfig::default();
//! let mut engine = AudioEngine::new(&config)?;
//! engine.publish(&session_model);
//! engine.render(&mut output, frames);
//! ```

pub mod compat;
pub mod config;
pub mod error;

pub use config::EngineConfig;
pub use error::{Error, Result};

pub mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};

pub mod model;
pub use model::SessionModel;

pub mod snapshot;
pub use snapshot::StateSnapshot;

pub mod events;
pub use events::{EventList, EventPayload, TimedEvent};

pub mod exchange;
pub use exchange::StateExchange;

pub mod transport;
pub use transport::TransportClock;

pub mod metering;
pub use metering::{CpuMeter, CpuMetrics, LoadBand};

pub mod diagnostics;
pub use diagnostics::Counters;

pub mod plugin;
pub use plugin::{HostCallbacks, JobQueue, PluginAbi, ThreadToken};

pub mod project;
pub use project::Project;

pub mod graph;
pub use graph::{Graph, NodeKind};

pub mod scheduler;
pub use scheduler::{RecordedNote, Scheduler};

pub mod engine;
pub use engine::AudioEngine;

#[cfg(feature = "cpal-backend")]
pub mod device;
