//! Message pipeline between a Player and the panels that render its data.
//!
//! # Architecture
//!
//! ```text
//! Player ──state──► MessagePipelineProvider ──► PipelineStore (reducer)
//!    ▲                       │                        │
//!    │ subscriptions,        │ watch channel          ▼
//!    │ playback, publish     └──────────────► MessagePipelineContext ──► panels
//!    └────────────────── MessagePipeline (handle) ◄──────────────────────┘
//! ```
//!
//! # Design
//!
//! - **Single writer**: all state transitions go through `PipelineStore::dispatch`
//!   under one mutex; panels only ever see immutable context snapshots.
//! - **Reference identity**: unchanged fields keep their `Arc`, see [`context`].
//! - **Backpressure**: the Player waits for render and paused panels each frame.

pub mod context;
pub mod provider;
pub mod store;

pub use context::{
    MessageEventsBySubscriberId, MessagePipelineContext, PlaybackApi, PlaybackFn, RenderDone,
    SeekFn, SpeedFn,
};
pub use provider::{MessagePipeline, MessagePipelineProvider, PipelineEnvironment};
pub use store::{PipelineAction, PipelineStore};
