//! # message-pipeline: Player-to-panel message distribution
//!
//! Sits between a data source (a [`player::Player`]: log file reader, live
//! connection, recorded playback) and many independent panels. Panels
//! declare what topics they need; the pipeline merges those requests for the
//! Player, fans incoming messages out per panel, and paces the Player so a
//! new frame is only produced once the previous one has been rendered.
//!
//! ## Modules
//!
//! - [`subscriptions`]: merging panel subscriptions for the Player
//! - [`pipeline`]: the reducer, context snapshots and the provider
//! - [`pause_frame`]: letting panels hold a frame while async work finishes
//! - [`assets`]: `package://` and HTTP asset resolution
//! - [`player`]: the Player trait and an in-memory recorded Player
//!
//! ## Example
//!
//! ```ignore
//! use message_pipeline::{
//!     config::PipelineConfig,
//!     notify::TracingNotifier,
//!     pipeline::{MessagePipelineProvider, PipelineEnvironment},
//!     types::Subscription,
//! };
//!
//! let config = PipelineConfig::load_or_default();
//! let env = PipelineEnvironment::from_config(&config, Arc::new(TracingNotifier))?;
//! let provider = MessagePipelineProvider::new(Some(player), env, &config);
//!
//! let pipeline = provider.pipeline();
//! pipeline.set_subscriptions("plot-1", vec![Subscription::new("/odom")]);
//!
//! let mut rx = pipeline.subscribe();
//! while rx.changed().await.is_ok() {
//!     let context = rx.borrow_and_update().clone();
//!     if let Some(messages) = context.messages_for("plot-1") {
//!         // draw
//!     }
//!     pipeline.render_committed();
//! }
//! ```

pub mod assets;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod pause_frame;
pub mod pipeline;
pub mod player;
pub mod subscriptions;
pub mod types;

pub use error::{PipelineError, Result, ResultExt};
pub use pipeline::{MessagePipeline, MessagePipelineContext, MessagePipelineProvider};
pub use player::{Player, PlayerCapabilities};
pub use types::{MessageEvent, PlayerState, Subscription};
