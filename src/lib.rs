//! Interop relay monitor
//!
//! Tracks cross-chain messages from the `SentMessage` event on their source
//! chain to the relay outcome on their destination chain, and orchestrates
//! swap -> bridge -> swap workflows on top of that tracking.

pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod message;
pub mod metrics;
pub mod monitor;
pub mod workflow;

pub use error::{MonitorError, MonitorResult};
pub use message::{MessageHash, MessageIdentifier, MessageState, MessageStatus, OutboundMessage};
pub use monitor::LifecycleMonitor;
pub use workflow::WorkflowOrchestrator;
