//! Ready-made handlers for common document automation patterns.
//!
//! Each handler here is a complete [`EventHandler`](crate::handler::EventHandler)
//! implementation built on the store/action client traits, usable as-is or as
//! a template for custom handlers. They all follow the same discipline:
//! re-check their guard condition against the live store before writing, keep
//! each write atomic, and classify failures so the runtime can report them.

mod assets;
mod generate;
mod stamp;
mod sync;

pub use assets::{AssetObservation, AssetObserver, SKIP_NO_ASSET_METADATA};
pub use generate::GenerateFieldHandler;
pub use stamp::{PublishStampHandler, SKIP_ALREADY_DEFINED};
pub use sync::ExternalSyncHandler;
