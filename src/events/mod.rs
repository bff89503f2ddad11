//! Translation of a subprocess's structured log into typed events.
//!
//! Streams are unbounded, yield events in arrival order and skip any line that
//! does not parse or names an unknown event.

mod maker;
mod stream;

pub use maker::{parse_maker_line, MakerEvent, SwapProgress, SyncPhase, XmrBalance};
pub use stream::{event_stream, EventStream, LineParser};
