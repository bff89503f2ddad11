//! The call boundary to the external swap engine.
//!
//! The orchestrator never sees protocol logic. It hands the engine a JSON
//! request and, for `buy`/`resume`, receives progress as [`BuyerEvent`]s on
//! the session's channel. Every call blocks, possibly for hours, so session
//! managers run them on blocking worker threads.

mod command;
mod events;
mod types;

pub use command::{CommandEngine, ENGINE_BINARY};
pub use events::{BuyerEvent, EventSink};
pub use types::{
    CancelAndRefundRequest, CancelAndRefundResponse, EngineParams, GetHistoryRequest,
    GetHistoryResponse, HistoryEntry, ListSellersRequest, ListSellersResponse, ResumeRequest,
    Seller, SellerStatus, SwapRequest, NO_PROXY_PORT,
};

use crate::error::Result;

/// Five blocking request/response calls.
///
/// `buy` and `resume` return when the engine stops driving the swap, either
/// because it reached a final state or because it failed. Implementations
/// should poll [`EventSink::is_running`] and return early once it is false.
pub trait Engine: Send + Sync {
    fn buy(&self, request: &SwapRequest, events: &EventSink) -> Result<()>;

    fn resume(&self, request: &ResumeRequest, events: &EventSink) -> Result<()>;

    fn cancel_and_refund(&self, request: &CancelAndRefundRequest) -> Result<CancelAndRefundResponse>;

    fn list_sellers(&self, request: &ListSellersRequest) -> Result<ListSellersResponse>;

    fn get_history(&self, request: &GetHistoryRequest) -> Result<GetHistoryResponse>;
}
