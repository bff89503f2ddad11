mod buyer;
mod maker;
mod tools;

pub use buyer::{run_buy, run_cancel_refund, run_history, run_resume, run_sellers};
pub use maker::run_maker;
pub use tools::{run_kill_orphans, run_price};
