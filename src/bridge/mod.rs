//! Bidirectional event bridge.
//!
//! Inbound events from the script context are recorded per component and
//! dispatched to registered callbacks. Recorded events can be queried,
//! exported as JSON and replayed against whatever callbacks are registered
//! at replay time.

mod log;
mod manager;
mod script;

pub use log::EventLog;
pub use manager::{Bridge, EventCallback, InboundEvent, StateListener};
pub use script::{bridge_script, wrap_with_bridge, RECEIVE_FUNCTION, SEND_FUNCTION};
