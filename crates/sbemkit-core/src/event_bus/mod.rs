//! # Event Bus Module
//!
//! Channel between background runs and whatever presents their progress.
//! Workers emit typed events; readers poll with a cursor and a filter.
//!
//! ```rust,ignore
//! use sbemkit_core::event_bus::{event_bus, AppEvent, EventFilter, Severity};
//!
//! let mut cursor = event_bus().last_seq();
//! // ... on each presentation tick:
//! for record in event_bus().records_after(cursor, &EventFilter::AtLeast(Severity::Warning)) {
//!     cursor = record.seq;
//!     if let AppEvent::Log(line) = &record.event {
//!         println!("{}", line);
//!     }
//! }
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
