//! Calendar to decision-function pipeline
//!
//! `ical` reads the document, `expand` turns recurring events into concrete
//! occurrences for one window, `grid` rasterizes them onto a [`TimeGrid`]
//! and `evaluator` answers "on or off, and as what" for a given instant.
//!
//! [`TimeGrid`]: servertide_domain::TimeGrid

pub mod evaluator;
pub mod expand;
pub mod grid;
pub mod ical;
pub mod rounding;

pub use evaluator::evaluate;
pub use expand::{expand_events, ExpansionWindow};
pub use grid::{compile, window_start, GridSettings};
pub use ical::{parse_calendar, IcalTime, VEvent};
pub use rounding::{ceil_to_interval, floor_to_interval};
