//! Domain types for crossing arrival estimates.
//!
//! Types here enforce their invariants at construction time, so code that
//! receives them can trust their validity.

mod eta;
mod gate;
mod time;
mod train_number;

pub use eta::{ArrivalEstimate, EtaDeriver, SourceTag, travel_minutes};
pub use gate::{GateTiming, GateWindow, gate_windows};
pub use time::{Clock, ClockTime, ManualClock, SystemClock, TimeError, resolve_clock_time};
pub use train_number::{InvalidTrainNumber, TrainNumber};
