pub mod level;
pub mod schedule;
pub mod worker;

pub use level::{ControlledLevelSwitch, Level, ParseLevelError};
pub use schedule::{
    ConnectionSchedule, MAXIMUM_BACKOFF_INTERVAL, MINIMUM_BACKOFF_PERIOD,
};
pub use worker::{LogShipper, ShipperConfig, ShipperError, ShipperHandle};
