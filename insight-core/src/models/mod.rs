pub mod event;

pub use event::{EventData, Photo, ScenarioStep, SessionEvent, SessionStep};
