mod service;

pub use service::{ActuatorCommand, ControlService};
