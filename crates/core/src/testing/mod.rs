//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits and
//! a simulated robot controller, allowing end-to-end tests of the job
//! pipeline without a camera, storage service or physical robot.
//!
//! # Example
//!
//! ```rust,ignore
//! use printsort_core::testing::{MockInspector, MockJobStore, MockUploader, SimulatedRobot};
//!
//! let store = Arc::new(MockJobStore::new());
//! let (link, inbox) = DeviceLink::new();
//! let robot = SimulatedRobot::connect(&link);
//!
//! // Script the robot
//! robot.ignore("ROBOT_PICKUP_PRINT").await;
//! ```

mod mock_inspector;
mod mock_store;
mod mock_uploader;
mod robot;

pub use mock_inspector::MockInspector;
pub use mock_store::MockJobStore;
pub use mock_uploader::MockUploader;
pub use robot::{acknowledgement_for, SimulatedRobot};
