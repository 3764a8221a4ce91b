//! Workers and dispatch
//!
//! - `pool`: workers, their labels, and the inventory file
//! - `scheduler`: label matching and parallel dispatch of instances

pub mod pool;
pub mod scheduler;

pub use pool::{Worker, WorkerInventory, WorkerPool, WorkerSpec};
pub use scheduler::{DispatchPlan, Dispatcher, InstanceResult};
