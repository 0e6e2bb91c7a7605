//! Table Partition Planner.

pub mod layout;
pub mod table_partition_planner;

pub use layout::{extension_capacity, plan, ColumnLayout, PlanColumn, PlanError};
pub use table_partition_planner::{extension_table_name, PartitionPlan, TablePartitionPlanner};
