//! The overview dashboard: chart catalogue, controller and service loop.

pub mod catalog;
mod controller;
mod service;

pub use catalog::{ChartQuery, ChartSpec, Presentation, overview};
pub use controller::{Dashboard, DashboardSnapshot};
pub use service::{DashboardCommand, DashboardHandle, DashboardService};
