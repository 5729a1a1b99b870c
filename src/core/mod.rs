// Core trading logic modules

pub mod grid;
pub mod order_state;
pub mod funds;
pub mod controller;

// Re-export commonly used types
pub use grid::{build_grid, floor_level, nearest_level, Grid};
pub use order_state::{is_level_occupied, stale_orders, OrderSnapshot};
pub use funds::{has_sufficient_funds, reservation_cost};
pub use controller::{
    CancelOutcome, Controller, ControllerSettings, PlacementOutcome, SkipReason, TickReport,
};
