mod allocator;
mod balance;
mod points_service;
mod recorder;
#[cfg(test)]
mod tests;

pub use allocator::{Allocation, SpendAllocator};
pub use balance::BalanceCalculator;
pub use points_service::PointsService;
pub use recorder::TransactionRecorder;
