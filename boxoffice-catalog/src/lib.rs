pub mod concert;
pub mod inventory;

pub use concert::{CatalogService, SeatBatch, MAX_SEATS};
pub use inventory::TicketAllocator;
