pub mod inventory_item;
pub mod inventory_location;
pub mod inventory_reservation;
pub mod inventory_transaction;

pub use inventory_item::{Entity as InventoryItem, InventoryStatus};
pub use inventory_location::Entity as InventoryLocation;
pub use inventory_reservation::{Entity as InventoryReservation, ReservationStatus};
pub use inventory_transaction::{Entity as InventoryTransaction, TransactionType};
