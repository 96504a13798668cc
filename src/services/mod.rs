// Status derivation shared by every quantity write
pub mod inventory_status;

// Append-only transaction log
pub mod inventory_transactions;

// Items, locations and stock movements
pub mod inventory;

// Reservations and their expiry
pub mod inventory_reservation_service;
pub mod reservation_sweeper;
