pub mod availability;
pub mod booking;
pub mod change;
pub mod mechanic;
pub mod user;

pub use availability::AvailabilitySlot;
pub use booking::{
    Booking, BookingStatus, FuelType, NewRepair, RepairUpdate, Transmission, WorkType,
};
pub use change::{ChangeEvent, ChangeKind, Row, Table};
pub use mechanic::{MechanicApplication, MechanicProfile};
pub use user::{User, UserType};
