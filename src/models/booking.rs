use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::AvailabilitySlot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub mechanic_id: Option<String>,
    pub reg_number: String,
    pub postcode: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub transmission: Transmission,
    pub fuel_type: FuelType,
    pub mileage: Option<i64>,
    pub work_types: Vec<WorkType>,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub problem_description: String,
    pub availability: Vec<AvailabilitySlot>,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A fully validated submission, ready to be persisted as a pending booking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRepair {
    pub reg_number: String,
    pub postcode: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub transmission: Transmission,
    pub fuel_type: FuelType,
    pub mileage: Option<i64>,
    pub work_types: Vec<WorkType>,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub problem_description: String,
    pub availability: Vec<AvailabilitySlot>,
}

/// Owner-editable subset of a booking. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub problem_description: Option<String>,
    pub year: Option<i32>,
}

impl RepairUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.problem_description.is_none()
            && self.year.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "accepted" => Some(BookingStatus::Accepted),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// The only status reachable from this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            BookingStatus::Pending => Some(BookingStatus::Accepted),
            BookingStatus::Accepted => Some(BookingStatus::Completed),
            BookingStatus::Completed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkType {
    Repair,
    Diagnostics,
    Servicing,
    #[serde(rename = "MOT")]
    Mot,
}

impl WorkType {
    pub const ALL: [WorkType; 4] = [
        WorkType::Repair,
        WorkType::Diagnostics,
        WorkType::Servicing,
        WorkType::Mot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Repair => "Repair",
            WorkType::Diagnostics => "Diagnostics",
            WorkType::Servicing => "Servicing",
            WorkType::Mot => "MOT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.as_str() == s)
    }

    /// Non-binding (low, high) price contribution in naira.
    pub fn price_range(&self) -> (u64, u64) {
        match self {
            WorkType::Repair => (40_000, 120_000),
            WorkType::Diagnostics => (10_000, 30_000),
            WorkType::Servicing => (30_000, 80_000),
            WorkType::Mot => (15_000, 40_000),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Transmission {
    Manual,
    Automatic,
    #[serde(rename = "CVT")]
    Cvt,
    Other,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transmission::Manual => "Manual",
            Transmission::Automatic => "Automatic",
            Transmission::Cvt => "CVT",
            Transmission::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Manual" => Some(Transmission::Manual),
            "Automatic" => Some(Transmission::Automatic),
            "CVT" => Some(Transmission::Cvt),
            "Other" => Some(Transmission::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FuelType {
    Petrol,
    Diesel,
    Hybrid,
    Electric,
    Other,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelType::Petrol => "Petrol",
            FuelType::Diesel => "Diesel",
            FuelType::Hybrid => "Hybrid",
            FuelType::Electric => "Electric",
            FuelType::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Petrol" => Some(FuelType::Petrol),
            "Diesel" => Some(FuelType::Diesel),
            "Hybrid" => Some(FuelType::Hybrid),
            "Electric" => Some(FuelType::Electric),
            "Other" => Some(FuelType::Other),
            _ => None,
        }
    }
}
