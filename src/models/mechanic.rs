use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MechanicApplication {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub postcode: String,
    pub address: Option<String>,
    /// Blob storage path of the uploaded police report PDF.
    pub police_report: String,
    pub created_at: NaiveDateTime,
}

/// Public view of a mechanic: the mirrored identity profile joined with their
/// application details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MechanicProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub postcode: String,
    pub phone: String,
    pub police_report: String,
    pub address: Option<String>,
}
