use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Mechanic,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Mechanic => "mechanic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mechanic" => Some(UserType::Mechanic),
            _ => None,
        }
    }
}
