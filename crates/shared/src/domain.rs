use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned record identity. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The editable part of a user record, as sent in create/update bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: UserId,
    #[serde(flatten)]
    pub fields: UserFields,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, fields: UserFields) -> Self {
        Self {
            id: UserId(id.into()),
            fields,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.fields.first_name, self.fields.last_name)
    }
}
