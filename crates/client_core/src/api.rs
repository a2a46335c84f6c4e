use std::{fmt, sync::Arc};

use serde_json::Value;
use shared::{
    domain::{UserId, UserRecord},
    protocol::{user_path, USERS_PATH},
};

use crate::{error::ClientError, transport::Transport, validation::ValidUser};

/// Identifies one cacheable server query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Users,
    User(UserId),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Users => f.write_str("users"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryData {
    Users(Vec<UserRecord>),
    User(UserRecord),
}

impl QueryData {
    pub fn as_users(&self) -> Option<&[UserRecord]> {
        match self {
            Self::Users(users) => Some(users),
            Self::User(_) => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserRecord> {
        match self {
            Self::User(user) => Some(user),
            Self::Users(_) => None,
        }
    }
}

/// Typed calls against the user-information resource.
#[derive(Clone)]
pub struct UserApi {
    transport: Arc<dyn Transport>,
}

impl UserApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, ClientError> {
        let body = self.transport.get(USERS_PATH).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn get_user(&self, id: &UserId) -> Result<UserRecord, ClientError> {
        let body = self
            .transport
            .get(&user_path(id))
            .await
            .map_err(|err| match err {
                ClientError::NotFound { message, .. } => {
                    ClientError::not_found(format!("user {id}"), message)
                }
                other => other,
            })?;
        if body.is_null() {
            return Err(ClientError::not_found(format!("user {id}"), None));
        }
        Ok(serde_json::from_value(body)?)
    }

    /// Returns the created record when the server echoes one back.
    pub async fn create_user(&self, user: &ValidUser) -> Result<Option<UserRecord>, ClientError> {
        let body = serde_json::to_value(user.fields())?;
        let response = self.transport.post(USERS_PATH, body).await?;
        Ok(record_from_ack(response))
    }

    pub async fn update_user(
        &self,
        id: &UserId,
        user: &ValidUser,
    ) -> Result<Option<UserRecord>, ClientError> {
        let body = serde_json::to_value(user.fields())?;
        let response = self.transport.put(&user_path(id), body).await?;
        Ok(record_from_ack(response))
    }

    pub async fn delete_user(&self, id: &UserId) -> Result<(), ClientError> {
        self.transport.delete(&user_path(id)).await?;
        Ok(())
    }

    pub async fn query(&self, key: &QueryKey) -> Result<QueryData, ClientError> {
        match key {
            QueryKey::Users => self.list_users().await.map(QueryData::Users),
            QueryKey::User(id) => self.get_user(id).await.map(QueryData::User),
        }
    }
}

fn record_from_ack(body: Value) -> Option<UserRecord> {
    serde_json::from_value(body).ok()
}
