//! In-memory stand-in for the user-information API used by unit tests.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{UserFields, UserId, UserRecord},
    error::ApiErrorBody,
    protocol::USERS_PATH,
};
use tokio::sync::Semaphore;

use crate::{
    api::UserApi,
    cache::{CacheConfig, CacheHandle, QueryCache},
    error::ClientError,
    transport::Transport,
    validation::ValidUser,
};

#[derive(Default)]
pub(crate) struct FakeBackend {
    users: Mutex<Vec<UserRecord>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    read_gate: Option<Arc<Semaphore>>,
    write_gate: Option<Arc<Semaphore>>,
    reject_writes: Mutex<Option<String>>,
    fail_reads: Mutex<Option<ClientError>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_users(users: Vec<UserRecord>) -> Self {
        let backend = Self::new();
        *backend.users.lock().expect("users") = users;
        backend
    }

    /// Reads block until [`FakeBackend::release_reads`] hands out permits.
    pub(crate) fn gate_reads(mut self) -> Self {
        self.read_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn gate_writes(mut self) -> Self {
        self.write_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub(crate) fn release_reads(&self, permits: usize) {
        if let Some(gate) = &self.read_gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn release_writes(&self, permits: usize) {
        if let Some(gate) = &self.write_gate {
            gate.add_permits(permits);
        }
    }

    pub(crate) fn reject_writes_with(&self, message: &str) {
        *self.reject_writes.lock().expect("reject") = Some(message.to_string());
    }

    pub(crate) fn fail_reads_with(&self, err: Option<ClientError>) {
        *self.fail_reads.lock().expect("fail") = err;
    }

    pub(crate) fn users(&self) -> Vec<UserRecord> {
        self.users.lock().expect("users").clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, method: &str, path: &str) {
        self.calls
            .lock()
            .expect("calls")
            .push(format!("{method} {path}"));
    }

    async fn pass(gate: &Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
    }

    fn id_from(path: &str) -> Option<UserId> {
        path.strip_prefix(USERS_PATH)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(UserId::from)
    }

    fn rejection(&self) -> Option<ClientError> {
        self.reject_writes
            .lock()
            .expect("reject")
            .clone()
            .map(|message| ClientError::transport(Some(400), message))
    }

    fn not_found(path: &str) -> ClientError {
        ClientError::not_found(path, Some(ApiErrorBody::new("User not found").error))
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.record("GET", path);
        Self::pass(&self.read_gate).await;
        if let Some(err) = self.fail_reads.lock().expect("fail").clone() {
            return Err(err);
        }
        let users = self.users();
        match Self::id_from(path) {
            None => Ok(serde_json::to_value(users)?),
            Some(id) => users
                .into_iter()
                .find(|user| user.id == id)
                .map(|user| serde_json::to_value(user).map_err(ClientError::from))
                .unwrap_or_else(|| Err(Self::not_found(path))),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.record("POST", path);
        Self::pass(&self.write_gate).await;
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        let fields: UserFields = serde_json::from_value(body)?;
        let id = format!("u{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 100);
        let record = UserRecord::new(id, fields);
        self.users.lock().expect("users").push(record.clone());
        Ok(serde_json::to_value(record)?)
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.record("PUT", path);
        Self::pass(&self.write_gate).await;
        if let Some(err) = self.rejection() {
            return Err(err);
        }
        let fields: UserFields = serde_json::from_value(body)?;
        let id = Self::id_from(path).ok_or_else(|| Self::not_found(path))?;
        let mut users = self.users.lock().expect("users");
        let user = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| Self::not_found(path))?;
        user.fields = fields;
        Ok(serde_json::to_value(user.clone())?)
    }

    async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.record("DELETE", path);
        Self::pass(&self.write_gate).await;
        let id = Self::id_from(path).ok_or_else(|| Self::not_found(path))?;
        let mut users = self.users.lock().expect("users");
        let before = users.len();
        users.retain(|user| user.id != id);
        if users.len() == before {
            return Err(Self::not_found(path));
        }
        Ok(Value::Null)
    }
}

pub(crate) fn fields(first: &str, last: &str, email: &str, phone: &str) -> UserFields {
    UserFields {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
    }
}

pub(crate) fn ann() -> UserRecord {
    UserRecord::new("u1", fields("Ann", "Lee", "ann@x.com", "9876543210"))
}

pub(crate) fn bob() -> UserRecord {
    UserRecord::new("u2", fields("Bob", "Ray", "bob@x.com", "8765432109"))
}

pub(crate) fn valid(first: &str) -> ValidUser {
    ValidUser::from_fields(fields(first, "Tester", "tester@x.com", "7000000000"))
        .expect("valid fixture")
}

pub(crate) fn cache_over(backend: Arc<FakeBackend>) -> CacheHandle {
    cache_with(backend, CacheConfig::default())
}

pub(crate) fn cache_with(backend: Arc<FakeBackend>, config: CacheConfig) -> CacheHandle {
    QueryCache::create(UserApi::new(backend), config)
}

/// Yields to the runtime until `condition` holds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
