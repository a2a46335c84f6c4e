//! Client-side core for the user-information service: field validation, form
//! state, a query cache over the REST API, and the list/create/update flows
//! built on them.

pub mod api;
pub mod cache;
pub mod error;
pub mod flows;
pub mod form;
pub mod transport;
pub mod validation;

pub use api::{QueryData, QueryKey, UserApi};
pub use cache::{
    CacheConfig, CacheEvent, CacheHandle, Mutation, MutationOutput, MutationStatus, QueryCache,
    QueryEntry, Subscription,
};
pub use error::ClientError;
pub use flows::{
    CreateFlow, FlowContext, ListFlow, ListState, Navigator, Notice, NoticeLevel, Notifier, Route,
    UpdateFlow, UpdateState,
};
pub use form::{FormController, FormError, SubmitOutcome, ValidationMode};
pub use transport::{HttpTransport, Transport};
pub use validation::{user_schema, FieldErrors, FormValues, ValidUser};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
