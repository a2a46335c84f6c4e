
use std::{
    future::Future,
    marker::PhantomData,
    sync::{Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;
use tracing::debug;

use crate::{
    error::ClientError,
    validation::{user_schema, FieldErrors, FormValues, Schema, ValidUser},
};

pub trait FormModel: Sized {
    fn schema() -> &'static Schema;
    fn parse(values: &FormValues) -> Result<Self, FieldErrors>;
}

impl FormModel for ValidUser {
    fn schema() -> &'static Schema {
        user_schema()
    }

    fn parse(values: &FormValues) -> Result<Self, FieldErrors> {
        ValidUser::parse(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Validate on submit; after the first submit attempt, re-validate a field
    /// whenever it changes.
    #[default]
    OnSubmit,
    OnChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form is disabled while a submission is in flight")]
    Disabled,
    #[error("unknown form field '{0}'")]
    UnknownField(String),
}

#[derive(Debug)]
pub enum SubmitOutcome<T> {
    Submitted(T),
    Invalid(FieldErrors),
    Rejected(ClientError),
    Blocked,
}

impl<T> SubmitOutcome<T> {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub errors: FieldErrors,
    pub submit_error: Option<String>,
    pub is_submitting: bool,
    pub submit_count: u32,
}

#[derive(Debug, Default)]
struct FormState {
    values: FormValues,
    errors: FieldErrors,
    submit_error: Option<String>,
    is_submitting: bool,
    submit_count: u32,
    seeded: bool,
}

pub struct FormController<M: FormModel> {
    state: Mutex<FormState>,
    mode: ValidationMode,
    _model: PhantomData<fn() -> M>,
}

impl<M: FormModel> Default for FormController<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: FormModel> FormController<M> {
    pub fn new() -> Self {
        Self::with_mode(ValidationMode::default())
    }

    pub fn with_mode(mode: ValidationMode) -> Self {
        Self {
            state: Mutex::new(FormState {
                values: M::schema().default_values(),
                ..FormState::default()
            }),
            mode,
            _model: PhantomData,
        }
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let state = self.lock();
        FormSnapshot {
            values: state.values.clone(),
            errors: state.errors.clone(),
            submit_error: state.submit_error.clone(),
            is_submitting: state.is_submitting,
            submit_count: state.submit_count,
        }
    }

    pub fn value(&self, field: &str) -> Option<String> {
        self.lock().values.get(field).cloned()
    }

    pub fn values(&self) -> FormValues {
        self.lock().values.clone()
    }

    pub fn error(&self, field: &str) -> Option<String> {
        self.lock().errors.get(field).cloned()
    }

    pub fn errors(&self) -> FieldErrors {
        self.lock().errors.clone()
    }

    pub fn submit_error(&self) -> Option<String> {
        self.lock().submit_error.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.lock().is_submitting
    }

    pub fn is_disabled(&self) -> bool {
        self.is_submitting()
    }

    pub fn set_value(&self, field: &str, value: impl Into<String>) -> Result<(), FormError> {
        let schema = M::schema();
        if !schema.contains(field) {
            return Err(FormError::UnknownField(field.to_string()));
        }
        let mut state = self.lock();
        if state.is_submitting {
            return Err(FormError::Disabled);
        }
        let value = value.into();
        let revalidate = match self.mode {
            ValidationMode::OnChange => true,
            ValidationMode::OnSubmit => state.submit_count > 0,
        };
        if revalidate {
            match schema.validate_field(field, &value) {
                Some(message) => state.errors.insert(field.to_string(), message),
                None => state.errors.remove(field),
            };
        }
        state.values.insert(field.to_string(), value);
        Ok(())
    }

    pub fn touch(&self, field: &str) -> Option<String> {
        let mut state = self.lock();
        let value = state.values.get(field).cloned().unwrap_or_default();
        let error = M::schema().validate_field(field, &value);
        match &error {
            Some(message) => state.errors.insert(field.to_string(), message.clone()),
            None => state.errors.remove(field),
        };
        error
    }

    /// Replaces the draft with `values` the first time it is called. Later
    /// calls are ignored until the form is reset, so a re-fetched record does
    /// not overwrite the operator's edits.
    pub fn seed(&self, values: FormValues) -> bool {
        let mut state = self.lock();
        if state.seeded || state.is_submitting {
            return false;
        }
        let schema = M::schema();
        for (field, value) in values {
            if schema.contains(&field) {
                state.values.insert(field, value);
            }
        }
        state.seeded = true;
        true
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        *state = FormState {
            values: M::schema().default_values(),
            is_submitting: state.is_submitting,
            ..FormState::default()
        };
    }

    /// Invalid drafts never reach `submit`.
    pub async fn submit<F, Fut, T>(&self, submit: F) -> SubmitOutcome<T>
    where
        F: FnOnce(M) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let model = {
            let mut state = self.lock();
            if state.is_submitting {
                return SubmitOutcome::Blocked;
            }
            state.submit_count += 1;
            state.submit_error = None;
            match M::parse(&state.values) {
                Ok(model) => {
                    state.errors.clear();
                    state.is_submitting = true;
                    model
                }
                Err(errors) => {
                    debug!(fields = errors.len(), "submission blocked by validation");
                    state.errors = errors.clone();
                    return SubmitOutcome::Invalid(errors);
                }
            }
        };

        let mut guard = SubmittingGuard {
            form: self,
            armed: true,
        };
        let result = submit(model).await;
        guard.armed = false;

        let mut state = self.lock();
        state.is_submitting = false;
        match result {
            Ok(output) => {
                state.values = M::schema().default_values();
                state.errors.clear();
                state.seeded = false;
                state.submit_count = 0;
                SubmitOutcome::Submitted(output)
            }
            Err(err) => {
                state.submit_error = Some(err.user_message());
                SubmitOutcome::Rejected(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_submitting` even when the submit future is dropped mid-flight.
struct SubmittingGuard<'a, M: FormModel> {
    form: &'a FormController<M>,
    armed: bool,
}

impl<M: FormModel> Drop for SubmittingGuard<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            self.form.lock().is_submitting = false;
        }
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
