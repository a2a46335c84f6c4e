use super::*;
use crate::{
    api::QueryKey,
    cache::MutationOutput,
    error::ClientError,
    form::{FormController, SubmitOutcome},
    test_support::{ann, bob, cache_over, wait_until, FakeBackend},
    validation::{ValidUser, EMAIL, FIRST_NAME, LAST_NAME, PHONE},
};

use std::sync::Mutex;

const LIST: &str = "GET /user-information";

#[derive(Default)]
struct Recorder {
    routes: Mutex<Vec<Route>>,
    notices: Mutex<Vec<Notice>>,
}

impl Recorder {
    fn routes(&self) -> Vec<Route> {
        self.routes.lock().expect("routes").clone()
    }

    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices").clone()
    }
}

impl Navigator for Recorder {
    fn navigate(&self, route: Route) {
        self.routes.lock().expect("routes").push(route);
    }
}

impl Notifier for Recorder {
    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices").push(notice);
    }
}

fn context(backend: Arc<FakeBackend>) -> (FlowContext, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let ctx = FlowContext::new(cache_over(backend), recorder.clone(), recorder.clone());
    (ctx, recorder)
}

fn fill(form: &FormController<ValidUser>, first: &str) {
    form.set_value(FIRST_NAME, first).expect("first");
    form.set_value(LAST_NAME, "Tester").expect("last");
    form.set_value(EMAIL, "tester@x.com").expect("email");
    form.set_value(PHONE, "7000000000").expect("phone");
}

#[test]
fn routes_map_to_front_end_paths() {
    assert_eq!(Route::UserList.path(), "/users");
    assert_eq!(Route::CreateUser.path(), "/users/create");
    assert_eq!(
        Route::UpdateUser(UserId::from("u7")).to_string(),
        "/users/update/u7"
    );
}

#[tokio::test]
async fn list_moves_from_loading_to_populated_rows() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann(), bob()]).gate_reads());
    let (ctx, _recorder) = context(backend.clone());

    let list = ListFlow::mount(ctx);
    assert_eq!(list.state(), ListState::Loading);
    assert!(list.rows().is_empty());

    backend.release_reads(1);
    assert_eq!(list.settled().await, ListState::Populated(vec![ann(), bob()]));

    let rows = list.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].index, 1);
    assert_eq!(rows[0].user, ann());
    assert_eq!(rows[1].index, 2);
}

#[tokio::test]
async fn list_without_users_is_empty() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, _recorder) = context(backend);

    let list = ListFlow::mount(ctx);

    assert_eq!(list.settled().await, ListState::Empty);
}

#[tokio::test]
async fn list_fetch_failure_shows_the_error() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_reads_with(Some(ClientError::transport(Some(503), "service unavailable")));
    let (ctx, _recorder) = context(backend);

    let list = ListFlow::mount(ctx);

    assert_eq!(
        list.settled().await,
        ListState::Error("service unavailable".to_string())
    );
}

#[tokio::test]
async fn deleting_a_row_reloads_the_list_without_it() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann(), bob()]));
    let (ctx, recorder) = context(backend.clone());
    let list = ListFlow::mount(ctx);
    list.settled().await;

    list.delete(UserId::from("u1")).await.expect("delete");

    assert_eq!(list.settled().await, ListState::Populated(vec![bob()]));
    assert_eq!(backend.count("DELETE /user-information/u1"), 1);
    assert_eq!(backend.count(LIST), 2);
    assert!(recorder.notices().is_empty());
}

#[tokio::test]
async fn deleting_twice_issues_two_requests_and_reports_the_second_failure() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]));
    let (ctx, recorder) = context(backend.clone());
    let list = ListFlow::mount(ctx);
    list.settled().await;

    let (first, second) = tokio::join!(
        list.delete(UserId::from("u1")),
        list.delete(UserId::from("u1"))
    );

    assert_eq!(backend.count("DELETE /user-information/u1"), 2);
    assert!(first.is_ok() != second.is_ok());
    assert_eq!(recorder.notices(), vec![Notice::error("User not found")]);
    assert_eq!(list.settled().await, ListState::Empty);
}

#[tokio::test]
async fn list_navigation_helpers_route_to_forms() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, recorder) = context(backend);
    let list = ListFlow::mount(ctx);

    list.open_create();
    list.open_update(UserId::from("u2"));

    assert_eq!(
        recorder.routes(),
        vec![Route::CreateUser, Route::UpdateUser(UserId::from("u2"))]
    );
}

#[tokio::test]
async fn unmounting_the_list_releases_its_subscription() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, _recorder) = context(backend);
    let cache = ctx.cache.clone();

    let list = ListFlow::mount(ctx);
    assert_eq!(cache.subscriber_count(&QueryKey::Users), 1);
    drop(list);

    assert_eq!(cache.subscriber_count(&QueryKey::Users), 0);
}

#[tokio::test]
async fn create_success_notifies_navigates_and_clears_the_draft() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, recorder) = context(backend.clone());
    let cache = ctx.cache.clone();
    let list = ListFlow::mount(ctx.clone());
    list.settled().await;

    let create = CreateFlow::mount(ctx);
    fill(create.form(), "Carl");
    let outcome = create.submit().await;

    let SubmitOutcome::Submitted(MutationOutput::Created(Some(record))) = outcome else {
        panic!("expected created record");
    };
    assert_eq!(record.fields.first_name, "Carl");
    assert_eq!(recorder.notices(), vec![Notice::success("User info submitted!")]);
    assert_eq!(recorder.routes(), vec![Route::UserList]);
    assert_eq!(create.form().value(FIRST_NAME).as_deref(), Some(""));

    assert_eq!(list.settled().await, ListState::Populated(vec![record]));
    assert!(cache.pending_mutations().is_empty());
}

#[tokio::test]
async fn create_rejection_keeps_the_draft_and_stays_put() {
    let backend = Arc::new(FakeBackend::new());
    backend.reject_writes_with("email already exists");
    let (ctx, recorder) = context(backend.clone());

    let create = CreateFlow::mount(ctx);
    fill(create.form(), "Carl");
    let outcome = create.submit().await;

    assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    assert_eq!(recorder.notices(), vec![Notice::error("email already exists")]);
    assert!(recorder.routes().is_empty());
    assert_eq!(create.form().value(FIRST_NAME).as_deref(), Some("Carl"));
    assert_eq!(
        create.form().submit_error().as_deref(),
        Some("email already exists")
    );
    assert!(backend.users().is_empty());
}

#[tokio::test]
async fn create_with_invalid_draft_sends_nothing() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, recorder) = context(backend.clone());

    let create = CreateFlow::mount(ctx);
    fill(create.form(), "Al");
    let outcome = create.submit().await;

    assert!(matches!(outcome, SubmitOutcome::Invalid(_)));
    assert_eq!(backend.count("POST /user-information"), 0);
    assert!(recorder.notices().is_empty());
    assert!(recorder.routes().is_empty());
}

#[tokio::test]
async fn update_loads_and_seeds_the_form() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]));
    let (ctx, _recorder) = context(backend);

    let update = UpdateFlow::mount(ctx, UserId::from("u1"));
    assert_eq!(update.state(), UpdateState::LoadingUser);
    assert_eq!(update.load().await, UpdateState::Ready);

    let values = update.form().values();
    assert_eq!(values[FIRST_NAME], "Ann");
    assert_eq!(values[LAST_NAME], "Lee");
    assert_eq!(values[EMAIL], "ann@x.com");
    assert_eq!(values[PHONE], "9876543210");
}

#[tokio::test]
async fn reloading_does_not_overwrite_edits() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]));
    let (ctx, _recorder) = context(backend);
    let update = UpdateFlow::mount(ctx, UserId::from("u1"));
    update.load().await;

    update.form().set_value(FIRST_NAME, "Annie").expect("edit");
    update.load().await;

    assert_eq!(update.form().value(FIRST_NAME).as_deref(), Some("Annie"));
}

#[tokio::test]
async fn update_of_missing_user_is_not_found() {
    let backend = Arc::new(FakeBackend::new());
    let (ctx, _recorder) = context(backend);

    let update = UpdateFlow::mount(ctx, UserId::from("ghost"));

    assert_eq!(update.load().await, UpdateState::NotFound);
    assert_eq!(update.state().to_string(), "User not found.");
    assert!(matches!(update.submit().await, SubmitOutcome::Blocked));
}

#[tokio::test]
async fn update_with_invalid_phone_is_rejected_locally() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]));
    let (ctx, recorder) = context(backend.clone());
    let update = UpdateFlow::mount(ctx, UserId::from("u1"));
    update.load().await;

    update.form().set_value(PHONE, "123").expect("edit");
    let outcome = update.submit().await;

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected local rejection");
    };
    assert_eq!(
        errors.get(PHONE).map(String::as_str),
        Some("Phone number must be exactly 10 characters!")
    );
    assert_eq!(backend.count("PUT /user-information/u1"), 0);
    assert_eq!(update.state(), UpdateState::Ready);
    assert!(recorder.notices().is_empty());
}

#[tokio::test]
async fn update_success_refreshes_list_and_record() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]));
    let (ctx, recorder) = context(backend.clone());
    let cache = ctx.cache.clone();
    let list = ListFlow::mount(ctx.clone());
    list.settled().await;
    let update = UpdateFlow::mount(ctx, UserId::from("u1"));
    update.load().await;

    update.form().set_value(FIRST_NAME, "Annie").expect("edit");
    assert!(update.submit().await.is_submitted());

    assert_eq!(update.state(), UpdateState::Done);
    assert_eq!(recorder.notices(), vec![Notice::success("User info updated!")]);
    assert_eq!(recorder.routes(), vec![Route::UserList]);
    let ListState::Populated(users) = list.settled().await else {
        panic!("expected populated list");
    };
    assert_eq!(users[0].fields.first_name, "Annie");
    let user_entry = cache
        .peek(&QueryKey::User(UserId::from("u1")))
        .expect("user entry");
    assert!(user_entry.is_invalidated);
}

#[tokio::test]
async fn update_rejection_keeps_edits_and_allows_retry() {
    let backend = Arc::new(FakeBackend::with_users(vec![ann()]).gate_writes());
    let (ctx, recorder) = context(backend.clone());
    let update = Arc::new(UpdateFlow::mount(ctx, UserId::from("u1")));
    update.load().await;
    backend.reject_writes_with("phone already exists");

    update.form().set_value(PHONE, "9000000000").expect("edit");
    let submitting = {
        let update = update.clone();
        tokio::spawn(async move { update.submit().await })
    };
    wait_until(|| update.state() == UpdateState::Submitting).await;
    assert!(update.form().is_disabled());
    backend.release_writes(1);
    let outcome = submitting.await.expect("submit task");

    assert!(matches!(outcome, SubmitOutcome::Rejected(_)));
    assert_eq!(
        update.state(),
        UpdateState::Failed("phone already exists".to_string())
    );
    assert_eq!(recorder.notices(), vec![Notice::error("phone already exists")]);
    assert!(recorder.routes().is_empty());
    assert_eq!(update.form().value(PHONE).as_deref(), Some("9000000000"));
    assert_eq!(backend.users()[0].fields.phone, "9876543210");
}
