//! CRUD, concurrency and query behaviour of the generic store over the
//! in-memory backing context.

mod common;

use authstore::prelude::*;
use authstore::{EntityKind, columns};
use common::{harness, harness_with};
use futures_util::TryStreamExt;
use uuid::Uuid;

#[tokio::test]
async fn test_create_assigns_identifier_and_concurrency_token() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();

    let app = store.create(Application::new("abc123")).await.unwrap();

    assert!(app.id.is_some());
    assert!(app.concurrency_token.is_some());
    assert_eq!(h.context.row_count(EntityKind::Application).await, 1);
}

#[tokio::test]
async fn test_update_rotates_concurrency_token() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let app = store.create(Application::new("abc123")).await.unwrap();
    let before = app.concurrency_token.clone();

    let mut changed = app.clone();
    changed.display_name = Some("Portal".to_string());
    let updated = store.update(changed).await.unwrap();

    assert_ne!(updated.concurrency_token, before);
    let stored = store.find_by_id(app.id.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("Portal"));
    assert_eq!(stored.concurrency_token, updated.concurrency_token);
}

#[tokio::test]
async fn test_stale_update_conflicts_and_leaves_entity_unchanged() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let app = store.create(Application::new("abc123")).await.unwrap();

    let mut first = app.clone();
    first.display_name = Some("First".to_string());
    let first = store.update(first).await.unwrap();

    let mut stale = app.clone();
    stale.display_name = Some("Stale".to_string());
    let err = store.update(stale).await.unwrap_err();
    assert!(err.is_retryable());

    let stored = store.find_by_id(app.id.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored, first);
}

#[tokio::test]
async fn test_stale_delete_conflicts() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();
    let scope = store.create(Scope::new("api")).await.unwrap();
    store.update(scope.clone()).await.unwrap();

    let err = store.delete(&scope).await.unwrap_err();
    assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    assert_eq!(h.context.row_count(EntityKind::Scope).await, 1);
}

#[tokio::test]
async fn test_update_without_token_conflicts() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();
    let mut scope = store.create(Scope::new("api")).await.unwrap();
    scope.concurrency_token = None;

    let err = store.update(scope).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_update_without_identifier_is_rejected() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();

    let err = store.update(Scope::new("api")).await.unwrap_err();
    assert!(err.is_validation_error());
}

#[tokio::test]
async fn test_concurrent_updates_with_same_token_let_one_win() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let app = store.create(Application::new("abc123")).await.unwrap();

    let mut left = app.clone();
    left.display_name = Some("Left".to_string());
    let mut right = app.clone();
    right.display_name = Some("Right".to_string());

    let (left, right) = tokio::join!(store.update(left), store.update(right));
    let succeeded = [left.is_ok(), right.is_ok()];
    assert_eq!(succeeded.iter().filter(|ok| **ok).count(), 1);

    let loser = if let Err(e) = left { e } else { right.unwrap_err() };
    assert!(loser.is_retryable());
}

#[tokio::test]
async fn test_duplicate_client_id_is_rejected() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    store.create(Application::new("abc123")).await.unwrap();

    let err = store.create(Application::new("abc123")).await.unwrap_err();
    assert!(err.is_backend_error());
    assert_eq!(h.context.row_count(EntityKind::Application).await, 1);
}

#[tokio::test]
async fn test_find_by_client_id() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let created = store.create(Application::new("abc123")).await.unwrap();
    store.create(Application::new("other")).await.unwrap();

    let found = store.find_by_client_id("abc123").await.unwrap();
    assert_eq!(found, Some(created));
    assert_eq!(store.find_by_client_id("missing").await.unwrap(), None);
}

#[tokio::test]
async fn test_authorizations_have_no_unique_field() {
    let h = harness();
    let store = h.services.authorization_store::<Authorization>().unwrap();
    let mut authorization = Authorization::default();
    authorization.subject = Some("alice".to_string());
    store.create(authorization).await.unwrap();

    assert_eq!(store.find_by_unique_field("alice").await.unwrap(), None);
}

#[tokio::test]
async fn test_list_accessor_preserves_order() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let permissions = vec!["c".to_string(), "a".to_string(), "b".to_string()];

    let mut app = Application::new("abc123");
    store.set_permissions(&mut app, &permissions).unwrap();
    let app = store.create(app).await.unwrap();

    let stored = store.find_by_id(app.id.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(store.permissions(&stored).unwrap(), permissions);
}

#[tokio::test]
async fn test_malformed_column_is_a_validation_error() {
    let h = harness();
    let store = h.services.application_store::<Application>().unwrap();
    let mut app = Application::new("abc123");
    app.permissions = Some("not json".to_string());

    let err = store.permissions(&app).unwrap_err();
    assert!(err.is_validation_error());
}

async fn create_scopes(store: &dyn ScopeStore<Scope>, names: &[&str]) {
    for name in names {
        store.create(Scope::new(*name)).await.unwrap();
    }
}

#[tokio::test]
async fn test_paged_windows_concatenate_to_ordered_set() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();
    create_scopes(store.as_ref(), &["e", "b", "d", "a", "c"]).await;

    let ordered = || EntityQuery::default().order_by(OrderBy::asc(columns::NAME));
    let full: Vec<_> = store
        .list(ordered())
        .await
        .unwrap()
        .into_iter()
        .filter_map(|scope| scope.name)
        .collect();
    assert_eq!(full, ["a", "b", "c", "d", "e"]);

    let mut paged = Vec::new();
    for skip in (0..5).step_by(2) {
        let page = store.list(ordered().skip(skip).take(2)).await.unwrap();
        paged.extend(page.into_iter().filter_map(|scope| scope.name));
    }
    assert_eq!(paged, full);
}

#[tokio::test]
async fn test_query_stream_crosses_page_boundaries() {
    let h = harness_with(|builder| builder.configure(|config| config.query.page_size = 2));
    let store = h.services.scope_store::<Scope>().unwrap();
    create_scopes(store.as_ref(), &["a", "b", "c", "d", "e"]).await;

    let all: Vec<Scope> = store
        .query(EntityQuery::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all.len(), 5);

    let windowed: Vec<Scope> = store
        .query(
            EntityQuery::default()
                .order_by(OrderBy::desc(columns::NAME))
                .skip(1)
                .take(3),
        )
        .try_collect()
        .await
        .unwrap();
    let names: Vec<_> = windowed.into_iter().filter_map(|scope| scope.name).collect();
    assert_eq!(names, ["d", "c", "b"]);
}

#[tokio::test]
async fn test_query_on_unknown_column_fails() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();

    let result: StoreResult<Vec<Scope>> = store
        .query(EntityQuery::new(Filter::all().eq("nope", "x")))
        .try_collect()
        .await;
    assert!(result.unwrap_err().is_validation_error());
}

#[tokio::test]
async fn test_count_applies_filter() {
    let h = harness();
    let store = h.services.scope_store::<Scope>().unwrap();
    create_scopes(store.as_ref(), &["read", "write", "admin"]).await;

    assert_eq!(store.count(Filter::all()).await.unwrap(), 3);
    assert_eq!(
        store
            .count(Filter::all().eq(columns::NAME, "admin"))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_integer_keys_are_assigned_sequentially() {
    let h = harness_with(|builder| builder.with_key::<i64>());
    let store = h.services.scope_store::<Scope<i64>>().unwrap();

    let first = store.create(Scope::new("read")).await.unwrap();
    let second = store.create(Scope::new("write")).await.unwrap();

    assert_eq!(first.id, Some(1));
    assert_eq!(second.id, Some(2));
    let found = store.find_by_id(&2).await.unwrap().unwrap();
    assert_eq!(found.name.as_deref(), Some("write"));
}

#[tokio::test]
async fn test_uuid_keys_are_generated() {
    let h = harness_with(|builder| builder.with_key::<Uuid>());
    let store = h.services.token_store::<Token<Uuid>>().unwrap();

    let token = store.create(Token::default()).await.unwrap();
    let id = token.id.unwrap();
    assert!(store.find_by_id(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_restrict_policy_refuses_referenced_application() {
    let h = harness();
    let applications = h.services.application_store::<Application>().unwrap();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();

    let app = applications.create(Application::new("abc123")).await.unwrap();
    let mut authorization = Authorization::default();
    authorization.application_id = app.id.clone();
    authorizations.create(authorization).await.unwrap();

    let err = applications.delete(&app).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::ReferentialConflict { dependents: 1, .. }
    ));
    assert_eq!(h.context.row_count(EntityKind::Application).await, 1);
}

#[tokio::test]
async fn test_cascade_policy_removes_dependents() {
    let h = harness_with(|builder| builder.delete_policy(DeletePolicy::Cascade));
    let applications = h.services.application_store::<Application>().unwrap();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();
    let tokens = h.services.token_store::<Token>().unwrap();

    let app = applications.create(Application::new("abc123")).await.unwrap();
    let mut authorization = Authorization::default();
    authorization.application_id = app.id.clone();
    let authorization = authorizations.create(authorization).await.unwrap();

    let mut token = Token::default();
    token.authorization_id = authorization.id.clone();
    tokens.create(token).await.unwrap();
    let mut token = Token::default();
    token.application_id = app.id.clone();
    tokens.create(token).await.unwrap();

    applications.delete(&app).await.unwrap();

    assert_eq!(h.context.row_count(EntityKind::Application).await, 0);
    assert_eq!(h.context.row_count(EntityKind::Authorization).await, 0);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 0);
}

#[tokio::test]
async fn test_shutdown_clears_resolution_caches() {
    let h = harness();
    h.services.application_store::<Application>().unwrap();
    assert_eq!(h.services.applications().cache().len(), 1);

    h.services.shutdown().await;
    assert!(h.services.applications().cache().is_empty());
}

#[derive(Debug, Clone, Default)]
struct LabelledScope {
    base: Scope,
    label: Option<String>,
}

impl Entity for LabelledScope {
    type Key = String;
}

impl Model for LabelledScope {
    type Base = Scope;

    const EXTENSION_PROPERTY: Option<&'static str> = Some("label");

    fn base(&self) -> &Scope {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Scope {
        &mut self.base
    }

    fn from_base(base: Scope) -> Self {
        Self { base, label: None }
    }

    fn extension(&self) -> serde_json::Value {
        serde_json::json!(self.label)
    }

    fn restore_extension(&mut self, value: serde_json::Value) -> StoreResult<()> {
        self.label = serde_json::from_value(value)
            .map_err(|e| StoreError::validation(format!("Malformed label: {e}")))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_model_extension_survives_reads() {
    let h = harness_with(|builder| builder.register_scope::<LabelledScope>());
    let store = h.services.scope_store::<LabelledScope>().unwrap();

    let scope = LabelledScope {
        base: Scope {
            name: Some("api".to_string()),
            ..Scope::default()
        },
        label: Some("internal".to_string()),
    };
    let created = store.create(scope).await.unwrap();
    let id = created.base.id.clone().unwrap();

    let stored = store.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.label.as_deref(), Some("internal"));

    let mut changed = stored;
    changed.label = Some("public".to_string());
    store.update(changed).await.unwrap();
    let stored = store.find_by_unique_field("api").await.unwrap().unwrap();
    assert_eq!(stored.label.as_deref(), Some("public"));

    // The base model sees the extension as an ordinary property.
    let scopes = h.services.scope_store::<Scope>().unwrap();
    let base = scopes.find_by_id(&id).await.unwrap().unwrap();
    let properties = scopes.properties(&base).unwrap();
    assert_eq!(properties.get("label"), Some(&serde_json::json!("public")));
}

#[tokio::test]
async fn test_malformed_extension_is_a_validation_error() {
    let h = harness_with(|builder| builder.register_scope::<LabelledScope>());
    let scopes = h.services.scope_store::<Scope>().unwrap();

    let mut scope = Scope {
        name: Some("api".to_string()),
        ..Scope::default()
    };
    let mut properties = authstore::Properties::new();
    properties.insert("label".to_string(), serde_json::json!(42));
    scopes.set_properties(&mut scope, &properties).unwrap();
    let scope = scopes.create(scope).await.unwrap();

    let store = h.services.scope_store::<LabelledScope>().unwrap();
    let err = store
        .find_by_id(scope.id.as_ref().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_validation_error());
}
