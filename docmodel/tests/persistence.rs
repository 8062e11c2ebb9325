use async_trait::async_trait;
use docmodel::{
    bson::{Bson, doc, oid::ObjectId},
    memory::InMemoryStore,
    prelude::*,
};
use std::sync::Arc;

struct Schemas {
    user: Arc<Schema>,
    post: Arc<Schema>,
}

struct NotBanned;

#[async_trait]
impl IoValidator for NotBanned {
    async fn validate(&self, ctx: &IoContext<'_>, _field: &Field, value: &FieldValue) -> DocumentStoreResult<()> {
        let nick = value.as_str().unwrap_or_default();

        match ctx.backend.count_documents("banned", doc! { "nick": nick }).await? {
            0 => Ok(()),
            _ => Err(ErrorMessages::message("Nick is banned.").into()),
        }
    }
}

/// Refuses to touch records flagged as locked.
struct SkipLocked;

impl DocumentHooks for SkipLocked {
    fn pre_insert(&self, data: &mut DataProxy) -> DocumentStoreResult<()> {
        data.set("locked", false)
    }

    fn pre_update(&self, _data: &mut DataProxy) -> DocumentStoreResult<Option<docmodel::bson::Document>> {
        Ok(Some(doc! { "locked": false }))
    }
}

fn schemas() -> Schemas {
    let name = Schema::embedded("Name")
        .field(Field::string("first").attribute("f"))
        .field(Field::string("last").attribute("l"))
        .build()
        .unwrap();

    let user = Schema::document("User", "user")
        .field(Field::string("nick").required().unique().io_validate(NotBanned))
        .field(Field::embedded("name", &name).attribute("n"))
        .field(Field::integer("age"))
        .field(Field::list("tags", Field::string("tag")))
        .build()
        .unwrap();

    let post = Schema::document("Post", "post")
        .field(Field::string("title").required())
        .field(Field::reference("author", &user))
        .field(Field::boolean("locked"))
        .hooks(SkipLocked)
        .build()
        .unwrap();

    Schemas { user, post }
}

async fn setup() -> (DocumentStore<InMemoryStore>, Schemas) {
    let schemas = schemas();
    let registry = SchemaRegistry::new()
        .with(schemas.user.clone())
        .unwrap()
        .with(schemas.post.clone())
        .unwrap();

    let store = DocumentStore::new(InMemoryStore::new(), registry);
    store.ensure_indexes().await.unwrap();

    (store, schemas)
}

async fn create_user(store: &DocumentStore<InMemoryStore>, schema: &Arc<Schema>, nick: &str) -> Document {
    let mut user = Document::with_data(schema.clone(), [("nick", nick)]).unwrap();
    user.commit(store, CommitOptions::default()).await.unwrap();
    user
}

#[tokio::test]
async fn insert_requires_required_fields() {
    let (store, schemas) = setup().await;
    let mut user = Document::new(schemas.user.clone()).unwrap();

    let err = user.commit(&store, CommitOptions::default()).await.unwrap_err();

    assert_eq!(
        err.validation_messages().unwrap(),
        &ErrorMessages::field("nick", ErrorMessages::message("Missing data for required field."))
    );
    assert_eq!(user.state(), DocumentState::NotCreated);
    assert!(store.backend().records("user").await.is_empty());
}

#[tokio::test]
async fn insert_sets_the_primary_key() {
    let (store, schemas) = setup().await;
    let mut user = Document::with_data(
        schemas.user.clone(),
        doc! { "nick": "bob", "name": { "first": "Bob", "last": "Smith" } },
    )
    .unwrap();

    let result = user.commit(&store, CommitOptions::default()).await.unwrap();

    assert!(matches!(result, Some(CommitResult::Inserted(_))));
    assert!(user.is_created());
    assert!(!user.is_modified());

    let records = store.backend().records("user").await;
    assert_eq!(records.len(), 1);
    assert_eq!(Some(records[0].get("_id").unwrap()), user.pk());
    assert_eq!(records[0].get_document("n").unwrap(), &doc! { "f": "Bob", "l": "Smith" });
}

#[tokio::test]
async fn duplicate_unique_value_is_a_field_error() {
    let (store, schemas) = setup().await;
    create_user(&store, &schemas.user, "bob").await;

    let mut other = Document::with_data(schemas.user.clone(), [("nick", "bob")]).unwrap();
    let err = other.commit(&store, CommitOptions::default()).await.unwrap_err();

    assert_eq!(
        err.validation_messages().unwrap(),
        &ErrorMessages::field("nick", ErrorMessages::message("Field value must be unique."))
    );
    assert!(!other.is_created());
}

#[tokio::test]
async fn update_sends_only_modified_fields() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    // Changed behind the document's back; a partial update must not overwrite it.
    store
        .backend()
        .update_one("user", doc! { "_id": user.pk().unwrap().clone() }, doc! { "$set": { "age": 99 } })
        .await
        .unwrap();

    user.data_mut().list_mut("tags").unwrap().push("admin").unwrap();
    assert_eq!(user.data().get_modified_fields().into_iter().collect::<Vec<_>>(), ["tags"]);

    let result = user.commit(&store, CommitOptions::default()).await.unwrap();
    assert!(matches!(result, Some(CommitResult::Updated(_))));

    let records = store.backend().records("user").await;
    assert_eq!(records[0].get_i32("age").unwrap(), 99);
    assert_eq!(records[0].get_array("tags").unwrap(), &vec![Bson::from("admin")]);

    let again = user.commit(&store, CommitOptions::default()).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn replace_writes_the_whole_document() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    store
        .backend()
        .update_one("user", doc! { "_id": user.pk().unwrap().clone() }, doc! { "$set": { "age": 99 } })
        .await
        .unwrap();

    user.set("nick", "robert").unwrap();
    let result = user
        .commit(&store, CommitOptions::new().replace(true))
        .await
        .unwrap();
    assert!(matches!(result, Some(CommitResult::Replaced(_))));

    let records = store.backend().records("user").await;
    assert_eq!(records[0].get_str("nick").unwrap(), "robert");
    assert!(records[0].get("age").is_none());
}

#[tokio::test]
async fn conditions_guard_the_update() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    user.set("age", 30).unwrap();
    let err = user
        .commit(&store, CommitOptions::new().conditions(doc! { "nick": "alice" }))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::Update { matched: 0, .. }));
    assert!(user.is_modified());

    user.commit(&store, CommitOptions::new().conditions(doc! { "nick": "bob" }))
        .await
        .unwrap();
    assert_eq!(store.backend().records("user").await[0].get_i32("age").unwrap(), 30);
}

#[tokio::test]
async fn conditions_need_a_created_document() {
    let (store, schemas) = setup().await;
    let mut user = Document::with_data(schemas.user.clone(), [("nick", "bob")]).unwrap();

    let err = user
        .commit(&store, CommitOptions::new().conditions(doc! { "nick": "bob" }))
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::InvalidUsage(_)));
}

#[tokio::test]
async fn deleted_document_is_terminal() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    let result = user.delete(&store, None).await.unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(user.state(), DocumentState::Deleted);
    assert!(store.backend().records("user").await.is_empty());

    user.set("age", 3).unwrap();
    assert!(matches!(
        user.commit(&store, CommitOptions::default()).await,
        Err(DocumentStoreError::NotCreated(_))
    ));
    assert!(matches!(user.delete(&store, None).await, Err(DocumentStoreError::NotCreated(_))));
    assert!(matches!(user.reload(&store).await, Err(DocumentStoreError::NotCreated(_))));
}

#[tokio::test]
async fn delete_with_failed_conditions() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    let err = user
        .delete(&store, Some(doc! { "age": 12 }))
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::Delete { deleted: 0, .. }));
    assert!(user.is_created());
}

#[tokio::test]
async fn reload_discards_local_changes() {
    let (store, schemas) = setup().await;
    let mut user = create_user(&store, &schemas.user, "bob").await;

    store
        .backend()
        .update_one("user", doc! { "_id": user.pk().unwrap().clone() }, doc! { "$set": { "age": 41 } })
        .await
        .unwrap();
    user.set("nick", "robert").unwrap();

    user.reload(&store).await.unwrap();

    assert_eq!(user.get("nick").unwrap().as_str(), Some("bob"));
    assert_eq!(user.get("age").unwrap().as_i64(), Some(41));
    assert!(!user.is_modified());
}

#[tokio::test]
async fn custom_io_validator_rejects_values() {
    let (store, schemas) = setup().await;
    store
        .backend()
        .insert_one("banned", doc! { "nick": "mallory" })
        .await
        .unwrap();

    let mut user = Document::with_data(schemas.user.clone(), [("nick", "mallory")]).unwrap();
    let err = user.commit(&store, CommitOptions::default()).await.unwrap_err();

    assert_eq!(
        err.validation_messages().unwrap(),
        &ErrorMessages::field("nick", ErrorMessages::message("Nick is banned."))
    );
}

#[tokio::test]
async fn reference_messages_agree_between_validation_and_fetch() {
    let schemas = schemas();
    let comment = Schema::document("Comment", "comment")
        .field(Field::reference("author", &schemas.user).error_message(MessageKey::NotFound, "No such {document}."))
        .build()
        .unwrap();
    let registry = SchemaRegistry::new()
        .with(schemas.user.clone())
        .unwrap()
        .with(comment.clone())
        .unwrap();
    let store = DocumentStore::new(InMemoryStore::new(), registry);
    let expected = ErrorMessages::field("author", ErrorMessages::message("No such User."));

    let mut dangling = Document::with_data(comment.clone(), [("author", ObjectId::new())]).unwrap();
    let err = dangling.commit(&store, CommitOptions::default()).await.unwrap_err();
    assert_eq!(err.validation_messages().unwrap(), &expected);

    let bob = create_user(&store, &schemas.user, "bob").await;
    let mut reply = Document::with_data(comment.clone(), [("author", bob.to_reference().unwrap())]).unwrap();
    reply.commit(&store, CommitOptions::default()).await.unwrap();

    store
        .backend()
        .delete_one("user", doc! { "_id": bob.pk().unwrap().clone() })
        .await
        .unwrap();

    let err = reply.fetch_reference("author", &store).await.unwrap_err();
    assert_eq!(err.validation_messages().unwrap(), expected.get("author").unwrap());
}

#[tokio::test]
async fn references_are_checked_and_fetched() {
    let (store, schemas) = setup().await;
    let bob = create_user(&store, &schemas.user, "bob").await;

    let mut orphan = Document::with_data(
        schemas.post.clone(),
        [("title", FieldValue::from("Hello")), ("author", FieldValue::from(ObjectId::new()))],
    )
    .unwrap();
    let err = orphan.commit(&store, CommitOptions::default()).await.unwrap_err();
    assert_eq!(
        err.validation_messages().unwrap(),
        &ErrorMessages::field("author", ErrorMessages::message("Reference not found for document User."))
    );

    let mut post = Document::with_data(
        schemas.post.clone(),
        [("title", FieldValue::from("Hello")), ("author", FieldValue::from(bob.to_reference().unwrap()))],
    )
    .unwrap();
    post.commit(&store, CommitOptions::default()).await.unwrap();

    let author = post.get("author").unwrap().as_reference().unwrap();
    assert!(author.exists(&store).await.unwrap());

    let fetched = author.fetch(&store).await.unwrap();
    assert_eq!(fetched.get("nick").unwrap().as_str(), Some("bob"));
    assert_eq!(fetched.pk(), bob.pk());
}

#[tokio::test]
async fn hooks_fill_data_and_restrict_updates() {
    let (store, schemas) = setup().await;
    let mut post = Document::with_data(schemas.post.clone(), [("title", "Hello")]).unwrap();
    post.commit(&store, CommitOptions::default()).await.unwrap();

    assert_eq!(post.get("locked").unwrap().as_bool(), Some(false));
    assert_eq!(store.backend().records("post").await[0].get_bool("locked").unwrap(), false);

    store
        .backend()
        .update_one("post", doc! { "_id": post.pk().unwrap().clone() }, doc! { "$set": { "locked": true } })
        .await
        .unwrap();

    post.set("title", "Edited").unwrap();
    let err = post.commit(&store, CommitOptions::default()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Update { .. }));
}

#[tokio::test]
async fn queries_use_object_names() {
    let (store, schemas) = setup().await;

    for (nick, first, age) in [("ann", "Ann", 31), ("bob", "Bob", 25), ("cid", "Cid", 40)] {
        let mut user = Document::with_data(
            schemas.user.clone(),
            doc! { "nick": nick, "name": { "first": first }, "age": age },
        )
        .unwrap();
        user.commit(&store, CommitOptions::default()).await.unwrap();
    }

    let users = store.collection(&schemas.user).unwrap();

    let ann = users.find_one(doc! { "name.first": "Ann" }).await.unwrap().unwrap();
    assert_eq!(ann.get("nick").unwrap().as_str(), Some("ann"));
    assert!(ann.is_created());

    let query = Query::builder()
        .filter(doc! { "age": { "$gte": 30 } })
        .sort("age", SortDirection::Desc)
        .limit(1)
        .projection(["nick"])
        .build();
    let found = users.find(query).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("nick").unwrap().as_str(), Some("cid"));
    assert!(found[0].get("age").unwrap().is_missing());

    assert_eq!(users.count_documents(Filter::lt("age", 35)).await.unwrap(), 2);
    assert_eq!(users.count_documents(doc! {}).await.unwrap(), 3);
}

#[tokio::test]
async fn update_many_pushes_list_elements() {
    let (store, schemas) = setup().await;

    for nick in ["ann", "bob"] {
        let mut user = Document::with_data(schemas.user.clone(), doc! { "nick": nick, "tags": ["staff"] }).unwrap();
        user.commit(&store, CommitOptions::default()).await.unwrap();
    }

    let mut changes = DataProxy::new(schemas.user.clone());
    changes.update(doc! { "tags": ["admin"] }).unwrap();

    let users = store.collection(&schemas.user).unwrap();
    let result = users.update_many(doc! {}, &changes, false).await.unwrap();
    assert_eq!(result.matched_count, 2);

    for record in store.backend().records("user").await {
        assert_eq!(record.get_array("tags").unwrap(), &vec![Bson::from("staff"), Bson::from("admin")]);
    }

    let untouched = DataProxy::new(schemas.user.clone());
    assert!(matches!(
        users.update_many(doc! {}, &untouched, false).await,
        Err(DocumentStoreError::InvalidUsage(_))
    ));
}
