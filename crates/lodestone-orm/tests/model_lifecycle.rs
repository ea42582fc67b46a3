//! Model registry and instance lifecycle behavior against an in-memory
//! database.

use lodestone_orm::{
    sync_hook, AssociationDef, Connection, InstanceState, ModelDef, OrmError, Registry,
    RegistryBuilder,
};
use lodestone_sql::{Config, SqlValue};

async fn setup() -> (Connection, Registry) {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, \
         salary REAL, company_id INTEGER)",
    )
    .await
    .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("company", "companies")
                .associate(AssociationDef::one_to_many("employees", "employee")),
        )
        .unwrap();
    builder
        .define(
            ModelDef::new("employee", "employees")
                .associate(AssociationDef::many_to_one("company", "company")),
        )
        .unwrap();

    let registry = builder.sync(conn.clone()).await.unwrap();
    (conn, registry)
}

#[tokio::test]
async fn test_create_save_reloads_generated_pk() {
    let (_conn, registry) = setup().await;
    let company = registry.model("company").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    assert_eq!(acme.state(), InstanceState::New);
    assert!(acme.get("id").is_none());

    acme.save().await.unwrap();
    assert_eq!(acme.state(), InstanceState::Persisted);
    assert_eq!(acme.get("id"), Some(&SqlValue::Int(1)));

    let fetched = company.get(1_i64).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&SqlValue::Text(String::from("acme"))));
}

#[tokio::test]
async fn test_update_writes_changed_columns_only() {
    let (conn, registry) = setup().await;
    let employee = registry.model("employee").unwrap();

    let mut ann = employee
        .create(vec![
            ("name", SqlValue::Text(String::from("ann"))),
            ("salary", SqlValue::Float(100.0)),
        ])
        .unwrap();
    ann.save().await.unwrap();

    // Change the salary behind the instance's back, then save a change to
    // a different column. The out-of-band salary must survive.
    conn.execute("UPDATE employees SET salary = 999.0 WHERE id = 1")
        .await
        .unwrap();
    ann.set("name", "ann m").unwrap();
    assert!(ann.changed().contains("name"));
    ann.save().await.unwrap();
    assert!(ann.changed().is_empty());

    ann.refresh().await.unwrap();
    assert_eq!(ann.get("name"), Some(&SqlValue::Text(String::from("ann m"))));
    assert_eq!(ann.get("salary"), Some(&SqlValue::Float(999.0)));
}

#[tokio::test]
async fn test_save_without_changes_is_a_no_op() {
    let (conn, registry) = setup().await;
    let company = registry.model("company").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();

    let before = conn.statement_count();
    acme.save().await.unwrap();
    assert_eq!(conn.statement_count(), before);
}

#[tokio::test]
async fn test_removed_is_terminal() {
    let (_conn, registry) = setup().await;
    let company = registry.model("company").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();
    acme.remove().await.unwrap();
    assert_eq!(acme.state(), InstanceState::Removed);

    assert!(matches!(acme.set("name", "x"), Err(OrmError::Model(_))));
    assert!(matches!(acme.save().await, Err(OrmError::Model(_))));
    assert!(matches!(acme.remove().await, Err(OrmError::Model(_))));
    assert_eq!(company.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_remove_requires_persistence() {
    let (_conn, registry) = setup().await;
    let company = registry.model("company").unwrap();
    let mut unsaved = company.create(vec![("name", "ghost")]).unwrap();
    assert!(matches!(unsaved.remove().await, Err(OrmError::Model(_))));
}

#[tokio::test]
async fn test_get_not_found() {
    let (_conn, registry) = setup().await;
    let company = registry.model("company").unwrap();
    assert!(matches!(company.get(42_i64).await, Err(OrmError::NotFound)));
}

#[tokio::test]
async fn test_unknown_column_rejected() {
    let (_conn, registry) = setup().await;
    let company = registry.model("company").unwrap();
    assert!(matches!(
        company.create(vec![("nope", 1_i64)]),
        Err(OrmError::Model(_))
    ));
}

#[tokio::test]
async fn test_pre_save_hook_mutates_before_insert() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
        .await
        .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(ModelDef::new("note", "notes").pre_save(sync_hook(|instance| {
            let body = match instance.get("body") {
                Some(SqlValue::Text(s)) => s.to_uppercase(),
                _ => String::new(),
            };
            instance.set("body", body)
        })))
        .unwrap();
    let registry = builder.sync(conn.clone()).await.unwrap();

    let note = registry.model("note").unwrap();
    let mut n = note.create(vec![("body", "hello")]).unwrap();
    n.save().await.unwrap();

    let fetched = note.get(1_i64).await.unwrap();
    assert_eq!(fetched.get("body"), Some(&SqlValue::Text(String::from("HELLO"))));
}

#[tokio::test]
async fn test_failing_pre_save_hook_aborts_before_any_statement() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
        .await
        .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(ModelDef::new("note", "notes").pre_save(sync_hook(|_instance| {
            Err(OrmError::Model(String::from("rejected")))
        })))
        .unwrap();
    let registry = builder.sync(conn.clone()).await.unwrap();

    let note = registry.model("note").unwrap();
    let mut n = note.create(vec![("body", "hello")]).unwrap();
    let before = conn.statement_count();
    assert!(n.save().await.is_err());

    // Nothing was written and the instance never became persisted.
    assert_eq!(conn.statement_count(), before);
    assert_eq!(n.state(), InstanceState::New);
    assert_eq!(note.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_model_and_table_rejected() {
    let mut builder = RegistryBuilder::new(Config::default());
    builder.define(ModelDef::new("a", "letters")).unwrap();
    assert!(matches!(
        builder.define(ModelDef::new("a", "other")),
        Err(OrmError::Model(_))
    ));
    assert!(matches!(
        builder.define(ModelDef::new("b", "letters")),
        Err(OrmError::Model(_))
    ));
}

#[tokio::test]
async fn test_sync_fails_for_missing_table() {
    let conn = Connection::in_memory().await.unwrap();
    let mut builder = RegistryBuilder::new(Config::default());
    builder.define(ModelDef::new("ghost", "ghosts")).unwrap();
    assert!(matches!(
        builder.sync(conn).await,
        Err(OrmError::Model(_))
    ));
}

#[tokio::test]
async fn test_sync_fails_for_unknown_association_target() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("company", "companies")
                .associate(AssociationDef::one_to_many("employees", "employee")),
        )
        .unwrap();
    assert!(matches!(
        builder.sync(conn).await,
        Err(OrmError::Association(_))
    ));
}

#[tokio::test]
async fn test_sync_fails_for_unresolvable_key_column() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    // No company_id column, so the derived key cannot resolve.
    conn.execute("CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("company", "companies")
                .associate(AssociationDef::one_to_many("employees", "employee")),
        )
        .unwrap();
    builder.define(ModelDef::new("employee", "employees")).unwrap();
    assert!(matches!(
        builder.sync(conn).await,
        Err(OrmError::Association(_))
    ));
}
